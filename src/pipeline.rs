use crate::config::PipelineParams;
use crate::cooc_stats::CoocStats;
use crate::embedder::{Embedder, EmbedderParams};
use crate::error::{EmbeddingError, Result};
use crate::extraction::{extract_cooc_parallel, extract_unigram_parallel};
use crate::f_delta::DeltaArgs;
use crate::m_builder::MBuilder;
use crate::shards::Shard;
use crate::unigram::Unigram;

use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

const BADNESS_EVERY: usize = 10;

pub struct Pipeline {}

impl Pipeline {

    // runs the main procedure of 3 steps -
    // -> cooccurrence statistics, extracted or loaded from output_dir
    // -> the association matrix M
    // -> training, then saving vectors, covectors and dictionary

    pub fn run(params: &PipelineParams) -> Result<()> {

        info!("{}", params);

        let timer = Instant::now();
        let (mut stats, unigram) = match params.saved_counts {
            true => match Pipeline::load_stats(params) {
                Err(EmbeddingError::NotFound(path)) => {
                    warn!("no saved stats at {}, extracting instead", path.display());
                    Pipeline::extract_stats(params)?
                },
                loaded => loaded?,
            },
            false => Pipeline::extract_stats(params)?,
        };
        info!("cooccurrences ready over {} words, took {} seconds ...", stats.vocab_len(), timer.elapsed().as_secs());

        let timer = Instant::now();
        let m = MBuilder::from_params(&params.m_params).load_all(&mut stats, unigram.as_ref())?;
        info!("built M of shape {:?}, took {} seconds ...", m.dim(), timer.elapsed().as_secs());

        let timer = Instant::now();
        let train = &params.train_params;
        let f_delta = train.f_delta.build(
            &stats.load_shard(&Shard::whole()),
            params.m_params.k,
            train.x_max,
            train.temperature
        )?;
        let embedder_params = EmbedderParams {
            d: train.embedding_dim,
            learning_rate: train.learning_rate,
            one_sided: train.one_sided,
            seed: train.seed,
        };
        let mut embedder = Embedder::new(m, f_delta, embedder_params)?;
        if let Some(kind) = train.constrainer {
            embedder = embedder.with_constrainer(kind.build());
        }

        let args = DeltaArgs::new(train.temperature)?;
        let mut solver = train.solver.build(embedder, train.learning_rate, train.momentum_decay);
        for iteration in 0..train.max_iter {
            solver.cycle(1, Some(&args))?;
            if iteration % BADNESS_EVERY == 0 {
                info!("iteration {} / {}, badness: {}", iteration, train.max_iter, solver.objective().calc_badness());
            }
        }
        let embedder = solver.into_objective();
        info!("finished training, final badness {}, took {} seconds ...", embedder.calc_badness(), timer.elapsed().as_secs());

        embedder.save(&params.output_dir)?;
        stats.dictionary().save(&params.output_dir)?;
        info!("saved vectors, covectors and dictionary to {}", params.output_dir.display());
        Ok(())
    }

    fn stats_dir(params: &PipelineParams) -> PathBuf {
        params.output_dir.join("cooc")
    }

    fn extract_stats(params: &PipelineParams) -> Result<(CoocStats, Option<Unigram>)> {

        info!("starting vocab building...");
        let mut unigram = extract_unigram_parallel(&params.corpus_file, params.num_threads)?;
        if let Some(min_count) = params.min_count {
            unigram.prune(min_count);
        }
        if let Some(vocab_size) = params.vocab_size {
            unigram.truncate(vocab_size);
        }

        info!("counting cooccurrences for {} words...", unigram.len());
        let mut stats = extract_cooc_parallel(
            &params.corpus_file,
            params.window_size,
            Some(unigram.dictionary()),
            params.num_threads
        )?;
        stats.sort();
        let unigram = unigram.aligned_to(stats.dictionary());

        stats.save(&Pipeline::stats_dir(params))?;
        unigram.save(&params.output_dir)?;
        Ok((stats, Some(unigram)))
    }

    fn load_stats(params: &PipelineParams) -> Result<(CoocStats, Option<Unigram>)> {

        let stats = CoocStats::load(&Pipeline::stats_dir(params))?;
        let unigram = match Unigram::load(&params.output_dir) {
            Ok(unigram) => Some(unigram.aligned_to(stats.dictionary())),
            Err(EmbeddingError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        info!("loaded saved stats from {}", params.output_dir.display());
        Ok((stats, unigram))
    }
}


#[cfg(test)]
mod tests {

    use super::Pipeline;
    use crate::config::Config;
    use crate::dictionary::Dictionary;
    use ndarray::Array2;
    use ndarray_npy::read_npy;
    use serde_json::json;
    use std::io::Write;

    const LINES: [&str; 4] = [
        "the car has wheels . drive the car .",
        "the wheels spin . eat the bread .",
        "the sandwich has bread . drive the car .",
        "eat the sandwich . the bread has the car .",
    ];

    fn corpus(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("corpus.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        for line in LINES {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let corpus_file = corpus(dir.path());
        let output_dir = dir.path().join("out");
        let json = json!({
            "corpus_file": corpus_file.to_str().unwrap(),
            "output_dir": output_dir.to_str().unwrap(),
            "window_size": 2,
            "num_threads": 2,
            "m_base": "ppmi",
            "embedding_dim": 4,
            "learning_rate": 0.01,
            "max_iter": 5,
            "seed": 1,
        });
        let params = Config::from_json(&json).unwrap().get_params();
        Pipeline::run(&params).unwrap();

        let dictionary = Dictionary::load(&output_dir).unwrap();
        assert_eq!(dictionary.len(), 10);
        let vectors: Array2<f64> = read_npy(output_dir.join("vectors.npy")).unwrap();
        let covectors: Array2<f64> = read_npy(output_dir.join("covectors.npy")).unwrap();
        assert_eq!(vectors.dim(), (4, 10));
        assert_eq!(covectors.dim(), (10, 4));
        assert!(output_dir.join("cooc").is_dir());

        // a second run picks the saved stats up
        let mut reuse = params.clone();
        reuse.saved_counts = true;
        reuse.corpus_file = dir.path().join("gone.txt");
        Pipeline::run(&reuse).unwrap();
    }

    #[test]
    fn w2v_one_sided_run() {
        let dir = tempfile::tempdir().unwrap();
        let corpus_file = corpus(dir.path());
        let output_dir = dir.path().join("out");
        let json = json!({
            "corpus_file": corpus_file.to_str().unwrap(),
            "output_dir": output_dir.to_str().unwrap(),
            "window_size": 2,
            "num_threads": 1,
            "min_count": 2,
            "m_base": "w2v",
            "k": 2.0,
            "clip_thresh": -10.0,
            "embedding_dim": 3,
            "one_sided": true,
            "solver": "nesterov_optimized",
            "max_iter": 3,
            "seed": 2,
        });
        let params = Config::from_json(&json).unwrap().get_params();
        Pipeline::run(&params).unwrap();

        let vectors: Array2<f64> = read_npy(output_dir.join("vectors.npy")).unwrap();
        let covectors: Array2<f64> = read_npy(output_dir.join("covectors.npy")).unwrap();
        assert_eq!(covectors, vectors.t());
    }

    #[test]
    fn missing_corpus_fails() {
        let dir = tempfile::tempdir().unwrap();
        let json = json!({
            "corpus_file": dir.path().join("nope.txt").to_str().unwrap(),
            "output_dir": dir.path().join("out").to_str().unwrap(),
        });
        let params = Config::from_json(&json).unwrap().get_params();
        assert!(Pipeline::run(&params).is_err());
    }
}
