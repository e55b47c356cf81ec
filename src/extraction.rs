use crate::cooc_stats::CoocStats;
use crate::dictionary::Dictionary;
use crate::error::{EmbeddingError, Result};
use crate::unigram::Unigram;

use rayon::{prelude::*, ThreadPoolBuilder};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::{debug, info};


const PROGRESS_EVERY: usize = 100_000;

fn read_file(file_path: &Path) -> Result<Lines<BufReader<File>>> {
    if !file_path.is_file() {
        return Err(EmbeddingError::NotFound(file_path.to_path_buf()));
    }
    Ok(BufReader::new(File::open(file_path)?).lines())
}

fn in_vocabulary(vocabulary: Option<&Dictionary>, token: &str) -> bool {
    vocabulary.map_or(true, |v| v.get_id_opt(token).is_some())
}

/// Add `(focal, context)` for every context within `window` positions of the
/// focal token. The window is clipped at the ends of `tokens`, so nothing
/// co-occurs across documents.
pub fn extract_window<S: AsRef<str>>(tokens: &[S], window: usize, stats: &mut CoocStats) {
    extract_window_in(tokens, window, None, stats);
}

// out-of-vocabulary tokens still take up room in the window, they are only
// never counted
fn extract_window_in<S: AsRef<str>>(
    tokens: &[S],
    window: usize,
    vocabulary: Option<&Dictionary>,
    stats: &mut CoocStats) {

        let n = tokens.len();
        for i in 0..n {
            let focal = tokens[i].as_ref();
            if !in_vocabulary(vocabulary, focal) {
                continue;
            }
            let end = (i + window).min(n - 1);
            for j in i.saturating_sub(window)..=end {
                if j == i {
                    continue;
                }
                let context = tokens[j].as_ref();
                if in_vocabulary(vocabulary, context) {
                    stats.add(focal, context);
                }
            }
        }
}

pub fn extract_unigram<S: AsRef<str>>(tokens: &[S], unigram: &mut Unigram) {
    for token in tokens {
        unigram.add(token.as_ref());
    }
}

/// Stream a corpus, one whitespace tokenised document per line, into a
/// fresh `CoocStats`.
pub fn extract_file(file_path: &Path, window: usize) -> Result<CoocStats> {
    let mut stats = CoocStats::new();
    for (line_num, line) in read_file(file_path)?.enumerate() {
        if line_num % PROGRESS_EVERY == 0 {
            debug!("lines read: {}", line_num);
        }
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        extract_window(&tokens, window, &mut stats);
    }
    Ok(stats)
}

/// Count every token of the corpus, sorted by descending count.
pub fn extract_unigram_file(file_path: &Path) -> Result<Unigram> {
    let mut unigram = Unigram::new();
    for line in read_file(file_path)? {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        extract_unigram(&tokens, &mut unigram);
    }
    unigram.sort();
    Ok(unigram)
}

// the corpus is split into one contiguous run of lines per worker
fn load_chunks(file_path: &Path, num_threads: usize) -> Result<Vec<Vec<String>>> {
    let lines: Vec<String> = read_file(file_path)?.collect::<std::io::Result<_>>()?;
    let workers = num_threads.max(1);
    let chunk_size = ((lines.len() + workers - 1) / workers).max(1);
    info!("read {} lines, {} per worker", lines.len(), chunk_size);
    Ok(lines.chunks(chunk_size).map(|c| c.to_vec()).collect())
}

pub fn extract_unigram_parallel(file_path: &Path, num_threads: usize) -> Result<Unigram> {
    let chunks = load_chunks(file_path, num_threads)?;
    let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;

    let parts: Vec<Unigram> = pool.install(|| {
        chunks.par_iter().map(|chunk| {
            let mut unigram = Unigram::new();
            for line in chunk {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                extract_unigram(&tokens, &mut unigram);
            }
            unigram
        }).collect()
    });

    // reduce in chunk order so ids do not depend on thread scheduling
    let mut unigram = parts.iter().fold(Unigram::new(), |acc, part| &acc + part);
    unigram.sort();
    info!("found {} unique tokens, {} in total", unigram.len(), unigram.n());
    Ok(unigram)
}

/// Windowed extraction over `num_threads` workers. When `vocabulary` is
/// given only its tokens are counted, and all of them stay in the result
/// even if they never co-occur.
pub fn extract_cooc_parallel(
    file_path: &Path,
    window: usize,
    vocabulary: Option<&Dictionary>,
    num_threads: usize) -> Result<CoocStats> {

        let chunks = load_chunks(file_path, num_threads)?;
        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;

        let parts: Vec<CoocStats> = pool.install(|| {
            chunks.par_iter().enumerate().map(|(worker, chunk)| {
                let mut stats = CoocStats::from_parts(vocabulary.cloned(), None, None)
                    .unwrap_or_default();
                for (line_num, line) in chunk.iter().enumerate() {
                    if worker == 0 && line_num % PROGRESS_EVERY == 0 {
                        debug!("worker 0, lines read: {}", line_num);
                    }
                    let tokens: Vec<&str> = line.split_whitespace().collect();
                    extract_window_in(&tokens, window, vocabulary, &mut stats);
                }
                stats
            }).collect()
        });

        let seed = CoocStats::from_parts(vocabulary.cloned(), None, None)?;
        let mut stats = parts.iter().fold(seed, |acc, part| &acc + part);
        info!("extracted cooccurrences over {} words, N = {}", stats.vocab_len(), stats.n());
        Ok(stats)
}
