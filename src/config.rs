use crate::constrainer::ConstrainerKind;
use crate::error::{EmbeddingError, Result};
use crate::f_delta::DeltaKind;
use crate::m_builder::MBase;
use crate::solver::SolverKind;

use serde_json::Value;
use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;


#[derive(Clone, Debug)]
pub struct TrainParams {
    pub embedding_dim: usize,
    pub learning_rate: f64,
    pub momentum_decay: f64,
    pub solver: SolverKind,
    pub f_delta: DeltaKind,
    pub x_max: f64,
    pub temperature: f64,
    pub one_sided: bool,
    pub constrainer: Option<ConstrainerKind>,
    pub max_iter: usize,
    pub seed: Option<u64>,
}

impl Display for TrainParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "training hyper parameters:
        embedding_dim: {},
        learning_rate: {},
        momentum_decay: {},
        solver: {:?},
        f_delta: {:?},
        x_max: {},
        temperature: {},
        one_sided: {},
        constrainer: {:?},
        max_iter: {},
        seed: {:?}",
        self.embedding_dim, self.learning_rate, self.momentum_decay, self.solver, self.f_delta,
        self.x_max, self.temperature, self.one_sided, self.constrainer, self.max_iter, self.seed
        )
    }
}

#[derive(Clone, Debug)]
pub struct MParams {
    pub base: MBase,
    pub k: f64,
    pub shift_by: Option<f64>,
    pub neg_inf_val: Option<f64>,
    pub clip_thresh: Option<f64>,
    pub diag: Option<f64>,
    pub alpha_smoothing: Option<f64>,
}

impl Display for MParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "association matrix:
        base: {:?},
        k: {},
        shift_by: {:?},
        neg_inf_val: {:?},
        clip_thresh: {:?},
        diag: {:?},
        alpha_smoothing: {:?}",
        self.base, self.k, self.shift_by, self.neg_inf_val, self.clip_thresh, self.diag, self.alpha_smoothing
        )
    }
}

#[derive(Clone, Debug)]
pub struct PipelineParams {
    pub corpus_file: PathBuf,
    pub output_dir: PathBuf,
    pub window_size: usize,
    pub vocab_size: Option<usize>,
    pub min_count: Option<u64>,
    pub saved_counts: bool,
    pub num_threads: usize,
    pub m_params: MParams,
    pub train_params: TrainParams,
}

impl Display for PipelineParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using hyper-params:
        corpus_file: {}
        output_dir: {}
        window_size: {}
        vocab_size: {:?}
        min_count: {:?}
        saved_counts: {}
        num_threads: {},
        Using {}
        Using {}",
        self.corpus_file.display(), self.output_dir.display(), self.window_size, self.vocab_size,
        self.min_count, self.saved_counts, self.num_threads, self.m_params, self.train_params)
    }
}

pub struct Config {
    params: PipelineParams
}

impl Config {

    pub fn get_params(&self) -> PipelineParams {
        self.params.clone()
    }

    pub fn new(args: &[String]) -> Result<Config> {

        if args.len() != 2 {
            return Err(EmbeddingError::Config("input should be a path to json file only".into()));
        }

        let f = File::open(&args[1])?;
        let json: Value = serde_json::from_reader(BufReader::new(f))?;
        Config::from_json(&json)
    }

    pub fn from_json(json: &Value) -> Result<Config> {

        // input and output are mandatory, everything else has a default
        let corpus_file = required_str(json, "corpus_file")?;
        let output_dir = required_str(json, "output_dir")?;

        let m_params = MParams {
            base: parse_or(json, "m_base", MBase::Pmi)?,
            k: f64_or(json, "k", 15.0)?,
            shift_by: opt_f64(json, "shift_by")?,
            neg_inf_val: opt_f64(json, "neg_inf_val")?,
            clip_thresh: opt_f64(json, "clip_thresh")?,
            diag: opt_f64(json, "diag")?,
            alpha_smoothing: opt_f64(json, "alpha_smoothing")?,
        };

        let constrainer = match json.get("constrainer") {
            Some(Value::Null) | None => None,
            Some(_) => Some(parse_or(json, "constrainer", ConstrainerKind::Glove)?),
        };

        let train_params = TrainParams {
            embedding_dim: opt_u64(json, "embedding_dim")?.unwrap_or(300) as usize,
            learning_rate: f64_or(json, "learning_rate", 1e-6)?,
            momentum_decay: f64_or(json, "momentum_decay", 0.9)?,
            solver: parse_or(json, "solver", SolverKind::Nesterov)?,
            f_delta: parse_or(json, "f_delta", DeltaKind::Mse)?,
            x_max: f64_or(json, "x_max", 100.0)?,
            temperature: f64_or(json, "temperature", 1.0)?,
            one_sided: bool_or(json, "one_sided", false)?,
            constrainer,
            max_iter: opt_u64(json, "max_iter")?.unwrap_or(100) as usize,
            seed: opt_u64(json, "seed")?,
        };

        if train_params.temperature < 1.0 {
            return Err(EmbeddingError::InvalidTemperature(train_params.temperature));
        }

        let params = PipelineParams {
            corpus_file: PathBuf::from(corpus_file),
            output_dir: PathBuf::from(output_dir),
            window_size: opt_u64(json, "window_size")?.unwrap_or(5) as usize,
            vocab_size: opt_u64(json, "vocab_size")?.map(|v| v as usize),
            min_count: opt_u64(json, "min_count")?,
            saved_counts: bool_or(json, "saved_counts", false)?,
            num_threads: opt_u64(json, "num_threads")?.unwrap_or(4) as usize,
            m_params,
            train_params,
        };

        Ok(Self { params })
    }
}

fn required_str<'a>(json: &'a Value, key: &str) -> Result<&'a str> {
    json.get(key)
        .ok_or_else(|| EmbeddingError::Config(format!("{} was not supplied through json", key)))?
        .as_str()
        .ok_or_else(|| EmbeddingError::Config(format!("{} should be a string", key)))
}

fn opt_f64(json: &Value, key: &str) -> Result<Option<f64>> {
    match json.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64()
            .map(Some)
            .ok_or_else(|| EmbeddingError::Config(format!("given {} is not numeric", key))),
    }
}

fn f64_or(json: &Value, key: &str, default: f64) -> Result<f64> {
    Ok(opt_f64(json, key)?.unwrap_or(default))
}

fn opt_u64(json: &Value, key: &str) -> Result<Option<u64>> {
    match json.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64()
            .map(Some)
            .ok_or_else(|| EmbeddingError::Config(format!("given {} is not a non-negative integer", key))),
    }
}

fn bool_or(json: &Value, key: &str, default: bool) -> Result<bool> {
    match json.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_bool()
            .ok_or_else(|| EmbeddingError::Config(format!("given {} is not boolean", key))),
    }
}

fn parse_or<T>(json: &Value, key: &str, default: T) -> Result<T>
where
    T: FromStr<Err = EmbeddingError> {

    match json.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_str()
            .ok_or_else(|| EmbeddingError::Config(format!("given {} is not a string", key)))?
            .parse(),
    }
}


pub mod files_handling {

    // every artifact knows its own on-disk format, the directory layout is
    // decided by the caller.

    use crate::dictionary::Dictionary;
    use crate::error::{EmbeddingError, Result};
    use crate::sparse::CsrMatrix;

    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use ndarray::Array2;
    use ndarray_npy::{read_npy, write_npy};
    use serde::de::{SeqAccess, Visitor};
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter, Write};
    use std::path::{Path, PathBuf};


    pub fn read_input<R: ReadFile>(file_path: &Path) -> Result<R> {
        R::read_file(file_path)
    }

    pub fn save_output<S: SaveFile>(output_dir: &Path, file_name: &str, item: &S) -> Result<()> {
        fs::create_dir_all(output_dir)?;
        item.save_file(output_dir, file_name)
    }

    fn with_ext(path: &Path, ext: &str) -> PathBuf {
        PathBuf::from(format!("{}.{}", path.display(), ext))
    }

    fn open_existing(path: PathBuf) -> Result<BufReader<File>> {
        if !path.exists() {
            return Err(EmbeddingError::NotFound(path));
        }
        Ok(BufReader::new(File::open(path)?))
    }

    pub trait ReadFile: Sized {
        fn read_file(file_path: &Path) -> Result<Self>;
    }

    pub trait SaveFile {
        fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()>;
    }

    impl ReadFile for Dictionary {
        fn read_file(file_path: &Path) -> Result<Self> {
            let f = open_existing(with_ext(file_path, "json"))?;
            Ok(serde_json::from_reader(f)?)
        }
    }

    impl SaveFile for Dictionary {
        fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
            let out = with_ext(&output_dir.join(file_name), "json");
            let f = BufWriter::new(File::create(out)?);
            serde_json::to_writer(f, self)?;
            Ok(())
        }
    }

    impl ReadFile for Vec<u64> {
        fn read_file(file_path: &Path) -> Result<Self> {
            let f = open_existing(with_ext(file_path, "json"))?;
            Ok(serde_json::from_reader(f)?)
        }
    }

    impl SaveFile for Vec<u64> {
        fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
            let out = with_ext(&output_dir.join(file_name), "json");
            let f = BufWriter::new(File::create(out)?);
            serde_json::to_writer(f, self)?;
            Ok(())
        }
    }

    impl ReadFile for Array2<f64> {
        fn read_file(file_path: &Path) -> Result<Self> {
            let in_file = with_ext(file_path, "npy");
            if !in_file.exists() {
                return Err(EmbeddingError::NotFound(in_file));
            }
            Ok(read_npy(in_file)?)
        }
    }

    impl SaveFile for Array2<f64> {
        fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
            let out = with_ext(&output_dir.join(file_name), "npy");
            write_npy(out, self)?;
            Ok(())
        }
    }

    impl ReadFile for CsrMatrix {
        fn read_file(file_path: &Path) -> Result<Self> {
            let f = open_existing(with_ext(file_path, "bin.gz"))?;
            Ok(bincode::deserialize_from(GzDecoder::new(f))?)
        }
    }

    impl SaveFile for CsrMatrix {
        fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
            let out = with_ext(&output_dir.join(file_name), "bin.gz");
            let mut writer = GzEncoder::new(BufWriter::new(File::create(out)?), Compression::default());
            bincode::serialize_into(&mut writer, self)?;
            writer.finish()?.flush()?;
            Ok(())
        }
    }

    impl ReadFile for WrapperCounts {
        fn read_file(file_path: &Path) -> Result<Self> {
            let f = open_existing(with_ext(file_path, "bin.gz"))?;
            Ok(bincode::deserialize_from(GzDecoder::new(f))?)
        }
    }

    impl SaveFile for WrapperCounts {
        fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
            let out = with_ext(&output_dir.join(file_name), "bin.gz");
            let mut writer = GzEncoder::new(BufWriter::new(File::create(out)?), Compression::default());
            bincode::serialize_into(&mut writer, self)?;
            writer.finish()?.flush()?;
            Ok(())
        }
    }


    /// Raw pair counts, stored as a sequence of `(i, j, count)` lines sorted
    /// by pair so the same counts always produce the same bytes.
    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct WrapperCounts {
        pub counts: HashMap<(usize, usize), u64>,
    }

    impl Serialize for WrapperCounts {
        fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where
            S: Serializer {

                let mut lines: Vec<(usize, usize, u64)> = self.counts
                    .iter()
                    .map(|((i, j), c)| (*i, *j, *c))
                    .collect();
                lines.sort_unstable();

                let mut seq = serializer.serialize_seq(Some(lines.len()))?;
                for line in &lines {
                    seq.serialize_element(line)?;
                }
                seq.end()
        }
    }

    struct CountsVisitor;
    impl<'de> Visitor<'de> for CountsVisitor {

        type Value = HashMap<(usize, usize), u64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("sequence of (i, j, count) lines")
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>, {

                    let mut counts = HashMap::with_capacity(seq.size_hint().unwrap_or(0));
                    while let Some((i, j, count)) = seq.next_element::<(usize, usize, u64)>()? {
                        counts.insert((i, j), count);
                    }
                    Ok(counts)
        }
    }

    impl<'de> Deserialize<'de> for WrapperCounts {
        fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
        where
            D: Deserializer<'de> {

                let counts = deserializer.deserialize_seq(CountsVisitor)?;
                Ok(WrapperCounts { counts })
        }
    }
}
