use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the co-occurrence and embedding core.
///
/// Numeric trouble (log of zero, NaN from degenerate marginals) is never
/// reported here, it flows through the matrices as `-inf` / `NaN`.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot supply both counts and Nxx")]
    AmbiguousBasis,

    #[error("a dictionary must be supplied together with counts or Nxx")]
    MissingDictionary,

    #[error("covectors of a one-sided embedder cannot be updated independently")]
    OneSidedCovectorUpdate,

    #[error("temperature must be >= 1, got {0}")]
    InvalidTemperature(f64),

    #[error("keep probability must be in (0, 1], got {0}")]
    InvalidKeepProb(f64),

    #[error("the w2v base needs unigram statistics")]
    MissingUnigram,

    #[error("batch data is missing `{0}`")]
    MissingBatchField(&'static str),

    #[error("unknown {kind}: {name}")]
    UnknownVariant { kind: &'static str, name: String },

    #[error("dimension mismatch: expected {expected}, actual {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("nothing saved at {0}")]
    NotFound(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl EmbeddingError {
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownVariant { kind, name: name.into() }
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;


#[cfg(test)]
mod tests {

    use super::EmbeddingError;

    #[test]
    fn messages_name_the_problem() {
        let e = EmbeddingError::unknown("solver", "adam");
        assert_eq!(e.to_string(), "unknown solver: adam");
        let e = EmbeddingError::InvalidTemperature(0.5);
        assert_eq!(e.to_string(), "temperature must be >= 1, got 0.5");
        let e = EmbeddingError::dimension_mismatch(4, 3);
        assert_eq!(e.to_string(), "dimension mismatch: expected 4, actual 3");
    }
}
