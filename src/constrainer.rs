use crate::error::{EmbeddingError, Result};

use ndarray::{s, Array2};
use std::str::FromStr;


/// Called on `(W, V)` after every update, mutating both in place.
pub type Constrainer = Box<dyn Fn(&mut Array2<f64>, &mut Array2<f64>) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstrainerKind {
    Glove,
}

impl FromStr for ConstrainerKind {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "glove" => Ok(ConstrainerKind::Glove),
            _ => Err(EmbeddingError::unknown("constrainer", s)),
        }
    }
}

impl ConstrainerKind {
    pub fn build(&self) -> Constrainer {
        match self {
            ConstrainerKind::Glove => Box::new(glove_constrainer),
        }
    }
}

/// Pin the GloVe bias slots: column 1 of the covectors and row 0 of the
/// vectors stay at one, so `W[i,0]` and `V[1,j]` act as the biases.
pub fn glove_constrainer(w: &mut Array2<f64>, v: &mut Array2<f64>) {
    w.slice_mut(s![.., 1]).fill(1.0);
    v.slice_mut(s![0, ..]).fill(1.0);
}
