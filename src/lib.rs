pub mod config;
pub mod constrainer;
pub mod cooc_stats;
pub mod corpus_stats;
pub mod dictionary;
pub mod embedder;
pub mod error;
pub mod extraction;
pub mod f_delta;
pub mod loss;
pub mod m_builder;
pub mod pipeline;
pub mod shards;
pub mod solver;
pub mod sparse;
pub mod unigram;

pub use config::{files_handling, Config};
pub use cooc_stats::CoocStats;
pub use dictionary::Dictionary;
pub use embedder::{Embedder, EmbedderParams};
pub use error::{EmbeddingError, Result};
pub use m_builder::MBuilder;
pub use pipeline::Pipeline;
pub use solver::{Optimizable, Solver, SolverKind};
