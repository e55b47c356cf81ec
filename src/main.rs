use cooc_embeddings::{Config, Pipeline};

use std::env;
use tracing_subscriber::EnvFilter;

fn main() {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let params = match Config::new(&args) {
        Ok(config) => config.get_params(),
        Err(e) => panic!("{}", e)
    };

    if let Err(e) = Pipeline::run(&params) {
        panic!("{}", e)
    }
}
