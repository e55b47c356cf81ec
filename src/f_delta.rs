use crate::cooc_stats::CoocShard;
use crate::error::{EmbeddingError, Result};

use ndarray::{Array2, Zip};
use ndarray_stats::QuantileExt;
use std::str::FromStr;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaKind {
    Mse,
    W2v,
    Glove,
    Mle,
    Swivel,
}

impl FromStr for DeltaKind {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mse" => Ok(DeltaKind::Mse),
            "w2v" => Ok(DeltaKind::W2v),
            "glove" => Ok(DeltaKind::Glove),
            "mle" => Ok(DeltaKind::Mle),
            "swivel" => Ok(DeltaKind::Swivel),
            _ => Err(EmbeddingError::unknown("f_delta", s)),
        }
    }
}

impl DeltaKind {

    /// Precompute the corpus constants of this delta from whole-matrix
    /// statistics.
    pub fn build(&self, cooc: &CoocShard, k: f64, x_max: f64, temperature: f64) -> Result<Box<dyn DeltaFunction>> {
        let f: Box<dyn DeltaFunction> = match self {
            DeltaKind::Mse => Box::new(Mse),
            DeltaKind::W2v => Box::new(W2v::new(cooc, k)),
            DeltaKind::Glove => Box::new(Glove::new(cooc, x_max)),
            DeltaKind::Mle => Box::new(Mle::new(cooc, temperature)?),
            DeltaKind::Swivel => Box::new(Swivel::new(cooc)),
        };
        Ok(f)
    }
}

/// Per-call arguments forwarded from the solver to the delta function.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeltaArgs {
    temperature: f64,
}

impl DeltaArgs {

    pub fn new(temperature: f64) -> Result<DeltaArgs> {
        if temperature < 1.0 {
            return Err(EmbeddingError::InvalidTemperature(temperature));
        }
        Ok(Self { temperature })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl Default for DeltaArgs {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

/// Elementwise derivative of the objective with respect to `M_hat`.
pub trait DeltaFunction: Send + Sync {
    fn calc(&self, m: &Array2<f64>, m_hat: &Array2<f64>, args: Option<&DeltaArgs>) -> Array2<f64>;
}

impl<F> DeltaFunction for F
where
    F: Fn(&Array2<f64>, &Array2<f64>) -> Array2<f64> + Send + Sync {

    fn calc(&self, m: &Array2<f64>, m_hat: &Array2<f64>, _args: Option<&DeltaArgs>) -> Array2<f64> {
        self(m, m_hat)
    }
}

/// Logistic function, computed without overflowing for large `|x|`.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Expected negative samples under independence: `k Nx Nxᵗ / N`.
pub fn calc_n_neg_xx(k: f64, nx: &Array2<f64>) -> Array2<f64> {
    let n = nx.sum();
    nx.dot(&nx.t()) * (k / n)
}


#[derive(Clone, Copy, Debug, Default)]
pub struct Mse;

impl DeltaFunction for Mse {
    fn calc(&self, m: &Array2<f64>, m_hat: &Array2<f64>, _args: Option<&DeltaArgs>) -> Array2<f64> {
        m - m_hat
    }
}


#[derive(Clone, Debug)]
pub struct W2v {
    multiplier: Array2<f64>,
}

impl W2v {
    pub fn new(cooc: &CoocShard, k: f64) -> W2v {
        let multiplier = &cooc.nxx + &calc_n_neg_xx(k, &cooc.nx);
        Self { multiplier }
    }
}

impl DeltaFunction for W2v {
    fn calc(&self, m: &Array2<f64>, m_hat: &Array2<f64>, _args: Option<&DeltaArgs>) -> Array2<f64> {
        Zip::from(&self.multiplier)
            .and(m)
            .and(m_hat)
            .map_collect(|w, m, m_hat| w * (sigmoid(*m) - sigmoid(*m_hat)))
    }
}


#[derive(Clone, Debug)]
pub struct Glove {
    multiplier: Array2<f64>,
}

impl Glove {
    pub fn new(cooc: &CoocShard, x_max: f64) -> Glove {
        let multiplier = cooc.nxx.mapv(|v| (v / x_max).powf(0.75).min(1.0) * 2.0);
        Self { multiplier }
    }
}

impl DeltaFunction for Glove {
    fn calc(&self, m: &Array2<f64>, m_hat: &Array2<f64>, _args: Option<&DeltaArgs>) -> Array2<f64> {
        // unobserved pairs contribute nothing, even where M is -inf
        Zip::from(&self.multiplier)
            .and(m)
            .and(m_hat)
            .map_collect(|w, m, m_hat| if *w == 0.0 { 0.0 } else { w * (m - m_hat) })
    }
}


/// Tempered maximum likelihood: `(Nx Nxᵗ / max)^(1/t) (e^M - e^M_hat)`.
#[derive(Clone, Debug)]
pub struct Mle {
    multiplier: Array2<f64>,
    temperature: f64,
}

impl Mle {
    pub fn new(cooc: &CoocShard, temperature: f64) -> Result<Mle> {
        let args = DeltaArgs::new(temperature)?;
        let multiplier = cooc.nx.dot(&cooc.nxt);
        let max = multiplier.max().copied().unwrap_or(f64::NAN);
        Ok(Self { multiplier: multiplier / max, temperature: args.temperature })
    }
}

impl DeltaFunction for Mle {
    fn calc(&self, m: &Array2<f64>, m_hat: &Array2<f64>, args: Option<&DeltaArgs>) -> Array2<f64> {
        let t = args.map_or(self.temperature, |a| a.temperature);
        Zip::from(&self.multiplier)
            .and(m)
            .and(m_hat)
            .map_collect(|w, m, m_hat| w.powf(1.0 / t) * (m.exp() - m_hat.exp()))
    }
}


#[derive(Clone, Debug)]
pub struct Swivel {
    nxx_sqrt: Array2<f64>,
}

impl Swivel {
    pub fn new(cooc: &CoocShard) -> Swivel {
        Self { nxx_sqrt: cooc.nxx.mapv(f64::sqrt) }
    }
}

impl DeltaFunction for Swivel {
    fn calc(&self, m: &Array2<f64>, m_hat: &Array2<f64>, _args: Option<&DeltaArgs>) -> Array2<f64> {
        Zip::from(&self.nxx_sqrt)
            .and(m)
            .and(m_hat)
            .map_collect(|w, m, m_hat| {
                let diff = m - m_hat;
                if *w > 0.0 { w * diff } else { sigmoid(diff) }
            })
    }
}
