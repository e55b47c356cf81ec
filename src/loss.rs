use crate::cooc_stats::CoocShard;
use crate::error::{EmbeddingError, Result};
use crate::m_builder::negative_sample;
use crate::unigram::UnigramShard;

use ndarray::{Array1, Array2, Axis, Zip};
use rand::distributions::{Bernoulli, Distribution};
use rand::RngCore;
use statrs::function::beta::checked_ln_beta;
use statrs::function::gamma::digamma;


/// Per-batch quantities the losses read. Only the fields a loss names need
/// to be filled in.
#[derive(Clone, Debug, Default)]
pub struct BatchData {
    pub m: Option<Array2<f64>>,
    pub weights: Option<Array2<f64>>,
    pub nxx: Option<Array2<f64>>,
    pub n_neg: Option<Array2<f64>>,
    pub pxx_independent: Option<Array2<f64>>,
    pub pxx_data: Option<Array2<f64>>,
    pub pxx_posterior: Option<Array2<f64>>,
    pub n_posterior: Option<Array2<f64>>,
    pub digamma_a: Option<Array2<f64>>,
    pub digamma_b: Option<Array2<f64>>,
    pub n: Option<f64>,
}

impl BatchData {

    /// Counts and the data / independence probabilities of a shard.
    pub fn from_shard(cooc: &CoocShard) -> BatchData {
        let n2 = cooc.n * cooc.n;
        BatchData {
            pxx_independent: Some(cooc.nx.dot(&cooc.nxt) / n2),
            pxx_data: Some(&cooc.nxx / cooc.n),
            nxx: Some(cooc.nxx.clone()),
            n: Some(cooc.n),
            ..BatchData::default()
        }
    }

    pub fn with_m(mut self, m: Array2<f64>) -> BatchData {
        self.m = Some(m);
        self
    }

    pub fn with_weights(mut self, weights: Array2<f64>) -> BatchData {
        self.weights = Some(weights);
        self
    }

    /// Expected negative samples drawn from the unigram context distribution.
    pub fn with_negatives(mut self, cooc: &CoocShard, unigram: &UnigramShard, k: f64) -> BatchData {
        self.n_neg = Some(negative_sample(cooc, unigram, k));
        self
    }

    /// Beta posterior over each pair probability, with a prior of
    /// `prior_strength` pseudo-pairs centred on independence. Needs the
    /// fields set by `from_shard`.
    pub fn with_posterior(mut self, prior_strength: f64) -> Result<BatchData> {
        let n = self.n.ok_or(EmbeddingError::MissingBatchField("N"))?;
        let nxx = field(&self.nxx, "Nxx")?;
        let pxx_independent = field(&self.pxx_independent, "Pxx_independent")?;

        let n_post = n + prior_strength;
        let pxx_posterior = (nxx + &(pxx_independent * prior_strength)) / n_post;

        let a = &pxx_posterior * n_post;
        let b = pxx_posterior.mapv(|p| n_post * (1.0 - p) + 1.0);
        let digamma_ab = Zip::from(&a).and(&b).map_collect(|a, b| digamma(a + b));

        self.digamma_a = Some(Zip::from(&a).and(&digamma_ab).map_collect(|a, ab| digamma(*a) - ab));
        self.digamma_b = Some(Zip::from(&b).and(&digamma_ab).map_collect(|b, ab| digamma(*b) - ab));
        self.n_posterior = Some(Array2::from_elem(pxx_posterior.dim(), n_post));
        self.pxx_posterior = Some(pxx_posterior);
        Ok(self)
    }
}

fn field<'a>(value: &'a Option<Array2<f64>>, name: &'static str) -> Result<&'a Array2<f64>> {
    value.as_ref().ok_or(EmbeddingError::MissingBatchField(name))
}

/// Minibatch correction: each cell is kept with probability `keep_prob`
/// and the kept sum is rescaled by `keep_prob * ncomponents`.
#[derive(Clone, Copy, Debug)]
pub struct Minibatch {
    keep: Option<Bernoulli>,
    rescale: f64,
}

impl Minibatch {

    pub fn new(keep_prob: f64, ncomponents: usize) -> Result<Minibatch> {
        if !(keep_prob > 0.0 && keep_prob <= 1.0) {
            return Err(EmbeddingError::InvalidKeepProb(keep_prob));
        }
        let keep = match keep_prob {
            p if p == 1.0 => None,
            p => Some(Bernoulli::new(p).map_err(|_| EmbeddingError::InvalidKeepProb(p))?),
        };
        Ok(Self { keep, rescale: keep_prob * ncomponents as f64 })
    }

    pub fn reduce(&self, loss: &Array2<f64>, rng: &mut dyn RngCore) -> f64 {
        let kept: f64 = match &self.keep {
            None => loss.sum(),
            Some(keep) => loss.iter().filter(|_| keep.sample(rng)).sum(),
        };
        kept / self.rescale
    }
}

/// Reweight pairwise losses by `Pxx_independent^(1/t - 1)`.
pub fn temper(loss: Array2<f64>, pxx_independent: &Array2<f64>, temperature: f64) -> Array2<f64> {
    if temperature == 1.0 {
        return loss;
    }
    let power = 1.0 / temperature - 1.0;
    loss * &pxx_independent.mapv(|p| p.powf(power))
}

pub trait Loss {

    fn minibatch(&self) -> &Minibatch;

    fn elementwise(&self, m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>>;

    /// Scalar minibatch loss.
    fn forward(&self, m_hat: &Array2<f64>, batch: &BatchData, rng: &mut dyn RngCore) -> Result<f64> {
        let loss = self.elementwise(m_hat, batch)?;
        Ok(self.minibatch().reduce(&loss, rng))
    }
}

fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}


/// Weighted squared error, the GloVe objective.
#[derive(Clone, Debug)]
pub struct MseLoss {
    minibatch: Minibatch,
}

impl MseLoss {
    pub fn new(keep_prob: f64, ncomponents: usize) -> Result<MseLoss> {
        Ok(Self { minibatch: Minibatch::new(keep_prob, ncomponents)? })
    }
}

impl Loss for MseLoss {

    fn minibatch(&self) -> &Minibatch {
        &self.minibatch
    }

    fn elementwise(&self, m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
        let m = field(&batch.m, "M")?;
        let sq = (m_hat - m).mapv(|d| 0.5 * d * d);
        Ok(match &batch.weights {
            Some(weights) => sq * weights,
            None => sq,
        })
    }
}


#[derive(Clone, Debug)]
pub struct Word2vecLoss {
    minibatch: Minibatch,
}

impl Word2vecLoss {
    pub fn new(keep_prob: f64, ncomponents: usize) -> Result<Word2vecLoss> {
        Ok(Self { minibatch: Minibatch::new(keep_prob, ncomponents)? })
    }
}

impl Loss for Word2vecLoss {

    fn minibatch(&self) -> &Minibatch {
        &self.minibatch
    }

    fn elementwise(&self, m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
        let n_neg = field(&batch.n_neg, "N_neg")?;
        let nxx = field(&batch.nxx, "Nxx")?;
        Ok(Zip::from(m_hat).and(n_neg).and(nxx).map_collect(|m_hat, n_neg, nxx| {
            let log_factor = softplus(*m_hat);
            n_neg * log_factor + nxx * (log_factor - m_hat)
        }))
    }
}


// losses built on Pxx_independent share the minibatch and temperature
#[derive(Clone, Debug)]
struct Tempered {
    minibatch: Minibatch,
    temperature: f64,
}

impl Tempered {
    fn new(keep_prob: f64, ncomponents: usize, temperature: f64) -> Result<Tempered> {
        if temperature < 1.0 {
            return Err(EmbeddingError::InvalidTemperature(temperature));
        }
        Ok(Self { minibatch: Minibatch::new(keep_prob, ncomponents)?, temperature })
    }

    fn apply(&self, loss: Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
        Ok(temper(loss, field(&batch.pxx_independent, "Pxx_independent")?, self.temperature))
    }
}

fn pxx_model(m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
    let pxx_independent = field(&batch.pxx_independent, "Pxx_independent")?;
    Ok(pxx_independent * &m_hat.mapv(f64::exp))
}

macro_rules! tempered_loss {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug)]
        pub struct $name {
            tempered: Tempered,
        }

        impl $name {
            pub fn new(keep_prob: f64, ncomponents: usize, temperature: f64) -> Result<$name> {
                Ok(Self { tempered: Tempered::new(keep_prob, ncomponents, temperature)? })
            }
        }
    };
}

tempered_loss!(
    /// Binomial likelihood of the data pair probabilities.
    MaxLikelihoodLoss
);
tempered_loss!(SimpleMaxLikelihoodLoss);
tempered_loss!(
    /// Likelihood against the Beta posterior mean, see `BatchData::with_posterior`.
    MaxPosteriorLoss
);
tempered_loss!(KlLoss);

impl Loss for MaxLikelihoodLoss {

    fn minibatch(&self) -> &Minibatch {
        &self.tempered.minibatch
    }

    fn elementwise(&self, m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
        let pxx_data = field(&batch.pxx_data, "Pxx_data")?;
        let model = pxx_model(m_hat, batch)?;
        let loss = Zip::from(m_hat).and(pxx_data).and(&model).map_collect(|m_hat, p, model| {
            -(p * m_hat + (1.0 - p) * (1.0 - model).ln())
        });
        self.tempered.apply(loss, batch)
    }
}

impl Loss for SimpleMaxLikelihoodLoss {

    fn minibatch(&self) -> &Minibatch {
        &self.tempered.minibatch
    }

    fn elementwise(&self, m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
        let pxx_data = field(&batch.pxx_data, "Pxx_data")?;
        let model = pxx_model(m_hat, batch)?;
        let loss = Zip::from(m_hat).and(pxx_data).and(&model).map_collect(|m_hat, p, model| {
            -(p * m_hat - model)
        });
        self.tempered.apply(loss, batch)
    }
}

impl Loss for MaxPosteriorLoss {

    fn minibatch(&self) -> &Minibatch {
        &self.tempered.minibatch
    }

    fn elementwise(&self, m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
        let pxx_posterior = field(&batch.pxx_posterior, "Pxx_posterior")?;
        let n_posterior = field(&batch.n_posterior, "N_posterior")?;
        let n = batch.n.ok_or(EmbeddingError::MissingBatchField("N"))?;
        let model = pxx_model(m_hat, batch)?;
        let loss = Zip::from(m_hat).and(pxx_posterior).and(n_posterior).and(&model)
            .map_collect(|m_hat, p, n_post, model| {
                -(n_post / n) * (p * m_hat + (1.0 - p) * (1.0 - model).ln())
            });
        self.tempered.apply(loss, batch)
    }
}

impl Loss for KlLoss {

    fn minibatch(&self) -> &Minibatch {
        &self.tempered.minibatch
    }

    fn elementwise(&self, m_hat: &Array2<f64>, batch: &BatchData) -> Result<Array2<f64>> {
        let n_posterior = field(&batch.n_posterior, "N_posterior")?;
        let digamma_a = field(&batch.digamma_a, "digamma_a")?;
        let digamma_b = field(&batch.digamma_b, "digamma_b")?;
        let n = batch.n.ok_or(EmbeddingError::MissingBatchField("N"))?;
        let model = pxx_model(m_hat, batch)?;
        let loss = Zip::from(&model).and(n_posterior).and(digamma_a).and(digamma_b)
            .map_collect(|model, n_post, da, db| {
                let a_hat = n_post * model;
                let b_hat = n_post * (1.0 - model) + 1.0;
                // outside the Beta support the loss is NaN
                let ln_b = checked_ln_beta(a_hat, b_hat).unwrap_or(f64::NAN);
                (ln_b - a_hat * da - b_hat * db) / n
            });
        self.tempered.apply(loss, batch)
    }
}


/// Likelihood over sampled pairs: the first half of `m_hat` holds positive
/// samples, the second half negative ones.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleMaxLikelihoodLoss;

impl SampleMaxLikelihoodLoss {
    pub fn forward(&self, m_hat: &Array1<f64>) -> f64 {
        let boundary = m_hat.len() / 2;
        let (positive, negative) = m_hat.view().split_at(Axis(0), boundary);
        -(positive.sum() - negative.mapv(f64::exp).sum())
    }
}
