use crate::config::MParams;
use crate::cooc_stats::{CoocShard, CoocStats};
use crate::corpus_stats::{calc_pmi, calc_pmi_star, calc_positive_pmi, calc_shifted_pmi};
use crate::error::{EmbeddingError, Result};
use crate::shards::Shard;
use crate::unigram::{Unigram, UnigramShard};

use ndarray::Array2;
use std::str::FromStr;


/// Formula turning co-occurrence counts into the association matrix M.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MBase {
    LogNxx,
    Pmi,
    PositivePmi,
    ShiftedPmi,
    PmiStar,
    W2v,
}

impl FromStr for MBase {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lognxx" => Ok(MBase::LogNxx),
            "pmi" => Ok(MBase::Pmi),
            "ppmi" | "positive_pmi" => Ok(MBase::PositivePmi),
            "shifted_pmi" => Ok(MBase::ShiftedPmi),
            "pmi_star" => Ok(MBase::PmiStar),
            "w2v" => Ok(MBase::W2v),
            _ => Err(EmbeddingError::unknown("M base", s)),
        }
    }
}

/// Post-processing applied to every M shard, in field order. Unset fields
/// are skipped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Effects {
    pub shift_by: Option<f64>,
    pub neg_inf_val: Option<f64>,
    pub clip_thresh: Option<f64>,
    pub diag: Option<f64>,
}

impl Effects {

    pub fn apply(&self, m: &mut Array2<f64>, on_diag: bool) {
        if let Some(shift) = self.shift_by {
            m.mapv_inplace(|v| v + shift);
        }
        if let Some(val) = self.neg_inf_val {
            m.mapv_inplace(|v| if v == f64::NEG_INFINITY { val } else { v });
        }
        if let Some(thresh) = self.clip_thresh {
            m.mapv_inplace(|v| if v < thresh { thresh } else { v });
        }
        if let (Some(val), true) = (self.diag, on_diag) {
            m.diag_mut().fill(val);
        }
    }
}

/// Expected negative samples for each pair: `k (Nx - Nxx) uNxt / uN`.
pub fn negative_sample(cooc: &CoocShard, unigram: &UnigramShard, k: f64) -> Array2<f64> {
    Array2::from_shape_fn(cooc.nxx.dim(), |(i, j)| {
        k * (cooc.nx[[i, 0]] - cooc.nxx[[i, j]]) * (unigram.unxt[[0, j]] / unigram.un)
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct MBuilder {
    base: MBase,
    k: f64,
    alpha_smoothing: Option<f64>,
    effects: Effects,
}

impl MBuilder {

    pub fn new(base: MBase, k: f64) -> MBuilder {
        Self { base, k, alpha_smoothing: None, effects: Effects::default() }
    }

    pub fn from_params(params: &MParams) -> MBuilder {
        Self {
            base: params.base,
            k: params.k,
            alpha_smoothing: params.alpha_smoothing,
            effects: Effects {
                shift_by: params.shift_by,
                neg_inf_val: params.neg_inf_val,
                clip_thresh: params.clip_thresh,
                diag: params.diag,
            },
        }
    }

    pub fn with_effects(mut self, effects: Effects) -> MBuilder {
        self.effects = effects;
        self
    }

    /// Smooth the unigram context distribution with exponent `alpha`
    /// before negative sampling.
    pub fn with_smoothing(mut self, alpha: f64) -> MBuilder {
        self.alpha_smoothing = Some(alpha);
        self
    }

    pub fn base(&self) -> MBase {
        self.base
    }

    /// M for one shard before any effect is applied.
    pub fn calc_base(&self, cooc: &CoocShard, unigram: Option<&UnigramShard>) -> Result<Array2<f64>> {
        let m = match self.base {
            MBase::LogNxx => cooc.nxx.mapv(f64::ln),
            MBase::Pmi => calc_pmi(cooc),
            MBase::PositivePmi => calc_positive_pmi(cooc),
            MBase::ShiftedPmi => calc_shifted_pmi(cooc, self.k),
            MBase::PmiStar => calc_pmi_star(cooc),
            MBase::W2v => {
                let unigram = unigram.ok_or(EmbeddingError::MissingUnigram)?;
                let n_neg = negative_sample(cooc, unigram, self.k);
                cooc.nxx.mapv(f64::ln) - n_neg.mapv(f64::ln)
            },
        };
        Ok(m)
    }

    /// M for `shard`, effects included. The diagonal effect only touches
    /// shards that hold diagonal cells.
    pub fn build(&self, stats: &mut CoocStats, unigram: Option<&Unigram>, shard: &Shard) -> Result<Array2<f64>> {
        let cooc = stats.load_shard(shard);
        let unigram_shard = match (self.base, unigram) {
            (MBase::W2v, Some(u)) => Some(u.load_shard(shard, self.alpha_smoothing)),
            _ => None,
        };
        let mut m = self.calc_base(&cooc, unigram_shard.as_ref())?;
        self.effects.apply(&mut m, shard.on_diag());
        Ok(m)
    }

    pub fn load_all(&self, stats: &mut CoocStats, unigram: Option<&Unigram>) -> Result<Array2<f64>> {
        self.build(stats, unigram, &Shard::whole())
    }
}
