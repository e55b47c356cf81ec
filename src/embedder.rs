use crate::config::files_handling;
use crate::constrainer::Constrainer;
use crate::error::{EmbeddingError, Result};
use crate::f_delta::{DeltaArgs, DeltaFunction};
use crate::solver::Optimizable;

use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::{debug, info};


#[derive(Clone, Debug)]
pub struct EmbedderParams {
    pub d: usize,
    pub learning_rate: f64,
    pub one_sided: bool,
    pub seed: Option<u64>,
}

/// Low-rank factor model `M_hat = W V` of a target matrix `M`.
///
/// `V` (d × cols) holds the vectors and `W` (rows × d) the covectors. A
/// one-sided embedder stores only `V`; its covectors are `Vᵗ` by
/// construction, so `M` must be square.
pub struct Embedder {
    m: Array2<f64>,
    f_delta: Box<dyn DeltaFunction>,
    learning_rate: f64,
    v: Array2<f64>,
    w: Option<Array2<f64>>,
    m_hat: Array2<f64>,
    delta: Array2<f64>,
    constrainer: Option<Constrainer>,
}

impl Embedder {

    pub fn new(m: Array2<f64>, f_delta: Box<dyn DeltaFunction>, params: EmbedderParams) -> Result<Embedder> {

        let (rows, cols) = m.dim();
        if params.one_sided && rows != cols {
            return Err(EmbeddingError::dimension_mismatch(rows, cols));
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let d = params.d as f64;
        let v = Array2::random_using((params.d, cols), Uniform::new(-0.5, 0.5), &mut rng) / d;
        let w = match params.one_sided {
            true => None,
            false => Some(Array2::random_using((rows, params.d), Uniform::new(-0.5, 0.5), &mut rng) / d),
        };

        let m_hat = match &w {
            Some(w) => w.dot(&v),
            None => v.t().dot(&v),
        };
        debug!("embedder initialised: {} x {} at d = {}", rows, cols, params.d);

        Ok(Self {
            m,
            f_delta,
            learning_rate: params.learning_rate,
            v,
            w,
            m_hat,
            delta: Array2::zeros((rows, cols)),
            constrainer: None,
        })
    }

    /// Applied to `(W, V)` after every update, including right away.
    pub fn with_constrainer(mut self, constrainer: Constrainer) -> Embedder {
        self.apply_constrainer(&constrainer);
        self.constrainer = Some(constrainer);
        self
    }

    pub fn is_one_sided(&self) -> bool {
        self.w.is_none()
    }

    pub fn v(&self) -> &Array2<f64> {
        &self.v
    }

    pub fn w(&self) -> ArrayView2<f64> {
        match &self.w {
            Some(w) => w.view(),
            None => self.v.t(),
        }
    }

    pub fn m(&self) -> &Array2<f64> {
        &self.m
    }

    pub fn m_hat(&self) -> &Array2<f64> {
        &self.m_hat
    }

    pub fn delta(&self) -> &Array2<f64> {
        &self.delta
    }

    // reconstruction, delta and gradients at the given factors
    fn gradient_at(
        &self,
        v: ArrayView2<f64>,
        w: ArrayView2<f64>,
        pass_args: Option<&DeltaArgs>
    ) -> (Array2<f64>, Array2<f64>, Vec<Array2<f64>>) {

        let m_hat = w.dot(&v);
        let delta = self.f_delta.calc(&self.m, &m_hat, pass_args);
        let gradient = match self.w {
            None => vec![v.dot(&delta)],
            Some(_) => vec![w.t().dot(&delta), delta.dot(&v.t())],
        };
        (m_hat, delta, gradient)
    }

    /// `[∇V, ∇W]`, or `[∇V]` when one-sided. `offsets` shift `[V, W]` for
    /// this evaluation only.
    pub fn get_gradient(&mut self, offsets: Option<&[Array2<f64>]>, pass_args: Option<&DeltaArgs>) -> Vec<Array2<f64>> {

        let (m_hat, delta, gradient) = match offsets {
            None => self.gradient_at(self.v.view(), self.w(), pass_args),
            Some(offsets) => {
                let v = &self.v + &offsets[0];
                match (&self.w, offsets.get(1)) {
                    (Some(w), Some(offset_w)) => {
                        let w = w + offset_w;
                        self.gradient_at(v.view(), w.view(), pass_args)
                    },
                    (Some(w), None) => self.gradient_at(v.view(), w.view(), pass_args),
                    (None, _) => self.gradient_at(v.view(), v.t(), pass_args),
                }
            }
        };

        self.m_hat = m_hat;
        self.delta = delta;
        gradient
    }

    /// Add both deltas against the current state, then reapply the
    /// constrainer.
    pub fn update_factors(&mut self, delta_v: Option<&Array2<f64>>, delta_w: Option<&Array2<f64>>) -> Result<()> {

        if self.w.is_none() && delta_w.is_some() {
            return Err(EmbeddingError::OneSidedCovectorUpdate);
        }
        check_shape(&self.v, delta_v)?;
        if let Some(w) = &self.w {
            check_shape(w, delta_w)?;
        }

        if let Some(delta_v) = delta_v {
            self.v += delta_v;
        }
        if let (Some(w), Some(delta_w)) = (self.w.as_mut(), delta_w) {
            *w += delta_w;
        }

        if let Some(constrainer) = self.constrainer.take() {
            self.apply_constrainer(&constrainer);
            self.constrainer = Some(constrainer);
        }
        Ok(())
    }

    fn apply_constrainer(&mut self, constrainer: &Constrainer) {
        match self.w.as_mut() {
            Some(w) => constrainer(w, &mut self.v),
            None => {
                // covectors are only a view of V, constrain a scratch copy
                let mut w = self.v.t().to_owned();
                constrainer(&mut w, &mut self.v);
            },
        }
    }

    /// Mean absolute residual against the last computed `M_hat`.
    pub fn calc_badness(&self) -> f64 {
        let cells = self.m.len().max(1) as f64;
        (&self.m - &self.m_hat).mapv(f64::abs).sum() / cells
    }

    /// Plain gradient ascent at the embedder's own learning rate.
    pub fn cycle(&mut self, times: usize, pass_args: Option<&DeltaArgs>, print_badness: bool) -> Result<()> {
        for iteration in 0..times {
            let gradient = self.get_gradient(None, pass_args);
            let steps: Vec<Array2<f64>> = gradient.iter().map(|g| g * self.learning_rate).collect();
            self.update(&steps)?;
            if print_badness {
                info!("iteration {}, badness: {}", iteration, self.calc_badness());
            }
        }
        Ok(())
    }

    /// Write `vectors.npy` and `covectors.npy` into `output_dir`.
    pub fn save(&self, output_dir: &Path) -> Result<()> {
        files_handling::save_output(output_dir, "vectors", &self.v)?;
        files_handling::save_output(output_dir, "covectors", &self.w().to_owned())?;
        Ok(())
    }
}

fn check_shape(factor: &Array2<f64>, delta: Option<&Array2<f64>>) -> Result<()> {
    match delta {
        Some(delta) if delta.dim() != factor.dim() => {
            Err(EmbeddingError::dimension_mismatch(factor.len(), delta.len()))
        },
        _ => Ok(()),
    }
}

impl Optimizable for Embedder {
    type Args = DeltaArgs;

    fn get_gradient(&mut self, offsets: Option<&[Array2<f64>]>, pass_args: Option<&DeltaArgs>) -> Vec<Array2<f64>> {
        Embedder::get_gradient(self, offsets, pass_args)
    }

    fn update(&mut self, deltas: &[Array2<f64>]) -> Result<()> {
        self.update_factors(deltas.first(), deltas.get(1))
    }
}
