use crate::error::{EmbeddingError, Result};

use ndarray::Array2;
use std::str::FromStr;
use tracing::debug;


/// Anything a solver can drive: a gradient at the current parameters
/// (optionally displaced by `offsets`, without moving them) and an additive
/// update. Gradients point uphill on the fit, so updates add them.
pub trait Optimizable {
    type Args;

    fn get_gradient(&mut self, offsets: Option<&[Array2<f64>]>, pass_args: Option<&Self::Args>) -> Vec<Array2<f64>>;

    fn update(&mut self, deltas: &[Array2<f64>]) -> Result<()>;
}

pub trait Solver<O: Optimizable> {

    /// Run `times` iterations, forwarding `pass_args` to every gradient call.
    fn cycle(&mut self, times: usize, pass_args: Option<&O::Args>) -> Result<()>;

    fn objective(&self) -> &O;

    fn objective_mut(&mut self) -> &mut O;

    fn into_objective(self: Box<Self>) -> O;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverKind {
    Sgd,
    Momentum,
    Nesterov,
    NesterovOptimized,
}

impl FromStr for SolverKind {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sgd" => Ok(SolverKind::Sgd),
            "momentum" => Ok(SolverKind::Momentum),
            "nesterov" => Ok(SolverKind::Nesterov),
            "nesterov_optimized" => Ok(SolverKind::NesterovOptimized),
            _ => Err(EmbeddingError::unknown("solver", s)),
        }
    }
}

impl SolverKind {
    pub fn build<O>(&self, objective: O, learning_rate: f64, momentum_decay: f64) -> Box<dyn Solver<O>>
    where
        O: Optimizable + 'static {

        match self {
            SolverKind::Sgd => Box::new(SgdSolver::new(objective, learning_rate)),
            SolverKind::Momentum => Box::new(MomentumSolver::new(objective, learning_rate, momentum_decay)),
            SolverKind::Nesterov => Box::new(NesterovSolver::new(objective, learning_rate, momentum_decay)),
            SolverKind::NesterovOptimized => {
                Box::new(NesterovSolverOptimized::new(objective, learning_rate, momentum_decay))
            },
        }
    }
}

fn scaled(arrays: &[Array2<f64>], factor: f64) -> Vec<Array2<f64>> {
    arrays.iter().map(|a| a * factor).collect()
}

// one zero buffer per parameter, shaped by a probing gradient call
fn zero_velocity<O: Optimizable>(objective: &mut O) -> Vec<Array2<f64>> {
    objective
        .get_gradient(None, None)
        .iter()
        .map(|g| Array2::zeros(g.raw_dim()))
        .collect()
}

// velocity = decay * velocity + step
fn accumulate(velocity: &mut [Array2<f64>], decay: f64, steps: &[Array2<f64>]) {
    for (v, step) in velocity.iter_mut().zip(steps) {
        v.zip_mut_with(step, |v, s| *v = decay * *v + s);
    }
}


/// Plain gradient steps, no velocity.
pub struct SgdSolver<O> {
    objective: O,
    learning_rate: f64,
}

impl<O: Optimizable> SgdSolver<O> {
    pub fn new(objective: O, learning_rate: f64) -> SgdSolver<O> {
        Self { objective, learning_rate }
    }
}

impl<O: Optimizable> Solver<O> for SgdSolver<O> {

    fn cycle(&mut self, times: usize, pass_args: Option<&O::Args>) -> Result<()> {
        for _ in 0..times {
            let gradient = self.objective.get_gradient(None, pass_args);
            self.objective.update(&scaled(&gradient, self.learning_rate))?;
        }
        Ok(())
    }

    fn objective(&self) -> &O {
        &self.objective
    }

    fn objective_mut(&mut self) -> &mut O {
        &mut self.objective
    }

    fn into_objective(self: Box<Self>) -> O {
        self.objective
    }
}


pub struct MomentumSolver<O> {
    objective: O,
    learning_rate: f64,
    momentum_decay: f64,
    velocity: Vec<Array2<f64>>,
}

impl<O: Optimizable> MomentumSolver<O> {

    pub fn new(mut objective: O, learning_rate: f64, momentum_decay: f64) -> MomentumSolver<O> {
        let velocity = zero_velocity(&mut objective);
        Self { objective, learning_rate, momentum_decay, velocity }
    }

    pub fn velocity(&self) -> &[Array2<f64>] {
        &self.velocity
    }
}

impl<O: Optimizable> Solver<O> for MomentumSolver<O> {

    fn cycle(&mut self, times: usize, pass_args: Option<&O::Args>) -> Result<()> {
        for _ in 0..times {
            let gradient = self.objective.get_gradient(None, pass_args);
            accumulate(&mut self.velocity, self.momentum_decay, &scaled(&gradient, self.learning_rate));
            self.objective.update(&self.velocity)?;
        }
        Ok(())
    }

    fn objective(&self) -> &O {
        &self.objective
    }

    fn objective_mut(&mut self) -> &mut O {
        &mut self.objective
    }

    fn into_objective(self: Box<Self>) -> O {
        self.objective
    }
}


/// Momentum with the gradient taken at the look-ahead point
/// `params + decay * velocity`.
pub struct NesterovSolver<O> {
    objective: O,
    learning_rate: f64,
    momentum_decay: f64,
    velocity: Vec<Array2<f64>>,
}

impl<O: Optimizable> NesterovSolver<O> {

    pub fn new(mut objective: O, learning_rate: f64, momentum_decay: f64) -> NesterovSolver<O> {
        let velocity = zero_velocity(&mut objective);
        Self { objective, learning_rate, momentum_decay, velocity }
    }

    pub fn velocity(&self) -> &[Array2<f64>] {
        &self.velocity
    }
}

impl<O: Optimizable> Solver<O> for NesterovSolver<O> {

    fn cycle(&mut self, times: usize, pass_args: Option<&O::Args>) -> Result<()> {
        for _ in 0..times {
            let look_ahead = scaled(&self.velocity, self.momentum_decay);
            let gradient = self.objective.get_gradient(Some(&look_ahead), pass_args);
            accumulate(&mut self.velocity, self.momentum_decay, &scaled(&gradient, self.learning_rate));
            self.objective.update(&self.velocity)?;
        }
        Ok(())
    }

    fn objective(&self) -> &O {
        &self.objective
    }

    fn objective_mut(&mut self) -> &mut O {
        &mut self.objective
    }

    fn into_objective(self: Box<Self>) -> O {
        self.objective
    }
}


/// Nesterov momentum tracking the look-ahead point itself, so gradients
/// never need offsets. Its parameters are `NesterovSolver`'s parameters
/// plus `decay * velocity`, and both take identical gradient steps.
pub struct NesterovSolverOptimized<O> {
    objective: O,
    learning_rate: f64,
    momentum_decay: f64,
    velocity: Vec<Array2<f64>>,
}

impl<O: Optimizable> NesterovSolverOptimized<O> {

    pub fn new(mut objective: O, learning_rate: f64, momentum_decay: f64) -> NesterovSolverOptimized<O> {
        let velocity = zero_velocity(&mut objective);
        Self { objective, learning_rate, momentum_decay, velocity }
    }

    pub fn velocity(&self) -> &[Array2<f64>] {
        &self.velocity
    }
}

impl<O: Optimizable> Solver<O> for NesterovSolverOptimized<O> {

    fn cycle(&mut self, times: usize, pass_args: Option<&O::Args>) -> Result<()> {
        for iteration in 0..times {
            let gradient = self.objective.get_gradient(None, pass_args);
            let steps = scaled(&gradient, self.learning_rate);
            accumulate(&mut self.velocity, self.momentum_decay, &steps);
            let updates: Vec<Array2<f64>> = steps
                .iter()
                .zip(&self.velocity)
                .map(|(step, v)| step + &(v * self.momentum_decay))
                .collect();
            self.objective.update(&updates)?;
            debug!("nesterov step {} applied", iteration);
        }
        Ok(())
    }

    fn objective(&self) -> &O {
        &self.objective
    }

    fn objective_mut(&mut self) -> &mut O {
        &mut self.objective
    }

    fn into_objective(self: Box<Self>) -> O {
        self.objective
    }
}
