//! Tuning the numbers inside a program without changing its shape.
//!
//! A [`ConstantOptimizer`] only ever rewrites `Constant` leaves. Search drivers hand it an
//! objective that evaluates a program under the usual protocol and keep its result only when it
//! reports an improvement.
//!
//! [`ConstantOptimizer`]: trait.ConstantOptimizer.html

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::dsl::Node;
use crate::eval::{EvaluationRecord, GameError};

/// Scores a program under the evaluation protocol.
pub type Objective<'a> = dyn Fn(&Node) -> Result<EvaluationRecord, GameError> + Sync + 'a;

/// The result of tuning one program.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuned {
    pub program: Node,
    /// The constants of `program`, in pre-order.
    pub params: Vec<f64>,
    pub score: f64,
    pub raw_scores: Vec<f64>,
    /// Whether `score` beats the baseline. When false, `program` is the untouched input.
    pub improved: bool,
}
impl Tuned {
    fn unchanged(program: &Node, baseline: f64) -> Self {
        Tuned {
            params: program.constants(),
            program: program.clone(),
            score: baseline,
            raw_scores: vec![],
            improved: false,
        }
    }
}

/// Only a game that cannot be started aborts tuning. Trials whose program fails are rejected
/// like any other non-improving trial.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerFailure {
    Evaluation(GameError),
}
impl fmt::Display for OptimizerFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OptimizerFailure::Evaluation(ref err) => write!(f, "optimizer aborted: {}", err),
        }
    }
}
impl std::error::Error for OptimizerFailure {}

/// A black-box tuner for `Constant` leaves.
pub trait ConstantOptimizer: Send + Sync {
    /// Must never report `improved` with a score at or below `baseline`.
    fn optimize(
        &self,
        program: &Node,
        baseline: f64,
        objective: &Objective<'_>,
    ) -> Result<Tuned, OptimizerFailure>;
}

/// Random local search: jitter every constant at once, keep the setting if it scores better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationSearch {
    pub iterations: usize,
    /// Largest jitter, as a fraction of the width of `bounds`.
    pub step: f64,
    pub bounds: (f64, f64),
    #[serde(default)]
    pub seed: Option<u64>,
}
impl Default for PerturbationSearch {
    fn default() -> Self {
        PerturbationSearch {
            iterations: 20,
            step: 0.1,
            bounds: (0.001, 100.001),
            seed: None,
        }
    }
}
impl ConstantOptimizer for PerturbationSearch {
    fn optimize(
        &self,
        program: &Node,
        baseline: f64,
        objective: &Objective<'_>,
    ) -> Result<Tuned, OptimizerFailure> {
        let mut best = Tuned::unchanged(program, baseline);
        if best.params.is_empty() {
            return Ok(best);
        }
        let mut rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let (lo, hi) = self.bounds;
        let width = ((hi - lo) * self.step).abs();
        for _ in 0..self.iterations {
            let params: Vec<f64> = best
                .params
                .iter()
                .map(|&v| (v + rng.gen_range(-width..=width)).clamp(lo, hi))
                .collect();
            let mut trial = program.clone();
            trial.set_constants(&params);
            let record = objective(&trial).map_err(OptimizerFailure::Evaluation)?;
            if let Some(err) = record.failure {
                debug!(error = %err, params = ?params, "trial constants failed");
                continue;
            }
            if record.aggregate > best.score {
                debug!(score = record.aggregate, params = ?params, "constants improved");
                best = Tuned {
                    program: trial,
                    params,
                    score: record.aggregate,
                    raw_scores: record.raw_scores,
                    improved: true,
                };
            }
        }
        Ok(best)
    }
}
