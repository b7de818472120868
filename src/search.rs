//! What every search driver shares: budgets, results, and the [`Synthesizer`] trait.
//!
//! [`Synthesizer`]: trait.Synthesizer.html

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::dsl::Node;
use crate::eval::{EvaluationRecord, Evaluator, GameError, GameFactory};

/// Limits on a search run. Unset limits never trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default)]
    pub time_limit: Option<Duration>,
    #[serde(default)]
    pub max_evaluations: Option<usize>,
}
impl Budget {
    pub fn seconds(secs: f64) -> Self {
        Budget {
            time_limit: Some(Duration::from_secs_f64(secs)),
            max_evaluations: None,
        }
    }
    pub fn evaluations(n: usize) -> Self {
        Budget {
            time_limit: None,
            max_evaluations: Some(n),
        }
    }
    /// Starts the clock. `evaluations` is the evaluator's count at the start of the run.
    pub fn start(&self, evaluations: usize) -> Deadline {
        Deadline {
            budget: *self,
            start: Instant::now(),
            evaluations_at_start: evaluations,
        }
    }
}

/// A running [`Budget`].
///
/// [`Budget`]: struct.Budget.html
#[derive(Debug, Clone)]
pub struct Deadline {
    budget: Budget,
    start: Instant,
    evaluations_at_start: usize,
}
impl Deadline {
    pub fn should_stop(&self, evaluations: usize) -> bool {
        if let Some(limit) = self.budget.time_limit {
            if self.start.elapsed() >= limit {
                return true;
            }
        }
        if let Some(max) = self.budget.max_evaluations {
            if evaluations.saturating_sub(self.evaluations_at_start) >= max {
                return true;
            }
        }
        false
    }
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// A scored program.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub program: Node,
    pub score: f64,
    pub raw_scores: Vec<f64>,
}
impl Candidate {
    pub fn new(program: Node, record: &EvaluationRecord) -> Self {
        Candidate {
            program,
            score: record.aggregate,
            raw_scores: record.raw_scores.clone(),
        }
    }
    /// Strictly better than `other`, or anything at all when there is no `other`.
    pub fn beats(&self, other: Option<&Candidate>) -> bool {
        other.map_or(true, |o| self.score > o.score)
    }
}

/// What a search run hands back.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub best: Option<Candidate>,
    /// Whether the run stopped because a program was judged correct.
    pub solved: bool,
    pub elapsed: Duration,
    /// Evaluation calls made during the run.
    pub evaluations: usize,
}

/// A search strategy over programs.
///
/// Malformed candidates only lower their own score. The only error that escapes is failing to
/// obtain a game to play on.
pub trait Synthesizer {
    fn synthesize<F: GameFactory>(
        &mut self,
        evaluator: &mut Evaluator<F>,
    ) -> Result<SynthesisResult, GameError>;
}
