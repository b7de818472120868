//! Aggregation and early-stopping rules for repeated noisy play.

use serde::{Deserialize, Serialize};

use super::MIN_SCORE;
use crate::utils::{mean, round2, variance};

/// How per-game scores are folded into one number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum Aggregation {
    /// The mean of all games.
    #[default]
    #[serde(alias = "normal", alias = "NORMAL")]
    Normal,
    /// The mean over consecutive batches of each batch's best game. Nothing is reported until
    /// the first batch completes.
    #[serde(alias = "batch", alias = "BATCH")]
    Batch { batch_size: usize },
}

/// A concentration bound used to abandon a candidate that cannot catch the incumbent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Triage {
    /// Scores are assumed to lie in an interval of width `score_bound`.
    #[serde(alias = "hoeffding")]
    Hoeffding { confidence: f64, score_bound: f64 },
    /// Uses the observed variance and is checked every `k_eval` samples.
    #[serde(alias = "chebyshev", alias = "CHEBY")]
    Chebyshev { confidence: f64, k_eval: usize },
}

/// Parameters for scoring a program by play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationParams {
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Games played per evaluation unless triage stops it first.
    pub total_games: usize,
    #[serde(default)]
    pub triage: Option<Triage>,
    /// Report the fraction of games ending with a score of exactly one instead of a mean.
    #[serde(default)]
    pub by_win_rate: bool,
    /// Initial value of the ratcheting correctness threshold.
    pub score_threshold: f64,
    /// New bests above this score are re-evaluated with `run_longer_games` games.
    pub strong_score: f64,
    pub run_longer_games: usize,
}
impl Default for EvaluationParams {
    fn default() -> Self {
        EvaluationParams {
            aggregation: Aggregation::Normal,
            total_games: 10,
            triage: None,
            by_win_rate: false,
            score_threshold: 0.0,
            strong_score: 100.0,
            run_longer_games: 1000,
        }
    }
}
impl EvaluationParams {
    fn batch_size(&self) -> Option<usize> {
        match self.aggregation {
            Aggregation::Normal => None,
            Aggregation::Batch { batch_size } => Some(batch_size.max(1)),
        }
    }
    /// Number of samples the aggregate is taken over when the full budget is spent.
    fn full_samples(&self) -> usize {
        let games = self.total_games.max(1);
        match self.batch_size() {
            None => games,
            Some(b) => (games / b).max(1),
        }
    }
}

/// Half-width of a two-sided Hoeffding interval over `n` samples bounded by `bound`.
pub fn hoeffding_epsilon(bound: f64, confidence: f64, n: usize) -> f64 {
    bound * ((2.0 / (1.0 - confidence.sqrt())).ln() / (2.0 * n as f64)).sqrt()
}

/// Half-width of a Chebyshev interval over `n` samples, failing with probability
/// `1 - confidence`.
pub fn chebyshev_epsilon(variance: f64, confidence: f64, n: usize) -> f64 {
    (variance / ((1.0 - confidence) * n as f64)).sqrt()
}

/// The best evaluation seen so far, as triage needs it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Incumbent {
    pub score: f64,
    pub variance: f64,
}
impl Default for Incumbent {
    fn default() -> Self {
        Incumbent {
            score: MIN_SCORE,
            variance: 0.0,
        }
    }
}

/// Running scores of one evaluation call.
pub(crate) struct Tally<'a> {
    params: &'a EvaluationParams,
    scores: Vec<f64>,
    batch_maxima: Vec<f64>,
}
impl<'a> Tally<'a> {
    pub fn new(params: &'a EvaluationParams) -> Self {
        Tally {
            params,
            scores: Vec::with_capacity(params.total_games),
            batch_maxima: Vec::new(),
        }
    }
    pub fn push(&mut self, score: f64) {
        self.scores.push(score);
        if let Some(b) = self.params.batch_size() {
            if self.scores.len() % b == 0 {
                let batch = &self.scores[self.scores.len() - b..];
                self.batch_maxima
                    .push(batch.iter().copied().fold(f64::NEG_INFINITY, f64::max));
            }
        }
    }
    pub fn games(&self) -> usize {
        self.scores.len()
    }
    pub fn into_scores(self) -> Vec<f64> {
        self.scores
    }
    fn samples(&self) -> &[f64] {
        match self.params.aggregation {
            Aggregation::Normal => &self.scores,
            Aggregation::Batch { .. } => &self.batch_maxima,
        }
    }
    pub fn aggregate(&self) -> f64 {
        let samples = self.samples();
        if samples.is_empty() {
            return MIN_SCORE;
        }
        if self.params.by_win_rate {
            let wins = samples.iter().filter(|&&s| s == 1.0).count();
            wins as f64 / samples.len() as f64
        } else {
            round2(mean(samples))
        }
    }
    pub fn should_continue(&self, incumbent: &Incumbent) -> bool {
        if self.games() >= self.params.total_games.max(1) {
            return false;
        }
        match self.params.triage {
            Some(triage) => !self.dominated(triage, incumbent),
            None => true,
        }
    }
    /// Whether even an optimistic reading of the samples so far falls below a pessimistic
    /// reading of the incumbent.
    fn dominated(&self, triage: Triage, incumbent: &Incumbent) -> bool {
        let n = self.samples().len();
        if n == 0 || incumbent.score <= MIN_SCORE {
            return false;
        }
        let full = self.params.full_samples();
        let score = self.aggregate();
        match triage {
            Triage::Hoeffding {
                confidence,
                score_bound,
            } => {
                let bound = if self.params.by_win_rate {
                    1.0
                } else {
                    score_bound
                };
                score + hoeffding_epsilon(bound, confidence, n)
                    <= incumbent.score - hoeffding_epsilon(bound, confidence, full)
            }
            Triage::Chebyshev { confidence, k_eval } => {
                if k_eval == 0 || n % k_eval != 0 {
                    return false;
                }
                let spread = variance(self.samples());
                score + chebyshev_epsilon(spread, confidence, n)
                    <= incumbent.score - chebyshev_epsilon(incumbent.variance, confidence, full)
            }
        }
    }
}
