//! Simulated annealing over programs.
//!
//! Each outer iteration starts from a random program (or the best so far, depending on the
//! [`RestartPolicy`]) and cools from `initial_temperature` to `final_temperature`, proposing one
//! mutant per step and accepting it by the Metropolis rule. A new best that looks strong is
//! replayed over many more games before it is trusted, and programs with constants are pooled
//! for a [`ConstantOptimizer`] when one is attached.
//!
//! # Examples
//!
//! ```
//! use stratsynth::domains::catcher::{self, CatcherParams};
//! use stratsynth::sa::{AnnealingParams, SimulatedAnnealing};
//! use stratsynth::search::Budget;
//! use stratsynth::{EvaluationParams, Evaluator, Synthesizer};
//!
//! let g = catcher::grammar().unwrap();
//! let params = EvaluationParams {
//!     total_games: 2,
//!     ..EvaluationParams::default()
//! };
//! let mut evaluator = Evaluator::new(catcher::factory(CatcherParams::default(), 11), params);
//! let mut sa = SimulatedAnnealing::new(
//!     &g,
//!     AnnealingParams {
//!         budget: Budget::evaluations(30),
//!         seed: Some(5),
//!         ..AnnealingParams::default()
//!     },
//! );
//! let result = sa.synthesize(&mut evaluator).unwrap();
//! assert!(result.best.is_some());
//! ```
//!
//! [`RestartPolicy`]: enum.RestartPolicy.html
//! [`ConstantOptimizer`]: ../optimizer/trait.ConstantOptimizer.html

pub mod mutator;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use self::mutator::{MutatorParams, ProgramMutator};
use crate::dsl::Node;
use crate::eval::{EvaluationRecord, Evaluator, GameError, GameFactory};
use crate::grammar::Grammar;
use crate::optimizer::ConstantOptimizer;
use crate::search::{Budget, Candidate, Deadline, SynthesisResult, Synthesizer};

/// Where each outer iteration of annealing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    /// A new random program.
    Fresh,
    /// The best program found so far, or a random one while there is none.
    FromBest,
}
impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Fresh
    }
}

/// Parameters for simulated annealing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealingParams {
    pub initial_temperature: f64,
    pub final_temperature: f64,
    /// Cooling rate of `T <- T / (1 + alpha * epoch)`.
    pub alpha: f64,
    /// Scales score differences in the acceptance probability.
    pub beta: f64,
    #[serde(default)]
    pub restart: RestartPolicy,
    /// Programs with constants collected before the optimizer runs over them.
    pub optimizer_pool_size: usize,
    #[serde(default)]
    pub mutator: MutatorParams,
    pub budget: Budget,
    #[serde(default)]
    pub seed: Option<u64>,
}
impl Default for AnnealingParams {
    fn default() -> Self {
        AnnealingParams {
            initial_temperature: 2000.0,
            final_temperature: 1.0,
            alpha: 0.9,
            beta: 100.0,
            restart: RestartPolicy::Fresh,
            optimizer_pool_size: 5,
            mutator: MutatorParams::default(),
            budget: Budget::seconds(60.0),
            seed: None,
        }
    }
}

/// The Metropolis rule: always accept a candidate at least as good as the current program,
/// otherwise accept with probability `min(1, exp((candidate - current) * beta / temperature))`.
pub fn metropolis<R: Rng>(
    candidate: f64,
    current: f64,
    temperature: f64,
    beta: f64,
    rng: &mut R,
) -> bool {
    if candidate >= current {
        return true;
    }
    let p = ((candidate - current) * beta / temperature).exp().min(1.0);
    rng.gen::<f64>() < p
}

/// The temperature after `epoch` steps of cooling.
pub fn reduce_temperature(temperature: f64, alpha: f64, epoch: usize) -> f64 {
    temperature / (1.0 + alpha * epoch as f64)
}

pub struct SimulatedAnnealing<'a> {
    params: AnnealingParams,
    mutator: ProgramMutator<'a>,
    optimizer: Option<Box<dyn ConstantOptimizer + 'a>>,
    closed: HashSet<String>,
    rng: SmallRng,
}
impl<'a> SimulatedAnnealing<'a> {
    pub fn new(grammar: &'a Grammar, params: AnnealingParams) -> Self {
        let rng = match params.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        SimulatedAnnealing {
            mutator: ProgramMutator::new(grammar, params.mutator.clone()),
            params,
            optimizer: None,
            closed: HashSet::new(),
            rng,
        }
    }
    /// Tunes the constants of pooled programs as the search goes.
    pub fn with_optimizer<O: ConstantOptimizer + 'a>(mut self, optimizer: O) -> Self {
        self.optimizer = Some(Box::new(optimizer));
        self
    }
    /// Renders of every program the last run played or produced by tuning.
    pub fn closed(&self) -> &HashSet<String> {
        &self.closed
    }
}

/// Bookkeeping for one run.
struct Run {
    deadline: Deadline,
    best: Option<Candidate>,
    solved: bool,
    pool: Vec<Candidate>,
}

impl SimulatedAnnealing<'_> {
    /// Plays a program the run has not played yet. A program that fails comes back scored
    /// `MIN_SCORE` and is never pooled or promoted.
    fn play<F: GameFactory>(
        &mut self,
        run: &mut Run,
        program: Node,
        evaluator: &mut Evaluator<F>,
    ) -> Result<Candidate, GameError> {
        self.closed.insert(program.render());
        let record = evaluator.evaluate(&program)?;
        let candidate = Candidate::new(program, &record);
        if record.is_failure() {
            return Ok(candidate);
        }
        if candidate.beats(run.best.as_ref()) {
            self.promote(run, candidate.program.clone(), record, evaluator)?;
        } else {
            run.solved |= evaluator.judge(&record);
        }
        if self.optimizer.is_some() && !candidate.program.constants().is_empty() {
            run.pool.push(candidate.clone());
            if run.pool.len() >= self.params.optimizer_pool_size.max(1) {
                let pool = std::mem::take(&mut run.pool);
                if let Some((program, record)) = self.optimize_pool(pool, evaluator) {
                    self.closed.insert(program.render());
                    if Candidate::new(program.clone(), &record).beats(run.best.as_ref()) {
                        self.promote(run, program, record, evaluator)?;
                    }
                }
            }
        }
        Ok(candidate)
    }

    /// Installs a new best, first replaying it at length if its score looks strong. The
    /// threshold is judged against the replay whenever there is one.
    fn promote<F: GameFactory>(
        &self,
        run: &mut Run,
        program: Node,
        record: EvaluationRecord,
        evaluator: &mut Evaluator<F>,
    ) -> Result<(), GameError> {
        let mut record = record;
        let params = evaluator.params().clone();
        if record.aggregate > params.strong_score {
            let long = evaluator.evaluate_parallel(&program, params.run_longer_games)?;
            debug!(
                short = record.aggregate,
                long = long.aggregate,
                games = long.games_played,
                "replayed a strong program"
            );
            record = long;
        }
        run.solved |= evaluator.judge(&record);
        if record.is_failure() {
            return Ok(());
        }
        let candidate = Candidate::new(program, &record);
        if !candidate.beats(run.best.as_ref()) {
            return Ok(());
        }
        info!(
            score = candidate.score,
            cost = candidate.program.cost(),
            program = %candidate.program,
            "new best program"
        );
        evaluator.set_best(candidate.score, &candidate.raw_scores);
        run.best = Some(candidate);
        Ok(())
    }

    /// Tunes every pooled program in parallel and returns the best one that improved, with its
    /// tuning scores as a record.
    fn optimize_pool<F: GameFactory>(
        &self,
        pool: Vec<Candidate>,
        evaluator: &Evaluator<F>,
    ) -> Option<(Node, EvaluationRecord)> {
        let optimizer = self.optimizer.as_deref()?;
        let objective = |p: &Node| evaluator.evaluate(p);
        pool.par_iter()
            .filter_map(|c| match optimizer.optimize(&c.program, c.score, &objective) {
                Ok(tuned) if tuned.improved && tuned.score >= c.score => {
                    debug!(from = c.score, to = tuned.score, "tuned constants");
                    let record = EvaluationRecord {
                        games_played: tuned.raw_scores.len(),
                        raw_scores: tuned.raw_scores,
                        aggregate: tuned.score,
                        is_correct: tuned.score >= evaluator.threshold(),
                        failure: None,
                    };
                    Some((tuned.program, record))
                }
                Ok(_) => None,
                Err(err) => {
                    warn!(error = %err, "optimizer failed; keeping the original program");
                    None
                }
            })
            .max_by(|a, b| {
                a.1.aggregate
                    .partial_cmp(&b.1.aggregate)
                    .unwrap_or(Ordering::Equal)
            })
    }

    fn starting_point<F: GameFactory>(
        &mut self,
        run: &mut Run,
        evaluator: &mut Evaluator<F>,
    ) -> Result<Option<Candidate>, GameError> {
        if self.params.restart == RestartPolicy::FromBest {
            if let Some(ref best) = run.best {
                return Ok(Some(best.clone()));
            }
        }
        match self.mutator.generate_random(&self.closed, &mut self.rng) {
            Ok(program) => self.play(run, program, evaluator).map(Some),
            Err(err) => {
                warn!(error = %err, "could not draw a new starting program");
                Ok(None)
            }
        }
    }

    /// One cooling schedule from `current`. Returns false once the run should end.
    fn anneal<F: GameFactory>(
        &mut self,
        run: &mut Run,
        mut current: Candidate,
        evaluator: &mut Evaluator<F>,
    ) -> Result<bool, GameError> {
        let mut temperature = self.params.initial_temperature;
        let mut epoch = 0;
        while temperature > self.params.final_temperature {
            if run.deadline.should_stop(evaluator.evaluations()) {
                return Ok(false);
            }
            let program = match self
                .mutator
                .mutate(&current.program, &self.closed, &mut self.rng)
            {
                Ok(program) => program,
                Err(err) => {
                    warn!(error = %err, program = %current.program, "mutation exhausted");
                    return Ok(false);
                }
            };
            let candidate = self.play(run, program, evaluator)?;
            if metropolis(
                candidate.score,
                current.score,
                temperature,
                self.params.beta,
                &mut self.rng,
            ) {
                current = candidate;
            }
            epoch += 1;
            temperature = reduce_temperature(temperature, self.params.alpha, epoch);
        }
        debug!(epoch, score = current.score, "cooled down");
        Ok(true)
    }
}

impl Synthesizer for SimulatedAnnealing<'_> {
    fn synthesize<F: GameFactory>(
        &mut self,
        evaluator: &mut Evaluator<F>,
    ) -> Result<SynthesisResult, GameError> {
        let start = evaluator.evaluations();
        let mut run = Run {
            deadline: self.params.budget.start(start),
            best: None,
            solved: false,
            pool: Vec::new(),
        };
        self.closed.clear();
        info!(restart = ?self.params.restart, "starting simulated annealing");

        let mut restarts = 0;
        while !run.deadline.should_stop(evaluator.evaluations()) {
            let played = evaluator.evaluations();
            let current = match self.starting_point(&mut run, evaluator)? {
                Some(current) => current,
                None => break,
            };
            if !self.anneal(&mut run, current, evaluator)? {
                break;
            }
            // a restart from the best with no room to cool would spin forever
            if evaluator.evaluations() == played {
                warn!(
                    initial_temperature = self.params.initial_temperature,
                    final_temperature = self.params.final_temperature,
                    alpha = self.params.alpha,
                    "a cooling pass played nothing; stopping"
                );
                break;
            }
            restarts += 1;
        }
        info!(
            restarts,
            solved = run.solved,
            elapsed = ?run.deadline.elapsed(),
            "simulated annealing finished"
        );
        Ok(SynthesisResult {
            elapsed: run.deadline.elapsed(),
            evaluations: evaluator.evaluations() - start,
            best: run.best,
            solved: run.solved,
        })
    }
}
