//! Guided bottom-up search.
//!
//! Enumeration proceeds as in [`bus`], except that each rule's cost comes from a probability
//! kept in [`RuleWeights`] rather than the fixed cost table. A sweep enumerates every cost level
//! up to `cost_limit` and plays each statement as soon as it is built. Programs that score
//! above zero without beating the best so far are partial solutions; after a sweep the best of
//! them make the rules they use cheaper, and the next sweep starts over with the new costs.
//!
//! # Examples
//!
//! ```
//! use stratsynth::domains::catcher::{self, CatcherParams};
//! use stratsynth::probe::{Probe, ProbeParams};
//! use stratsynth::search::Budget;
//! use stratsynth::{EvaluationParams, Evaluator, Synthesizer};
//!
//! let g = catcher::grammar().unwrap();
//! let params = EvaluationParams {
//!     total_games: 2,
//!     ..EvaluationParams::default()
//! };
//! let mut evaluator = Evaluator::new(catcher::factory(CatcherParams::default(), 3), params);
//! let mut probe = Probe::new(
//!     &g,
//!     ProbeParams {
//!         cost_limit: 4,
//!         budget: Budget::evaluations(40),
//!         ..ProbeParams::default()
//!     },
//! );
//! let result = probe.synthesize(&mut evaluator).unwrap();
//! assert!(result.best.is_some());
//! assert!(result.evaluations <= 40);
//! ```
//!
//! [`bus`]: ../bus/index.html
//! [`RuleWeights`]: weights/struct.RuleWeights.html

pub mod weights;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use self::weights::RuleWeights;
use crate::dsl::Node;
use crate::enumerator::Growth;
use crate::eval::{Evaluator, GameError, GameFactory};
use crate::grammar::Grammar;
use crate::plist::ProgramIndex;
use crate::search::{Budget, Candidate, Deadline, SynthesisResult, Synthesizer};

/// Parameters for guided search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeParams {
    /// Highest weighted cost enumerated in one sweep.
    pub cost_limit: usize,
    /// Partial solutions must score above `beta * (best + 1)` to influence the weights.
    pub beta: f64,
    pub budget: Budget,
}
impl Default for ProbeParams {
    fn default() -> Self {
        ProbeParams {
            cost_limit: 8,
            beta: 0.55,
            budget: Budget::seconds(60.0),
        }
    }
}

/// Keeps the partial solutions scoring above `beta * (best + 1)`.
pub fn select(partials: &[Candidate], best: f64, beta: f64) -> Vec<Candidate> {
    let bar = beta * (best + 1.0);
    partials
        .iter()
        .filter(|c| c.score > bar)
        .cloned()
        .collect()
}

pub struct Probe<'a> {
    grammar: &'a Grammar,
    params: ProbeParams,
    weights: RuleWeights,
}
impl<'a> Probe<'a> {
    pub fn new(grammar: &'a Grammar, params: ProbeParams) -> Self {
        Probe {
            weights: RuleWeights::uniform(grammar),
            grammar,
            params,
        }
    }
    /// Starts from the given weights instead of uniform ones.
    pub fn with_weights(mut self, weights: RuleWeights) -> Self {
        self.weights = weights;
        self
    }
    pub fn weights(&self) -> &RuleWeights {
        &self.weights
    }

    /// Every new program of exactly this weighted cost, given the sweep's index so far.
    fn grow(&self, index: &ProgramIndex, closed: &mut HashSet<String>, cost: usize) -> Vec<Node> {
        let growth = Growth {
            grammar: self.grammar,
            index,
            fresh_level: None,
        };
        let mut fresh = Vec::new();
        let mut keep = |node: Node| {
            if closed.insert(node.render()) {
                fresh.push(node)
            }
            true
        };
        for rule in self.grammar.rules() {
            let own = match self.weights.cost(rule.kind) {
                Some(own) => own,
                None => continue,
            };
            if rule.is_terminal() {
                if own == cost {
                    for node in self.grammar.terminals(rule.kind) {
                        keep(node);
                    }
                }
            } else if own < cost {
                growth.grow(rule, own, cost, &mut keep);
            }
        }
        fresh
    }

    fn is_playable(&self, program: &Node) -> bool {
        let kind = program.kind();
        kind.is_statement() || self.grammar.is_program(kind)
    }
}

/// Bookkeeping shared by the sweeps of one run.
struct Run {
    deadline: Deadline,
    best: Option<Candidate>,
    solved: bool,
    /// Renderings played so far. Sweeps re-enumerate, but nothing is played twice.
    played: HashSet<String>,
}

impl Probe<'_> {
    /// One full sweep. Returns the partial solutions found and how many programs were played.
    fn sweep<F: GameFactory>(
        &self,
        run: &mut Run,
        evaluator: &mut Evaluator<F>,
    ) -> Result<(Vec<Candidate>, usize), GameError> {
        let mut index = ProgramIndex::new();
        let mut closed = HashSet::new();
        let mut partials = Vec::new();
        let mut played = 0;
        for cost in 1..=self.params.cost_limit {
            let fresh = self.grow(&index, &mut closed, cost);
            for program in &fresh {
                if !self.is_playable(program) || !run.played.insert(program.render()) {
                    continue;
                }
                if run.deadline.should_stop(evaluator.evaluations()) {
                    return Ok((partials, played));
                }
                played += 1;
                let record = evaluator.evaluate(program)?;
                if record.is_failure() {
                    continue;
                }
                run.solved |= evaluator.judge(&record);
                let candidate = Candidate::new(program.clone(), &record);
                if candidate.beats(run.best.as_ref()) {
                    info!(
                        score = candidate.score,
                        cost,
                        program = %candidate.program,
                        "new best program"
                    );
                    evaluator.set_best(candidate.score, &candidate.raw_scores);
                    run.best = Some(candidate);
                } else if candidate.score > 0.0 {
                    partials.push(candidate);
                }
            }
            index.open(cost);
            for program in fresh {
                index.insert_at(cost, program);
            }
        }
        debug!(indexed = index.len(), played, "sweep complete");
        Ok((partials, played))
    }
}

impl Synthesizer for Probe<'_> {
    fn synthesize<F: GameFactory>(
        &mut self,
        evaluator: &mut Evaluator<F>,
    ) -> Result<SynthesisResult, GameError> {
        let start = evaluator.evaluations();
        let mut run = Run {
            deadline: self.params.budget.start(start),
            best: None,
            solved: false,
            played: HashSet::new(),
        };
        info!(cost_limit = self.params.cost_limit, "starting guided search");
        let mut sweeps = 0;
        while !run.deadline.should_stop(evaluator.evaluations()) {
            let (partials, played) = self.sweep(&mut run, evaluator)?;
            sweeps += 1;
            if played == 0 {
                debug!(sweeps, "sweep played nothing new; stopping");
                break;
            }
            let best = match run.best {
                Some(ref best) => best.score,
                None => continue,
            };
            let selected = select(&partials, best, self.params.beta);
            if selected.is_empty() {
                continue;
            }
            self.weights
                .update(self.grammar, &selected, best, self.params.beta);
            info!(
                sweeps,
                selected = selected.len(),
                costs = ?self
                    .weights
                    .iter()
                    .map(|(kind, w)| (kind, w.cost))
                    .collect::<Vec<_>>(),
                "updated rule weights"
            );
        }
        info!(
            sweeps,
            solved = run.solved,
            elapsed = ?run.deadline.elapsed(),
            "guided search finished"
        );
        Ok(SynthesisResult {
            elapsed: run.deadline.elapsed(),
            evaluations: evaluator.evaluations() - start,
            best: run.best,
            solved: run.solved,
        })
    }
}
