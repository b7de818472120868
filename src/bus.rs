//! Bottom-up enumerative search.
//!
//! Programs are built in strictly increasing cost, each one out of smaller programs already in
//! the [`ProgramIndex`]. Every cost level is grown completely from the programs committed before
//! it and only then committed itself. Programs whose rendering has been seen before are dropped,
//! and only programs of the grammar's program kinds are played.
//!
//! # Examples
//!
//! ```
//! use stratsynth::bus::{BottomUpSearch, BusParams};
//! use stratsynth::{Evaluator, EvaluationParams, Grammar, Kind, Synthesizer};
//! # use stratsynth::{Env, Game, State, Value};
//! # struct Once(bool);
//! # impl Game for Once {
//! #     fn init_game(&mut self) { self.0 = false }
//! #     fn game_over(&self) -> bool { self.0 }
//! #     fn environment(&self) -> Env { Env::new(State::default()) }
//! #     fn act(&mut self, _: Option<&Value>) { self.0 = true }
//! #     fn score(&self) -> f64 { 1.0 }
//! # }
//!
//! let g = Grammar::from_json(
//!     r#"{ "operators": [], "constants": [0, 1], "program_kinds": ["Constant"] }"#,
//! )
//! .unwrap();
//! let mut evaluator = Evaluator::new(|| Ok(Once(false)), EvaluationParams::default());
//! let mut bus = BottomUpSearch::new(&g, BusParams { cost_bound: 3, ..BusParams::default() });
//!
//! let result = bus.synthesize(&mut evaluator).unwrap();
//! assert!(result.solved);
//! assert_eq!(result.best.unwrap().program.kind(), Kind::Constant);
//! ```
//!
//! [`ProgramIndex`]: ../plist/struct.ProgramIndex.html

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::dsl::Node;
use crate::enumerator::Growth;
use crate::eval::{Evaluator, GameError, GameFactory};
use crate::grammar::Grammar;
use crate::optimizer::ConstantOptimizer;
use crate::plist::ProgramIndex;
use crate::search::{Budget, Candidate, Deadline, SynthesisResult, Synthesizer};

/// Parameters for bottom-up search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusParams {
    /// Highest cost level that is enumerated.
    pub cost_bound: usize,
    /// Programs are played in parallel batches of this size.
    pub batch_size: usize,
    #[serde(default)]
    pub budget: Budget,
}
impl Default for BusParams {
    fn default() -> Self {
        BusParams {
            cost_bound: 10,
            batch_size: 1000,
            budget: Budget::default(),
        }
    }
}

pub struct BottomUpSearch<'a> {
    grammar: &'a Grammar,
    params: BusParams,
    index: ProgramIndex,
    closed: HashSet<String>,
    optimizer: Option<Box<dyn ConstantOptimizer + 'a>>,
}
impl<'a> BottomUpSearch<'a> {
    pub fn new(grammar: &'a Grammar, params: BusParams) -> Self {
        BottomUpSearch {
            grammar,
            params,
            index: ProgramIndex::new(),
            closed: HashSet::new(),
            optimizer: None,
        }
    }
    /// Tunes the constants of a correct program before returning it.
    pub fn with_optimizer<O: ConstantOptimizer + 'a>(mut self, optimizer: O) -> Self {
        self.optimizer = Some(Box::new(optimizer));
        self
    }
    pub fn index(&self) -> &ProgramIndex {
        &self.index
    }

    /// Grows and commits every new program of exactly this cost, returning them.
    pub fn grow(&mut self, cost: usize) -> Vec<Node> {
        let mut fresh = self.grow_from_committed(cost, false);
        self.commit(cost, &fresh);
        // zero-cost composites may take a program of this very level as a child
        let late = self.grow_from_committed(cost, true);
        self.commit(cost, &late);
        fresh.extend(late);
        fresh
    }

    fn grow_from_committed(&mut self, cost: usize, wrappers_only: bool) -> Vec<Node> {
        let grammar = self.grammar;
        let closed = &mut self.closed;
        let growth = Growth {
            grammar,
            index: &self.index,
            fresh_level: if wrappers_only { Some(cost) } else { None },
        };
        let mut fresh = Vec::new();
        let mut keep = |node: Node| {
            if closed.insert(node.render()) {
                fresh.push(node)
            }
            true
        };
        for rule in grammar.rules() {
            let own = rule.kind.own_cost();
            if wrappers_only {
                if own == 0 && !rule.is_terminal() {
                    growth.grow(rule, own, cost, &mut keep);
                }
            } else if rule.is_terminal() {
                if own == cost {
                    for node in grammar.terminals(rule.kind) {
                        keep(node);
                    }
                }
            } else {
                growth.grow(rule, own, cost, &mut keep);
            }
        }
        fresh
    }

    fn commit(&mut self, cost: usize, programs: &[Node]) {
        self.index.open(cost);
        for program in programs {
            debug_assert_eq!(program.cost(), cost);
            self.index.insert(program.clone());
        }
    }

    /// Plays a batch and returns the first program judged correct, in completion order.
    fn play_batch<F: GameFactory>(
        &self,
        batch: Vec<Node>,
        evaluator: &mut Evaluator<F>,
        best: &mut Option<Candidate>,
    ) -> Result<Option<Candidate>, GameError> {
        for (program, record) in evaluator.evaluate_batch(batch)? {
            if record.is_failure() {
                continue;
            }
            let correct = evaluator.judge(&record);
            let candidate = Candidate::new(program, &record);
            if candidate.beats(best.as_ref()) {
                info!(
                    score = candidate.score,
                    cost = candidate.program.cost(),
                    program = %candidate.program,
                    "new best program"
                );
                evaluator.set_best(candidate.score, &candidate.raw_scores);
                *best = Some(candidate.clone());
            }
            if correct {
                return Ok(Some(self.tune(candidate, evaluator)));
            }
        }
        Ok(None)
    }

    fn tune<F: GameFactory>(&self, candidate: Candidate, evaluator: &Evaluator<F>) -> Candidate {
        let optimizer = match self.optimizer {
            Some(ref optimizer) => optimizer,
            None => return candidate,
        };
        let objective = |p: &Node| evaluator.evaluate(p);
        match optimizer.optimize(&candidate.program, candidate.score, &objective) {
            Ok(tuned) if tuned.improved && tuned.score >= candidate.score => {
                debug!(from = candidate.score, to = tuned.score, "tuned constants");
                Candidate {
                    program: tuned.program,
                    score: tuned.score,
                    raw_scores: tuned.raw_scores,
                }
            }
            Ok(_) => candidate,
            Err(err) => {
                warn!(error = %err, "optimizer failed; keeping the original program");
                candidate
            }
        }
    }

    fn finish(
        &self,
        deadline: &Deadline,
        best: Option<Candidate>,
        solved: bool,
        evaluations: usize,
    ) -> SynthesisResult {
        info!(
            solved,
            indexed = self.index.len(),
            elapsed = ?deadline.elapsed(),
            "bottom-up search finished"
        );
        SynthesisResult {
            best,
            solved,
            elapsed: deadline.elapsed(),
            evaluations,
        }
    }
}

impl Synthesizer for BottomUpSearch<'_> {
    fn synthesize<F: GameFactory>(
        &mut self,
        evaluator: &mut Evaluator<F>,
    ) -> Result<SynthesisResult, GameError> {
        let start = evaluator.evaluations();
        let deadline = self.params.budget.start(start);
        self.index = ProgramIndex::new();
        self.closed.clear();
        info!(cost_bound = self.params.cost_bound, "starting bottom-up search");

        let batch_size = self.params.batch_size.max(1);
        let mut best = None;
        for cost in 0..=self.params.cost_bound {
            if deadline.should_stop(evaluator.evaluations()) {
                break;
            }
            let grammar = self.grammar;
            let mut pending: Vec<Node> = self
                .grow(cost)
                .into_iter()
                .filter(|p| grammar.is_program(p.kind()))
                .collect();
            while !pending.is_empty() && !deadline.should_stop(evaluator.evaluations()) {
                let rest = pending.split_off(pending.len().min(batch_size));
                let batch = std::mem::replace(&mut pending, rest);
                if let Some(found) = self.play_batch(batch, evaluator, &mut best)? {
                    let evaluations = evaluator.evaluations() - start;
                    return Ok(self.finish(&deadline, Some(found), true, evaluations));
                }
            }
            debug!(cost, indexed = self.index.len(), "cost level complete");
        }
        let evaluations = evaluator.evaluations() - start;
        Ok(self.finish(&deadline, best, false, evaluations))
    }
}
