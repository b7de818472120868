use itertools::Itertools;
use std::collections::BTreeMap;
use std::f64::consts::LN_10;

use crate::dsl::Kind;
use crate::grammar::Grammar;
use crate::search::Candidate;
use crate::utils::logsumexp;

/// A rule's current probability, kept in log space, and the enumeration cost derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weight {
    pub logprob: f64,
    pub cost: usize,
}

/// `max(1, floor(-log10(p)))` for `p = exp(logprob)`.
pub fn cost_of(logprob: f64) -> usize {
    let c = (-logprob / LN_10).floor();
    if c.is_nan() || c < 1.0 {
        1
    } else {
        (c as usize).min(u32::MAX as usize)
    }
}

/// Per-rule probabilities and costs for guided search. Owned by one search run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleWeights {
    weights: BTreeMap<Kind, Weight>,
}
impl RuleWeights {
    /// Every rule of the grammar equally likely.
    pub fn uniform(grammar: &Grammar) -> Self {
        let kinds = grammar.rules().map(|r| r.kind).collect_vec();
        let logprob = -(kinds.len().max(1) as f64).ln();
        let weights = kinds
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    Weight {
                        logprob,
                        cost: cost_of(logprob),
                    },
                )
            })
            .collect();
        RuleWeights { weights }
    }
    pub fn get(&self, kind: Kind) -> Option<Weight> {
        self.weights.get(&kind).copied()
    }
    pub fn cost(&self, kind: Kind) -> Option<usize> {
        self.weights.get(&kind).map(|w| w.cost)
    }
    pub fn probability(&self, kind: Kind) -> Option<f64> {
        self.weights.get(&kind).map(|w| w.logprob.exp())
    }
    pub fn iter(&self) -> impl Iterator<Item = (Kind, Weight)> + '_ {
        self.weights.iter().map(|(&k, &w)| (k, w))
    }

    /// Raises each rule's probability to the smallest fitness among the selected partial
    /// solutions that use it (one when none do), renormalizes, and recomputes costs.
    ///
    /// A partial solution's fitness is
    /// `(best + 1 - score) / ((1 - beta) * (best + 1))`, below one for the solutions that
    /// survive selection, so rules they use become more likely.
    pub fn update(&mut self, grammar: &Grammar, selected: &[Candidate], best: f64, beta: f64) {
        let fitness = |score: f64| (best + 1.0 - score) / ((1.0 - beta) * (best + 1.0));
        for (&kind, weight) in self.weights.iter_mut() {
            let rule = match grammar.rule(kind) {
                Some(rule) => rule,
                None => continue,
            };
            let exponent = selected
                .iter()
                .filter(|c| rule.used_in(&c.program))
                .map(|c| fitness(c.score))
                .fold(None, |acc: Option<f64>, f| Some(acc.map_or(f, |a| a.min(f))))
                .unwrap_or(1.0);
            weight.logprob *= exponent;
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        let lps = self.weights.values().map(|w| w.logprob).collect_vec();
        let z = logsumexp(&lps);
        if !z.is_finite() {
            return;
        }
        for weight in self.weights.values_mut() {
            weight.logprob -= z;
            weight.cost = cost_of(weight.logprob);
        }
    }
}
