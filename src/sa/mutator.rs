//! Random programs and random edits to them, always within the grammar.
//!
//! Generation picks a uniformly random valid kind for every slot until the tree is as deep or as
//! large as the [`MutatorParams`] allow. From then on every slot takes a kind that bottoms out as
//! quickly as possible, so generation always terminates.
//!
//! ```
//! use rand::rngs::SmallRng;
//! use rand::SeedableRng;
//! use std::collections::HashSet;
//! use stratsynth::sa::mutator::{MutatorParams, ProgramMutator};
//! use stratsynth::Grammar;
//!
//! let g = Grammar::standard();
//! let mutator = ProgramMutator::new(&g, MutatorParams::default());
//! let mut rng = SmallRng::seed_from_u64(42);
//!
//! let closed = HashSet::new();
//! let program = mutator.generate_random(&closed, &mut rng).unwrap();
//! let mutant = mutator.mutate(&program, &closed, &mut rng).unwrap();
//! assert!(g.validate(&mutant).is_ok());
//! assert_ne!(mutant.render(), program.render());
//! ```
//!
//! [`MutatorParams`]: struct.MutatorParams.html

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

use crate::dsl::{GrammarViolation, Kind, Node};
use crate::grammar::{Grammar, Slot};

/// Hard limit on tree depth, whatever the parameters say.
const MAX_DEPTH: usize = 64;
/// Draws before giving up on finding a program outside the closed set.
const MAX_ATTEMPTS: usize = 1000;

/// Size limits for generated trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutatorParams {
    /// Depth assigned to the root of a whole new program.
    pub initial_depth: usize,
    /// Past this depth, slots only take the quickest way down.
    pub max_depth: usize,
    /// Past this many nodes, slots only take the quickest way down.
    pub max_size: usize,
}
impl Default for MutatorParams {
    fn default() -> Self {
        MutatorParams {
            initial_depth: 0,
            max_depth: 4,
            max_size: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    Grammar(GrammarViolation),
    DepthExceeded(usize),
    /// Nothing new could be drawn: every attempt rendered to something already seen, or a slot
    /// had no usable kind.
    OptionsExhausted,
}
impl From<GrammarViolation> for SampleError {
    fn from(err: GrammarViolation) -> Self {
        SampleError::Grammar(err)
    }
}
impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SampleError::Grammar(ref err) => write!(f, "sampled an invalid tree: {}", err),
            SampleError::DepthExceeded(depth) => write!(f, "tree exceeded depth {}", depth),
            SampleError::OptionsExhausted => write!(f, "no new program could be sampled"),
        }
    }
}
impl std::error::Error for SampleError {}

/// Draws random programs of a grammar and random single-subtree edits of them.
pub struct ProgramMutator<'a> {
    grammar: &'a Grammar,
    params: MutatorParams,
    /// Height of the shortest tree rooted at each kind.
    heights: BTreeMap<Kind, usize>,
}
impl<'a> ProgramMutator<'a> {
    pub fn new(grammar: &'a Grammar, params: MutatorParams) -> Self {
        ProgramMutator {
            heights: shortest_heights(grammar),
            grammar,
            params,
        }
    }
    pub fn params(&self) -> &MutatorParams {
        &self.params
    }

    /// A random tree rooted at `kind`.
    pub fn sample<R: Rng>(&self, kind: Kind, rng: &mut R) -> Result<Node, SampleError> {
        let mut budget = self.params.max_size;
        self.sample_at(kind, self.params.initial_depth, &mut budget, rng)
    }

    fn sample_at<R: Rng>(
        &self,
        kind: Kind,
        depth: usize,
        budget: &mut usize,
        rng: &mut R,
    ) -> Result<Node, SampleError> {
        if depth > MAX_DEPTH {
            return Err(SampleError::DepthExceeded(depth));
        }
        *budget = budget.saturating_sub(1);
        let rule = self
            .grammar
            .rule(kind)
            .ok_or(GrammarViolation::UnknownRule(kind))?;
        if rule.is_terminal() {
            return self
                .grammar
                .sample_terminal(kind, rng)
                .ok_or(SampleError::OptionsExhausted);
        }
        let op = kind
            .bare_op()
            .ok_or(GrammarViolation::UnknownRule(kind))?;
        let mut children = Vec::with_capacity(rule.slots.len());
        for slot in &rule.slots {
            let capped = depth >= self.params.max_depth || *budget == 0;
            match self.pick(slot, capped, rng)? {
                Some(child) => children.push(self.sample_at(child, depth + 1, budget, rng)?),
                None => break,
            }
        }
        Ok(self.grammar.build(op, children)?)
    }

    /// A kind for one slot, or `None` to leave an optional slot empty.
    fn pick<R: Rng>(
        &self,
        slot: &Slot,
        capped: bool,
        rng: &mut R,
    ) -> Result<Option<Kind>, SampleError> {
        let usable: Vec<(Kind, usize)> = slot
            .kinds
            .iter()
            .filter_map(|k| self.heights.get(k).map(|&h| (*k, h)))
            .collect();
        if capped {
            if slot.optional {
                return Ok(None);
            }
            let lowest = usable.iter().map(|&(_, h)| h).min();
            let shortest: Vec<Kind> = usable
                .iter()
                .filter(|&&(_, h)| Some(h) == lowest)
                .map(|&(k, _)| k)
                .collect();
            return shortest
                .choose(rng)
                .copied()
                .map(Some)
                .ok_or(SampleError::OptionsExhausted);
        }
        if slot.optional && rng.gen_range(0..=usable.len()) == 0 {
            return Ok(None);
        }
        usable
            .choose(rng)
            .map(|&(k, _)| Some(k))
            .ok_or(SampleError::OptionsExhausted)
    }

    fn random_root<R: Rng>(&self, rng: &mut R) -> Result<Node, SampleError> {
        let kind = *self
            .grammar
            .program_kinds()
            .choose(rng)
            .ok_or(SampleError::OptionsExhausted)?;
        self.sample(kind, rng)
    }

    /// A random whole program whose rendering is not in `closed`.
    pub fn generate_random<R: Rng>(
        &self,
        closed: &HashSet<String>,
        rng: &mut R,
    ) -> Result<Node, SampleError> {
        for _ in 0..MAX_ATTEMPTS {
            let program = self.random_root(rng)?;
            if !closed.contains(&program.render()) {
                return Ok(program);
            }
        }
        Err(SampleError::OptionsExhausted)
    }

    /// Replaces one uniformly chosen subtree with a freshly sampled one of a kind its slot
    /// accepts. Choosing the root replaces the whole program. The result renders differently
    /// from `program` and is not in `closed`.
    pub fn mutate<R: Rng>(
        &self,
        program: &Node,
        closed: &HashSet<String>,
        rng: &mut R,
    ) -> Result<Node, SampleError> {
        let original = program.render();
        let size = program.node_count();
        for attempt in 0..MAX_ATTEMPTS {
            let mutant = match rng.gen_range(0..size) {
                0 => self.random_root(rng)?,
                i => self.replace_subtree(program, i, rng)?,
            };
            let rendered = mutant.render();
            if rendered != original && !closed.contains(&rendered) {
                return Ok(mutant);
            }
            if attempt > 0 && attempt % 100 == 0 {
                debug!(attempt, program = %original, "mutation keeps landing on known programs");
            }
        }
        Err(SampleError::OptionsExhausted)
    }

    fn replace_subtree<R: Rng>(
        &self,
        program: &Node,
        index: usize,
        rng: &mut R,
    ) -> Result<Node, SampleError> {
        let path = program.path_to(index).ok_or(SampleError::OptionsExhausted)?;
        let (&position, parent_path) = path.split_last().ok_or(SampleError::OptionsExhausted)?;
        let parent = program
            .get(parent_path)
            .ok_or(SampleError::OptionsExhausted)?;
        let slot = self.grammar.slot(parent.kind(), position).ok_or(
            GrammarViolation::NoSuchChild {
                parent: parent.kind(),
                index: position,
            },
        )?;
        let kind = match self.pick(slot, false, rng)? {
            Some(kind) => kind,
            // an optional slot that is present keeps a child; draw again without the gap
            None => self
                .pick(&Slot::new(slot.kinds.clone()), false, rng)?
                .ok_or(SampleError::OptionsExhausted)?,
        };
        let replaced = program
            .get(&path)
            .map_or(0, Node::node_count);
        let mut budget = self
            .params
            .max_size
            .saturating_sub(program.node_count() - replaced)
            .max(1);
        let subtree = self.sample_at(kind, path.len(), &mut budget, rng)?;
        let mut mutant = program.clone();
        mutant.replace_at(self.grammar, &path, subtree)?;
        Ok(mutant)
    }
}

/// The height of the shortest tree each enabled kind can root. Kinds that cannot bottom out are
/// left out.
fn shortest_heights(grammar: &Grammar) -> BTreeMap<Kind, usize> {
    let mut heights = BTreeMap::new();
    loop {
        let mut changed = false;
        for rule in grammar.rules() {
            let below = rule
                .slots
                .iter()
                .filter(|s| !s.optional)
                .map(|s| s.kinds.iter().filter_map(|k| heights.get(k)).min().copied())
                .try_fold(0, |acc: usize, h| h.map(|h| acc.max(h + 1)));
            if let Some(h) = below {
                if heights.get(&rule.kind).map_or(true, |&old| h < old) {
                    heights.insert(rule.kind, h);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    heights
}
