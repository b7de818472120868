//! A cost-indexed store of previously built programs, the raw material for bottom-up search.

use std::collections::BTreeMap;

use crate::dsl::{Kind, Node};

/// Programs filed by cost, then by kind.
///
/// The index only grows. A cost level that has been opened but holds nothing of some kind is
/// distinguishable from a level that was never explored:
///
/// ```
/// use stratsynth::{Kind, Node, ProgramIndex};
///
/// let mut index = ProgramIndex::new();
/// index.insert(Node::constant(1.0));
/// index.open(2);
///
/// assert_eq!(index.get(1, Kind::Constant).map(<[Node]>::len), Some(1));
/// assert_eq!(index.get(2, Kind::Constant), Some(&[][..]));
/// assert_eq!(index.get(3, Kind::Constant), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProgramIndex {
    levels: BTreeMap<usize, BTreeMap<Kind, Vec<Node>>>,
    len: usize,
}
impl ProgramIndex {
    pub fn new() -> Self {
        ProgramIndex::default()
    }
    /// Files a program under its own cost.
    pub fn insert(&mut self, node: Node) {
        let cost = node.cost();
        self.insert_at(cost, node)
    }
    /// Files a program under an externally computed cost, as weighted search does.
    pub fn insert_at(&mut self, cost: usize, node: Node) {
        self.levels
            .entry(cost)
            .or_default()
            .entry(node.kind())
            .or_default()
            .push(node);
        self.len += 1;
    }
    /// Marks a cost level as explored even if nothing gets filed there.
    pub fn open(&mut self, cost: usize) {
        self.levels.entry(cost).or_default();
    }
    /// Everything at exactly this cost, grouped by kind, or `None` if the level is unexplored.
    pub fn lookup(&self, cost: usize) -> Option<&BTreeMap<Kind, Vec<Node>>> {
        self.levels.get(&cost)
    }
    /// Programs of one kind at exactly this cost, or `None` if the level is unexplored.
    pub fn get(&self, cost: usize, kind: Kind) -> Option<&[Node]> {
        self.levels
            .get(&cost)
            .map(|level| level.get(&kind).map(Vec::as_slice).unwrap_or(&[]))
    }
    /// A copy that later insertions into `self` do not affect.
    pub fn snapshot(&self) -> ProgramIndex {
        self.clone()
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    /// The highest explored cost level.
    pub fn max_cost(&self) -> Option<usize> {
        self.levels.keys().next_back().copied()
    }
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.levels
            .iter()
            .flat_map(|(&cost, level)| level.values().flatten().map(move |n| (cost, n)))
    }
}
