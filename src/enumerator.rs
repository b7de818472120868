//! Growth of one production rule at one cost level out of a [`ProgramIndex`].
//!
//! Children are drawn only from the index passed in, so anything grown at a level is invisible
//! to the rest of that level until the caller commits it.
//!
//! [`ProgramIndex`]: ../plist/struct.ProgramIndex.html

use tracing::warn;

use crate::dsl::{Node, Op};
use crate::grammar::{Grammar, Rule};
use crate::plist::ProgramIndex;

pub(crate) struct Growth<'a> {
    pub grammar: &'a Grammar,
    pub index: &'a ProgramIndex,
    /// When set, only combinations using at least one child of this cost are produced.
    pub fresh_level: Option<usize>,
}
impl<'a> Growth<'a> {
    /// Calls `emit` with every program `rule` can build whose children's costs sum to
    /// `target - own_cost`. Returns whether the caller should continue enumerating.
    pub fn grow<F>(&self, rule: &Rule, own_cost: usize, target: usize, emit: &mut F) -> bool
    where
        F: FnMut(Node) -> bool,
    {
        if rule.is_terminal() || own_cost > target {
            return true;
        }
        let op = match rule.kind.bare_op() {
            Some(op) => op,
            None => return true,
        };
        let mut children = Vec::with_capacity(rule.slots.len());
        self.fill(&op, rule, target - own_cost, false, &mut children, emit)
    }

    fn fill<F>(
        &self,
        op: &Op,
        rule: &Rule,
        remaining: usize,
        touched: bool,
        children: &mut Vec<Node>,
        emit: &mut F,
    ) -> bool
    where
        F: FnMut(Node) -> bool,
    {
        let slot = children.len();
        if slot == rule.slots.len() {
            return self.finish(op, remaining, touched, children, emit);
        }
        let spec = &rule.slots[slot];
        if spec.optional && !self.finish(op, remaining, touched, children, emit) {
            return false;
        }
        let last = slot + 1 == rule.slots.len();
        let lowest = if last { remaining } else { 0 };
        for cost in lowest..=remaining {
            for &kind in &spec.kinds {
                let candidates = match self.index.get(cost, kind) {
                    Some(nodes) => nodes,
                    None => continue,
                };
                let touched = touched || self.fresh_level == Some(cost);
                for node in candidates {
                    children.push(node.clone());
                    let go_on = self.fill(op, rule, remaining - cost, touched, children, emit);
                    children.pop();
                    if !go_on {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn finish<F>(
        &self,
        op: &Op,
        remaining: usize,
        touched: bool,
        children: &[Node],
        emit: &mut F,
    ) -> bool
    where
        F: FnMut(Node) -> bool,
    {
        if remaining != 0 || (self.fresh_level.is_some() && !touched) {
            return true;
        }
        if is_redundant(op, children) {
            return true;
        }
        match self.grammar.build(op.clone(), children.to_vec()) {
            Ok(node) => emit(node),
            Err(err) => {
                warn!(error = %err, "skipping ill-formed combination");
                debug_assert!(false, "enumeration produced an ill-formed node: {}", err);
                true
            }
        }
    }
}

/// Whether a combination is trivially equivalent to something simpler or already produced in
/// the other operand order.
pub(crate) fn is_redundant(op: &Op, children: &[Node]) -> bool {
    let zero = |n: &Node| matches!(n.op(), Op::Constant(v) if *v == 0.0);
    match (op, children) {
        (Op::LessThan | Op::GreaterThan | Op::EqualTo, [l, r]) => l.render() == r.render(),
        (Op::Plus, [l, r]) => zero(l) || zero(r),
        (Op::Minus, [l, r]) => zero(r) || l.render() == r.render(),
        (Op::Divide, [l, r]) => zero(l) || zero(r) || l.render() == r.render(),
        (Op::Times, [l, r]) => l.render() > r.render(),
        _ => false,
    }
}
