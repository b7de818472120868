//! (representation) The strategy language: node kinds, trees with cached costs, and their
//! canonical renderings.
//!
//! Trees are plain values. A parent owns its children, there are no back-references, and every
//! node caches its own cost. Composite nodes are only ever built through a [`Grammar`], which
//! checks every child against the valid kinds of its slot.
//!
//! # Examples
//!
//! ```
//! use stratsynth::{Grammar, Node, Op};
//!
//! let g = Grammar::standard();
//! let cond = g
//!     .build(Op::GreaterThan, vec![Node::constant(10.0), Node::constant(0.0)])
//!     .unwrap();
//! let act = g
//!     .build(Op::ReturnAction, vec![Node::array_element("actions", 0)])
//!     .unwrap();
//! let program = g.build(Op::IfThen, vec![cond, act]).unwrap();
//!
//! assert_eq!(program.cost(), 5);
//! assert_eq!(program.render(), "if (10 > 0) { return actions[0] }");
//! assert_eq!(g.parse(&program.render()).unwrap(), program);
//! ```
//!
//! [`Grammar`]: ../grammar/struct.Grammar.html

pub mod interp;
mod parser;

pub use self::interp::{Env, EvaluationError, State, Value, ACTIONS};
pub use self::parser::ParseError;
pub(crate) use self::parser::parse;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grammar::Grammar;

/// The scalar name a `ForEach` body uses to read the element currently being visited.
pub const LOOP_VARIABLE: &str = "loop";

/// The closed set of node kinds.
///
/// Names accept the spellings used by older grammar configuration files as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Constant,
    #[serde(alias = "VarScalar")]
    ScalarRef,
    #[serde(alias = "VarArray")]
    ArrayRef,
    #[serde(alias = "VarFromArray")]
    ArrayElementRef,
    PlayerPosition,
    NonPlayerObjectPosition,
    NonPlayerObjectApproaching,
    #[serde(alias = "LT")]
    LessThan,
    #[serde(alias = "GT")]
    GreaterThan,
    #[serde(alias = "EQ")]
    EqualTo,
    #[serde(alias = "Addition")]
    Plus,
    Minus,
    #[serde(alias = "Multiplication")]
    Times,
    Divide,
    #[serde(alias = "IT")]
    IfThen,
    #[serde(alias = "ITE")]
    IfThenElse,
    ForEach,
    ReturnAction,
    Strategy,
}
impl Kind {
    pub const ALL: [Kind; 19] = [
        Kind::Constant,
        Kind::ScalarRef,
        Kind::ArrayRef,
        Kind::ArrayElementRef,
        Kind::PlayerPosition,
        Kind::NonPlayerObjectPosition,
        Kind::NonPlayerObjectApproaching,
        Kind::LessThan,
        Kind::GreaterThan,
        Kind::EqualTo,
        Kind::Plus,
        Kind::Minus,
        Kind::Times,
        Kind::Divide,
        Kind::IfThen,
        Kind::IfThenElse,
        Kind::ForEach,
        Kind::ReturnAction,
        Kind::Strategy,
    ];

    /// What a node of this kind adds to the cost of its tree, on top of its children.
    ///
    /// Variable references and the `Strategy` sequencing node are wrappers and contribute
    /// nothing; every other kind contributes one.
    pub fn own_cost(self) -> usize {
        match self {
            Kind::ScalarRef | Kind::ArrayRef | Kind::ArrayElementRef | Kind::Strategy => 0,
            _ => 1,
        }
    }
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Kind::Constant
                | Kind::ScalarRef
                | Kind::ArrayRef
                | Kind::ArrayElementRef
                | Kind::PlayerPosition
                | Kind::NonPlayerObjectPosition
                | Kind::NonPlayerObjectApproaching
        )
    }
    pub fn is_sensor(self) -> bool {
        matches!(
            self,
            Kind::PlayerPosition | Kind::NonPlayerObjectPosition | Kind::NonPlayerObjectApproaching
        )
    }
    /// Statements are the kinds that produce an action rather than a number or a truth value.
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            Kind::IfThen | Kind::IfThenElse | Kind::ForEach | Kind::ReturnAction | Kind::Strategy
        )
    }
    /// The operator for kinds that carry no payload. Constants and variable references need a
    /// value or a name and so have none.
    pub fn bare_op(self) -> Option<Op> {
        Some(match self {
            Kind::Constant | Kind::ScalarRef | Kind::ArrayRef | Kind::ArrayElementRef => {
                return None
            }
            Kind::PlayerPosition => Op::PlayerPosition,
            Kind::NonPlayerObjectPosition => Op::NonPlayerObjectPosition,
            Kind::NonPlayerObjectApproaching => Op::NonPlayerObjectApproaching,
            Kind::LessThan => Op::LessThan,
            Kind::GreaterThan => Op::GreaterThan,
            Kind::EqualTo => Op::EqualTo,
            Kind::Plus => Op::Plus,
            Kind::Minus => Op::Minus,
            Kind::Times => Op::Times,
            Kind::Divide => Op::Divide,
            Kind::IfThen => Op::IfThen,
            Kind::IfThenElse => Op::IfThenElse,
            Kind::ForEach => Op::ForEach,
            Kind::ReturnAction => Op::ReturnAction,
            Kind::Strategy => Op::Strategy,
        })
    }
}
impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A node's operator together with its payload, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Constant(f64),
    ScalarRef(String),
    ArrayRef(String),
    ArrayElementRef(String, usize),
    PlayerPosition,
    NonPlayerObjectPosition,
    NonPlayerObjectApproaching,
    LessThan,
    GreaterThan,
    EqualTo,
    Plus,
    Minus,
    Times,
    Divide,
    IfThen,
    IfThenElse,
    ForEach,
    ReturnAction,
    Strategy,
}
impl Op {
    pub fn kind(&self) -> Kind {
        match self {
            Op::Constant(_) => Kind::Constant,
            Op::ScalarRef(_) => Kind::ScalarRef,
            Op::ArrayRef(_) => Kind::ArrayRef,
            Op::ArrayElementRef(..) => Kind::ArrayElementRef,
            Op::PlayerPosition => Kind::PlayerPosition,
            Op::NonPlayerObjectPosition => Kind::NonPlayerObjectPosition,
            Op::NonPlayerObjectApproaching => Kind::NonPlayerObjectApproaching,
            Op::LessThan => Kind::LessThan,
            Op::GreaterThan => Kind::GreaterThan,
            Op::EqualTo => Kind::EqualTo,
            Op::Plus => Kind::Plus,
            Op::Minus => Kind::Minus,
            Op::Times => Kind::Times,
            Op::Divide => Kind::Divide,
            Op::IfThen => Kind::IfThen,
            Op::IfThenElse => Kind::IfThenElse,
            Op::ForEach => Kind::ForEach,
            Op::ReturnAction => Kind::ReturnAction,
            Op::Strategy => Kind::Strategy,
        }
    }
    /// Infix symbol for binary comparisons and arithmetic.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Op::LessThan => Some("<"),
            Op::GreaterThan => Some(">"),
            Op::EqualTo => Some("=="),
            Op::Plus => Some("+"),
            Op::Minus => Some("-"),
            Op::Times => Some("*"),
            Op::Divide => Some("//"),
            _ => None,
        }
    }
}

/// Failure to build or edit a node in a way the grammar allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarViolation {
    /// The grammar has no production for this kind.
    UnknownRule(Kind),
    Arity {
        kind: Kind,
        min: usize,
        max: usize,
        found: usize,
    },
    InvalidChild {
        parent: Kind,
        slot: usize,
        child: Kind,
    },
    NoSuchChild {
        parent: Kind,
        index: usize,
    },
}
impl fmt::Display for GrammarViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GrammarViolation::UnknownRule(kind) => write!(f, "no production for {}", kind),
            GrammarViolation::Arity {
                kind,
                min,
                max,
                found,
            } if min == max => write!(f, "{} takes {} children but got {}", kind, min, found),
            GrammarViolation::Arity {
                kind,
                min,
                max,
                found,
            } => write!(
                f,
                "{} takes {} to {} children but got {}",
                kind, min, max, found
            ),
            GrammarViolation::InvalidChild {
                parent,
                slot,
                child,
            } => write!(f, "{} cannot appear as child {} of {}", child, slot, parent),
            GrammarViolation::NoSuchChild { parent, index } => {
                write!(f, "{} has no child at position {}", parent, index)
            }
        }
    }
}
impl std::error::Error for GrammarViolation {}

/// A program tree.
///
/// Leaves can be made directly with [`constant`], [`scalar`], [`array`], [`array_element`] and
/// [`leaf`]. Anything with children goes through [`Grammar::build`].
///
/// [`constant`]: #method.constant
/// [`scalar`]: #method.scalar
/// [`array`]: #method.array
/// [`array_element`]: #method.array_element
/// [`leaf`]: #method.leaf
/// [`Grammar::build`]: ../grammar/struct.Grammar.html#method.build
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    op: Op,
    children: Vec<Node>,
    cost: usize,
}
impl Node {
    /// Assembles a node without consulting any grammar. Callers must have validated `children`.
    pub(crate) fn assemble(op: Op, children: Vec<Node>) -> Node {
        let cost = op.kind().own_cost() + children.iter().map(Node::cost).sum::<usize>();
        Node { op, children, cost }
    }
    pub fn constant(value: f64) -> Node {
        Node::assemble(Op::Constant(value), vec![])
    }
    pub fn scalar<S: Into<String>>(name: S) -> Node {
        Node::assemble(Op::ScalarRef(name.into()), vec![])
    }
    pub fn array<S: Into<String>>(name: S) -> Node {
        Node::assemble(Op::ArrayRef(name.into()), vec![])
    }
    pub fn array_element<S: Into<String>>(name: S, index: usize) -> Node {
        Node::assemble(Op::ArrayElementRef(name.into(), index), vec![])
    }
    /// A childless node. Fails for any operator that needs children.
    pub fn leaf(op: Op) -> Result<Node, GrammarViolation> {
        let kind = op.kind();
        if kind.is_terminal() {
            Ok(Node::assemble(op, vec![]))
        } else {
            Err(GrammarViolation::Arity {
                kind,
                min: 1,
                max: usize::MAX,
                found: 0,
            })
        }
    }

    pub fn op(&self) -> &Op {
        &self.op
    }
    pub fn kind(&self) -> Kind {
        self.op.kind()
    }
    pub fn children(&self) -> &[Node] {
        &self.children
    }
    /// The cached cost of this tree.
    pub fn cost(&self) -> usize {
        self.cost
    }
    fn local_cost(&self) -> usize {
        self.kind().own_cost() + self.children.iter().map(Node::cost).sum::<usize>()
    }
    /// Walks the whole tree bottom-up, rewriting every cached cost, and returns the root's.
    pub fn recompute_cost(&mut self) -> usize {
        let below: usize = self.children.iter_mut().map(Node::recompute_cost).sum();
        self.cost = self.kind().own_cost() + below;
        self.cost
    }
    /// Whether every cached cost in the tree agrees with a recomputation from its children.
    pub fn has_consistent_cost(&self) -> bool {
        self.children.iter().all(Node::has_consistent_cost) && self.cost == self.local_cost()
    }
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Node::depth).max().unwrap_or(0)
    }
    /// Whether this node or any descendant has the given kind.
    pub fn contains_kind(&self, kind: Kind) -> bool {
        self.kind() == kind || self.children.iter().any(|c| c.contains_kind(kind))
    }

    /// Child positions leading from the root to the `index`-th node in pre-order. The root is
    /// index 0 and has the empty path.
    pub fn path_to(&self, index: usize) -> Option<Vec<usize>> {
        fn walk(node: &Node, index: &mut usize, path: &mut Vec<usize>) -> bool {
            if *index == 0 {
                return true;
            }
            *index -= 1;
            for (i, child) in node.children.iter().enumerate() {
                path.push(i);
                if walk(child, index, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut index = index;
        let mut path = Vec::new();
        if walk(self, &mut index, &mut path) {
            Some(path)
        } else {
            None
        }
    }
    pub fn get(&self, path: &[usize]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((&i, rest)) => self.children.get(i)?.get(rest),
        }
    }

    /// Substitutes the child at `index`, returning the old one. The new child must be valid for
    /// that slot, and this node's cached cost is restored.
    ///
    /// Ancestors are not touched; use [`replace_at`] to edit deep inside a tree.
    ///
    /// [`replace_at`]: #method.replace_at
    pub fn replace_child(
        &mut self,
        grammar: &Grammar,
        index: usize,
        child: Node,
    ) -> Result<Node, GrammarViolation> {
        let parent = self.kind();
        if index >= self.children.len() {
            return Err(GrammarViolation::NoSuchChild { parent, index });
        }
        let slot = grammar
            .slot(parent, index)
            .ok_or(GrammarViolation::NoSuchChild { parent, index })?;
        if !slot.accepts(child.kind()) {
            return Err(GrammarViolation::InvalidChild {
                parent,
                slot: index,
                child: child.kind(),
            });
        }
        let old = std::mem::replace(&mut self.children[index], child);
        self.cost = self.local_cost();
        Ok(old)
    }
    /// Substitutes the subtree at `path`, returning the old one, and repairs the cached cost of
    /// every node along the path. An empty path replaces the whole tree.
    pub fn replace_at(
        &mut self,
        grammar: &Grammar,
        path: &[usize],
        node: Node,
    ) -> Result<Node, GrammarViolation> {
        match path.split_first() {
            None => Ok(std::mem::replace(self, node)),
            Some((&i, [])) => self.replace_child(grammar, i, node),
            Some((&i, rest)) => {
                let parent = self.kind();
                let old = self
                    .children
                    .get_mut(i)
                    .ok_or(GrammarViolation::NoSuchChild { parent, index: i })?
                    .replace_at(grammar, rest, node)?;
                self.cost = self.local_cost();
                Ok(old)
            }
        }
    }

    /// Values of the `Constant` leaves, in pre-order.
    pub fn constants(&self) -> Vec<f64> {
        let mut out = Vec::new();
        self.collect_constants(&mut out);
        out
    }
    fn collect_constants(&self, out: &mut Vec<f64>) {
        if let Op::Constant(v) = self.op {
            out.push(v)
        }
        for child in &self.children {
            child.collect_constants(out)
        }
    }
    /// Overwrites `Constant` leaves in pre-order with `values`. Leaves beyond the end of
    /// `values` keep their old value. Structure and costs are unaffected.
    pub fn set_constants(&mut self, values: &[f64]) {
        self.fill_constants(&mut values.iter())
    }
    fn fill_constants(&mut self, values: &mut std::slice::Iter<f64>) {
        if let Op::Constant(ref mut v) = self.op {
            if let Some(&x) = values.next() {
                *v = x
            }
        }
        for child in &mut self.children {
            child.fill_constants(values)
        }
    }

    /// The canonical one-line rendering, used as the deduplication key.
    pub fn render(&self) -> String {
        self.to_string()
    }
    /// An indented multi-line rendering for people to read.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out
    }
    fn write_pretty(&self, out: &mut String, depth: usize) {
        let pad = "    ".repeat(depth);
        let c = &self.children;
        match self.op {
            Op::IfThen => {
                out.push_str(&format!("{}if {}:\n", pad, c[0]));
                c[1].write_pretty(out, depth + 1);
            }
            Op::IfThenElse => {
                out.push_str(&format!("{}if {}:\n", pad, c[0]));
                c[1].write_pretty(out, depth + 1);
                out.push_str(&format!("{}else:\n", pad));
                c[2].write_pretty(out, depth + 1);
            }
            Op::ForEach => {
                out.push_str(&format!("{}for {} in {}:\n", pad, LOOP_VARIABLE, c[0]));
                c[1].write_pretty(out, depth + 1);
            }
            Op::Strategy => {
                for statement in c {
                    statement.write_pretty(out, depth)
                }
            }
            _ => out.push_str(&format!("{}{}\n", pad, self)),
        }
    }
}
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let c = &self.children;
        match self.op {
            Op::Constant(v) => write!(f, "{}", v),
            Op::ScalarRef(ref name) | Op::ArrayRef(ref name) => write!(f, "{}", name),
            Op::ArrayElementRef(ref name, index) => write!(f, "{}[{}]", name, index),
            Op::PlayerPosition | Op::NonPlayerObjectPosition | Op::NonPlayerObjectApproaching => {
                write!(f, "{}", self.kind())
            }
            Op::LessThan
            | Op::GreaterThan
            | Op::EqualTo
            | Op::Plus
            | Op::Minus
            | Op::Times
            | Op::Divide => write!(
                f,
                "({} {} {})",
                c[0],
                self.op.symbol().unwrap_or("?"),
                c[1]
            ),
            Op::IfThen => write!(f, "if {} {{ {} }}", c[0], c[1]),
            Op::IfThenElse => write!(f, "if {} {{ {} }} else {{ {} }}", c[0], c[1], c[2]),
            Op::ForEach => write!(f, "for {} in {} {{ {} }}", LOOP_VARIABLE, c[0], c[1]),
            Op::ReturnAction => write!(f, "return {}", c[0]),
            Op::Strategy => match c.get(1) {
                Some(next) => write!(f, "{}; {}", c[0], next),
                None => write!(f, "{};", c[0]),
            },
        }
    }
}
