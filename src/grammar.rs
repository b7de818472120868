//! (representation) Production rules: which kinds may appear as each child of each kind.
//!
//! A [`Grammar`] is built once from a [`GrammarConfig`] and never changes afterwards. Every
//! component that creates or edits trees borrows it.
//!
//! # Examples
//!
//! ```
//! use stratsynth::{Grammar, Kind};
//!
//! let g = Grammar::from_json(
//!     r#"{
//!         "operators": ["Strategy", "IT", "ReturnAction", "GreaterThan"],
//!         "sensors": ["PlayerPosition", "NonPlayerObjectPosition"],
//!         "arrays": ["actions"],
//!         "array_indexes": [0, 1, 2]
//!     }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(g.program_kinds(), &[Kind::Strategy]);
//! // the standard table lets comparisons take constants, but none were configured
//! assert!(!g.slot(Kind::GreaterThan, 0).unwrap().accepts(Kind::Constant));
//! assert!(g.slot(Kind::GreaterThan, 0).unwrap().accepts(Kind::PlayerPosition));
//! ```
//!
//! [`Grammar`]: struct.Grammar.html
//! [`GrammarConfig`]: struct.GrammarConfig.html

use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::dsl::{self, GrammarViolation, Kind, Node, Op, ParseError, LOOP_VARIABLE};

/// The valid kinds for one child position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub kinds: Vec<Kind>,
    /// An optional slot may be left empty. Only trailing slots may be optional.
    #[serde(default)]
    pub optional: bool,
}
impl Slot {
    pub fn new(kinds: Vec<Kind>) -> Self {
        Slot {
            kinds,
            optional: false,
        }
    }
    pub fn optional(kinds: Vec<Kind>) -> Self {
        Slot {
            kinds,
            optional: true,
        }
    }
    pub fn accepts(&self, kind: Kind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// A production: the result kind and the valid kinds of each of its child slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub kind: Kind,
    pub slots: Vec<Slot>,
}
impl Rule {
    /// Smallest and largest number of children.
    pub fn arity(&self) -> (usize, usize) {
        let required = self.slots.iter().take_while(|s| !s.optional).count();
        (required, self.slots.len())
    }
    pub fn is_terminal(&self) -> bool {
        self.slots.is_empty()
    }
    /// Whether the program or any of its subprograms was produced by this rule.
    pub fn used_in(&self, program: &Node) -> bool {
        program.contains_kind(self.kind)
    }
}

static STANDARD_SLOTS: Lazy<HashMap<Kind, Vec<Slot>>> = Lazy::new(|| {
    let operand = vec![
        Kind::Constant,
        Kind::ScalarRef,
        Kind::PlayerPosition,
        Kind::NonPlayerObjectPosition,
        Kind::Plus,
        Kind::Minus,
        Kind::Times,
        Kind::Divide,
    ];
    let condition = vec![
        Kind::LessThan,
        Kind::GreaterThan,
        Kind::EqualTo,
        Kind::NonPlayerObjectApproaching,
    ];
    let body = vec![Kind::ReturnAction, Kind::IfThen];
    let binary = vec![Slot::new(operand.clone()), Slot::new(operand)];
    let mut slots = HashMap::new();
    for kind in [
        Kind::LessThan,
        Kind::GreaterThan,
        Kind::EqualTo,
        Kind::Plus,
        Kind::Minus,
        Kind::Times,
        Kind::Divide,
    ] {
        slots.insert(kind, binary.clone());
    }
    slots.insert(
        Kind::IfThen,
        vec![Slot::new(condition.clone()), Slot::new(body.clone())],
    );
    slots.insert(
        Kind::IfThenElse,
        vec![
            Slot::new(condition),
            Slot::new(body.clone()),
            Slot::new(body),
        ],
    );
    slots.insert(
        Kind::ForEach,
        vec![
            Slot::new(vec![Kind::ArrayRef]),
            Slot::new(vec![Kind::IfThen, Kind::IfThenElse]),
        ],
    );
    slots.insert(
        Kind::ReturnAction,
        vec![Slot::new(vec![Kind::ArrayElementRef])],
    );
    slots.insert(
        Kind::Strategy,
        vec![
            Slot::new(vec![Kind::IfThen, Kind::IfThenElse, Kind::ForEach]),
            Slot::optional(vec![Kind::Strategy, Kind::ReturnAction]),
        ],
    );
    slots
});

/// The numbers `Constant` leaves may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantDomain {
    Values(Vec<f64>),
    /// `start`, `start + step`, ... while below `stop`.
    Range { start: f64, stop: f64, step: f64 },
}
impl Default for ConstantDomain {
    fn default() -> Self {
        ConstantDomain::Values(vec![])
    }
}
impl ConstantDomain {
    pub fn values(&self) -> Vec<f64> {
        match *self {
            ConstantDomain::Values(ref xs) => xs.clone(),
            ConstantDomain::Range { start, stop, step } => {
                if step <= 0.0 || stop <= start {
                    return vec![];
                }
                let n = ((stop - start) / step).ceil() as usize;
                (0..n)
                    .map(|i| ((start + i as f64 * step) * 1e10).round() / 1e10)
                    .filter(|&x| x < stop)
                    .collect()
            }
        }
    }
}

/// Externally supplied description of a game's language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarConfig {
    /// Composite kinds: comparisons, arithmetic, and statements.
    pub operators: Vec<Kind>,
    #[serde(default)]
    pub sensors: Vec<Kind>,
    #[serde(default)]
    pub scalars: Vec<String>,
    #[serde(default)]
    pub arrays: Vec<String>,
    #[serde(default)]
    pub array_indexes: Vec<usize>,
    #[serde(default)]
    pub constants: ConstantDomain,
    /// Kinds a whole program may have at its root.
    #[serde(default = "GrammarConfig::default_program_kinds")]
    pub program_kinds: Vec<Kind>,
    /// Replaces the standard valid-children table for the listed kinds.
    #[serde(default)]
    pub valid_children: BTreeMap<Kind, Vec<Slot>>,
}
impl GrammarConfig {
    fn default_program_kinds() -> Vec<Kind> {
        vec![Kind::Strategy]
    }
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Json)
    }
}
impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig {
            operators: vec![
                Kind::LessThan,
                Kind::GreaterThan,
                Kind::EqualTo,
                Kind::Plus,
                Kind::Minus,
                Kind::Times,
                Kind::Divide,
                Kind::IfThen,
                Kind::IfThenElse,
                Kind::ReturnAction,
                Kind::Strategy,
            ],
            sensors: vec![
                Kind::PlayerPosition,
                Kind::NonPlayerObjectPosition,
                Kind::NonPlayerObjectApproaching,
            ],
            scalars: vec![String::from("paddle_width")],
            arrays: vec![String::from(dsl::ACTIONS)],
            array_indexes: vec![0, 1, 2],
            constants: ConstantDomain::Values(vec![0.5, 1.0, 2.0]),
            program_kinds: GrammarConfig::default_program_kinds(),
            valid_children: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Json(serde_json::Error),
    /// A program kind that the configuration does not enable.
    UnknownProgramKind(Kind),
    /// A required slot whose valid kinds are all disabled.
    EmptySlot { kind: Kind, slot: usize },
    /// An enabled kind from which no finite tree can be built.
    UnproductiveKind(Kind),
    /// A `valid_children` entry with a different number of slots than the kind takes.
    ArityOverride {
        kind: Kind,
        expected: usize,
        found: usize,
    },
    /// A `valid_children` entry that makes a required slot optional.
    OptionalOverride { kind: Kind, slot: usize },
}
impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Json(ref err) => write!(f, "invalid grammar configuration: {}", err),
            ConfigError::UnknownProgramKind(kind) => {
                write!(f, "program kind {} is not enabled", kind)
            }
            ConfigError::EmptySlot { kind, slot } => {
                write!(f, "no enabled kind can fill child {} of {}", slot, kind)
            }
            ConfigError::UnproductiveKind(kind) => {
                write!(f, "no finite program of kind {} can be built", kind)
            }
            ConfigError::ArityOverride {
                kind,
                expected,
                found,
            } => write!(
                f,
                "{} takes {} children but its override lists {} slots",
                kind, expected, found
            ),
            ConfigError::OptionalOverride { kind, slot } => {
                write!(f, "child {} of {} cannot be made optional", slot, kind)
            }
        }
    }
}
impl std::error::Error for ConfigError {}

/// (representation) An immutable set of production rules plus the leaves they bottom out in.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: BTreeMap<Kind, Rule>,
    program_kinds: Vec<Kind>,
    constants: Vec<f64>,
    scalars: Vec<String>,
    arrays: Vec<String>,
    array_indexes: Vec<usize>,
}
impl Grammar {
    /// Enables the configured kinds and restricts every slot to enabled kinds.
    pub fn new(config: &GrammarConfig) -> Result<Self, ConfigError> {
        check_overrides(config)?;
        let grammar = Grammar::assemble(config);
        for rule in grammar.rules.values() {
            for (i, slot) in rule.slots.iter().enumerate() {
                if slot.kinds.is_empty() && !slot.optional {
                    return Err(ConfigError::EmptySlot {
                        kind: rule.kind,
                        slot: i,
                    });
                }
            }
        }
        if let Some(&kind) = grammar
            .program_kinds
            .iter()
            .find(|k| !grammar.rules.contains_key(k))
        {
            return Err(ConfigError::UnknownProgramKind(kind));
        }
        if let Some(kind) = grammar.unproductive_kind() {
            return Err(ConfigError::UnproductiveKind(kind));
        }
        Ok(grammar)
    }
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Grammar::new(&GrammarConfig::from_json(json)?)
    }
    /// The grammar of [`GrammarConfig::default`]: every kind except `ForEach`.
    ///
    /// [`GrammarConfig::default`]: struct.GrammarConfig.html
    pub fn standard() -> Self {
        Grammar::assemble(&GrammarConfig::default())
    }
    fn assemble(config: &GrammarConfig) -> Self {
        let constants = config.constants.values();
        let mut enabled: BTreeSet<Kind> = config
            .operators
            .iter()
            .chain(&config.sensors)
            .copied()
            .filter(|k| !k.is_terminal() || k.is_sensor())
            .collect();
        if !constants.is_empty() {
            enabled.insert(Kind::Constant);
        }
        if !config.scalars.is_empty() || enabled.contains(&Kind::ForEach) {
            enabled.insert(Kind::ScalarRef);
        }
        if !config.arrays.is_empty() {
            enabled.insert(Kind::ArrayRef);
            if !config.array_indexes.is_empty() {
                enabled.insert(Kind::ArrayElementRef);
            }
        }
        let rules = enabled
            .iter()
            .map(|&kind| {
                let slots = config
                    .valid_children
                    .get(&kind)
                    .or_else(|| STANDARD_SLOTS.get(&kind))
                    .map(|slots| {
                        slots
                            .iter()
                            .map(|slot| Slot {
                                kinds: slot
                                    .kinds
                                    .iter()
                                    .copied()
                                    .filter(|k| enabled.contains(k))
                                    .unique()
                                    .collect(),
                                optional: slot.optional,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (kind, Rule { kind, slots })
            })
            .collect();
        Grammar {
            rules,
            program_kinds: config.program_kinds.clone(),
            constants,
            scalars: config.scalars.clone(),
            arrays: config.arrays.clone(),
            array_indexes: config.array_indexes.clone(),
        }
    }

    /// Finds a kind whose every expansion recurses forever. Random generation relies on there
    /// being none.
    fn unproductive_kind(&self) -> Option<Kind> {
        let mut productive: BTreeSet<Kind> = BTreeSet::new();
        loop {
            let before = productive.len();
            for rule in self.rules.values() {
                let buildable = rule
                    .slots
                    .iter()
                    .all(|s| s.optional || s.kinds.iter().any(|k| productive.contains(k)));
                if buildable {
                    productive.insert(rule.kind);
                }
            }
            if productive.len() == before {
                break;
            }
        }
        self.rules.keys().copied().find(|k| !productive.contains(k))
    }

    /// Rules in a fixed order, terminals first.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
    pub fn rule(&self, kind: Kind) -> Option<&Rule> {
        self.rules.get(&kind)
    }
    pub fn slot(&self, kind: Kind, index: usize) -> Option<&Slot> {
        self.rules.get(&kind)?.slots.get(index)
    }
    pub fn program_kinds(&self) -> &[Kind] {
        &self.program_kinds
    }
    pub fn is_program(&self, kind: Kind) -> bool {
        self.program_kinds.contains(&kind)
    }
    pub fn constants(&self) -> &[f64] {
        &self.constants
    }

    /// Builds a node, checking arity and every child against its slot.
    pub fn build(&self, op: Op, children: Vec<Node>) -> Result<Node, GrammarViolation> {
        let kind = op.kind();
        let rule = self
            .rules
            .get(&kind)
            .ok_or(GrammarViolation::UnknownRule(kind))?;
        check_children(rule, children.iter().map(Node::kind))?;
        Ok(Node::assemble(op, children))
    }
    /// Checks a whole tree against the production rules.
    pub fn validate(&self, program: &Node) -> Result<(), GrammarViolation> {
        let kind = program.kind();
        let rule = self
            .rules
            .get(&kind)
            .ok_or(GrammarViolation::UnknownRule(kind))?;
        check_children(rule, program.children().iter().map(Node::kind))?;
        program
            .children()
            .iter()
            .try_for_each(|child| self.validate(child))
    }
    /// Reads back a program written by [`Node::render`].
    ///
    /// [`Node::render`]: ../dsl/struct.Node.html#method.render
    pub fn parse(&self, input: &str) -> Result<Node, ParseError> {
        dsl::parse(self, input)
    }

    fn scalar_names(&self) -> Vec<&str> {
        let mut names = self.scalars.iter().map(String::as_str).collect_vec();
        if self.rules.contains_key(&Kind::ForEach) && !names.contains(&LOOP_VARIABLE) {
            names.push(LOOP_VARIABLE)
        }
        names
    }
    /// Every leaf of the given kind, in a fixed order. Empty for composite or disabled kinds.
    pub fn terminals(&self, kind: Kind) -> Vec<Node> {
        if !self.rules.contains_key(&kind) {
            return vec![];
        }
        match kind {
            Kind::Constant => self.constants.iter().map(|&v| Node::constant(v)).collect(),
            Kind::ScalarRef => self.scalar_names().into_iter().map(Node::scalar).collect(),
            Kind::ArrayRef => self.arrays.iter().map(Node::array).collect(),
            Kind::ArrayElementRef => self
                .arrays
                .iter()
                .cartesian_product(&self.array_indexes)
                .map(|(name, &i)| Node::array_element(name.as_str(), i))
                .collect(),
            _ if kind.is_sensor() => kind
                .bare_op()
                .map(|op| vec![Node::assemble(op, vec![])])
                .unwrap_or_default(),
            _ => vec![],
        }
    }
    /// A uniformly chosen leaf of the given kind.
    pub fn sample_terminal<R: Rng>(&self, kind: Kind, rng: &mut R) -> Option<Node> {
        if !self.rules.contains_key(&kind) {
            return None;
        }
        match kind {
            Kind::Constant => self.constants.choose(rng).map(|&v| Node::constant(v)),
            Kind::ScalarRef => self.scalar_names().choose(rng).map(|&s| Node::scalar(s)),
            Kind::ArrayRef => self.arrays.choose(rng).map(Node::array),
            Kind::ArrayElementRef => {
                let name = self.arrays.choose(rng)?;
                let i = self.array_indexes.choose(rng)?;
                Some(Node::array_element(name.as_str(), *i))
            }
            _ if kind.is_sensor() => kind.bare_op().map(|op| Node::assemble(op, vec![])),
            _ => None,
        }
    }
}

/// Overrides may narrow or widen the kinds of a slot, but never change how many children a
/// kind takes: rendering and interpretation rely on the standard shapes.
fn check_overrides(config: &GrammarConfig) -> Result<(), ConfigError> {
    for (&kind, slots) in &config.valid_children {
        let standard = STANDARD_SLOTS.get(&kind).map_or(&[][..], Vec::as_slice);
        if slots.len() != standard.len() {
            return Err(ConfigError::ArityOverride {
                kind,
                expected: standard.len(),
                found: slots.len(),
            });
        }
        if let Some(slot) = slots
            .iter()
            .zip(standard)
            .position(|(s, std)| s.optional && !std.optional)
        {
            return Err(ConfigError::OptionalOverride { kind, slot });
        }
    }
    Ok(())
}

fn check_children<I>(rule: &Rule, kinds: I) -> Result<(), GrammarViolation>
where
    I: ExactSizeIterator<Item = Kind>,
{
    let (min, max) = rule.arity();
    let found = kinds.len();
    if found < min || found > max {
        return Err(GrammarViolation::Arity {
            kind: rule.kind,
            min,
            max,
            found,
        });
    }
    for (slot, (spec, child)) in rule.slots.iter().zip(kinds).enumerate() {
        if !spec.accepts(child) {
            return Err(GrammarViolation::InvalidChild {
                parent: rule.kind,
                slot,
                child,
            });
        }
    }
    Ok(())
}
