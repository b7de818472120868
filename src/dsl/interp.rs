//! Interpretation of programs against a snapshot of a running game.

use std::collections::HashMap;
use std::fmt;

use super::{Kind, Node, Op, LOOP_VARIABLE};

/// The array holding the action tokens a program may return.
pub const ACTIONS: &str = "actions";

/// Anything a node can evaluate to.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    /// Position of an action in the game's action set.
    Action(usize),
    List(Vec<Value>),
}
impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Action(_) => "action",
            Value::List(_) => "list",
        }
    }
}
impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Number(x)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

/// The positional facts every game reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub player_position: f64,
    pub non_player_position: f64,
    pub non_player_approaching: bool,
}

/// Everything a program can observe on one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    pub state: State,
    pub scalars: HashMap<String, Value>,
    pub arrays: HashMap<String, Vec<Value>>,
}
impl Env {
    pub fn new(state: State) -> Self {
        Env {
            state,
            scalars: HashMap::new(),
            arrays: HashMap::new(),
        }
    }
    pub fn with_scalar<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.scalars.insert(name.into(), value.into());
        self
    }
    pub fn with_array<S: Into<String>>(mut self, name: S, values: Vec<Value>) -> Self {
        self.arrays.insert(name.into(), values);
        self
    }
    /// Installs the [`ACTIONS`] array for an action set of size `n`.
    ///
    /// [`ACTIONS`]: constant.ACTIONS.html
    pub fn with_actions(self, n: usize) -> Self {
        self.with_array(ACTIONS, (0..n).map(Value::Action).collect())
    }
}

/// A runtime failure of a syntactically valid program.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    DivisionByZero,
    IndexOutOfRange {
        array: String,
        index: usize,
        len: usize,
    },
    UnknownVariable(String),
    TypeMismatch {
        kind: Kind,
        expected: &'static str,
        found: &'static str,
    },
    /// An operand evaluated to nothing.
    NoValue(Kind),
}
impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EvaluationError::DivisionByZero => write!(f, "division by zero"),
            EvaluationError::IndexOutOfRange {
                ref array,
                index,
                len,
            } => write!(f, "index {} out of range for {} (length {})", index, array, len),
            EvaluationError::UnknownVariable(ref name) => write!(f, "unknown variable {}", name),
            EvaluationError::TypeMismatch {
                kind,
                expected,
                found,
            } => write!(f, "{} expected a {} but found a {}", kind, expected, found),
            EvaluationError::NoValue(kind) => write!(f, "{} produced no value", kind),
        }
    }
}
impl std::error::Error for EvaluationError {}

impl Node {
    /// Evaluates the program. `Ok(None)` means no value was produced, as when an `IfThen`
    /// condition fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratsynth::{Env, Grammar, State, Value};
    ///
    /// let g = Grammar::standard();
    /// let program = g
    ///     .parse("if (NonPlayerObjectPosition > PlayerPosition) { return actions[1] }; return actions[2]")
    ///     .unwrap();
    /// let env = |player, object| {
    ///     Env::new(State {
    ///         player_position: player,
    ///         non_player_position: object,
    ///         non_player_approaching: true,
    ///     })
    ///     .with_actions(3)
    /// };
    /// assert_eq!(program.interpret(&env(10.0, 50.0)), Ok(Some(Value::Action(1))));
    /// assert_eq!(program.interpret(&env(50.0, 10.0)), Ok(Some(Value::Action(2))));
    /// ```
    pub fn interpret(&self, env: &Env) -> Result<Option<Value>, EvaluationError> {
        self.eval(env, None)
    }

    fn eval(&self, env: &Env, bound: Option<&Value>) -> Result<Option<Value>, EvaluationError> {
        let c = &self.children;
        let value = match self.op {
            Op::Constant(v) => Value::Number(v),
            Op::ScalarRef(ref name) => match bound {
                Some(v) if name == LOOP_VARIABLE => v.clone(),
                _ => env
                    .scalars
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvaluationError::UnknownVariable(name.clone()))?,
            },
            Op::ArrayRef(ref name) => Value::List(lookup_array(env, name)?.to_vec()),
            Op::ArrayElementRef(ref name, index) => {
                let xs = lookup_array(env, name)?;
                xs.get(index)
                    .cloned()
                    .ok_or_else(|| EvaluationError::IndexOutOfRange {
                        array: name.clone(),
                        index,
                        len: xs.len(),
                    })?
            }
            Op::PlayerPosition => Value::Number(env.state.player_position),
            Op::NonPlayerObjectPosition => Value::Number(env.state.non_player_position),
            Op::NonPlayerObjectApproaching => Value::Bool(env.state.non_player_approaching),
            Op::LessThan => {
                let (l, r) = self.operands(env, bound)?;
                Value::Bool(l < r)
            }
            Op::GreaterThan => {
                let (l, r) = self.operands(env, bound)?;
                Value::Bool(l > r)
            }
            Op::EqualTo => Value::Bool(c[0].value(env, bound)? == c[1].value(env, bound)?),
            Op::Plus => {
                let (l, r) = self.operands(env, bound)?;
                Value::Number(l + r)
            }
            Op::Minus => {
                let (l, r) = self.operands(env, bound)?;
                Value::Number(l - r)
            }
            Op::Times => {
                let (l, r) = self.operands(env, bound)?;
                Value::Number(l * r)
            }
            Op::Divide => {
                let (l, r) = self.operands(env, bound)?;
                if r == 0.0 {
                    return Err(EvaluationError::DivisionByZero);
                }
                Value::Number((l / r).floor())
            }
            Op::IfThen => {
                return if c[0].truth(env, bound)? {
                    c[1].eval(env, bound)
                } else {
                    Ok(None)
                }
            }
            Op::IfThenElse => {
                return if c[0].truth(env, bound)? {
                    c[1].eval(env, bound)
                } else {
                    c[2].eval(env, bound)
                }
            }
            Op::ForEach => {
                let items = match c[0].value(env, bound)? {
                    Value::List(xs) => xs,
                    other => {
                        return Err(EvaluationError::TypeMismatch {
                            kind: Kind::ForEach,
                            expected: "list",
                            found: other.type_name(),
                        })
                    }
                };
                for item in &items {
                    if let Some(v) = c[1].eval(env, Some(item))? {
                        return Ok(Some(v));
                    }
                }
                return Ok(None);
            }
            Op::ReturnAction => return c[0].eval(env, bound),
            Op::Strategy => {
                return match c[0].eval(env, bound)? {
                    Some(v) => Ok(Some(v)),
                    None => match c.get(1) {
                        Some(next) => next.eval(env, bound),
                        None => Ok(None),
                    },
                }
            }
        };
        Ok(Some(value))
    }

    fn value(&self, env: &Env, bound: Option<&Value>) -> Result<Value, EvaluationError> {
        self.eval(env, bound)?
            .ok_or(EvaluationError::NoValue(self.kind()))
    }
    fn number(&self, env: &Env, bound: Option<&Value>) -> Result<f64, EvaluationError> {
        match self.value(env, bound)? {
            Value::Number(x) => Ok(x),
            other => Err(EvaluationError::TypeMismatch {
                kind: self.kind(),
                expected: "number",
                found: other.type_name(),
            }),
        }
    }
    fn truth(&self, env: &Env, bound: Option<&Value>) -> Result<bool, EvaluationError> {
        match self.value(env, bound)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvaluationError::TypeMismatch {
                kind: self.kind(),
                expected: "bool",
                found: other.type_name(),
            }),
        }
    }
    fn operands(&self, env: &Env, bound: Option<&Value>) -> Result<(f64, f64), EvaluationError> {
        Ok((
            self.children[0].number(env, bound)?,
            self.children[1].number(env, bound)?,
        ))
    }
}

fn lookup_array<'a>(env: &'a Env, name: &str) -> Result<&'a [Value], EvaluationError> {
    env.arrays
        .get(name)
        .map(Vec::as_slice)
        .ok_or_else(|| EvaluationError::UnknownVariable(name.to_owned()))
}
