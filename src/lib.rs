//! A library for synthesizing game-playing strategies as programs.
//!
//! Strategies are small trees of a tiny imperative language ([`dsl`]) constrained by a
//! [`Grammar`]. They are scored by playing a [`Game`] through an [`Evaluator`], and found by one
//! of three [`Synthesizer`]s:
//!
//! - [`bus`], exhaustive bottom-up enumeration in order of cost;
//! - [`probe`], the same enumeration with costs learned from partial solutions;
//! - [`sa`], simulated annealing over random edits of a program.
//!
//! Good places to look are [`Grammar`], [`Evaluator`] and [`domains::catcher`], a complete small
//! game.
//!
//! # Examples
//!
//! ```
//! use stratsynth::bus::{BottomUpSearch, BusParams};
//! use stratsynth::domains::catcher::{self, CatcherParams};
//! use stratsynth::{EvaluationParams, Evaluator, Grammar, Synthesizer};
//!
//! let g = Grammar::from_json(
//!     r#"{
//!         "operators": ["GreaterThan", "ITE", "ReturnAction", "Strategy"],
//!         "sensors": ["PlayerPosition", "NonPlayerObjectPosition"],
//!         "arrays": ["actions"],
//!         "array_indexes": [0, 1, 2]
//!     }"#,
//! )
//! .unwrap();
//! let params = EvaluationParams {
//!     total_games: 2,
//!     score_threshold: 20.0,
//!     ..EvaluationParams::default()
//! };
//! let mut evaluator = Evaluator::new(catcher::factory(CatcherParams::default(), 1), params);
//! let mut bus = BottomUpSearch::new(&g, BusParams { cost_bound: 6, ..BusParams::default() });
//!
//! let result = bus.synthesize(&mut evaluator).unwrap();
//! assert!(result.solved);
//! println!("{}", result.best.unwrap().program.pretty());
//! ```
//!
//! [`dsl`]: dsl/index.html
//! [`Grammar`]: grammar/struct.Grammar.html
//! [`Game`]: eval/trait.Game.html
//! [`Evaluator`]: eval/struct.Evaluator.html
//! [`Synthesizer`]: search/trait.Synthesizer.html
//! [`bus`]: bus/index.html
//! [`probe`]: probe/index.html
//! [`sa`]: sa/index.html
//! [`domains::catcher`]: domains/catcher/index.html

pub mod bus;
pub mod domains;
pub mod dsl;
mod enumerator;
pub mod eval;
pub mod grammar;
pub mod optimizer;
pub mod plist;
pub mod probe;
pub mod sa;
pub mod search;
mod utils;

pub use dsl::{
    Env, EvaluationError, GrammarViolation, Kind, Node, Op, ParseError, State, Value,
};
pub use eval::{
    Aggregation, EvaluationParams, EvaluationRecord, Evaluator, Game, GameError, GameFactory,
    Triage, MIN_SCORE,
};
pub use grammar::{ConfigError, ConstantDomain, Grammar, GrammarConfig, Rule, Slot};
pub use plist::ProgramIndex;
pub use search::{Budget, Candidate, SynthesisResult, Synthesizer};
