//! Scoring programs by letting them play.
//!
//! A [`Game`] is stepped one tick at a time by a program until it reports that it is over. An
//! [`Evaluator`] repeats that over several games and folds the final scores according to its
//! [`EvaluationParams`], optionally abandoning a candidate early once it is statistically
//! dominated by the incumbent.
//!
//! # Examples
//!
//! ```
//! use stratsynth::domains::catcher::{self, CatcherParams};
//! use stratsynth::{EvaluationParams, Evaluator, Grammar};
//!
//! let g = Grammar::standard();
//! let chase = g
//!     .parse(
//!         "if (NonPlayerObjectPosition > PlayerPosition) { return actions[1] } \
//!          else { return actions[0] }",
//!     )
//!     .unwrap();
//! let stay = g.parse("return actions[2]").unwrap();
//!
//! let params = EvaluationParams {
//!     total_games: 3,
//!     ..EvaluationParams::default()
//! };
//! let evaluator = Evaluator::new(catcher::factory(CatcherParams::default(), 7), params);
//! let good = evaluator.evaluate(&chase).unwrap();
//! let bad = evaluator.evaluate(&stay).unwrap();
//! assert_eq!(good.games_played, 3);
//! assert!(good.aggregate > bad.aggregate);
//! ```
//!
//! [`Game`]: trait.Game.html
//! [`Evaluator`]: struct.Evaluator.html
//! [`EvaluationParams`]: struct.EvaluationParams.html

mod policy;
pub use self::policy::{
    chebyshev_epsilon, hoeffding_epsilon, Aggregation, EvaluationParams, Incumbent, Triage,
};

use crossbeam_channel::unbounded;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use self::policy::Tally;
use crate::dsl::{Env, EvaluationError, Node, Value};
use crate::utils::variance;

/// Reported for any program that fails while playing.
pub const MIN_SCORE: f64 = -1_000_000.0;

/// A game a program can play.
///
/// Implementors must guarantee that [`game_over`] eventually holds whatever actions are taken.
///
/// [`game_over`]: #tymethod.game_over
pub trait Game {
    /// Resets to the start of a fresh game.
    fn init_game(&mut self);
    fn game_over(&self) -> bool;
    /// A snapshot of everything a program may observe, including the `actions` array.
    fn environment(&self) -> Env;
    /// Advances one tick. `None` means the program produced no action.
    fn act(&mut self, action: Option<&Value>);
    fn score(&self) -> f64;

    /// Runs the program for one tick and returns the current score.
    fn play(&mut self, program: &Node) -> Result<f64, EvaluationError> {
        let env = self.environment();
        let action = program.interpret(&env)?;
        self.act(action.as_ref());
        Ok(self.score())
    }
}

/// Failure to acquire a game instance. This is the only error that ends a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameError(pub String);
impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not start game: {}", self.0)
    }
}
impl std::error::Error for GameError {}

/// Makes independent game instances, one per worker.
pub trait GameFactory: Sync {
    type Game: Game;
    fn new_game(&self) -> Result<Self::Game, GameError>;
}
impl<G, F> GameFactory for F
where
    G: Game,
    F: Fn() -> Result<G, GameError> + Sync,
{
    type Game = G;
    fn new_game(&self) -> Result<G, GameError> {
        self()
    }
}

/// The outcome of one evaluation call.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    /// Final score of each completed game.
    pub raw_scores: Vec<f64>,
    pub games_played: usize,
    pub aggregate: f64,
    /// Whether the aggregate reached the evaluator's threshold when it was computed.
    pub is_correct: bool,
    /// Set when the program failed during play; the aggregate is then `MIN_SCORE`.
    pub failure: Option<EvaluationError>,
}
impl EvaluationRecord {
    fn failed(games_played: usize, err: EvaluationError) -> Self {
        EvaluationRecord {
            raw_scores: vec![],
            games_played,
            aggregate: MIN_SCORE,
            is_correct: false,
            failure: Some(err),
        }
    }
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Plays programs and keeps the state the triage protocol needs: the ratcheting correctness
/// threshold and the incumbent's score and variance.
pub struct Evaluator<F> {
    factory: F,
    params: EvaluationParams,
    threshold: f64,
    incumbent: Incumbent,
    evaluations: AtomicUsize,
    plays: AtomicUsize,
}
impl<F: GameFactory> Evaluator<F> {
    pub fn new(factory: F, params: EvaluationParams) -> Self {
        Evaluator {
            threshold: params.score_threshold,
            factory,
            params,
            incumbent: Incumbent::default(),
            evaluations: AtomicUsize::new(0),
            plays: AtomicUsize::new(0),
        }
    }
    pub fn params(&self) -> &EvaluationParams {
        &self.params
    }
    /// The current correctness threshold. It only ever rises.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
    pub fn incumbent(&self) -> Incumbent {
        self.incumbent
    }
    /// Number of evaluation calls made so far, including parallel re-evaluations.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }
    /// Number of ticks played so far.
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::Relaxed)
    }

    fn play_game(&self, game: &mut F::Game, program: &Node) -> Result<f64, EvaluationError> {
        game.init_game();
        let mut score = game.score();
        while !game.game_over() {
            self.plays.fetch_add(1, Ordering::Relaxed);
            score = game.play(program)?;
        }
        Ok(score)
    }

    /// Plays games until the budget is spent or triage gives up on the program.
    ///
    /// A program that fails while playing is reported with `MIN_SCORE` and no raw scores.
    pub fn evaluate(&self, program: &Node) -> Result<EvaluationRecord, GameError> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let mut game = self.factory.new_game()?;
        let mut tally = Tally::new(&self.params);
        loop {
            match self.play_game(&mut game, program) {
                Ok(score) => tally.push(score),
                Err(err) => {
                    debug!(program = %program, error = %err, "program failed during play");
                    return Ok(EvaluationRecord::failed(tally.games(), err));
                }
            }
            if !tally.should_continue(&self.incumbent) {
                break;
            }
        }
        if tally.games() < self.params.total_games {
            debug!(
                program = %program,
                games = tally.games(),
                "stopped early: dominated by the incumbent"
            );
        }
        Ok(self.record(tally))
    }

    fn record(&self, tally: Tally) -> EvaluationRecord {
        let aggregate = tally.aggregate();
        EvaluationRecord {
            games_played: tally.games(),
            is_correct: aggregate > MIN_SCORE && aggregate >= self.threshold,
            aggregate,
            raw_scores: tally.into_scores(),
            failure: None,
        }
    }

    /// Checks a record against the threshold, raising the threshold to its aggregate when it
    /// is reached.
    pub fn judge(&mut self, record: &EvaluationRecord) -> bool {
        if record.is_failure() || record.aggregate < self.threshold {
            return false;
        }
        self.threshold = record.aggregate;
        true
    }

    /// Evaluates and judges in one step.
    pub fn is_correct(&mut self, program: &Node) -> Result<(bool, f64), GameError> {
        let record = self.evaluate(program)?;
        Ok((self.judge(&record), record.aggregate))
    }

    /// Makes this the incumbent that later candidates are triaged against.
    pub fn set_best(&mut self, aggregate: f64, raw_scores: &[f64]) {
        self.incumbent = Incumbent {
            score: aggregate,
            variance: variance(raw_scores),
        };
    }

    /// Evaluates independent programs in parallel and returns them in completion order.
    pub fn evaluate_batch(
        &self,
        programs: Vec<Node>,
    ) -> Result<Vec<(Node, EvaluationRecord)>, GameError> {
        let (tx, rx) = unbounded();
        programs.into_par_iter().for_each_with(tx, |tx, program| {
            let record = self.evaluate(&program);
            tx.send((program, record)).ok();
        });
        rx.into_iter()
            .map(|(program, record)| record.map(|r| (program, r)))
            .collect()
    }

    /// Plays `total_games` single games in parallel, each on its own game instance, and
    /// reports their plain mean. Triage, batching and win rates do not apply.
    pub fn evaluate_parallel(
        &self,
        program: &Node,
        total_games: usize,
    ) -> Result<EvaluationRecord, GameError> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let outcomes = (0..total_games.max(1))
            .into_par_iter()
            .map(|_| -> Result<_, GameError> {
                let mut game = self.factory.new_game()?;
                Ok(self.play_game(&mut game, program))
            })
            .collect::<Result<Vec<_>, GameError>>()?;
        let replay = EvaluationParams {
            aggregation: Aggregation::Normal,
            triage: None,
            by_win_rate: false,
            total_games,
            ..self.params.clone()
        };
        let mut tally = Tally::new(&replay);
        for outcome in outcomes {
            match outcome {
                Ok(score) => tally.push(score),
                Err(err) => return Ok(EvaluationRecord::failed(tally.games(), err)),
            }
        }
        Ok(self.record(tally))
    }
}
