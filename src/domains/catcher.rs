//! The Catcher domain: move a paddle along the bottom of the screen to catch falling fruit.
//!
//! Every caught fruit scores one point and every missed fruit costs one point and a life. A game
//! ends when the lives run out or after `max_ticks` ticks.
//!
//! # Examples
//!
//! ```
//! use stratsynth::domains::catcher::{self, Catcher, CatcherParams, LEFT, RIGHT};
//! use stratsynth::Game;
//!
//! let mut game = Catcher::new(CatcherParams::default(), 0).unwrap();
//! game.init_game();
//! let program = catcher::grammar()
//!     .unwrap()
//!     .parse(&format!(
//!         "if (NonPlayerObjectPosition > PlayerPosition) {{ return actions[{}] }} \
//!          else {{ return actions[{}] }}",
//!         RIGHT, LEFT
//!     ))
//!     .unwrap();
//! while !game.game_over() {
//!     game.play(&program).unwrap();
//! }
//! assert!(game.score() > 20.0);
//! ```

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dsl::{Env, Kind, State, Value};
use crate::eval::{Game, GameError};
use crate::grammar::{ConfigError, ConstantDomain, Grammar, GrammarConfig};

pub const LEFT: usize = 0;
pub const RIGHT: usize = 1;
pub const STAY: usize = 2;

/// Geometry and pacing of the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatcherParams {
    pub width: f64,
    pub height: f64,
    pub paddle_width: f64,
    /// Distance the paddle moves per tick.
    pub player_speed: f64,
    /// Distance a fruit falls per tick.
    pub fruit_speed: f64,
    pub lives: u32,
    pub max_ticks: usize,
}
impl Default for CatcherParams {
    fn default() -> Self {
        CatcherParams {
            width: 100.0,
            height: 100.0,
            paddle_width: 20.0,
            player_speed: 8.0,
            fruit_speed: 5.0,
            lives: 3,
            max_ticks: 500,
        }
    }
}

pub struct Catcher {
    params: CatcherParams,
    rng: SmallRng,
    player: f64,
    fruit: (f64, f64),
    lives: u32,
    ticks: usize,
    score: f64,
}
impl Catcher {
    pub fn new(params: CatcherParams, seed: u64) -> Result<Self, GameError> {
        if params.width <= 0.0 || params.height <= 0.0 || params.fruit_speed <= 0.0 {
            return Err(GameError(format!(
                "catcher needs positive dimensions and fall speed, got {:?}",
                params
            )));
        }
        let mut game = Catcher {
            player: params.width / 2.0,
            fruit: (0.0, 0.0),
            lives: params.lives,
            ticks: 0,
            score: 0.0,
            rng: SmallRng::seed_from_u64(seed),
            params,
        };
        game.init_game();
        Ok(game)
    }
    pub fn lives(&self) -> u32 {
        self.lives
    }

    fn drop_fruit(&mut self) {
        self.fruit = (self.rng.gen_range(0.0..=self.params.width), 0.0);
    }
}
impl Game for Catcher {
    fn init_game(&mut self) {
        self.player = self.params.width / 2.0;
        self.lives = self.params.lives;
        self.ticks = 0;
        self.score = 0.0;
        self.drop_fruit();
    }
    fn game_over(&self) -> bool {
        self.lives == 0 || self.ticks >= self.params.max_ticks
    }
    fn environment(&self) -> Env {
        Env::new(State {
            player_position: self.player,
            non_player_position: self.fruit.0,
            non_player_approaching: self.fruit.1 >= self.params.height / 2.0,
        })
        .with_scalar("paddle_width", self.params.paddle_width)
        .with_actions(3)
    }
    fn act(&mut self, action: Option<&Value>) {
        let step = match action {
            Some(&Value::Action(LEFT)) => -self.params.player_speed,
            Some(&Value::Action(RIGHT)) => self.params.player_speed,
            _ => 0.0,
        };
        self.player = (self.player + step).clamp(0.0, self.params.width);
        self.fruit.1 += self.params.fruit_speed;
        if self.fruit.1 >= self.params.height {
            if (self.fruit.0 - self.player).abs() <= self.params.paddle_width / 2.0 {
                self.score += 1.0;
            } else {
                self.score -= 1.0;
                self.lives = self.lives.saturating_sub(1);
            }
            self.drop_fruit();
        }
        self.ticks += 1;
    }
    fn score(&self) -> f64 {
        self.score
    }
}

/// Makes games for an [`Evaluator`], each seeded differently, starting from `seed`.
///
/// [`Evaluator`]: ../../eval/struct.Evaluator.html
pub fn factory(
    params: CatcherParams,
    seed: u64,
) -> impl Fn() -> Result<Catcher, GameError> + Sync {
    let next = AtomicU64::new(seed);
    move || Catcher::new(params.clone(), next.fetch_add(1, Ordering::Relaxed))
}

pub fn grammar_config() -> GrammarConfig {
    GrammarConfig {
        operators: vec![
            Kind::LessThan,
            Kind::GreaterThan,
            Kind::Plus,
            Kind::Minus,
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
        arrays: vec![String::from(crate::dsl::ACTIONS)],
        array_indexes: vec![LEFT, RIGHT, STAY],
        constants: ConstantDomain::Values(vec![0.5, 1.0, 2.0]),
        ..GrammarConfig::default()
    }
}

/// The language strategies for Catcher are written in.
pub fn grammar() -> Result<Grammar, ConfigError> {
    Grammar::new(&grammar_config())
}
