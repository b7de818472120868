use rand::{rngs::SmallRng, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stratsynth::domains::catcher::{self, CatcherParams};
use stratsynth::optimizer::{ConstantOptimizer, Objective, OptimizerFailure, PerturbationSearch, Tuned};
use stratsynth::sa::mutator::{MutatorParams, ProgramMutator, SampleError};
use stratsynth::sa::{metropolis, reduce_temperature, AnnealingParams, RestartPolicy, SimulatedAnnealing};
use stratsynth::search::Budget;
use stratsynth::{
    Env, EvaluationParams, Evaluator, Game, GameError, Grammar, Kind, Node, State, Synthesizer,
    Value,
};

#[test]
fn sa_metropolis_accepts_improvements() {
    let rng = &mut SmallRng::seed_from_u64(0);
    for &t in &[1e-6, 1.0, 2000.0] {
        assert!(metropolis(15.0, 10.0, t, 100.0, rng));
        assert!(metropolis(10.0, 10.0, t, 100.0, rng));
    }
    assert!((0..100).all(|_| !metropolis(9.0, 10.0, 1e-6, 100.0, rng)));
    // at a high temperature a slightly worse program is almost always taken
    let taken = (0..100)
        .filter(|_| metropolis(9.99, 10.0, 1e6, 100.0, rng))
        .count();
    assert!(taken > 90);
}

#[test]
fn sa_cooling_schedule() {
    assert!((reduce_temperature(2000.0, 0.9, 1) - 1052.631_578_947).abs() < 1e-6);
    let mut t = 2000.0;
    let mut epoch = 0;
    while t > 1.0 {
        epoch += 1;
        let next = reduce_temperature(t, 0.9, epoch);
        assert!(next < t);
        t = next;
    }
    assert!(epoch < 10);
}

#[test]
fn sa_mutations_stay_in_grammar() {
    for g in &[Grammar::standard(), catcher::grammar().unwrap()] {
        let mutator = ProgramMutator::new(g, MutatorParams::default());
        let rng = &mut SmallRng::seed_from_u64(17);
        let mut closed = HashSet::new();
        let mut program = mutator.generate_random(&closed, rng).unwrap();
        for _ in 0..1000 {
            closed.insert(program.render());
            let mutant = mutator.mutate(&program, &closed, rng).unwrap();
            assert!(g.validate(&mutant).is_ok(), "{}", mutant);
            assert!(mutant.has_consistent_cost());
            assert!(g.is_program(mutant.kind()));
            assert!(!closed.contains(&mutant.render()));
            program = mutant;
        }
    }
}

#[test]
fn sa_samples_any_kind() {
    let g = Grammar::standard();
    let mutator = ProgramMutator::new(&g, MutatorParams::default());
    let rng = &mut SmallRng::seed_from_u64(3);
    for &kind in &[Kind::IfThenElse, Kind::Plus, Kind::LessThan, Kind::ReturnAction] {
        let tree = mutator.sample(kind, rng).unwrap();
        assert_eq!(tree.kind(), kind);
        assert!(g.validate(&tree).is_ok());
    }
}

#[test]
fn sa_mutation_exhausts_tiny_grammars() {
    let g = Grammar::from_json(
        r#"{ "operators": [], "constants": [0], "program_kinds": ["Constant"] }"#,
    )
    .unwrap();
    let mutator = ProgramMutator::new(&g, MutatorParams::default());
    let rng = &mut SmallRng::seed_from_u64(1);
    let program = mutator.generate_random(&HashSet::new(), rng).unwrap();
    assert_eq!(program.render(), "0");

    let closed: HashSet<String> = vec![String::from("0")].into_iter().collect();
    assert_eq!(
        mutator.generate_random(&closed, rng),
        Err(SampleError::OptionsExhausted)
    );
    assert_eq!(
        mutator.mutate(&program, &HashSet::new(), rng),
        Err(SampleError::OptionsExhausted)
    );
}

#[test]
fn sa_runs_on_catcher() {
    let g = catcher::grammar().unwrap();
    let params = EvaluationParams {
        total_games: 2,
        ..EvaluationParams::default()
    };
    let mut evaluator = Evaluator::new(catcher::factory(CatcherParams::default(), 8), params);
    let mut sa = SimulatedAnnealing::new(
        &g,
        AnnealingParams {
            restart: RestartPolicy::FromBest,
            budget: Budget::evaluations(60),
            seed: Some(12),
            ..AnnealingParams::default()
        },
    );
    let result = sa.synthesize(&mut evaluator).unwrap();

    // one play may be followed by one long replay before the budget is checked again
    assert!(result.evaluations <= 61);
    assert!(result.evaluations >= 60);
    let best = result.best.unwrap();
    assert!(g.validate(&best.program).is_ok());
    assert_eq!(best.score, evaluator.incumbent().score);
}

#[test]
fn sa_stops_when_cooling_has_no_room() {
    let g = catcher::grammar().unwrap();
    let params = EvaluationParams {
        total_games: 2,
        ..EvaluationParams::default()
    };
    let mut evaluator = Evaluator::new(catcher::factory(CatcherParams::default(), 4), params);
    let mut sa = SimulatedAnnealing::new(
        &g,
        AnnealingParams {
            initial_temperature: 1.0,
            final_temperature: 1.0,
            restart: RestartPolicy::FromBest,
            budget: Budget::evaluations(5),
            seed: Some(2),
            ..AnnealingParams::default()
        },
    );
    let result = sa.synthesize(&mut evaluator).unwrap();

    // only fresh starting points are ever played
    assert!(result.evaluations >= 1);
    assert!(result.evaluations <= 5);
    assert_eq!(sa.closed().len(), result.evaluations);
}

/// Scores nothing on the first game an instance plays and ten on every later one, so a
/// single-instance evaluation looks better than a replay over fresh instances.
struct Warmup {
    round: usize,
    done: bool,
}
impl Game for Warmup {
    fn init_game(&mut self) {
        self.round += 1;
        self.done = false;
    }
    fn game_over(&self) -> bool {
        self.done
    }
    fn environment(&self) -> Env {
        Env::new(State::default()).with_actions(3)
    }
    fn act(&mut self, _: Option<&Value>) {
        self.done = true;
    }
    fn score(&self) -> f64 {
        if self.round >= 2 {
            10.0
        } else {
            0.0
        }
    }
}

#[test]
fn sa_replays_strong_programs() {
    let g = Grammar::from_json(
        r#"{
            "operators": ["IT", "GT", "ReturnAction", "Strategy"],
            "sensors": ["PlayerPosition", "NonPlayerObjectPosition"],
            "arrays": ["actions"],
            "array_indexes": [0, 1, 2]
        }"#,
    )
    .unwrap();
    let params = EvaluationParams {
        total_games: 2,
        score_threshold: 3.0,
        strong_score: 1.0,
        run_longer_games: 7,
        ..EvaluationParams::default()
    };
    let warmup = || -> Result<Warmup, GameError> {
        Ok(Warmup {
            round: 0,
            done: false,
        })
    };
    let mut evaluator = Evaluator::new(warmup, params);
    let mut sa = SimulatedAnnealing::new(
        &g,
        AnnealingParams {
            budget: Budget::evaluations(12),
            seed: Some(8),
            ..AnnealingParams::default()
        },
    );
    let result = sa.synthesize(&mut evaluator).unwrap();

    // every program scores 5 over two games and 0 once replayed
    let best = result.best.unwrap();
    assert_eq!(best.score, 0.0);
    assert_eq!(best.raw_scores, vec![0.0; 7]);
    assert_eq!(evaluator.incumbent().score, 0.0);
    assert!(result.evaluations >= 4);
    // the short scores never count towards the threshold
    assert!(!result.solved);
    assert_eq!(evaluator.threshold(), 3.0);
}

/// Tunes with a perturbation search and remembers what it was asked to tune.
struct Recording {
    inner: PerturbationSearch,
    calls: Arc<AtomicUsize>,
    improved: Arc<Mutex<Vec<String>>>,
}
impl ConstantOptimizer for Recording {
    fn optimize(
        &self,
        program: &Node,
        baseline: f64,
        objective: &Objective<'_>,
    ) -> Result<Tuned, OptimizerFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tuned = self.inner.optimize(program, baseline, objective)?;
        assert!(!program.constants().is_empty());
        if tuned.improved {
            self.improved.lock().unwrap().push(tuned.program.render());
        }
        Ok(tuned)
    }
}

#[test]
fn sa_tunes_pooled_constants() {
    let g = catcher::grammar().unwrap();
    let params = EvaluationParams {
        total_games: 2,
        ..EvaluationParams::default()
    };
    let mut evaluator = Evaluator::new(catcher::factory(CatcherParams::default(), 13), params);
    let calls = Arc::new(AtomicUsize::new(0));
    let improved = Arc::new(Mutex::new(Vec::new()));
    let mut sa = SimulatedAnnealing::new(
        &g,
        AnnealingParams {
            optimizer_pool_size: 1,
            budget: Budget::evaluations(120),
            seed: Some(21),
            ..AnnealingParams::default()
        },
    )
    .with_optimizer(Recording {
        inner: PerturbationSearch {
            iterations: 3,
            seed: Some(1),
            ..PerturbationSearch::default()
        },
        calls: calls.clone(),
        improved: improved.clone(),
    });
    let result = sa.synthesize(&mut evaluator).unwrap();

    // a pool of one is tuned as soon as a program with constants is played
    let pooled = sa
        .closed()
        .iter()
        .filter(|r| g.parse(r).map_or(false, |p| !p.constants().is_empty()))
        .count();
    assert!(calls.load(Ordering::SeqCst) > 0);
    assert!(calls.load(Ordering::SeqCst) <= pooled);
    // each pool has one program, so every improvement is the pool's best
    for render in improved.lock().unwrap().iter() {
        assert!(sa.closed().contains(render), "{}", render);
    }
    assert!(result.best.is_some());
}
