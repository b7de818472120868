use std::sync::atomic::{AtomicUsize, Ordering};
use stratsynth::optimizer::{ConstantOptimizer, OptimizerFailure, PerturbationSearch};
use stratsynth::{EvaluationError, EvaluationRecord, GameError, Grammar, Kind, Node};

fn record(aggregate: f64) -> EvaluationRecord {
    EvaluationRecord {
        raw_scores: vec![aggregate],
        games_played: 1,
        aggregate,
        is_correct: false,
        failure: None,
    }
}

/// Best when the first constant is 3.
fn parabola(program: &Node) -> Result<EvaluationRecord, GameError> {
    let c = program.constants().first().copied().unwrap_or(0.0);
    Ok(record(-(c - 3.0) * (c - 3.0)))
}

#[test]
fn optimizer_improves_constants() {
    let g = Grammar::standard();
    let program = g.parse("(PlayerPosition + 1)").unwrap();
    let optimizer = PerturbationSearch {
        iterations: 200,
        step: 0.01,
        seed: Some(9),
        ..PerturbationSearch::default()
    };
    let tuned = optimizer.optimize(&program, -4.0, &parabola).unwrap();

    assert!(tuned.improved);
    assert!(tuned.score > -4.0);
    assert_eq!(tuned.params, tuned.program.constants());
    let c = tuned.params[0];
    assert!((0.001..=100.001).contains(&c));
    assert!((c - 3.0).abs() < 2.0);

    assert_eq!(tuned.program.kind(), Kind::Plus);
    assert_eq!(tuned.program.cost(), program.cost());
    assert!(g.validate(&tuned.program).is_ok());
    assert_eq!(tuned.program.children()[0], program.children()[0]);
}

#[test]
fn optimizer_keeps_programs_without_constants() {
    let g = Grammar::standard();
    let program = g
        .parse("if (NonPlayerObjectPosition > PlayerPosition) { return actions[1] }")
        .unwrap();
    let optimizer = PerturbationSearch::default();
    let tuned = optimizer.optimize(&program, 7.0, &parabola).unwrap();
    assert!(!tuned.improved);
    assert_eq!(tuned.program, program);
    assert_eq!(tuned.score, 7.0);
    assert!(tuned.params.is_empty());
}

#[test]
fn optimizer_never_reports_a_worse_program() {
    let g = Grammar::standard();
    let program = g.parse("(PlayerPosition + 3)").unwrap();
    let optimizer = PerturbationSearch {
        seed: Some(2),
        ..PerturbationSearch::default()
    };
    // already optimal
    let tuned = optimizer.optimize(&program, 0.0, &parabola).unwrap();
    assert!(!tuned.improved);
    assert_eq!(tuned.program.render(), "(PlayerPosition + 3)");
}

#[test]
fn optimizer_failures() {
    let g = Grammar::standard();
    let program = g.parse("(PlayerPosition // 2)").unwrap();
    let optimizer = PerturbationSearch {
        seed: Some(4),
        ..PerturbationSearch::default()
    };

    let gone = |_: &Node| -> Result<EvaluationRecord, GameError> {
        Err(GameError(String::from("gone")))
    };
    let err = optimizer.optimize(&program, 0.0, &gone).unwrap_err();
    assert_eq!(err, OptimizerFailure::Evaluation(GameError(String::from("gone"))));
    assert!(err.to_string().contains("gone"));

    // every trial fails: nothing improves and the input comes back untouched
    let broken = |_: &Node| -> Result<EvaluationRecord, GameError> {
        let mut r = record(0.0);
        r.failure = Some(EvaluationError::DivisionByZero);
        Ok(r)
    };
    let tuned = optimizer.optimize(&program, 0.0, &broken).unwrap();
    assert!(!tuned.improved);
    assert_eq!(tuned.program, program);
    assert_eq!(tuned.score, 0.0);
}

#[test]
fn optimizer_keeps_improvements_past_failing_trials() {
    let g = Grammar::standard();
    let program = g.parse("(PlayerPosition + 1)").unwrap();
    let optimizer = PerturbationSearch {
        iterations: 10,
        seed: Some(6),
        ..PerturbationSearch::default()
    };
    let calls = AtomicUsize::new(0);
    // only the first trial plays cleanly
    let flaky = |p: &Node| -> Result<EvaluationRecord, GameError> {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return parabola(p);
        }
        let mut r = record(0.0);
        r.failure = Some(EvaluationError::DivisionByZero);
        Ok(r)
    };
    let tuned = optimizer.optimize(&program, -1e9, &flaky).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert!(tuned.improved);
    assert!(tuned.score > -1e9);
    assert_eq!(tuned.score, parabola(&tuned.program).unwrap().aggregate);
    assert_eq!(tuned.params, tuned.program.constants());
    assert_ne!(tuned.program, program);
}
