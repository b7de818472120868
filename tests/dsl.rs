use proptest::prelude::*;
use rand::{rngs::SmallRng, SeedableRng};
use std::collections::HashSet;
use stratsynth::sa::mutator::{MutatorParams, ProgramMutator};
use stratsynth::{Env, EvaluationError, Grammar, GrammarViolation, Kind, Node, Op, State, Value};

fn env(player: f64, object: f64) -> Env {
    Env::new(State {
        player_position: player,
        non_player_position: object,
        non_player_approaching: true,
    })
    .with_actions(3)
}

#[test]
fn dsl_cost_of_guarded_return() {
    let g = Grammar::standard();
    let cond = g
        .build(
            Op::GreaterThan,
            vec![Node::constant(10.0), Node::constant(0.0)],
        )
        .unwrap();
    assert_eq!(cond.cost(), 3);
    let act = g
        .build(Op::ReturnAction, vec![Node::array_element("actions", 0)])
        .unwrap();
    assert_eq!(act.cost(), 1);
    let program = g.build(Op::IfThen, vec![cond, act]).unwrap();

    // IfThen, GreaterThan, ReturnAction and both constants count one each
    assert_eq!(program.cost(), 5);
    assert!(program.has_consistent_cost());
    assert_eq!(program.node_count(), 6);
    assert_eq!(program.depth(), 3);
}

#[test]
fn dsl_render() {
    let g = Grammar::standard();
    let cases = [
        "return actions[2]",
        "if (PlayerPosition < 0.5) { return actions[0] }",
        "if NonPlayerObjectApproaching { return actions[1] } else { return actions[2] }",
        "if ((NonPlayerObjectPosition - paddle_width) > (PlayerPosition // 2)) { return actions[1] }; return actions[2]",
        "if (PlayerPosition == 1) { if (1 < PlayerPosition) { return actions[0] } };",
        "if (PlayerPosition == 1) { return actions[0] }; if (2 > PlayerPosition) { return actions[1] };",
    ];
    for case in &cases {
        let program = g.parse(case).unwrap();
        assert_eq!(&program.render(), case);
        assert!(program.has_consistent_cost());
    }
}

#[test]
fn dsl_sequences_are_distinct_from_statements() {
    let g = Grammar::standard();
    let statement = g
        .parse("if (PlayerPosition < 1) { return actions[0] }")
        .unwrap();
    let sequence = g
        .parse("if (PlayerPosition < 1) { return actions[0] };")
        .unwrap();
    assert_eq!(statement.kind(), Kind::IfThen);
    assert_eq!(sequence.kind(), Kind::Strategy);
    assert_eq!(sequence.children().len(), 1);
    assert_eq!(sequence.cost(), statement.cost());
    assert_ne!(statement.render(), sequence.render());
}

#[test]
fn dsl_parse_rejects_ill_formed() {
    let g = Grammar::standard();
    assert!(g.parse("if (PlayerPosition < 1) {").is_err());
    assert!(g.parse("return actions[").is_err());
    // ReturnAction only takes array elements
    assert!(matches!(
        g.parse("return 1"),
        Err(stratsynth::ParseError::Grammar(
            GrammarViolation::InvalidChild { .. }
        ))
    ));
    // ForEach is not part of the standard grammar
    assert!(g
        .parse("for loop in actions { if (loop > 1) { return actions[0] } }")
        .is_err());
}

#[test]
fn dsl_pretty() {
    let g = Grammar::standard();
    let program = g
        .parse("if (PlayerPosition < 1) { return actions[0] } else { return actions[1] }; return actions[2]")
        .unwrap();
    assert_eq!(
        program.pretty(),
        "if (PlayerPosition < 1):\n    return actions[0]\nelse:\n    return actions[1]\nreturn actions[2]\n"
    );
}

#[test]
fn dsl_interpret_branches() {
    let g = Grammar::standard();
    let program = g
        .parse("if (NonPlayerObjectPosition > PlayerPosition) { return actions[1] } else { return actions[0] }")
        .unwrap();
    assert_eq!(program.interpret(&env(0.0, 10.0)), Ok(Some(Value::Action(1))));
    assert_eq!(program.interpret(&env(10.0, 0.0)), Ok(Some(Value::Action(0))));

    let guarded = g
        .parse("if (NonPlayerObjectPosition > PlayerPosition) { return actions[1] }")
        .unwrap();
    assert_eq!(guarded.interpret(&env(10.0, 0.0)), Ok(None));

    let sequence = g
        .parse("if (NonPlayerObjectPosition > PlayerPosition) { return actions[1] }; return actions[2]")
        .unwrap();
    assert_eq!(sequence.interpret(&env(10.0, 0.0)), Ok(Some(Value::Action(2))));
}

#[test]
fn dsl_interpret_arithmetic() {
    let g = Grammar::standard();
    let e = env(7.0, 2.0).with_scalar("paddle_width", 4.0);
    let value = |src: &str| g.parse(src).unwrap().interpret(&e);

    assert_eq!(value("(PlayerPosition // 2)"), Ok(Some(Value::Number(3.0))));
    assert_eq!(value("(PlayerPosition - paddle_width)"), Ok(Some(Value::Number(3.0))));
    assert_eq!(value("(0.5 * paddle_width)"), Ok(Some(Value::Number(2.0))));
    assert_eq!(value("(NonPlayerObjectPosition == 2)"), Ok(Some(Value::Bool(true))));
    assert_eq!(
        value("(PlayerPosition // (NonPlayerObjectPosition - 2))"),
        Err(EvaluationError::DivisionByZero)
    );
}

#[test]
fn dsl_interpret_errors() {
    let g = Grammar::standard();
    let program = g
        .parse("if (paddle_width > 1) { return actions[2] }")
        .unwrap();
    assert_eq!(
        program.interpret(&env(0.0, 0.0)),
        Err(EvaluationError::UnknownVariable(String::from("paddle_width")))
    );

    let program = g.parse("return actions[2]").unwrap();
    let short = Env::new(State::default()).with_actions(2);
    assert!(matches!(
        program.interpret(&short),
        Err(EvaluationError::IndexOutOfRange { index: 2, len: 2, .. })
    ));
}

#[test]
fn dsl_interpret_loop() {
    let g = Grammar::from_json(
        r#"{
            "operators": ["ForEach", "IT", "GT", "ReturnAction", "Strategy"],
            "sensors": ["PlayerPosition"],
            "arrays": ["actions", "thresholds"],
            "array_indexes": [0, 1, 2]
        }"#,
    )
    .unwrap();
    let program = g
        .parse("for loop in thresholds { if (loop > PlayerPosition) { return actions[1] } };")
        .unwrap();
    assert_eq!(program.kind(), Kind::Strategy);
    let thresholds = vec![Value::Number(5.0), Value::Number(50.0)];
    let at = |player: f64| {
        env(player, 0.0).with_array("thresholds", thresholds.clone())
    };
    assert_eq!(program.interpret(&at(10.0)), Ok(Some(Value::Action(1))));
    assert_eq!(program.interpret(&at(60.0)), Ok(None));

    // the loop variable does not exist outside of the loop
    let stray = g
        .parse("if (loop > PlayerPosition) { return actions[1] }")
        .unwrap();
    assert_eq!(
        stray.interpret(&at(10.0)),
        Err(EvaluationError::UnknownVariable(String::from("loop")))
    );
}

#[test]
fn dsl_builder_violations() {
    let g = Grammar::standard();
    let act = g
        .build(Op::ReturnAction, vec![Node::array_element("actions", 0)])
        .unwrap();
    assert_eq!(
        g.build(Op::IfThen, vec![Node::constant(1.0), act.clone()]),
        Err(GrammarViolation::InvalidChild {
            parent: Kind::IfThen,
            slot: 0,
            child: Kind::Constant,
        })
    );
    assert!(matches!(
        g.build(Op::Plus, vec![Node::constant(1.0)]),
        Err(GrammarViolation::Arity { kind: Kind::Plus, found: 1, .. })
    ));
    assert_eq!(
        g.build(Op::ForEach, vec![Node::array("actions"), act]),
        Err(GrammarViolation::UnknownRule(Kind::ForEach))
    );
    assert!(Node::leaf(Op::Plus).is_err());
    assert_eq!(Node::leaf(Op::PlayerPosition).unwrap().cost(), 1);
}

#[test]
fn dsl_replace_keeps_costs() {
    let g = Grammar::standard();
    let mut program = g
        .parse("if (PlayerPosition < 1) { return actions[0] }; return actions[2]")
        .unwrap();
    assert_eq!(program.cost(), 6);

    // pre-order: Strategy, IfThen, LessThan, PlayerPosition, 1, ...
    let path = program.path_to(4).unwrap();
    assert_eq!(path, vec![0, 0, 1]);
    assert_eq!(program.get(&path), Some(&Node::constant(1.0)));

    let bigger = g
        .parse("(NonPlayerObjectPosition - paddle_width)")
        .unwrap();
    let old = program.replace_at(&g, &path, bigger).unwrap();
    assert_eq!(old, Node::constant(1.0));
    assert_eq!(program.cost(), 7);
    assert!(program.has_consistent_cost());
    assert_eq!(
        program.render(),
        "if (PlayerPosition < (NonPlayerObjectPosition - paddle_width)) { return actions[0] }; return actions[2]"
    );

    // an invalid child is refused and leaves the tree untouched
    let before = program.clone();
    let statement = g.parse("return actions[1]").unwrap();
    assert!(program.replace_at(&g, &[0, 0], statement).is_err());
    assert_eq!(program, before);
    assert!(matches!(
        program.replace_child(&g, 5, Node::constant(1.0)),
        Err(GrammarViolation::NoSuchChild { index: 5, .. })
    ));
}

#[test]
fn dsl_constants() {
    let g = Grammar::standard();
    let mut program = g
        .parse("if ((PlayerPosition + 0.5) < 2) { return actions[0] }")
        .unwrap();
    assert_eq!(program.constants(), vec![0.5, 2.0]);
    let shape = program.cost();
    program.set_constants(&[1.25]);
    assert_eq!(program.constants(), vec![1.25, 2.0]);
    assert_eq!(program.cost(), shape);
    assert_eq!(
        program.render(),
        "if ((PlayerPosition + 1.25) < 2) { return actions[0] }"
    );
}

proptest! {
    #[test]
    fn dsl_random_programs_are_consistent(seed in any::<u64>()) {
        let g = Grammar::standard();
        let mutator = ProgramMutator::new(&g, MutatorParams::default());
        let rng = &mut SmallRng::seed_from_u64(seed);
        let program = mutator.generate_random(&HashSet::new(), rng).unwrap();

        prop_assert!(program.has_consistent_cost());
        let mut recomputed = program.clone();
        prop_assert_eq!(recomputed.recompute_cost(), program.cost());
        prop_assert!(g.validate(&program).is_ok());
        prop_assert_eq!(program.clone().render(), program.render());
        prop_assert_eq!(g.parse(&program.render()).unwrap(), program);
    }
}
