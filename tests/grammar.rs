use stratsynth::{ConfigError, ConstantDomain, Grammar, GrammarConfig, Kind, Node, ProgramIndex};

#[test]
fn grammar_from_json_with_legacy_names() {
    let g = Grammar::from_json(
        r#"{
            "operators": ["LT", "GT", "Addition", "IT", "ITE", "ReturnAction", "Strategy"],
            "sensors": ["PlayerPosition", "NonPlayerObjectPosition"],
            "scalars": ["paddle_width"],
            "arrays": ["actions"],
            "array_indexes": [0, 1],
            "constants": {"start": 0, "stop": 1, "step": 0.25}
        }"#,
    )
    .unwrap();

    assert!(g.rule(Kind::LessThan).is_some());
    assert!(g.rule(Kind::Plus).is_some());
    assert!(g.rule(Kind::IfThenElse).is_some());
    assert!(g.rule(Kind::Times).is_none());
    assert_eq!(g.constants(), &[0.0, 0.25, 0.5, 0.75]);

    let operand = g.slot(Kind::Plus, 0).unwrap();
    assert!(operand.accepts(Kind::Constant));
    assert!(operand.accepts(Kind::ScalarRef));
    assert!(!operand.accepts(Kind::Times));
    assert!(g.slot(Kind::Strategy, 1).unwrap().optional);
    assert_eq!(g.rule(Kind::Strategy).unwrap().arity(), (1, 2));
}

#[test]
fn grammar_rejects_bad_configs() {
    assert!(matches!(
        Grammar::from_json("{ not json"),
        Err(ConfigError::Json(_))
    ));
    // nothing can fill a ReturnAction without arrays
    assert!(matches!(
        Grammar::from_json(
            r#"{ "operators": ["ReturnAction", "Strategy", "IT", "GT"], "sensors": ["PlayerPosition"] }"#
        ),
        Err(ConfigError::EmptySlot {
            kind: Kind::ReturnAction,
            slot: 0,
        })
    ));
    assert!(matches!(
        Grammar::from_json(r#"{ "operators": [], "constants": [1], "program_kinds": ["Strategy"] }"#),
        Err(ConfigError::UnknownProgramKind(Kind::Strategy))
    ));
    // Plus only ever takes more Plus
    let err = Grammar::from_json(
        r#"{
            "operators": ["Plus"],
            "constants": [1],
            "program_kinds": ["Plus"],
            "valid_children": {
                "Plus": [{"kinds": ["Plus"]}, {"kinds": ["Plus"]}]
            }
        }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnproductiveKind(Kind::Plus)));
    assert!(err.to_string().contains("Plus"));
}

#[test]
fn grammar_valid_children_override() {
    let config = GrammarConfig {
        constants: ConstantDomain::Values(vec![1.0]),
        valid_children: vec![(
            Kind::ReturnAction,
            vec![stratsynth::Slot::new(vec![Kind::ArrayElementRef, Kind::Constant])],
        )]
        .into_iter()
        .collect(),
        ..GrammarConfig::default()
    };
    let g = Grammar::new(&config).unwrap();
    assert!(g.parse("return 1").is_ok());
    assert!(Grammar::standard().parse("return 1").is_err());
}

#[test]
fn grammar_overrides_keep_arity() {
    let err = Grammar::from_json(
        r#"{
            "operators": ["IT", "GT", "ReturnAction", "Strategy"],
            "sensors": ["PlayerPosition"],
            "arrays": ["actions"],
            "array_indexes": [0],
            "valid_children": { "IT": [{"kinds": ["ReturnAction"]}] }
        }"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::ArityOverride {
            kind: Kind::IfThen,
            expected: 2,
            found: 1,
        }
    ));
    assert!(err.to_string().contains("2 children"));

    // leaves take no children at all
    assert!(matches!(
        Grammar::from_json(
            r#"{
                "operators": [],
                "constants": [1],
                "program_kinds": ["Constant"],
                "valid_children": { "Constant": [{"kinds": ["Constant"]}] }
            }"#,
        ),
        Err(ConfigError::ArityOverride {
            kind: Kind::Constant,
            expected: 0,
            found: 1,
        })
    ));

    let err = Grammar::from_json(
        r#"{
            "operators": ["ITE", "GT", "ReturnAction", "Strategy"],
            "sensors": ["PlayerPosition"],
            "arrays": ["actions"],
            "array_indexes": [0],
            "valid_children": {
                "ITE": [
                    {"kinds": ["GT"], "optional": true},
                    {"kinds": ["ReturnAction"]},
                    {"kinds": ["ReturnAction"]}
                ]
            }
        }"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::OptionalOverride {
            kind: Kind::IfThenElse,
            slot: 0,
        }
    ));

    // the tail of a sequence is optional already, and may stay so with fewer kinds
    let g = Grammar::from_json(
        r#"{
            "operators": ["IT", "GT", "ReturnAction", "Strategy"],
            "sensors": ["PlayerPosition"],
            "arrays": ["actions"],
            "array_indexes": [0],
            "valid_children": {
                "Strategy": [{"kinds": ["IT"]}, {"kinds": ["ReturnAction"], "optional": true}]
            }
        }"#,
    )
    .unwrap();
    assert_eq!(g.rule(Kind::Strategy).unwrap().arity(), (1, 2));
    assert!(g.slot(Kind::Strategy, 1).unwrap().accepts(Kind::ReturnAction));
    assert!(!g.slot(Kind::Strategy, 1).unwrap().accepts(Kind::Strategy));
}

#[test]
fn grammar_terminals() {
    let g = Grammar::standard();
    let names = |kind| {
        g.terminals(kind)
            .iter()
            .map(Node::render)
            .collect::<Vec<_>>()
    };
    assert_eq!(names(Kind::Constant), vec!["0.5", "1", "2"]);
    assert_eq!(names(Kind::ScalarRef), vec!["paddle_width"]);
    assert_eq!(
        names(Kind::ArrayElementRef),
        vec!["actions[0]", "actions[1]", "actions[2]"]
    );
    assert_eq!(names(Kind::PlayerPosition), vec!["PlayerPosition"]);
    assert!(names(Kind::IfThen).is_empty());

    // loops bring their own variable
    let g = Grammar::from_json(
        r#"{
            "operators": ["ForEach", "IT", "LT", "ReturnAction", "Strategy"],
            "arrays": ["actions"],
            "array_indexes": [0]
        }"#,
    )
    .unwrap();
    assert_eq!(
        g.terminals(Kind::ScalarRef)
            .iter()
            .map(Node::render)
            .collect::<Vec<_>>(),
        vec!["loop"]
    );
}

#[test]
fn grammar_validate() {
    let g = Grammar::standard();
    let program = g
        .parse("if (PlayerPosition < 1) { return actions[0] }; return actions[1]")
        .unwrap();
    assert!(g.validate(&program).is_ok());

    let narrow = Grammar::from_json(
        r#"{
            "operators": ["IT", "GT", "ReturnAction", "Strategy"],
            "sensors": ["PlayerPosition"],
            "constants": [1],
            "arrays": ["actions"],
            "array_indexes": [0, 1]
        }"#,
    )
    .unwrap();
    assert!(narrow.rule(Kind::LessThan).is_none());
    assert!(narrow.validate(&program).is_err());
}

#[test]
fn plist_files_by_cost_and_kind() {
    let g = Grammar::standard();
    let mut index = ProgramIndex::new();
    assert!(index.is_empty());
    for node in g.terminals(Kind::Constant) {
        index.insert(node);
    }
    let guard = g.parse("if (PlayerPosition < 1) { return actions[0] }").unwrap();
    index.insert(guard.clone());
    index.insert_at(9, g.parse("return actions[1]").unwrap());

    assert_eq!(index.len(), 5);
    assert_eq!(index.get(1, Kind::Constant).map(<[Node]>::len), Some(3));
    assert_eq!(index.get(5, Kind::IfThen), Some(&[guard][..]));
    assert_eq!(index.get(9, Kind::ReturnAction).map(<[Node]>::len), Some(1));
    assert_eq!(index.get(4, Kind::IfThen), None);
    assert_eq!(index.max_cost(), Some(9));
    assert_eq!(index.lookup(1).map(|level| level.len()), Some(1));

    let snapshot = index.snapshot();
    index.insert(Node::constant(7.0));
    assert_eq!(snapshot.len(), 5);
    assert_eq!(index.len(), 6);
    let costs: Vec<usize> = index.iter().map(|(cost, _)| cost).collect();
    assert_eq!(costs, vec![1, 1, 1, 1, 5, 9]);
}
