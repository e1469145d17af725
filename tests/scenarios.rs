use automata_reuse::prelude::*;

fn word(w: &str) -> Vec<char> {
    w.chars().collect()
}

fn machine(first_output: &'static str) -> MealyMachine<char, &'static str> {
    MealyMachine::builder()
        .with_transitions([
            (0, 'a', first_output, 1),
            (0, 'b', "w", 2),
            (1, 'a', "x", 1),
            (1, 'b', "y", 1),
            (2, 'a', "v", 2),
            (2, 'b', "v", 2),
        ])
        .into_mealy(0)
}

#[test_log::test]
fn scenario_a_prefix_reuse() {
    let oracle = ReuseOracle::new(MealySimulator::new(machine("x")));

    assert_eq!(oracle.answer(&word("a")).unwrap(), vec!["x"]);
    let node1 = oracle.inspect(|tree| tree.node_at(&word("a"))).unwrap();
    assert!(oracle.inspect(|tree| tree.has_state(node1)));

    assert_eq!(oracle.answer(&word("ab")).unwrap(), vec!["x", "y"]);
    assert_eq!(oracle.sut().resets(), 1);
    assert_eq!(oracle.sut().steps(), 2);
    let stats = oracle.stats();
    assert_eq!(stats.continued, 1);
    assert_eq!(stats.full_runs, 1);
}

#[test_log::test]
fn scenario_b_nondeterminism_prefers_fresh_output() {
    let oracle = ReuseOracle::new(MealySimulator::new(machine("x")));
    oracle.answer(&word("a")).unwrap();
    oracle.answer(&word("ab")).unwrap();
    let node1 = oracle.inspect(|tree| tree.node_at(&word("a"))).unwrap();
    let node_ab = oracle.inspect(|tree| tree.node_at(&word("ab"))).unwrap();
    assert!(oracle.inspect(|tree| tree.has_state(node_ab)));

    // the system now answers `z` on `a`, and `aa` can only be run from scratch
    oracle.sut().replace_machine(machine("z"));
    assert_eq!(oracle.answer(&word("aa")).unwrap(), vec!["z", "x"]);

    oracle.inspect(|tree| {
        assert!(tree.is_reuse_disabled(node1));
        assert!(tree.is_reuse_disabled(node_ab));
        assert!(!tree.has_state(node_ab));
    });
    assert_eq!(oracle.stats().nondeterminism, 1);
    assert_eq!(oracle.answer(&word("a")).unwrap(), vec!["z"]);

    // `ab` is still known but cannot be resumed from the disabled node anymore
    let resets = oracle.sut().resets();
    oracle.answer(&word("abb")).unwrap();
    assert_eq!(oracle.sut().resets(), resets + 1);
    assert_eq!(oracle.sut().double_releases(), 0);
}

#[test_log::test]
fn scenario_c_capacity_eviction() {
    let config = ReuseConfig::builder().max_cached_states(1).build();
    let oracle = ReuseOracle::with_config(MealySimulator::new(machine("x")), config);

    oracle.answer(&word("a")).unwrap();
    assert_eq!(oracle.stats().cached_states, 1);
    oracle.answer(&word("b")).unwrap();

    let (node1, node2) = oracle.inspect(|tree| {
        (
            tree.node_at(&word("a")).unwrap(),
            tree.node_at(&word("b")).unwrap(),
        )
    });
    oracle.inspect(|tree| {
        assert!(!tree.has_state(node1));
        assert!(tree.has_state(node2));
    });
    let stats = oracle.stats();
    assert_eq!(stats.cached_states, 1);
    assert_eq!(stats.evictions, 1);
    assert_eq!(oracle.sut().released_states(), 1);
    assert_eq!(oracle.sut().live_states(), 1);

    // evicted nodes keep answering from recorded outputs
    assert_eq!(oracle.answer(&word("a")).unwrap(), vec!["x"]);
    assert_eq!(oracle.sut().resets(), 2);
}

#[test_log::test]
fn scenario_d_exhaustive_search_order() {
    let system = FnOracle::new(|w: &[u8]| w != [1u8]);
    let exploration = CompleteExploration::with_depths(system, 1, 2);
    let counterexample = exploration
        .find_counterexample(&|_: &[u8]| true, &[0, 1])
        .unwrap()
        .expect("the system rejects `1`");
    assert_eq!(counterexample, Counterexample::new(vec![1], false));
}

#[test_log::test]
fn exhaustive_search_through_reuse_oracle() {
    let target = machine("x");
    let hypothesis = MealyMachine::builder()
        .with_transitions([
            (0, 'a', "x", 1),
            (0, 'b', "w", 2),
            (1, 'a', "x", 1),
            (1, 'b', "y", 0),
            (2, 'a', "v", 2),
            (2, 'b', "v", 2),
        ])
        .into_mealy(0);

    let oracle = ReuseOracle::new(MealySimulator::new(target.clone()));
    let exploration = CompleteExploration::new(&oracle, 4).with_batch_size(8);
    let counterexample = exploration
        .find_counterexample(&hypothesis, target.alphabet())
        .unwrap()
        .expect("hypothesis differs on `abb`");
    assert_eq!(counterexample.input, word("abb"));
    assert_eq!(counterexample.output, vec!["x", "y", "y"]);

    let stats = oracle.stats();
    assert!(stats.continued > 0);
    assert!(oracle.sut().resets() < stats.queries);
}

#[test_log::test]
fn non_reusable_outputs_are_never_resumed() {
    let config = ReuseConfig::builder().non_reusable_output("w").build();
    let oracle = ReuseOracle::with_config(MealySimulator::new(machine("x")), config);
    oracle.answer(&word("b")).unwrap();
    assert_eq!(oracle.stats().cached_states, 0);
    oracle.answer(&word("ba")).unwrap();
    assert_eq!(oracle.sut().resets(), 2);
    assert_eq!(oracle.stats().continued, 0);
}
