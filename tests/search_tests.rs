use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use phonebeam_lib::decoder::{
    ActiveListConfig, ActiveListFactory, BreadthFirstSearchManager, FrameSummary, SearchConfig,
    SearchManager, SearchPhase, SimpleAcousticScorer, SimplePruner,
};
use phonebeam_lib::frontend::VecFeatureSource;
use phonebeam_lib::linguist::{ExplicitGraph, SearchGraph, StateId, StaticLinguist};
use phonebeam_lib::{SearchError, SearchResult};

/// init -> A -> B -> exit. A scores column 0, B column 1.
fn make_two_unit_graph() -> Arc<dyn SearchGraph> {
    let mut b = ExplicitGraph::builder();
    let init = b.non_emitting(None);
    let a = b.emitting("A", 0);
    let unit_b = b.emitting("B", 1);
    let exit = b.non_emitting(None);
    b.set_initial(init).mark_final(exit).mark_word(exit);
    b.add_arc(init, a, 0.0)
        .add_arc(a, a, 0.0)
        .add_arc(a, unit_b, -1.0)
        .add_arc(unit_b, unit_b, 0.0)
        .add_arc(unit_b, exit, 0.0);
    Arc::new(b.build().expect("graph should build"))
}

/// Two looping units, each with its own final word exit.
fn make_phone_loop_graph() -> Arc<dyn SearchGraph> {
    let mut b = ExplicitGraph::builder();
    let init = b.non_emitting(None);
    let a = b.emitting("A", 0);
    let exit_a = b.non_emitting(Some("A"));
    let unit_b = b.emitting("B", 1);
    let exit_b = b.non_emitting(Some("B"));
    b.set_initial(init);
    for exit in [exit_a, exit_b] {
        b.mark_final(exit).mark_word(exit);
    }
    b.add_arc(init, a, 0.0)
        .add_arc(init, unit_b, 0.0)
        .add_arc(a, a, 0.0)
        .add_arc(a, exit_a, 0.0)
        .add_arc(unit_b, unit_b, 0.0)
        .add_arc(unit_b, exit_b, 0.0);
    for exit in [exit_a, exit_b] {
        b.add_arc(exit, a, -1.0).add_arc(exit, unit_b, -1.0);
    }
    Arc::new(b.build().expect("graph should build"))
}

fn make_scenario_frames() -> Vec<Vec<f32>> {
    vec![vec![-1.0, -5.0], vec![-5.0, -1.0], vec![-5.0, -1.0]]
}

fn make_loop_frames() -> Vec<Vec<f32>> {
    let mut frames = vec![vec![0.0, -5.0]; 3];
    frames.extend(vec![vec![-5.0, 0.0]; 3]);
    frames
}

fn make_manager(
    graph: Arc<dyn SearchGraph>,
    frames: Vec<Vec<f32>>,
    config: SearchConfig,
    lists: ActiveListConfig,
) -> BreadthFirstSearchManager {
    let mut manager = BreadthFirstSearchManager::new(
        Box::new(StaticLinguist::new(graph)),
        Box::new(SimpleAcousticScorer::new(VecFeatureSource::from_frames(frames))),
        Box::new(SimplePruner::new()),
        ActiveListFactory::new(&lists),
        config,
    );
    manager.allocate().expect("allocate should succeed");
    manager.start_recognition().expect("start should succeed");
    manager
}

fn decode(graph: Arc<dyn SearchGraph>, frames: Vec<Vec<f32>>, config: SearchConfig) -> SearchResult {
    let mut manager = make_manager(graph, frames, config, ActiveListConfig::default());
    manager
        .recognize(1000)
        .expect("decode should succeed")
        .expect("decode should produce a result")
}

#[test]
fn two_unit_scenario_yields_timed_units() {
    let result = decode(make_two_unit_graph(), make_scenario_frames(), SearchConfig::default());
    assert!(result.is_final());
    assert_eq!(result.hypothesis(), "A B");

    let units = result.timed_best_result(false);
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].label, "A");
    assert_eq!((units[0].start_frame, units[0].end_frame), (0, 1));
    assert_eq!(units[1].label, "B");
    assert_eq!((units[1].start_frame, units[1].end_frame), (1, 2));

    let best = result.best_token().expect("best token");
    assert!((result.token(best).score() - -4.0).abs() < 1e-5);
    assert!((units[1].score - -4.0).abs() < 1e-5);
}

#[test]
fn best_token_prefers_final_tokens() {
    let result = decode(make_two_unit_graph(), make_scenario_frames(), SearchConfig::default());
    let best = result.best_token().expect("best token");
    assert_eq!(result.best_final_token(), Some(best));
    assert!(result.token(best).is_final());
}

#[test]
fn active_list_holds_one_token_per_state() {
    let mut manager = make_manager(
        make_phone_loop_graph(),
        make_loop_frames(),
        SearchConfig::default(),
        ActiveListConfig::default(),
    );
    for _ in 0..6 {
        manager.recognize(1).expect("frame should decode");
        let states: Vec<Option<StateId>> = manager
            .active_list()
            .iter()
            .map(|id| manager.tokens()[id].state())
            .collect();
        let unique: HashSet<_> = states.iter().collect();
        assert_eq!(unique.len(), states.len());
    }
}

#[test]
fn non_emitting_self_loop_terminates() {
    let mut b = ExplicitGraph::builder();
    let init = b.non_emitting(None);
    let hub = b.non_emitting(None);
    let e = b.emitting("E", 0);
    let exit = b.non_emitting(None);
    b.set_initial(init).mark_final(exit).mark_word(exit);
    b.add_arc(init, hub, 0.0)
        .add_arc(hub, hub, 0.0)
        .add_arc(hub, e, 0.0)
        .add_arc(hub, exit, 0.0)
        .add_arc(e, hub, -0.5)
        .add_arc(e, e, -0.1);
    let graph: Arc<dyn SearchGraph> = Arc::new(b.build().expect("graph"));

    let mut manager = make_manager(
        graph,
        vec![vec![-1.0]; 5],
        SearchConfig::default(),
        ActiveListConfig::default(),
    );
    let result = manager
        .recognize(100)
        .expect("decode should succeed")
        .expect("result");
    assert!(result.is_final());
    assert!(manager.statistics().cycle_skips > 0);
    assert!(!result.final_tokens().is_empty());
}

#[test]
fn corrected_chain_has_no_unscored_tail() {
    // No final states, so the result falls back to the corrected active list.
    let mut b = ExplicitGraph::builder();
    let init = b.non_emitting(None);
    let a = b.emitting("A", 0);
    let unit_b = b.emitting("B", 1);
    b.set_initial(init);
    b.add_arc(init, a, 0.0)
        .add_arc(a, a, 0.0)
        .add_arc(a, unit_b, -1.0)
        .add_arc(unit_b, unit_b, 0.0);
    let graph: Arc<dyn SearchGraph> = Arc::new(b.build().expect("graph"));

    let result = decode(graph, make_scenario_frames(), SearchConfig::default());
    assert!(result.final_tokens().is_empty());
    for &id in result.active_tokens() {
        let token = result.token(id);
        assert!(token.is_emitting());
        assert!(token.is_scored());
    }
    let path = result.best_path();
    let leaf = result.token(*path.last().expect("non-empty path"));
    assert!(leaf.is_emitting() && leaf.is_scored());
    assert!(path
        .iter()
        .all(|&id| !result.token(id).is_emitting() || result.token(id).is_scored()));
    assert_eq!(result.hypothesis(), "A B");
}

#[test]
fn decoding_is_deterministic() {
    let first = decode(make_phone_loop_graph(), make_loop_frames(), SearchConfig::default());
    let second = decode(make_phone_loop_graph(), make_loop_frames(), SearchConfig::default());
    assert_eq!(first.timed_best_result(false), second.timed_best_result(false));
    assert_eq!(first.lattice(), second.lattice());
}

#[test]
fn absolute_beam_of_one_keeps_single_survivor() {
    let summaries: Arc<Mutex<Vec<FrameSummary>>> = Arc::default();
    let sink = Arc::clone(&summaries);
    let lists = ActiveListConfig {
        absolute_beam_width: 1,
        ..ActiveListConfig::default()
    };
    let mut manager = BreadthFirstSearchManager::new(
        Box::new(StaticLinguist::new(make_phone_loop_graph())),
        Box::new(SimpleAcousticScorer::new(VecFeatureSource::from_frames(
            make_loop_frames(),
        ))),
        Box::new(SimplePruner::new()),
        ActiveListFactory::new(&lists),
        SearchConfig::default(),
    )
    .with_frame_listener(move |s| sink.lock().unwrap().push(*s));
    manager.allocate().unwrap();
    manager.start_recognition().unwrap();
    let result = manager.recognize(100).unwrap().expect("result");

    let summaries = summaries.lock().unwrap();
    assert_eq!(summaries.len(), 6);
    assert!(summaries.iter().all(|s| s.survivors == 1));
    assert_eq!(result.hypothesis(), "A B");
}

#[test]
fn tight_relative_beam_keeps_only_the_leader() {
    let summaries: Arc<Mutex<Vec<FrameSummary>>> = Arc::default();
    let sink = Arc::clone(&summaries);
    let lists = ActiveListConfig {
        relative_beam_width: 0.1,
        ..ActiveListConfig::default()
    };
    let mut manager = BreadthFirstSearchManager::new(
        Box::new(StaticLinguist::new(make_phone_loop_graph())),
        Box::new(SimpleAcousticScorer::new(VecFeatureSource::from_frames(
            make_loop_frames(),
        ))),
        Box::new(SimplePruner::new()),
        ActiveListFactory::new(&lists),
        SearchConfig::default(),
    )
    .with_frame_listener(move |s| sink.lock().unwrap().push(*s));
    manager.allocate().unwrap();
    manager.start_recognition().unwrap();
    let result = manager.recognize(100).unwrap().expect("result");

    let summaries = summaries.lock().unwrap();
    assert_eq!(summaries.len(), 6);
    assert!(summaries.iter().all(|s| s.scored == 2 && s.survivors == 1));
    assert_eq!(result.hypothesis(), "A B");
}

#[test]
fn grow_skip_leaves_survivors_in_place() {
    let summaries: Arc<Mutex<Vec<FrameSummary>>> = Arc::default();
    let sink = Arc::clone(&summaries);
    let config = SearchConfig {
        grow_skip_interval: 2,
        ..SearchConfig::default()
    };
    let mut manager = BreadthFirstSearchManager::new(
        Box::new(StaticLinguist::new(make_two_unit_graph())),
        Box::new(SimpleAcousticScorer::new(VecFeatureSource::from_frames(
            make_scenario_frames(),
        ))),
        Box::new(SimplePruner::new()),
        ActiveListFactory::default(),
        config,
    )
    .with_frame_listener(move |s| sink.lock().unwrap().push(*s));
    manager.allocate().unwrap();
    manager.start_recognition().unwrap();
    manager.recognize(100).unwrap();

    let summaries = summaries.lock().unwrap();
    assert_eq!(summaries[0].survivors, 1);
    assert_eq!(summaries[0].active, 2);
    assert_eq!(summaries[1].active, summaries[1].survivors);
}

#[test]
fn entry_pruning_drops_hopeless_arcs() {
    let make_graph = || -> Arc<dyn SearchGraph> {
        let mut b = ExplicitGraph::builder();
        let init = b.non_emitting(None);
        let a = b.emitting("A", 0);
        let unit_b = b.emitting("B", 1);
        b.set_initial(init);
        b.add_arc(init, a, 0.0).add_arc(init, unit_b, -500.0);
        Arc::new(b.build().expect("graph"))
    };
    let frames = vec![vec![0.0, 0.0]];

    let plain = make_manager(make_graph(), frames.clone(), SearchConfig::default(), ActiveListConfig::default());
    assert_eq!(plain.active_list().len(), 2);
    assert_eq!(plain.statistics().entry_pruned, 0);

    let config = SearchConfig {
        want_entry_pruning: true,
        ..SearchConfig::default()
    };
    let pruned = make_manager(make_graph(), frames, config, ActiveListConfig::default());
    assert_eq!(pruned.active_list().len(), 1);
    assert_eq!(pruned.statistics().entry_pruned, 1);
}

#[test]
fn word_beam_blocks_weak_word_tokens() {
    let make_graph = || -> (Arc<dyn SearchGraph>, StateId) {
        let mut b = ExplicitGraph::builder();
        let init = b.non_emitting(None);
        let a = b.emitting("A", 0);
        let word = b.non_emitting(None);
        let unit_b = b.emitting("B", 1);
        b.set_initial(init).mark_word(word);
        b.add_arc(init, a, 0.0)
            .add_arc(a, a, 0.0)
            .add_arc(a, word, -100.0)
            .add_arc(word, unit_b, 0.0);
        let graph: Arc<dyn SearchGraph> = Arc::new(b.build().expect("graph"));
        (graph, unit_b)
    };
    let frames = vec![vec![0.0, 0.0]; 2];
    let holds = |manager: &BreadthFirstSearchManager, state: StateId| {
        manager
            .active_list()
            .iter()
            .any(|id| manager.tokens()[id].state() == Some(state))
    };

    let (graph, unit_b) = make_graph();
    let mut narrow = make_manager(graph, frames.clone(), SearchConfig::default(), ActiveListConfig::default());
    narrow.recognize(1).unwrap();
    assert!(!holds(&narrow, unit_b));

    let (graph, unit_b) = make_graph();
    let wide_config = SearchConfig {
        relative_word_beam_width: 1e-60,
        ..SearchConfig::default()
    };
    let mut wide = make_manager(graph, frames, wide_config, ActiveListConfig::default());
    wide.recognize(1).unwrap();
    assert!(holds(&wide, unit_b));
}

#[test]
fn word_only_chains_keep_the_hypothesis() {
    for build_word_lattice in [true, false] {
        let config = SearchConfig {
            keep_all_tokens: false,
            build_word_lattice,
            ..SearchConfig::default()
        };
        let result = decode(make_phone_loop_graph(), make_loop_frames(), config);
        assert_eq!(result.hypothesis(), "A B", "lattice mode {build_word_lattice}");
    }
}

#[test]
fn lattice_links_start_to_end() {
    let result = decode(make_phone_loop_graph(), make_loop_frames(), SearchConfig::default());
    let lattice = result.lattice();
    let labels: Vec<&str> = lattice.nodes.iter().map(|n| n.label.as_str()).collect();
    assert!(labels.contains(&"A"));
    assert!(labels.contains(&"B"));
    assert!(lattice
        .edges
        .iter()
        .all(|e| e.from < lattice.nodes.len() && e.to < lattice.nodes.len()));
    assert!(lattice.edges.iter().any(|e| e.from == 0));
    assert!(lattice.edges.iter().any(|e| e.to == 1));

    let json = serde_json::to_string(&lattice).expect("lattice serializes");
    assert!(json.contains("\"edges\""));
}

#[test]
fn compaction_preserves_the_result() {
    let compacted = SearchConfig {
        compact_interval_frames: 1,
        ..SearchConfig::default()
    };
    let never = SearchConfig {
        compact_interval_frames: 0,
        ..SearchConfig::default()
    };
    let mut manager = make_manager(make_phone_loop_graph(), make_loop_frames(), compacted, ActiveListConfig::default());
    let with = manager.recognize(100).unwrap().expect("result");
    assert!(manager.statistics().compactions > 0);
    let without = decode(make_phone_loop_graph(), make_loop_frames(), never);
    assert_eq!(with.timed_best_result(false), without.timed_best_result(false));
}

#[test]
fn empty_stream_reports_final_then_nothing() {
    let mut manager = make_manager(
        make_two_unit_graph(),
        Vec::new(),
        SearchConfig::default(),
        ActiveListConfig::default(),
    );
    let result = manager.recognize(10).unwrap().expect("final result");
    assert!(result.is_final());
    assert_eq!(result.hypothesis(), "");
    assert_eq!(manager.phase(), SearchPhase::StreamEnded);

    assert!(manager.recognize(10).unwrap().is_none());
}

#[test]
fn speech_end_markers_split_utterances() {
    use phonebeam_lib::frontend::{Data, FeatureFrame};
    use ndarray::arr1;

    let frame = |index: usize, values: [f32; 2]| {
        Data::Features(FeatureFrame {
            index,
            values: arr1(&values),
        })
    };
    let source = VecFeatureSource::new([
        Data::SpeechStart,
        frame(0, [-1.0, -5.0]),
        frame(1, [-5.0, -1.0]),
        Data::SpeechEnd,
        Data::DataEnd,
    ]);
    let mut manager = BreadthFirstSearchManager::new(
        Box::new(StaticLinguist::new(make_two_unit_graph())),
        Box::new(SimpleAcousticScorer::new(source)),
        Box::new(SimplePruner::new()),
        ActiveListFactory::default(),
        SearchConfig::default(),
    );
    manager.allocate().unwrap();
    manager.start_recognition().unwrap();

    let result = manager.recognize(100).unwrap().expect("result at speech end");
    assert!(result.is_final());
    assert_eq!(result.hypothesis(), "A B");
    // The trailing data end closes the stream.
    assert!(manager.recognize(100).unwrap().is_none());
}

#[test]
fn wrong_frame_width_terminates_the_session() {
    let mut manager = make_manager(
        make_two_unit_graph(),
        vec![vec![0.0, 0.0, 0.0]],
        SearchConfig::default(),
        ActiveListConfig::default(),
    );
    let err = manager.recognize(10).unwrap_err();
    assert!(matches!(
        err,
        SearchError::FeatureDimension {
            expected: 2,
            actual: 3
        }
    ));
    assert!(!err.is_setup_error());
    assert_eq!(manager.phase(), SearchPhase::Terminated);
}

#[test]
fn recognize_before_allocate_fails() {
    let mut manager = BreadthFirstSearchManager::new(
        Box::new(StaticLinguist::new(make_two_unit_graph())),
        Box::new(SimpleAcousticScorer::new(VecFeatureSource::default())),
        Box::new(SimplePruner::new()),
        ActiveListFactory::default(),
        SearchConfig::default(),
    );
    assert!(matches!(manager.recognize(1), Err(SearchError::NotAllocated)));
}

#[test]
fn stop_recognition_is_idempotent() {
    let mut manager = make_manager(
        make_two_unit_graph(),
        make_scenario_frames(),
        SearchConfig::default(),
        ActiveListConfig::default(),
    );
    manager.recognize(1).unwrap();
    manager.stop_recognition();
    manager.stop_recognition();
    assert_eq!(manager.phase(), SearchPhase::Terminated);
    assert!(manager.active_list().is_empty());
    assert!(manager.tokens().is_empty());
}

#[test]
fn intermediate_results_are_not_final() {
    let mut manager = make_manager(
        make_two_unit_graph(),
        make_scenario_frames(),
        SearchConfig::default(),
        ActiveListConfig::default(),
    );
    let partial = manager.recognize(1).unwrap().expect("partial result");
    assert!(!partial.is_final());
    assert_eq!(partial.frame_number(), 1);
    assert_eq!(partial.hypothesis(), "A");
}
