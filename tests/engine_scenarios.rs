//! End-to-end engine scenarios (§8), exercised against the public crate
//! API the way `robt_test.rs`/`dlog_test.rs` exercise their own engines:
//! one `#[test]` per scenario, a fresh `SearchEngine` per test.

use maildex::config::RECORD_CONFIG;
use maildex::{Config, Error, MutateOp, MutationScope, SearchEngine, Store};

fn open_engine(dir: &std::path::Path) -> SearchEngine {
    SearchEngine::open(dir, &[[7u8; 32]]).unwrap()
}

fn iset(xs: &[u32]) -> maildex::IntSet {
    xs.iter().copied().collect()
}

#[test]
fn scenario_1_basic_membership() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("hello", &iset(&[1, 2])).unwrap();
    engine.add_results("world", &iset(&[1, 3])).unwrap();

    assert_eq!(engine.search("hello world").unwrap().to_vec(), vec![1]);
    assert_eq!(engine.search("hello OR world").unwrap().to_vec(), vec![1, 2, 3]);
    assert_eq!(engine.search("hello -world").unwrap().to_vec(), vec![2]);
}

#[test]
fn scenario_2_tag_namespacing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("in:inbox", &iset(&[4])).unwrap();
    engine
        .add_results_in_namespace("in:inbox", &iset(&[5]), Some("work"))
        .unwrap();

    assert_eq!(engine.search("in:inbox").unwrap().to_vec(), vec![4]);
    assert_eq!(
        engine.search_in_namespace("in:inbox", Some("work")).unwrap().to_vec(),
        vec![5]
    );
    assert_eq!(
        engine.search_in_namespace("all:mail", Some("work")).unwrap().to_vec(),
        vec![5]
    );
}

#[test]
fn scenario_3_mutate_then_undo() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("hello", &iset(&[6])).unwrap();
    let version_before = engine.get_version().unwrap();
    let snapshot_before = engine.get_tag("in:x").unwrap();
    assert!(snapshot_before.is_none());

    let mlist = vec![(
        MutationScope::Ids(iset(&[6])),
        vec![(MutateOp::Union, "in:x".to_string())],
    )];
    let result = engine.mutate(&mlist, Some("a"), None).unwrap();
    assert!(engine.search("in:x").unwrap().to_vec().contains(&6));

    let undo = engine.historic_mutate(result.history, true).unwrap();
    assert!(undo.changed.to_vec().contains(&6));
    assert!(!engine.search("in:x").unwrap().to_vec().contains(&6));
    assert!(engine.get_tag("in:x").unwrap().is_none());

    assert_eq!(engine.get_version().unwrap(), version_before + 2);
}

#[test]
fn scenario_4_partial_matches_with_wildcards() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = Store::open(dir.path(), &[[7u8; 32]]).unwrap();
        let mut config = Config::default();
        config.partial_shortest = 3;
        config.partial_longest = 14;
        config.partial_min_hits = 1;
        store.set(RECORD_CONFIG, &config.encode().unwrap()).unwrap();
        store.close().unwrap();
    }
    let engine = open_engine(dir.path());

    engine.add_results("ell", &iset(&[1])).unwrap();
    engine.add_results("hell", &iset(&[1])).unwrap();
    engine.add_results("hello", &iset(&[1])).unwrap();
    engine.add_results("hellyeah", &iset(&[1])).unwrap();
    engine.add_results("hellscapenation", &iset(&[1])).unwrap();
    engine.add_results("world", &iset(&[1])).unwrap();

    engine
        .update_terms("ell hell hello hellyeah hellscapenation world")
        .unwrap();

    let mut candidates = engine.candidates("*ell*").unwrap();
    candidates.sort();
    assert_eq!(
        candidates,
        vec!["ell".to_string(), "hell".to_string(), "hello".to_string(), "hellyeah".to_string()]
    );

    assert_eq!(engine.search("hell* w*ld").unwrap().to_vec(), vec![1]);
}

#[test]
fn scenario_5_id_range_queries() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("x", &iset(&[10, 11, 12, 20])).unwrap();

    assert_eq!(engine.search("id:10..12,20").unwrap().to_vec(), vec![10, 11, 12, 20]);
    assert_eq!(engine.search("id:5..9").unwrap().to_vec(), Vec::<u32>::new());
}

#[test]
fn scenario_6_history_ring_wrap() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    let mut history_ids = Vec::with_capacity(1001);
    for i in 1..=1001u32 {
        let mlist = vec![(
            MutationScope::Ids(iset(&[i])),
            vec![(MutateOp::Union, "ring".to_string())],
        )];
        let result = engine.mutate(&mlist, Some("wrap"), None).unwrap();
        history_ids.push(result.history);
    }

    assert_eq!(history_ids.len(), 1001);
    let oldest = history_ids[0];
    let newest_1000 = &history_ids[1..];
    assert_eq!(newest_1000.len(), 1000);

    let err = engine.historic_mutate(oldest, true).unwrap_err();
    match err {
        Error::NotFound(_) => {}
        other => panic!("expected NotFound for overwritten ring slot, got {:?}", other),
    }

    let hits = engine.search("ring").unwrap().to_vec();
    assert_eq!(hits.len(), 1001);
    assert!(hits.contains(&1));
    assert!(hits.contains(&1001));

    let version_before_undo = engine.get_version().unwrap();
    let undo = engine.historic_mutate(*newest_1000.last().unwrap(), true).unwrap();
    assert!(undo.changed.to_vec().contains(&1001));
    assert!(!engine.search("ring").unwrap().to_vec().contains(&1001));
    assert_eq!(engine.get_version().unwrap(), version_before_undo + 1);

    let mid = newest_1000[newest_1000.len() / 2];
    engine.historic_mutate(mid, true).unwrap();
    engine.historic_mutate(mid, false).unwrap();
}
