use super::*;

fn open_engine(dir: &Path) -> SearchEngine {
    SearchEngine::open(dir, &[[1u8; 32]]).unwrap()
}

fn iset(xs: &[u32]) -> IntSet {
    xs.iter().copied().collect()
}

#[test]
fn test_add_and_search_basic_membership() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("in:inbox", &iset(&[1, 2, 3])).unwrap();
    let hits = engine.search("in:inbox").unwrap();
    assert_eq!(hits.to_vec(), vec![1, 2, 3]);
}

#[test]
fn test_search_and_or_not() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("in:inbox", &iset(&[1, 2, 3])).unwrap();
    engine.add_results("in:starred", &iset(&[2, 4])).unwrap();

    assert_eq!(engine.search("in:inbox in:starred").unwrap().to_vec(), vec![2]);
    assert_eq!(
        engine.search("in:inbox OR in:starred").unwrap().to_vec(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(engine.search("in:inbox -in:starred").unwrap().to_vec(), vec![1, 3]);
}

#[test]
fn test_tag_namespace_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("in:urgent@work", &iset(&[1])).unwrap();
    engine.add_results("in:urgent@personal", &iset(&[2])).unwrap();

    let work_tags = engine.iter_tags(Some("work")).unwrap();
    assert!(work_tags.contains(&"in:urgent@work".to_string()));
    assert!(!work_tags.contains(&"in:urgent@personal".to_string()));

    assert_eq!(engine.search("ALL:work").unwrap().to_vec(), vec![1]);
    assert_eq!(engine.search("ALL:personal").unwrap().to_vec(), vec![2]);
}

#[test]
fn test_search_in_namespace_scopes_bare_tag_queries() {
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
fn test_mutate_then_undo_round_trips_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("in:x", &iset(&[6])).unwrap();
    engine.del_results("in:x", &iset(&[6])).unwrap();
    let version_before = engine.get_version().unwrap();

    let mlist = vec![(
        MutationScope::Ids(iset(&[6])),
        vec![(MutateOp::Union, "in:x".to_string())],
    )];
    let result = engine.mutate(&mlist, Some("a"), None).unwrap();
    assert_eq!(result.mutations, 1);
    assert_eq!(result.changed.to_vec(), vec![6]);
    assert_eq!(engine.search("in:x").unwrap().to_vec(), vec![6]);

    engine.historic_mutate(result.history, true).unwrap();
    assert_eq!(engine.search("in:x").unwrap().to_vec(), Vec::<u32>::new());
    assert_eq!(engine.get_version().unwrap(), version_before + 2);

    engine.historic_mutate(result.history, false).unwrap();
    assert_eq!(engine.search("in:x").unwrap().to_vec(), vec![6]);
}

#[test]
fn test_mutate_comment_patch_merge_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("in:inbox", &iset(&[1])).unwrap();

    let mut merge = serde_json::Map::new();
    merge.insert("priority".to_string(), serde_json::Value::String("high".to_string()));
    merge.insert("flag".to_string(), serde_json::Value::Bool(true));
    let mlist = vec![(
        MutationScope::CommentPatch(merge),
        vec![(MutateOp::Union, "in:inbox".to_string())],
    )];
    engine.mutate(&mlist, None, None).unwrap();

    let (_, comment) = engine.get_tag("in:inbox").unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&comment).unwrap();
    assert_eq!(parsed["priority"], "high");
    assert_eq!(parsed["flag"], true);

    let mut remove = serde_json::Map::new();
    remove.insert("flag".to_string(), serde_json::Value::Null);
    let mlist = vec![(
        MutationScope::CommentPatch(remove),
        vec![(MutateOp::Subtract, "in:inbox".to_string())],
    )];
    engine.mutate(&mlist, None, None).unwrap();

    let (_, comment) = engine.get_tag("in:inbox").unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&comment).unwrap();
    assert_eq!(parsed["priority"], "high");
    assert!(parsed.get("flag").is_none());
}

#[test]
fn test_mutate_wildcard_tag_expands_across_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine
        .add_results_in_namespace("in:inbox", &iset(&[1, 2]), Some("work"))
        .unwrap();
    engine
        .add_results_in_namespace("in:starred", &iset(&[2]), Some("work"))
        .unwrap();

    let mlist = vec![(
        MutationScope::Ids(iset(&[2])),
        vec![(MutateOp::Subtract, "in:*".to_string())],
    )];
    let result = engine.mutate(&mlist, None, Some("work")).unwrap();
    assert!(result.mutations >= 2);
    assert_eq!(
        engine.search_in_namespace("in:inbox", Some("work")).unwrap().to_vec(),
        vec![1]
    );
    assert_eq!(
        engine.search_in_namespace("in:starred", Some("work")).unwrap().to_vec(),
        Vec::<u32>::new()
    );

    let mlist = vec![(
        MutationScope::Ids(iset(&[3])),
        vec![(MutateOp::Union, "in:*".to_string())],
    )];
    let err = engine.mutate(&mlist, None, Some("work")).unwrap_err();
    match err {
        Error::PermissionError(_) => {}
        other => panic!("expected PermissionError, got {:?}", other),
    }
}

#[test]
fn test_rename_l1_preserves_ids_and_comment() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.add_results("in:inbox", &iset(&[1, 2])).unwrap();
    engine.set_tag_comment("in:inbox", "primary inbox").unwrap();

    engine.rename_l1("in:inbox", "in:archive").unwrap();

    assert_eq!(engine.search("in:archive").unwrap().to_vec(), vec![1, 2]);
    let (_, comment) = engine.get_tag("in:archive").unwrap().unwrap();
    assert_eq!(comment, "primary inbox");
    assert!(engine.get_tag("in:inbox").unwrap().is_none());
}

#[test]
fn test_touch_bumps_version_and_tags_ids() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());

    let v1 = engine.touch(&iset(&[10])).unwrap();
    let v2 = engine.touch(&iset(&[11])).unwrap();
    assert!(v2 > v1);

    let hits = engine.search(&format!("version:{}", v1)).unwrap();
    assert_eq!(hits.to_vec(), vec![10]);
}

#[test]
fn test_id_range_query() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());
    let hits = engine.search("id:10..12,20").unwrap();
    assert_eq!(hits.to_vec(), vec![10, 11, 12, 20]);
}

#[test]
fn test_flush_and_reopen_preserves_search_results() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = open_engine(dir.path());
        engine.add_results("in:inbox", &iset(&[1, 2])).unwrap();
        engine.flush().unwrap();
    }
    let engine = open_engine(dir.path());
    assert_eq!(engine.search("in:inbox").unwrap().to_vec(), vec![1, 2]);
}

#[test]
fn test_l1_region_exhaustion_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());
    {
        let mut inner = engine.inner.lock().unwrap();
        inner.config.l1_keywords = 1;
    }
    engine.add_results("in:first", &iset(&[1])).unwrap();
    let err = engine.add_results("in:second", &iset(&[2])).unwrap_err();
    match err {
        Error::StorageError(msg) => assert!(msg.contains("L1 region exhausted")),
        other => panic!("expected StorageError, got {:?}", other),
    }
}

#[test]
fn test_wildcard_query_expands_through_wordblob() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = crate::store::Store::open(dir.path(), &[[1u8; 32]]).unwrap();
        let mut config = Config::default();
        config.partial_shortest = 3;
        config.partial_min_hits = 1;
        store.set(RECORD_CONFIG, &config.encode().unwrap()).unwrap();
        store.close().unwrap();
    }
    let engine = open_engine(dir.path());

    engine.add_results("world", &iset(&[1])).unwrap();
    engine.add_results("hello", &iset(&[1])).unwrap();
    engine.add_results("hell", &iset(&[2])).unwrap();

    engine.update_terms("world hello hell").unwrap();

    let hits = engine.search("hell* w*ld").unwrap();
    assert_eq!(hits.to_vec(), vec![1]);
}

#[test]
fn test_explain_query_text() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());
    assert_eq!(engine.explain_query("a (b OR c)").unwrap(), "(a AND (b OR c))");
}

#[test]
fn test_email_wordblobs_persist_independently_per_field() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = crate::store::Store::open(dir.path(), &[[1u8; 32]]).unwrap();
        let mut config = Config::default();
        config.partial_shortest = 3;
        config.partial_min_hits = 1;
        store.set(RECORD_CONFIG, &config.encode().unwrap()).unwrap();
        store.close().unwrap();
    }
    {
        let engine = open_engine(dir.path());
        engine.update_email_terms(0, "alice bob").unwrap();
        engine.update_email_terms(1, "carol dave").unwrap();
        assert_eq!(engine.email_candidates(0, "ali").unwrap(), vec!["alice".to_string()]);
        assert!(engine.email_candidates(1, "ali").unwrap().is_empty());
        engine.flush().unwrap();
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.email_candidates(0, "ali").unwrap(), vec!["alice".to_string()]);
    assert_eq!(engine.email_candidates(1, "car").unwrap(), vec!["carol".to_string()]);
    assert!(engine.email_candidates(3, "x").is_err());
}

#[test]
fn test_delete_everything_resets_engine() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine.add_results("in:inbox", &iset(&[1])).unwrap();
    engine.touch(&iset(&[1])).unwrap();

    engine.delete_everything().unwrap();

    assert_eq!(engine.search("in:inbox").unwrap().to_vec(), Vec::<u32>::new());
    assert_eq!(engine.get_version().unwrap(), 0);
}
