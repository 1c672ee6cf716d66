// tests/store_test.rs — Integration test: SQLite round-trip (store CRUD)

use koi_learn::memory::schema;
use koi_learn::memory::store::Store;
use pretty_assertions::assert_eq;
use rusqlite::Connection;

/// Create an in-memory SQLite store with schema applied.
fn test_store() -> Store {
    let conn = Connection::open_in_memory().unwrap();
    schema::run_migrations(&conn).unwrap();
    Store::new(conn)
}

#[test]
fn test_event_counts_after_watermark() {
    let store = test_store();

    store.insert_event("s1", "Read", "read", Some("a.rs"), true, None).unwrap();
    store.insert_event("s1", "Bash", "command", None, false, Some("exit 1")).unwrap();
    let watermark = store.max_event_id().unwrap();
    store.insert_event("s1", "Read", "read", Some("a.rs"), true, None).unwrap();
    store.insert_event("s2", "Read", "read", Some("a.rs"), true, None).unwrap();

    assert_eq!(store.count_events("s1", Some("read"), 0).unwrap(), 2);
    assert_eq!(store.count_events("s1", Some("read"), watermark).unwrap(), 1);
    assert_eq!(store.count_events("s1", None, 0).unwrap(), 3);
    assert_eq!(store.count_failed_events("s1", 0).unwrap(), 1);
    assert_eq!(store.count_failed_events("s1", watermark).unwrap(), 0);
    assert_eq!(store.count_file_reads("s1", "a.rs").unwrap(), 2);

    let events = store.query_session_events("s1").unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].detail.as_deref(), Some("exit 1"));
    assert!(!events[1].success);
}

#[test]
fn test_error_pattern_upsert_counts() {
    let store = test_store();

    store
        .upsert_error_pattern("abc", "cannot find module <STR>", "cannot|find|module", Some("import-resolution"), None)
        .unwrap();
    store
        .upsert_error_pattern("abc", "cannot find module <STR>", "cannot|find|module", Some("import-resolution"), None)
        .unwrap();

    let p = store.get_error_pattern("abc").unwrap().unwrap();
    assert_eq!(p.occurrence_count, 2);
    assert_eq!(p.fix_count, 0);
    assert_eq!(store.count_error_patterns().unwrap(), 1);

    store.record_pattern_fix("abc", Some("language-specialist")).unwrap();
    let p = store.get_error_pattern("abc").unwrap().unwrap();
    assert_eq!(p.fix_count, 1);
    assert!((p.fix_success_rate - 0.5).abs() < 1e-9);
    assert_eq!(p.suggested_agent.as_deref(), Some("language-specialist"));
}

#[test]
fn test_error_instance_fixed_once() {
    let store = test_store();
    store.upsert_error_pattern("p1", "boom", "boom", None, None).unwrap();
    store
        .insert_error_instance("i1", "p1", Some("s1"), Some("npm test"), "boom", None)
        .unwrap();

    assert_eq!(store.query_unfixed_instances("s1", Some("npm test")).unwrap().len(), 1);
    assert!(store.query_unfixed_instances("s1", Some("cargo test")).unwrap().is_empty());

    assert!(store.mark_instance_fixed("i1", Some("fixer")).unwrap());
    assert!(!store.mark_instance_fixed("i1", Some("fixer")).unwrap());

    let i = store.get_error_instance("i1").unwrap().unwrap();
    assert!(i.fixed);
    assert_eq!(i.fixed_by_agent.as_deref(), Some("fixer"));
    assert!(i.fixed_at.is_some());
}

#[test]
fn test_single_open_usage_per_type() {
    let store = test_store();
    store
        .insert_agent_usage("u1", "s1", "guard", "quality-guard", None, 0, 0, 0)
        .unwrap();
    // The partial unique index rejects a second open record of the same type
    assert!(store
        .insert_agent_usage("u2", "s1", "guard", "quality-guard", None, 0, 0, 0)
        .is_err());

    assert!(store.complete_agent_usage("u1", true, 0, 0, 0.8).unwrap());
    assert!(!store.complete_agent_usage("u1", true, 0, 0, 0.1).unwrap());

    // Once closed, the type may be opened again
    store
        .insert_agent_usage("u3", "s1", "guard", "quality-guard", None, 0, 0, 0)
        .unwrap();

    let u1 = store.get_agent_usage("u1").unwrap().unwrap();
    assert_eq!(u1.effectiveness, Some(0.8));
    assert_eq!(u1.task_success, Some(true));
    assert_eq!(
        store.latest_completed_usage("s1").unwrap().unwrap().id,
        "u1"
    );
    assert_eq!(
        store.latest_open_usage("s1", Some("quality-guard")).unwrap().unwrap().id,
        "u3"
    );
}

#[test]
fn test_usage_stats_by_type() {
    let store = test_store();
    for (i, eff) in [0.2, 0.4, 0.6].iter().enumerate() {
        let id = format!("u{i}");
        store
            .insert_agent_usage(&id, &format!("s{i}"), "h", "re-read-detector", None, 1, 0, 0)
            .unwrap();
        store.complete_agent_usage(&id, true, 0, 0, *eff).unwrap();
    }
    // Open usages are not counted
    store
        .insert_agent_usage("open", "s9", "h", "re-read-detector", None, 1, 0, 0)
        .unwrap();

    let stats = store.query_usage_stats("1970-01-01T00:00:00.000000Z", None).unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].sample_count, 3);
    assert!((stats[0].avg_effectiveness - 0.4).abs() < 1e-9);

    let future = store.query_usage_stats("2999-01-01T00:00:00.000000Z", None).unwrap();
    assert!(future.is_empty());
    assert_eq!(store.query_agent_types_with_usage().unwrap(), vec!["re-read-detector"]);
}

#[test]
fn test_threshold_rows() {
    let store = test_store();
    store.insert_threshold_if_missing("t", 5.0, 1.0, 20.0).unwrap();
    store.insert_threshold_if_missing("t", 9.0, 1.0, 20.0).unwrap();
    assert_eq!(store.get_threshold("t").unwrap().unwrap().current_value, 5.0);

    store.update_threshold("t", 4.5, 0.8, 6, "[]").unwrap();
    let row = store.get_threshold("t").unwrap().unwrap();
    assert_eq!(row.current_value, 4.5);
    assert_eq!(row.sample_count, 6);
    assert!(row.last_adjusted.is_some());

    store.reset_threshold("t", 5.0, 1.0, 20.0).unwrap();
    let row = store.get_threshold("t").unwrap().unwrap();
    assert_eq!(row.current_value, 5.0);
    assert_eq!(row.sample_count, 0);
    assert_eq!(row.avg_effectiveness, 0.5);
    assert_eq!(row.history, "[]");

    // Updating a type with no row is an error, not a silent no-op
    assert!(store.update_threshold("missing", 4.0, 0.8, 6, "[]").is_err());
    assert!(store.get_threshold("missing").unwrap().is_none());
}

#[test]
fn test_context_snapshot_filter() {
    let store = test_store();
    store.insert_context_snapshot(Some("s1"), "{}", "a", 0.2).unwrap();
    store.insert_context_snapshot(None, "{}", "b", 0.7).unwrap();

    let useful = store.query_context_snapshots(0.4).unwrap();
    assert_eq!(useful.len(), 1);
    assert_eq!(useful[0].agent_name, "b");
    assert!(useful[0].session_id.is_none());
}
