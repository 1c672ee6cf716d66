// tests/hooks_test.rs — Integration test: host lifecycle events through the learning core

use koi_learn::events::{EventLogger, SessionEvent};
use koi_learn::hooks::{AlertCache, HookEvent, HookHandler, HookInput, HookOutput};
use koi_learn::infra::config::Config;
use koi_learn::learner::ContextMatcher;
use koi_learn::memory::schema;
use koi_learn::memory::store::Store;
use rusqlite::Connection;
use serde_json::json;

/// Create an in-memory SQLite store with schema applied.
fn test_store() -> Store {
    let conn = Connection::open_in_memory().unwrap();
    schema::run_migrations(&conn).unwrap();
    Store::new(conn)
}

fn bash(session: &str, command: &str, response: serde_json::Value) -> HookInput {
    HookInput::new(HookEvent::PostToolUse, session)
        .with_tool("Bash", json!({ "command": command }))
        .with_response(response)
}

fn failing_test_run(session: &str) -> HookInput {
    bash(
        session,
        "npm test",
        json!({ "exit_code": 1, "stderr": "Error: Cannot find module 'lodash'" }),
    )
}

#[test]
fn test_failure_fix_and_reuse_cycle() {
    let store = test_store();
    let config = Config::default();
    let handler = HookHandler::new(&store, &config);
    let mut alerts = AlertCache::new(config.alerts.cooldown_secs);

    handler.handle(&HookInput::new(HookEvent::SessionStart, "s1"), &mut alerts);

    // Repeats below the recurring-failure threshold stay quiet
    for _ in 0..3 {
        assert_eq!(handler.handle(&failing_test_run("s1"), &mut alerts), HookOutput::approve());
    }
    let out = handler.handle(&failing_test_run("s1"), &mut alerts);
    let text = out.message().unwrap();
    assert!(text.contains("occurred 4 times"));
    assert!(text.contains("recurring-failure-detector"));

    // A helper runs, then the command passes
    let task = json!({ "subagent_type": "dep-fixer", "description": "fix imports" });
    handler.handle(
        &HookInput::new(HookEvent::PreToolUse, "s1").with_tool("Task", task.clone()),
        &mut alerts,
    );
    handler.handle(
        &HookInput::new(HookEvent::PostToolUse, "s1")
            .with_tool("Task", task)
            .with_response(json!({ "result": "done" })),
        &mut alerts,
    );
    handler.handle(&bash("s1", "npm test", json!({ "exit_code": 0 })), &mut alerts);

    let usage = store.latest_completed_usage("s1").unwrap().unwrap();
    assert_eq!(usage.agent_name, "dep-fixer");
    assert!(usage.effectiveness.is_some());
    assert!(store.query_unfixed_instances("s1", Some("npm test")).unwrap().is_empty());
    assert_eq!(store.query_context_snapshots(0.0).unwrap().len(), 1);

    let patterns = store.query_top_error_patterns(1).unwrap();
    assert_eq!(patterns[0].fix_count, 4);
    assert_eq!(patterns[0].suggested_agent.as_deref(), Some("dep-fixer"));

    // The next session hitting the same failure hears about the fix
    handler.handle(&HookInput::new(HookEvent::SessionStart, "s2"), &mut alerts);
    let out = handler.handle(&failing_test_run("s2"), &mut alerts);
    let text = out.message().unwrap();
    assert!(text.contains("fixed before with the dep-fixer helper"));
}

#[test]
fn test_check_regression_suggests_fixer() {
    let store = test_store();
    let config = Config::default();
    let handler = HookHandler::new(&store, &config);
    let mut alerts = AlertCache::new(300);

    handler.handle(&bash("s1", "cargo test", json!({ "exit_code": 0 })), &mut alerts);
    let out = handler.handle(
        &bash("s1", "cargo test", json!({ "exit_code": 101, "stderr": "test result: FAILED" })),
        &mut alerts,
    );
    assert!(out.message().unwrap().contains("regression-fixer"));
}

#[test]
fn test_wide_activity_suggestion() {
    let store = test_store();
    let config = Config::default();
    let handler = HookHandler::new(&store, &config);
    let mut alerts = AlertCache::new(300);

    let edit = |i: usize| {
        HookInput::new(HookEvent::PostToolUse, "s1")
            .with_tool("Edit", json!({ "file_path": format!("src/m{i}.py") }))
            .with_response(json!({}))
    };
    for i in 0..7 {
        assert_eq!(handler.handle(&edit(i), &mut alerts), HookOutput::approve());
    }
    let out = handler.handle(&edit(7), &mut alerts);
    assert!(out.message().unwrap().contains("8 edits in src/"));
    assert!(!out.message().unwrap().contains("language-specialist"));

    // Tenth .py edit reaches the language threshold; folder alert stays quiet
    handler.handle(&edit(8), &mut alerts);
    let out = handler.handle(&edit(9), &mut alerts);
    let text = out.message().unwrap();
    assert!(text.contains("language-specialist"));
    assert!(!text.contains("wide-activity-detector"));
}

#[test]
fn test_absolute_paths_group_by_project_folder() {
    let store = test_store();
    let mut config = Config::default();
    config.thresholds.push(koi_learn::infra::config::ThresholdOverride {
        agent_type: "wide-activity-detector".into(),
        default: 3.0,
        min: 3.0,
        max: 20.0,
    });
    let handler = HookHandler::new(&store, &config);
    let mut alerts = AlertCache::new(300);

    let edit = |path: &str| {
        HookInput::new(HookEvent::PostToolUse, "s1")
            .with_cwd("/home/dev/proj")
            .with_tool("Edit", json!({ "file_path": path }))
            .with_response(json!({}))
    };
    for path in [
        "/home/dev/proj/src/a.rs",
        "/home/dev/proj/tests/b.rs",
        "/home/dev/proj/docs/c.md",
    ] {
        // Three edits in three folders never reach a per-folder threshold of 3
        assert_eq!(handler.handle(&edit(path), &mut alerts), HookOutput::approve());
    }

    let folders = EventLogger::new(&store).folder_edit_counts("s1").unwrap();
    assert_eq!(folders.len(), 3);
    assert_eq!(folders.get("src"), Some(&1));
    assert!(folders.get("home").is_none());
}

#[test]
fn test_prompt_surfaces_confident_prediction_once() {
    let store = test_store();
    let config = Config::default();
    let logger = EventLogger::new(&store);
    logger.log(&SessionEvent::new("past", "Edit").with_file("api/routes.go")).unwrap();
    logger.log(&SessionEvent::new("now", "Edit").with_file("api/handlers.go")).unwrap();
    ContextMatcher::new(&store)
        .record_useful_agent("past", "go-specialist", 0.9)
        .unwrap();

    let handler = HookHandler::new(&store, &config);
    let mut alerts = AlertCache::new(300);
    let prompt = HookInput::new(HookEvent::UserPromptSubmit, "now").with_prompt("add an endpoint");

    let out = handler.handle(&prompt, &mut alerts);
    assert!(out.message().unwrap().contains("go-specialist"));
    assert_eq!(handler.handle(&prompt, &mut alerts), HookOutput::approve());
}

#[test]
fn test_stop_applies_efficiency_adjustment() {
    let store = test_store();
    let config = Config::default();
    let handler = HookHandler::new(&store, &config);
    let mut alerts = AlertCache::new(300);

    // Scattered edits, endless searching and looping reads: a poor session
    let logger = EventLogger::new(&store);
    for folder in ["a", "b", "c", "d"] {
        logger.log(&SessionEvent::new("s1", "Edit").with_file(format!("{folder}/x.rs"))).unwrap();
    }
    for _ in 0..20 {
        logger.log(&SessionEvent::new("s1", "Grep")).unwrap();
    }
    for f in ["1", "2", "3", "4", "5"] {
        for _ in 0..3 {
            logger.log(&SessionEvent::new("s1", "Read").with_file(format!("{f}.rs"))).unwrap();
        }
    }

    let out = handler.handle(&HookInput::new(HookEvent::Stop, "s1"), &mut alerts);
    assert_eq!(out, HookOutput::approve());
    let t = store.get_threshold("re-read-detector").unwrap().unwrap();
    assert_eq!(t.current_value, 4.8);
}

#[test]
fn test_store_failure_degrades_to_approve() {
    let store = test_store();
    store.conn().execute_batch("DROP TABLE session_events").unwrap();
    let config = Config::default();
    let handler = HookHandler::new(&store, &config);
    let mut alerts = AlertCache::new(300);

    let out = handler.handle(&failing_test_run("s1"), &mut alerts);
    assert_eq!(out, HookOutput::approve());
}
