use std::sync::Arc;
use std::thread;
use std::time::Duration;

use generation_engine::{EngineError, HydrateOutcome, SessionEngine, SnapshotApplied};
use generation_session::{
    GenerationSession, OperationType, SessionSeed, TodoStatus, ToolCallState,
};
use serde_json::{json, Value};
use snapshot_store::{MemorySnapshotStore, SnapshotStore};

fn seed(session_id: &str) -> SessionSeed {
    SessionSeed {
        session_id: Some(session_id.to_string()),
        project_id: "project-1".to_string(),
        project_name: "Demo".to_string(),
        operation_type: OperationType::InitialBuild,
        agent_id: Some("claude-code".to_string()),
        model_id: None,
        resume_thread_id: None,
    }
}

fn engine() -> (Arc<MemorySnapshotStore>, SessionEngine) {
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = SessionEngine::with_debounce_window(
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        Duration::from_millis(20),
    );
    (store, engine)
}

fn frame(payload: &Value) -> String {
    format!("data: {payload}\n\n")
}

fn build_stream() -> String {
    [
        json!({"type": "start", "messageId": "m1"}),
        json!({
            "type": "tool-input-available",
            "toolCallId": "plan-1",
            "toolName": "update_plan",
            "input": {"todos": [{"content": "A", "status": "in_progress"}]},
        }),
        json!({
            "type": "tool-input-available",
            "toolCallId": "t1",
            "toolName": "Bash",
            "input": {"command": "npm install"},
        }),
        json!({"type": "tool-output-available", "toolCallId": "t1", "output": "ok"}),
        json!({"type": "finish"}),
    ]
    .iter()
    .map(frame)
    .collect()
}

fn assert_scenario_final_state(session: &GenerationSession) {
    assert_eq!(session.todos.len(), 1);
    assert_eq!(session.todos[0].content, "A");
    assert_eq!(session.todos[0].status, TodoStatus::Completed);
    assert_eq!(session.active_todo_index, None);
    assert!(!session.is_active);
    assert!(session.end_time.is_some());

    let calls = &session.tools_by_todo[&0];
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "t1");
    assert_eq!(calls[0].state, ToolCallState::OutputAvailable);
    assert_eq!(calls[0].output, Some(json!("ok")));
    assert!(session.todo_exclusivity_holds());
}

#[test]
fn full_stream_scenario_reaches_expected_final_state() {
    let (_store, engine) = engine();

    let mut handle = engine
        .begin_generation(seed("session-1"))
        .expect("generation should start");
    assert!(engine.is_generating());
    assert!(engine.current_session().is_some(), "state exists before any bytes arrive");

    handle.feed(build_stream().as_bytes());
    handle.finish();

    assert!(!engine.is_generating());
    let session = engine.current_session().expect("terminal session remains current");
    assert_scenario_final_state(&session);
}

#[test]
fn stream_split_at_arbitrary_chunk_boundaries_decodes_identically() {
    let payload = build_stream();
    let bytes = payload.as_bytes();

    for offset in [1, 7, bytes.len() / 2, bytes.len() - 3] {
        let (_store, engine) = engine();
        let mut handle = engine
            .begin_generation(seed("session-1"))
            .expect("generation should start");
        handle.feed(&bytes[..offset]);
        handle.feed(&bytes[offset..]);
        handle.finish();

        let session = engine.current_session().expect("session exists");
        assert_scenario_final_state(&session);
    }
}

#[test]
fn done_sentinel_finalizes_without_explicit_finish() {
    let (_store, engine) = engine();
    let mut handle = engine
        .begin_generation(seed("session-1"))
        .expect("generation should start");

    handle.feed(frame(&json!({
        "type": "tool-input-available",
        "toolCallId": "plan-1",
        "toolName": "update_plan",
        "input": {"todos": [{"content": "A", "status": "in_progress"}]},
    }))
    .as_bytes());
    handle.feed(b"data: [DONE]\n\n");

    assert!(handle.is_finished());
    assert!(!engine.is_generating());
    let session = engine.current_session().expect("session exists");
    assert!(!session.is_active);
    assert_eq!(session.todos[0].status, TodoStatus::Completed);
}

#[test]
fn dropping_the_handle_finalizes_an_abruptly_ended_stream() {
    let (_store, engine) = engine();
    {
        let mut handle = engine
            .begin_generation(seed("session-1"))
            .expect("generation should start");
        // Partial frame with no sentinel and no trailing blank line.
        handle.feed(b"data: {\"type\":\"finish\"}");
    }

    assert!(!engine.is_generating());
    let session = engine.current_session().expect("session exists");
    assert!(!session.is_active);
    assert!(session.end_time.is_some());
}

#[test]
fn concurrent_generation_is_rejected() {
    let (_store, engine) = engine();
    let _handle = engine
        .begin_generation(seed("session-1"))
        .expect("first generation should start");

    let error = engine
        .begin_generation(seed("session-2"))
        .err()
        .expect("second generation must be rejected");
    assert!(matches!(error, EngineError::GenerationInProgress));
}

#[test]
fn hydration_is_skipped_while_generating() {
    let (store, engine) = engine();
    store.seed(
        "project-1",
        json!({
            "id": "stale",
            "projectId": "project-1",
            "isActive": false,
            "startTime": "2026-03-01T08:00:00Z",
        }),
    );

    let handle = engine
        .begin_generation(seed("session-live"))
        .expect("generation should start");

    let outcome = engine
        .hydrate_project("project-1")
        .expect("hydration call should succeed");
    assert_eq!(outcome, HydrateOutcome::SkippedGenerating);
    assert_eq!(
        engine.current_session().expect("live session").id,
        "session-live"
    );
    handle.finish();
}

#[test]
fn hydration_selects_active_current_and_archives_the_rest() {
    let (store, engine) = engine();
    store.seed(
        "project-1",
        json!({
            "id": "session-done",
            "projectId": "project-1",
            "isActive": false,
            "startTime": "2026-03-01T11:00:00Z",
        }),
    );
    store.seed(
        "project-1",
        json!({
            "id": "session-live",
            "projectId": "project-1",
            "isActive": true,
            "startTime": "2026-03-01T09:00:00Z",
        }),
    );

    let outcome = engine
        .hydrate_project("project-1")
        .expect("hydration should succeed");
    assert_eq!(
        outcome,
        HydrateOutcome::Hydrated {
            has_current: true,
            archived: 1,
        }
    );

    assert_eq!(
        engine.current_session().expect("current").id,
        "session-live"
    );
    let history = engine.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, "session-done");
}

#[test]
fn remote_snapshot_with_matching_id_merges_and_keeps_metadata() {
    let (_store, engine) = engine();
    let handle = engine
        .begin_generation(seed("session-1"))
        .expect("generation should start");

    let applied = engine
        .apply_remote_snapshot(&json!({
            "id": "session-1",
            "projectId": "project-1",
            "todos": [{"content": "A", "status": "in_progress"}],
            "activeTodoIndex": 0,
            "isActive": true,
            "startTime": "2026-03-01T10:00:00Z",
        }))
        .expect("snapshot should apply");
    assert_eq!(applied, SnapshotApplied::Merged);

    let session = engine.current_session().expect("session exists");
    assert_eq!(session.todos.len(), 1);
    // The snapshot omitted agentId; local metadata must not regress.
    assert_eq!(session.agent_id.as_deref(), Some("claude-code"));
    handle.finish();
}

#[test]
fn remote_snapshot_with_new_id_supersedes_and_archives_the_old_session() {
    let (_store, engine) = engine();
    let handle = engine
        .begin_generation(seed("session-a"))
        .expect("generation should start");
    handle.finish();

    let applied = engine
        .apply_remote_snapshot(&json!({
            "id": "session-b",
            "projectId": "project-1",
            "isActive": true,
            "startTime": "2026-03-01T12:00:00Z",
        }))
        .expect("snapshot should apply");
    assert_eq!(applied, SnapshotApplied::Replaced);

    let session = engine.current_session().expect("session exists");
    assert_eq!(session.id, "session-b");
    assert!(session.todos.is_empty());
    assert_eq!(session.agent_id.as_deref(), Some("claude-code"));

    let history = engine.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, "session-a");
}

#[test]
fn malformed_remote_snapshot_is_an_error_without_state_change() {
    let (_store, engine) = engine();
    let handle = engine
        .begin_generation(seed("session-1"))
        .expect("generation should start");

    let before = engine.current_session();
    assert!(engine.apply_remote_snapshot(&json!("nonsense")).is_err());
    assert_eq!(engine.current_session(), before);
    handle.finish();
}

#[test]
fn terminal_state_is_persisted_to_the_store() {
    let (store, engine) = engine();
    let mut handle = engine
        .begin_generation(seed("session-1"))
        .expect("generation should start");
    handle.feed(build_stream().as_bytes());
    handle.finish();

    let mut persisted = None;
    for _ in 0..100 {
        persisted = store.latest_snapshot("project-1", "session-1");
        if persisted
            .as_ref()
            .is_some_and(|snapshot| snapshot["isActive"] == json!(false))
        {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let snapshot = persisted.expect("terminal snapshot should be written");
    assert_eq!(snapshot["isActive"], json!(false));
    assert_eq!(snapshot["todos"][0]["status"], json!("completed"));
    assert_eq!(snapshot["activeTodoIndex"], json!(-1));
}

#[test]
fn captured_thread_id_is_exposed_for_follow_up_builds() {
    let (_store, engine) = engine();
    let mut handle = engine
        .begin_generation(seed("session-1"))
        .expect("generation should start");

    handle.feed(frame(&json!({
        "type": "tool-input-available",
        "toolCallId": "meta-1",
        "toolName": "codex_thread",
        "input": {"threadId": "thread-42"},
    }))
    .as_bytes());
    handle.finish();

    assert_eq!(engine.resume_thread_id().as_deref(), Some("thread-42"));

    let mut follow_up = seed("session-2");
    follow_up.operation_type = OperationType::Continuation;
    follow_up.resume_thread_id = engine.resume_thread_id();
    let handle = engine
        .begin_generation(follow_up)
        .expect("follow-up generation should start");

    let session = engine.current_session().expect("session exists");
    assert_eq!(session.id, "session-2");
    assert_eq!(
        session.codex.as_ref().and_then(|codex| codex.thread_id.as_deref()),
        Some("thread-42")
    );
    // The finished first session moved into history.
    assert_eq!(engine.history()[0].id, "session-1");
    handle.finish();
}

#[test]
fn codex_phase_events_update_sub_state() {
    let (_store, engine) = engine();
    let mut handle = engine
        .begin_generation(seed("session-1"))
        .expect("generation should start");

    let payload: String = [
        json!({"type": "data-codex-phase", "data": {"id": "scaffold", "status": "in_progress"}}),
        json!({"type": "data-codex-insight", "data": {"text": "project uses vite"}}),
        json!({"type": "data-codex-phase", "data": {"id": "scaffold", "status": "completed"}}),
    ]
    .iter()
    .map(frame)
    .collect();
    handle.feed(payload.as_bytes());
    handle.finish();

    let session = engine.current_session().expect("session exists");
    let codex = session.codex.expect("codex state exists");
    assert_eq!(codex.phases.len(), 1);
    assert_eq!(codex.phases[0].id, "scaffold");
    assert_eq!(codex.execution_insights, vec!["project uses vite"]);
}
