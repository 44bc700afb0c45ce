//! Sub-reducer for agents that report phased execution.

use generation_session::{CodexPhase, CodexPhaseStatus, GenerationSession};
use serde_json::Value;
use time::OffsetDateTime;

const PHASE_EVENT: &str = "phase";
const INSIGHT_EVENT: &str = "insight";

/// Applies one `data-codex-*` event. `kind` is the name suffix after
/// `codex-`. Every recognized event refreshes `last_updated_at`.
pub(crate) fn apply(session: &mut GenerationSession, kind: &str, data: &Value, now: OffsetDateTime) {
    match kind {
        PHASE_EVENT => {
            let Some(id) = data.get("id").and_then(Value::as_str) else {
                log::debug!("ignoring codex phase event without id");
                return;
            };
            let status = data
                .get("status")
                .and_then(Value::as_str)
                .and_then(CodexPhaseStatus::parse)
                .unwrap_or_default();

            let codex = session.codex_mut(now);
            match codex.phases.iter_mut().find(|phase| phase.id == id) {
                Some(phase) => phase.status = status,
                None => codex.phases.push(CodexPhase {
                    id: id.to_string(),
                    status,
                }),
            }
            codex.last_updated_at = now;
        }
        INSIGHT_EVENT => {
            let Some(text) = data.get("text").and_then(Value::as_str) else {
                log::debug!("ignoring codex insight event without text");
                return;
            };
            let codex = session.codex_mut(now);
            codex.execution_insights.push(text.to_string());
            codex.last_updated_at = now;
        }
        other => log::debug!("ignoring unrecognized codex event '{other}'"),
    }
}

/// Captures a resumable thread id reported mid-stream.
pub(crate) fn capture_thread(session: &mut GenerationSession, thread_id: &str, now: OffsetDateTime) {
    let codex = session.codex_mut(now);
    codex.thread_id = Some(thread_id.to_string());
    codex.last_updated_at = now;
}

#[cfg(test)]
mod tests {
    use generation_session::{OperationType, SessionSeed};
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn session() -> GenerationSession {
        let seed = SessionSeed {
            project_id: "project-1".to_string(),
            project_name: "Demo".to_string(),
            operation_type: OperationType::Continuation,
            ..SessionSeed::default()
        };
        GenerationSession::new_pending("session-1", &seed, datetime!(2026-03-01 00:00 UTC))
    }

    #[test]
    fn phase_events_upsert_by_id() {
        let mut session = session();
        let t0 = datetime!(2026-03-01 00:01 UTC);
        let t1 = datetime!(2026-03-01 00:02 UTC);

        apply(
            &mut session,
            "phase",
            &json!({"id": "scaffold", "status": "in_progress"}),
            t0,
        );
        apply(
            &mut session,
            "phase",
            &json!({"id": "scaffold", "status": "completed"}),
            t1,
        );

        let codex = session.codex.as_ref().expect("codex state exists");
        assert_eq!(codex.phases.len(), 1);
        assert_eq!(codex.phases[0].status, CodexPhaseStatus::Completed);
        assert_eq!(codex.last_updated_at, t1);
    }

    #[test]
    fn insights_append_in_order() {
        let mut session = session();
        let now = datetime!(2026-03-01 00:01 UTC);

        apply(&mut session, "insight", &json!({"text": "uses vite"}), now);
        apply(&mut session, "insight", &json!({"text": "has eslint"}), now);

        let codex = session.codex.as_ref().expect("codex state exists");
        assert_eq!(codex.execution_insights, vec!["uses vite", "has eslint"]);
    }

    #[test]
    fn unrecognized_or_incomplete_events_do_not_create_state() {
        let mut session = session();
        let now = datetime!(2026-03-01 00:01 UTC);

        apply(&mut session, "phase", &json!({"status": "completed"}), now);
        apply(&mut session, "telemetry", &json!({"ok": true}), now);

        assert!(session.codex.is_none());
    }

    #[test]
    fn capture_thread_sets_thread_id() {
        let mut session = session();
        let now = datetime!(2026-03-01 00:01 UTC);

        capture_thread(&mut session, "thread-42", now);

        let codex = session.codex.as_ref().expect("codex state exists");
        assert_eq!(codex.thread_id.as_deref(), Some("thread-42"));
        assert_eq!(codex.last_updated_at, now);
    }
}
