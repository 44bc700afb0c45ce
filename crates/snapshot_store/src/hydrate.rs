use std::collections::BTreeMap;

use generation_session::{
    CodexPhase, CodexPhaseStatus, CodexSessionState, GenerationSession, OperationType, TextNote,
    TodoItem, TodoStatus, ToolCall, ToolCallState,
};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::SnapshotError;
use crate::schema::{PersistedCodexState, PersistedSession, PersistedTextNote, PersistedToolCall};

/// Rebuilds a `GenerationSession` from an untyped persisted record.
///
/// Timestamps are coerced from RFC 3339 strings or epoch milliseconds and
/// default to now; missing `activeForm` falls back to `content`; a missing
/// `activeTodoIndex` defaults to none and `isActive` to false. A record
/// that is not an object or lacks a non-empty `id`/`projectId` is
/// unrecoverable.
pub fn hydrate(record: &Value) -> Result<GenerationSession, SnapshotError> {
    let persisted: PersistedSession =
        serde_json::from_value(record.clone()).map_err(SnapshotError::structure)?;

    if persisted.id.is_empty() {
        return Err(SnapshotError::MissingField { field: "id" });
    }
    if persisted.project_id.is_empty() {
        return Err(SnapshotError::MissingField { field: "projectId" });
    }

    let now = OffsetDateTime::now_utc();

    let todos: Vec<TodoItem> = persisted
        .todos
        .into_iter()
        .map(|todo| TodoItem {
            active_form: todo
                .active_form
                .filter(|form| !form.is_empty())
                .unwrap_or_else(|| todo.content.clone()),
            status: parse_enum(&todo.status, TodoStatus::parse).unwrap_or_default(),
            content: todo.content,
        })
        .collect();

    let tools_by_todo = hydrate_index_map(persisted.tools_by_todo, |call| {
        hydrate_tool_call(call, now)
    });
    let text_by_todo = hydrate_index_map(persisted.text_by_todo, |note| {
        hydrate_text_note(note, now)
    });

    let active_todo_index = persisted
        .active_todo_index
        .filter(|index| *index >= 0)
        .map(|index| index as usize)
        .filter(|index| *index < todos.len());

    Ok(GenerationSession {
        id: persisted.id,
        project_id: persisted.project_id,
        project_name: persisted.project_name,
        operation_type: parse_enum(&persisted.operation_type, OperationType::parse)
            .unwrap_or_default(),
        agent_id: persisted.agent_id,
        model_id: persisted.model_id,
        todos,
        tools_by_todo,
        text_by_todo,
        active_todo_index,
        is_active: persisted.is_active,
        start_time: coerce_timestamp(&persisted.start_time).unwrap_or(now),
        end_time: coerce_timestamp(&persisted.end_time),
        codex: persisted
            .codex
            .map(|codex| hydrate_codex_state(codex, now)),
    })
}

/// Result of hydrating the persisted sessions of one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectHydration {
    /// At most one session to treat as current: an active session if any
    /// exists, otherwise the most recently started completed session shown
    /// as trailing context.
    pub current: Option<GenerationSession>,
    /// All remaining sessions, newest first.
    pub history: Vec<GenerationSession>,
}

/// Hydrates a batch of persisted records for one project. An unrecoverable
/// record is logged and skipped without affecting its siblings.
pub fn hydrate_project(records: &[Value]) -> ProjectHydration {
    let mut sessions = Vec::new();
    for record in records {
        match hydrate(record) {
            Ok(session) => sessions.push(session),
            Err(error) => log::warn!("skipping unrecoverable session snapshot: {error}"),
        }
    }

    let current = pick_current(&sessions).map(|index| sessions.remove(index));
    sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    ProjectHydration {
        current,
        history: sessions,
    }
}

fn pick_current(sessions: &[GenerationSession]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, session) in sessions.iter().enumerate() {
        let better = match best {
            None => true,
            Some(current_best) => {
                let chosen = &sessions[current_best];
                (session.is_active && !chosen.is_active)
                    || (session.is_active == chosen.is_active
                        && session.start_time > chosen.start_time)
            }
        };
        if better {
            best = Some(index);
        }
    }
    best
}

fn hydrate_tool_call(call: PersistedToolCall, now: OffsetDateTime) -> Option<ToolCall> {
    let Some(id) = call.id.filter(|id| !id.is_empty()) else {
        log::debug!("skipping persisted tool call without id");
        return None;
    };

    let state = parse_enum(&call.state, ToolCallState::parse).unwrap_or(if call.output.is_some() {
        ToolCallState::OutputAvailable
    } else {
        ToolCallState::InputAvailable
    });

    Some(ToolCall {
        id,
        name: call.name,
        input: call.input,
        output: call.output,
        state,
        start_time: coerce_timestamp(&call.start_time).unwrap_or(now),
        end_time: coerce_timestamp(&call.end_time),
    })
}

fn hydrate_text_note(note: PersistedTextNote, now: OffsetDateTime) -> Option<TextNote> {
    let Some(id) = note.id.filter(|id| !id.is_empty()) else {
        log::debug!("skipping persisted text note without id");
        return None;
    };

    Some(TextNote {
        id,
        text: note.text,
        timestamp: coerce_timestamp(&note.timestamp).unwrap_or(now),
    })
}

fn hydrate_codex_state(codex: PersistedCodexState, now: OffsetDateTime) -> CodexSessionState {
    let phases = codex
        .phases
        .into_iter()
        .filter_map(|phase| {
            let id = phase.id.filter(|id| !id.is_empty())?;
            Some(CodexPhase {
                id,
                status: parse_enum(&phase.status, CodexPhaseStatus::parse).unwrap_or_default(),
            })
        })
        .collect();

    CodexSessionState {
        phases,
        execution_insights: codex.execution_insights,
        thread_id: codex.thread_id,
        last_updated_at: coerce_timestamp(&codex.last_updated_at).unwrap_or(now),
    }
}

/// Rebuilds an index-keyed map from the string-keyed serialized form,
/// dropping entries whose key is not a valid todo index.
fn hydrate_index_map<P, T>(
    serialized: BTreeMap<String, Vec<P>>,
    mut hydrate_entry: impl FnMut(P) -> Option<T>,
) -> BTreeMap<usize, Vec<T>> {
    let mut map = BTreeMap::new();
    for (key, entries) in serialized {
        let Ok(index) = key.parse::<usize>() else {
            log::debug!("skipping bucket with non-index key '{key}'");
            continue;
        };
        let entries: Vec<T> = entries.into_iter().filter_map(&mut hydrate_entry).collect();
        if !entries.is_empty() {
            map.insert(index, entries);
        }
    }
    map
}

fn parse_enum<T>(value: &Value, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    value.as_str().and_then(parse)
}

/// Coerces a serialized timestamp (RFC 3339 string or epoch milliseconds)
/// to the temporal type. Anything else is treated as absent.
fn coerce_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(raw) => OffsetDateTime::parse(raw, &Rfc3339).ok(),
        Value::Number(number) => {
            let millis = number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value as i64))?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
        _ => None,
    }
}
