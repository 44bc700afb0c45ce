//! Lenient mirror of the persisted session shape.
//!
//! Persisted snapshots originate from a JS-keyed store: fields are
//! camelCase, timestamps may be RFC 3339 strings or epoch milliseconds, and
//! index-keyed maps arrive with string keys. Every field except the record
//! identity is defaulted; hydration turns this mirror into a validated
//! `GenerationSession`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PersistedSession {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    pub operation_type: Value,
    pub agent_id: Option<String>,
    pub model_id: Option<String>,
    pub todos: Vec<PersistedTodo>,
    pub tools_by_todo: BTreeMap<String, Vec<PersistedToolCall>>,
    pub text_by_todo: BTreeMap<String, Vec<PersistedTextNote>>,
    pub active_todo_index: Option<i64>,
    pub is_active: bool,
    pub start_time: Value,
    pub end_time: Value,
    pub codex: Option<PersistedCodexState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PersistedTodo {
    pub content: String,
    pub status: Value,
    pub active_form: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PersistedToolCall {
    pub id: Option<String>,
    pub name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub state: Value,
    pub start_time: Value,
    pub end_time: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PersistedTextNote {
    pub id: Option<String>,
    pub text: String,
    pub timestamp: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PersistedCodexState {
    pub phases: Vec<PersistedPhase>,
    pub execution_insights: Vec<String>,
    pub thread_id: Option<String>,
    pub last_updated_at: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PersistedPhase {
    pub id: Option<String>,
    pub status: Value,
}
