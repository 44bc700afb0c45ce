//! Shared data-model contract for generation sessions.
//!
//! This crate intentionally defines only the session state types shared by
//! the stream reducer, the cross-source synchronizer, and the persistence
//! layer. It excludes wire decoding, merge policy, and storage mechanics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Reserved tool name that replaces the session todo list wholesale.
pub const PLAN_TOOL_NAME: &str = "update_plan";

/// Reserved tool name that captures a resumable agent thread id.
pub const THREAD_TOOL_NAME: &str = "codex_thread";

/// Kind of build the session performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    #[default]
    InitialBuild,
    Enhancement,
    FocusedEdit,
    Continuation,
}

impl OperationType {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "initial-build" => Self::InitialBuild,
            "enhancement" => Self::Enhancement,
            "focused-edit" => Self::FocusedEdit,
            "continuation" => Self::Continuation,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialBuild => "initial-build",
            Self::Enhancement => "enhancement",
            Self::FocusedEdit => "focused-edit",
            Self::Continuation => "continuation",
        }
    }
}

/// Execution state of one todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// Lifecycle state of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    InputAvailable,
    OutputAvailable,
}

impl ToolCallState {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "input-available" => Self::InputAvailable,
            "output-available" => Self::OutputAvailable,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputAvailable => "input-available",
            Self::OutputAvailable => "output-available",
        }
    }
}

/// One step of the agent's task plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
    /// Progress-tense label shown while the todo is in progress.
    pub active_form: String,
}

impl TodoItem {
    #[must_use]
    pub fn new(content: impl Into<String>, status: TodoStatus) -> Self {
        let content = content.into();
        Self {
            active_form: content.clone(),
            content,
            status,
        }
    }
}

/// A discrete action the agent invoked, with eventual output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub state: ToolCallState,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<OffsetDateTime>,
}

impl ToolCall {
    /// Constructs a call in the `input-available` state.
    #[must_use]
    pub fn started(
        id: impl Into<String>,
        name: impl Into<String>,
        input: Value,
        at: OffsetDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            output: None,
            state: ToolCallState::InputAvailable,
            start_time: at,
            end_time: None,
        }
    }

    /// Transitions the call to `output-available`. The transition happens
    /// exactly once; later outputs for the same call are ignored.
    pub fn complete(&mut self, output: Value, at: OffsetDateTime) {
        if self.state == ToolCallState::OutputAvailable {
            return;
        }
        self.output = Some(output);
        self.state = ToolCallState::OutputAvailable;
        self.end_time = Some(at);
    }
}

/// Free-form narration emitted while a todo was active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNote {
    pub id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Status of one phase reported by a phased-execution agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodexPhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl CodexPhaseStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodexPhase {
    pub id: String,
    pub status: CodexPhaseStatus,
}

/// Sub-state for agents that report phased execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodexSessionState {
    pub phases: Vec<CodexPhase>,
    pub execution_insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
}

impl CodexSessionState {
    #[must_use]
    pub fn new(at: OffsetDateTime) -> Self {
        Self {
            phases: Vec::new(),
            execution_insights: Vec::new(),
            thread_id: None,
            last_updated_at: at,
        }
    }
}

/// Metadata required to materialize a fresh session before any network
/// confirmation exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSeed {
    pub session_id: Option<String>,
    pub project_id: String,
    pub project_name: String,
    pub operation_type: OperationType,
    pub agent_id: Option<String>,
    pub model_id: Option<String>,
    /// Thread captured from a prior session, carried into a follow-up build.
    pub resume_thread_id: Option<String>,
}

/// One build/iteration attempt tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSession {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub todos: Vec<TodoItem>,
    pub tools_by_todo: BTreeMap<usize, Vec<ToolCall>>,
    pub text_by_todo: BTreeMap<usize, Vec<TextNote>>,
    /// Index of the todo currently in progress. Serialized as `-1` when no
    /// todo is in progress, matching the wire and persisted shapes.
    #[serde(default, with = "active_todo_index")]
    pub active_todo_index: Option<usize>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codex: Option<CodexSessionState>,
}

impl GenerationSession {
    /// Materializes the fresh, empty, active session that exists from the
    /// instant a build request is issued.
    #[must_use]
    pub fn new_pending(id: impl Into<String>, seed: &SessionSeed, at: OffsetDateTime) -> Self {
        let codex = seed.resume_thread_id.as_ref().map(|thread_id| {
            let mut codex = CodexSessionState::new(at);
            codex.thread_id = Some(thread_id.clone());
            codex
        });

        Self {
            id: id.into(),
            project_id: seed.project_id.clone(),
            project_name: seed.project_name.clone(),
            operation_type: seed.operation_type,
            agent_id: seed.agent_id.clone(),
            model_id: seed.model_id.clone(),
            todos: Vec::new(),
            tools_by_todo: BTreeMap::new(),
            text_by_todo: BTreeMap::new(),
            active_todo_index: None,
            is_active: true,
            start_time: at,
            end_time: None,
            codex,
        }
    }

    /// Bucket index that tool calls and text notes attach to: the active
    /// todo, or the provisional bucket 0 before any todo is active.
    #[must_use]
    pub fn active_bucket(&self) -> usize {
        self.active_todo_index.unwrap_or(0)
    }

    /// Recomputes `active_todo_index` from todo statuses. The first
    /// `in_progress` todo wins; any later ones are demoted to `pending` so
    /// the exclusivity invariant holds for every reachable state.
    pub fn recompute_active_todo(&mut self) {
        let mut active = None;
        for (index, todo) in self.todos.iter_mut().enumerate() {
            if todo.status != TodoStatus::InProgress {
                continue;
            }
            if active.is_none() {
                active = Some(index);
            } else {
                todo.status = TodoStatus::Pending;
            }
        }
        self.active_todo_index = active;
    }

    /// Looks up a tool call by id across all todo buckets.
    pub fn find_tool_call_mut(&mut self, call_id: &str) -> Option<&mut ToolCall> {
        self.tools_by_todo
            .values_mut()
            .flat_map(|calls| calls.iter_mut())
            .find(|call| call.id == call_id)
    }

    /// Returns the codex sub-state, creating it on first use.
    pub fn codex_mut(&mut self, at: OffsetDateTime) -> &mut CodexSessionState {
        self.codex.get_or_insert_with(|| CodexSessionState::new(at))
    }

    /// Invariant check used by tests: at most one todo is in progress and
    /// `active_todo_index` references it (or nothing is in progress).
    #[must_use]
    pub fn todo_exclusivity_holds(&self) -> bool {
        let in_progress: Vec<usize> = self
            .todos
            .iter()
            .enumerate()
            .filter(|(_, todo)| todo.status == TodoStatus::InProgress)
            .map(|(index, _)| index)
            .collect();

        match (in_progress.as_slice(), self.active_todo_index) {
            ([], None) => true,
            ([only], Some(active)) => *only == active,
            _ => false,
        }
    }
}

/// Serde bridge between the in-memory `Option<usize>` and the `-1`/index
/// wire representation.
mod active_todo_index {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(index) => serializer.serialize_i64(*index as i64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<usize>, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw < 0 {
            Ok(None)
        } else {
            Ok(Some(raw as usize))
        }
    }
}
