use agent_stream::{StreamEvent, TextChannel};
use generation_session::{
    GenerationSession, SessionSeed, TextNote, TodoItem, TodoStatus, ToolCall, PLAN_TOOL_NAME,
    THREAD_TOOL_NAME,
};
use serde_json::Value;
use time::OffsetDateTime;

use crate::codex;

/// Folds decoded stream events into the session state.
///
/// The reducer never fails: malformed or unknown events degrade to a logged
/// no-op, and every mutation preserves the todo exclusivity invariant.
#[derive(Debug, Default)]
pub struct SessionReducer {
    session: Option<GenerationSession>,
    /// Tool calls observed before any todo existed, waiting for the first
    /// plan update to give them a bucket.
    pending_tools: Vec<ToolCall>,
    /// User-visible reply text for the current message envelope. Not part
    /// of the session; rendering owns its presentation.
    reply: String,
    message_open: bool,
}

impl SessionReducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn session(&self) -> Option<&GenerationSession> {
        self.session.as_ref()
    }

    pub fn session_slot_mut(&mut self) -> &mut Option<GenerationSession> {
        &mut self.session
    }

    pub fn set_session(&mut self, session: Option<GenerationSession>) {
        self.session = session;
        self.pending_tools.clear();
        self.reply.clear();
        self.message_open = false;
    }

    pub fn take_session(&mut self) -> Option<GenerationSession> {
        self.session.take()
    }

    /// Materializes a fresh session when events arrive before one exists.
    pub fn ensure_session(&mut self, id: impl Into<String>, seed: &SessionSeed) {
        if self.session.is_none() {
            self.session = Some(GenerationSession::new_pending(
                id,
                seed,
                OffsetDateTime::now_utc(),
            ));
        }
    }

    #[must_use]
    pub fn reply_text(&self) -> &str {
        &self.reply
    }

    /// True between a `start` event and its matching `finish`.
    #[must_use]
    pub fn message_open(&self) -> bool {
        self.message_open
    }

    #[must_use]
    pub fn pending_tool_count(&self) -> usize {
        self.pending_tools.len()
    }

    /// Applies one decoded event. Unknown event types are ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Start { .. } => {
                self.message_open = true;
                self.reply.clear();
            }
            StreamEvent::TextStart { id, channel } => {
                if *channel == TextChannel::Narration {
                    self.begin_narration_note(id);
                }
            }
            StreamEvent::TextDelta { id, channel, delta } => match channel {
                TextChannel::Reply => self.reply.push_str(delta),
                TextChannel::Narration => self.append_narration(id, delta),
            },
            StreamEvent::TextEnd { .. } => {}
            StreamEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => self.on_tool_input(tool_call_id, tool_name, input),
            StreamEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            } => self.on_tool_output(tool_call_id, output),
            StreamEvent::Data { name, data } => {
                if let Some(kind) = name.strip_prefix("codex-") {
                    if let Some(session) = self.session.as_mut() {
                        codex::apply(session, kind, data, OffsetDateTime::now_utc());
                    }
                }
            }
            StreamEvent::Finish => {
                self.message_open = false;
            }
            StreamEvent::Unknown { event_type, .. } => {
                log::debug!("ignoring unknown stream event type '{event_type}'");
            }
        }
    }

    /// Finalizes the session when the stream ends, in two idempotent steps:
    /// close out an implicit final-summary todo, then flip the session
    /// terminal.
    pub fn finish_stream(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        close_out_final_todo(session);

        if session.is_active {
            session.is_active = false;
            session.end_time = Some(OffsetDateTime::now_utc());
        }
    }

    fn begin_narration_note(&mut self, block_id: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let bucket = session.active_bucket();
        session.text_by_todo.entry(bucket).or_default().push(TextNote {
            id: block_id.to_string(),
            text: String::new(),
            timestamp: OffsetDateTime::now_utc(),
        });
    }

    fn append_narration(&mut self, block_id: &str, delta: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let existing = session
            .text_by_todo
            .values_mut()
            .flat_map(|notes| notes.iter_mut())
            .find(|note| note.id == block_id);

        match existing {
            Some(note) => note.text.push_str(delta),
            // A delta with no preceding start still accumulates.
            None => {
                let bucket = session.active_bucket();
                session.text_by_todo.entry(bucket).or_default().push(TextNote {
                    id: block_id.to_string(),
                    text: delta.to_string(),
                    timestamp: OffsetDateTime::now_utc(),
                });
            }
        }
    }

    fn on_tool_input(&mut self, tool_call_id: &str, tool_name: &str, input: &Value) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let now = OffsetDateTime::now_utc();

        if tool_name == PLAN_TOOL_NAME {
            apply_plan_update(session, input);
            if !session.todos.is_empty() && !self.pending_tools.is_empty() {
                let bucket = session.active_bucket();
                session
                    .tools_by_todo
                    .entry(bucket)
                    .or_default()
                    .append(&mut self.pending_tools);
            }
            return;
        }

        if tool_name == THREAD_TOOL_NAME {
            if let Some(thread_id) = input.get("threadId").and_then(Value::as_str) {
                codex::capture_thread(session, thread_id, now);
            }
            return;
        }

        let call = ToolCall::started(tool_call_id, tool_name, input.clone(), now);
        if session.todos.is_empty() {
            log::debug!("queueing tool call '{tool_call_id}' observed before any todo exists");
            self.pending_tools.push(call);
        } else {
            let bucket = session.active_bucket();
            session.tools_by_todo.entry(bucket).or_default().push(call);
        }
    }

    fn on_tool_output(&mut self, tool_call_id: &str, output: &Value) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let now = OffsetDateTime::now_utc();

        if let Some(call) = session.find_tool_call_mut(tool_call_id) {
            call.complete(output.clone(), now);
            return;
        }

        if let Some(call) = self
            .pending_tools
            .iter_mut()
            .find(|call| call.id == tool_call_id)
        {
            call.complete(output.clone(), now);
            return;
        }

        // Output raced ahead of its input event or belongs to another
        // session; state stays unchanged.
        log::debug!("ignoring output for unknown tool call '{tool_call_id}'");
    }
}

/// Replaces the todo list wholesale from a plan-tool payload. This is the
/// only way todos change.
fn apply_plan_update(session: &mut GenerationSession, input: &Value) {
    let Some(raw_todos) = input.get("todos").and_then(Value::as_array) else {
        log::warn!("plan update without a todo array leaves todos untouched");
        return;
    };

    session.todos = raw_todos
        .iter()
        .map(|raw| {
            let content = raw
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let status = raw
                .get("status")
                .and_then(Value::as_str)
                .and_then(TodoStatus::parse)
                .unwrap_or_default();
            let mut todo = TodoItem::new(content, status);
            if let Some(form) = raw
                .get("activeForm")
                .and_then(Value::as_str)
                .filter(|form| !form.is_empty())
            {
                todo.active_form = form.to_string();
            }
            todo
        })
        .collect();

    session.recompute_active_todo();
}

/// Closes out an implicit final-summary task: when every todo but the last
/// is completed, the stream ending completes the last one too.
fn close_out_final_todo(session: &mut GenerationSession) {
    let Some((last, prior)) = session.todos.split_last_mut() else {
        return;
    };

    let prior_all_completed = prior.iter().all(|todo| todo.status == TodoStatus::Completed);
    if prior_all_completed && last.status != TodoStatus::Completed {
        last.status = TodoStatus::Completed;
        session.active_todo_index = None;
    }
}
