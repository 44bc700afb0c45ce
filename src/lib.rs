//! Generation session state engine.
//!
//! Maintains one consistent, ordered session state from events arriving
//! over multiple independent channels: the primary byte stream (decoded by
//! `agent_stream` and folded in by [`SessionReducer`]), authoritative
//! out-of-band snapshots (reconciled by [`sync::apply_snapshot`]), and
//! persisted snapshots rehydrated on reload (`snapshot_store`). The
//! [`SessionEngine`] is the single mutation point that keeps the two live
//! writers and the hydration path from racing each other.

pub mod archive;
mod codex;
pub mod engine;
pub mod guard;
pub mod persist;
pub mod reducer;
pub mod sync;

pub use archive::HistoryArchive;
pub use engine::{EngineError, GenerationHandle, HydrateOutcome, SessionEngine};
pub use guard::{GenerationGuard, GenerationToken};
pub use persist::{PersistScheduler, DEBOUNCE_WINDOW};
pub use reducer::SessionReducer;
pub use sync::{apply_snapshot, SnapshotApplied};
