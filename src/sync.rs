//! Reconciliation between the locally reduced session and authoritative
//! snapshots pushed over the out-of-band channel.

use generation_session::GenerationSession;

/// How an incoming snapshot was applied to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotApplied {
    /// No local session existed; the snapshot was adopted as-is.
    Adopted,
    /// The snapshot carried a different session id and superseded the
    /// local session.
    Replaced,
    /// Same session id; snapshot fields were merged over local state.
    Merged,
}

/// Applies an authoritative snapshot to the local session slot.
///
/// Snapshots are full projections of authoritative state, never diffs, so
/// "last write observed wins" per field. Metadata (`agent_id`, `model_id`,
/// `project_id`, `project_name`) never regresses to absent, and a session
/// that already turned terminal locally can never flip active again.
pub fn apply_snapshot(
    slot: &mut Option<GenerationSession>,
    mut incoming: GenerationSession,
) -> SnapshotApplied {
    let Some(local) = slot.as_mut() else {
        *slot = Some(incoming);
        return SnapshotApplied::Adopted;
    };

    backfill_metadata(&mut incoming, local);

    if local.id != incoming.id {
        // A follow-up build superseded the local session.
        *local = incoming;
        return SnapshotApplied::Replaced;
    }

    if incoming.end_time.is_none() {
        incoming.end_time = local.end_time;
    }
    if !local.is_active {
        incoming.is_active = false;
    }
    *local = incoming;
    SnapshotApplied::Merged
}

fn backfill_metadata(incoming: &mut GenerationSession, local: &GenerationSession) {
    if incoming.project_id.is_empty() {
        incoming.project_id = local.project_id.clone();
    }
    if incoming.project_name.is_empty() {
        incoming.project_name = local.project_name.clone();
    }
    if incoming.agent_id.is_none() {
        incoming.agent_id = local.agent_id.clone();
    }
    if incoming.model_id.is_none() {
        incoming.model_id = local.model_id.clone();
    }
}
