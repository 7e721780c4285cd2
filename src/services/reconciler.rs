//! Version/timestamp-ordered merge of external group snapshots.
//!
//! This is the seam that lets process replicas, or a persisted copy, converge
//! without ever rewinding playback: each replica publishes a snapshot after
//! every authoritative change, and applying one is a deterministic
//! last-writer-wins merge keyed lexicographically on
//! `(state_version, server_time)`.

use std::sync::Arc;

use crate::events::GroupEventSink;
use crate::model::{GroupSnapshot, SyncState};
use crate::services::GroupStore;

/// Whether an incoming `(state_version, server_time)` pair supersedes the
/// local one.
///
/// Accept on a strictly newer version, or on an equal version with a
/// strictly newer server time. Clock skew and duplicate/delayed delivery
/// therefore never regress state: equal pairs are discarded.
pub fn snapshot_supersedes(incoming: (u64, u64), local: (u64, u64)) -> bool {
    incoming > local
}

/// Applies externally-sourced snapshots to local groups.
pub struct SnapshotReconciler {
    store: Arc<GroupStore>,
    sink: Arc<dyn GroupEventSink>,
}

impl SnapshotReconciler {
    pub fn new(store: Arc<GroupStore>, sink: Arc<dyn GroupEventSink>) -> Self {
        Self { store, sink }
    }

    /// Immutable projection of a group, or `None` if it doesn't exist.
    pub fn snapshot_by_id(&self, id: &str) -> Option<GroupSnapshot> {
        self.store.get(id)
    }

    /// Merges an external snapshot into the local group.
    ///
    /// No-op for an unknown group or a stale snapshot; otherwise the local
    /// playback block is replaced wholesale, the group marked dirty, and a
    /// full-state push fired. Returns whether the snapshot was applied.
    pub fn apply_external_snapshot(&self, snapshot: &GroupSnapshot) -> bool {
        let Some(shared) = self.store.shared(&snapshot.group_id) else {
            log::debug!(
                "[Reconciler] Dropping snapshot for unknown group {}",
                snapshot.group_id
            );
            return false;
        };
        let mut group = shared.lock();

        let incoming = (snapshot.playback.state_version, snapshot.playback.server_time);
        let local = (group.playback.state_version, group.playback.server_time);
        if !snapshot_supersedes(incoming, local) {
            log::debug!(
                "[Reconciler] Discarding stale snapshot for group {} ({:?} <= {:?})",
                snapshot.group_id,
                incoming,
                local
            );
            return false;
        }

        group.playback.queue = snapshot.playback.queue.clone();
        // A malformed peer must not install an index past the queue.
        group.playback.current_index = match group.playback.queue.len() {
            0 => 0,
            len => snapshot.playback.current_index.min(len - 1),
        };
        group.playback.is_playing = snapshot.playback.is_playing;
        group.playback.position_ms = snapshot.playback.position_ms;
        group.playback.state_version = snapshot.playback.state_version;
        group.playback.server_time = snapshot.playback.server_time;

        // An open gate keeps the waiting state; it still resolves exactly
        // once on its own (ready set or timeout).
        if group.ready_gate.is_none() {
            group.sync_state = SyncState::derive(
                group.playback.is_playing,
                group.playback.queue.is_empty(),
            );
        }
        group.dirty = true;

        log::info!(
            "[Reconciler] Applied snapshot v{} to group {}",
            group.playback.state_version,
            group.id
        );
        self.sink.on_group_state(&group.id, &group.snapshot());
        true
    }
}
