//! The engine façade the transport layer talks to.
//!
//! [`GroupManager`] composes the store and controllers behind one API
//! surface. The event sink and timer scheduler are injected at construction
//! so embedders own the fan-out and tests own the clock; there is no global
//! registry - each manager instance is fully isolated.

use std::sync::Arc;

use crate::error::GroupResult;
use crate::events::{GroupEnded, GroupEventSink};
use crate::model::GroupSnapshot;
use crate::services::membership::RemovalOutcome;
use crate::services::playback::{require_host, QueueChange, SetTrackOutcome};
use crate::services::{
    CreateOptions, GroupStore, HydrateOptions, MembershipController, PlaybackController,
    ReadyGateCoordinator, SnapshotReconciler,
};
use crate::timer::TimerScheduler;

/// Façade over the Listen Together group synchronization engine.
pub struct GroupManager {
    store: Arc<GroupStore>,
    membership: MembershipController,
    playback: PlaybackController,
    gate: Arc<ReadyGateCoordinator>,
    reconciler: SnapshotReconciler,
    sink: Arc<dyn GroupEventSink>,
}

impl GroupManager {
    /// Wires up the engine around an injected callback sink and timer
    /// scheduler.
    pub fn new(sink: Arc<dyn GroupEventSink>, scheduler: Arc<dyn TimerScheduler>) -> Self {
        let store = Arc::new(GroupStore::new());
        let gate = Arc::new(ReadyGateCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&sink),
            scheduler,
        ));
        Self {
            membership: MembershipController::new(
                Arc::clone(&store),
                Arc::clone(&sink),
                Arc::clone(&gate),
            ),
            playback: PlaybackController::new(
                Arc::clone(&store),
                Arc::clone(&sink),
                Arc::clone(&gate),
            ),
            reconciler: SnapshotReconciler::new(Arc::clone(&store), Arc::clone(&sink)),
            gate,
            store,
            sink,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle & persistence
    // ─────────────────────────────────────────────────────────────────────

    /// Creates a fresh group and pushes its initial full state.
    pub fn create(&self, id: &str, opts: CreateOptions) -> GroupSnapshot {
        let snapshot = self.store.create(id, opts);
        self.sink.on_group_state(id, &snapshot);
        snapshot
    }

    /// Restores a persisted group at cold start (never autoplays).
    pub fn hydrate(&self, id: &str, opts: HydrateOptions) -> GroupSnapshot {
        self.store.hydrate(id, opts)
    }

    /// Snapshot projection of a group, or `None`.
    pub fn get(&self, id: &str) -> Option<GroupSnapshot> {
        self.store.get(id)
    }

    /// Whether the group exists.
    pub fn has(&self, id: &str) -> bool {
        self.store.has(id)
    }

    /// Removes a group without ceremony (no callbacks). Returns whether it
    /// existed.
    pub fn remove(&self, id: &str) -> bool {
        self.store.remove(id)
    }

    /// Ids of every live group.
    pub fn all_group_ids(&self) -> Vec<String> {
        self.store.all_group_ids()
    }

    /// Groups with unflushed mutations, for the persistence drain.
    pub fn dirty_groups(&self) -> Vec<GroupSnapshot> {
        self.store.dirty_groups()
    }

    /// Clears a group's dirty flag after a successful flush.
    pub fn mark_clean(&self, id: &str) {
        self.store.mark_clean(id)
    }

    /// Host-gated orderly termination.
    pub fn end_group(&self, id: &str, actor_id: &str) -> GroupResult<()> {
        let shared = self.store.require(id)?;
        {
            let mut group = shared.lock();
            require_host(&group, actor_id)?;
            group.close_gate();
            self.sink.on_group_ended(
                id,
                &GroupEnded {
                    reason: "Ended by host".to_string(),
                },
            );
        }
        self.store.remove(id);
        Ok(())
    }

    /// Administrative termination. Silent no-op on a missing group.
    pub fn force_end(&self, id: &str, reason: &str) {
        let Some(shared) = self.store.shared(id) else {
            return;
        };
        {
            let mut group = shared.lock();
            group.close_gate();
            self.sink.on_group_ended(
                id,
                &GroupEnded {
                    reason: reason.to_string(),
                },
            );
        }
        self.store.remove(id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_member(&self, id: &str, user_id: &str, username: &str) -> GroupResult<GroupSnapshot> {
        self.membership.add_member(id, user_id, username)
    }

    pub fn remove_member(&self, id: &str, user_id: &str) -> GroupResult<RemovalOutcome> {
        self.membership.remove_member(id, user_id)
    }

    pub fn add_socket(&self, id: &str, user_id: &str, socket_id: &str) -> GroupResult<()> {
        self.membership.add_socket(id, user_id, socket_id)
    }

    pub fn remove_socket(&self, id: &str, user_id: &str, socket_id: &str) -> GroupResult<()> {
        self.membership.remove_socket(id, user_id, socket_id)
    }

    pub fn socket_count(&self, id: &str, user_id: &str) -> GroupResult<usize> {
        self.membership.socket_count(id, user_id)
    }

    pub fn connected_member_count(&self, id: &str) -> GroupResult<usize> {
        self.membership.connected_member_count(id)
    }

    /// Sweeps silent, fully-disconnected members; driven by an external
    /// periodic task that supplies "now".
    pub fn cleanup_stale_members(&self, id: &str, now_ms: u64) -> Vec<String> {
        self.membership.cleanup_stale_members(id, now_ms)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Playback (host-gated)
    // ─────────────────────────────────────────────────────────────────────

    pub fn play(&self, id: &str, actor_id: &str) -> GroupResult<bool> {
        self.playback.play(id, actor_id)
    }

    pub fn pause(&self, id: &str, actor_id: &str) -> GroupResult<bool> {
        self.playback.pause(id, actor_id)
    }

    pub fn seek(&self, id: &str, actor_id: &str, position_ms: u64) -> GroupResult<u64> {
        self.playback.seek(id, actor_id, position_ms)
    }

    pub fn next(&self, id: &str, actor_id: &str) -> GroupResult<usize> {
        self.playback.next(id, actor_id)
    }

    pub fn previous(&self, id: &str, actor_id: &str) -> GroupResult<usize> {
        self.playback.previous(id, actor_id)
    }

    pub fn modify_queue(
        &self,
        id: &str,
        actor_id: &str,
        change: QueueChange,
    ) -> GroupResult<crate::events::QueueDelta> {
        self.playback.modify_queue(id, actor_id, change)
    }

    pub fn set_track(
        &self,
        id: &str,
        actor_id: &str,
        index: usize,
        auto_play: bool,
    ) -> GroupResult<SetTrackOutcome> {
        self.playback.set_track(id, actor_id, index, auto_play)
    }

    /// Confirms a member's buffering readiness against the open gate.
    pub fn report_ready(&self, id: &str, user_id: &str) -> GroupResult<bool> {
        self.gate.report_ready(id, user_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────

    pub fn snapshot_by_id(&self, id: &str) -> Option<GroupSnapshot> {
        self.reconciler.snapshot_by_id(id)
    }

    pub fn apply_external_snapshot(&self, snapshot: &GroupSnapshot) -> bool {
        self.reconciler.apply_external_snapshot(snapshot)
    }
}
