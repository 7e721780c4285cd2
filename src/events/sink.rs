//! Event sink abstraction for decoupling the engine from transport.
//!
//! Services depend on the [`GroupEventSink`] trait rather than concrete
//! sockets or channels, enabling testing and alternative transports.

use crate::model::GroupSnapshot;

use super::{GroupEnded, MemberJoined, MemberLeft, PlayAt, PlaybackDelta, QueueDelta, WaitingStart};

/// Trait the engine invokes to notify the outside world.
///
/// Each method receives the group id and a payload; the transport
/// collaborator fans the payload out to the group's sockets. Callbacks fire
/// synchronously inside the mutating call, after the mutation is complete,
/// so once the call returns, a snapshot of the group reflects every payload
/// delivered during it.
///
/// Callbacks run while the group's lock is held: implementations must hand
/// work off (queue, channel, spawn) rather than call back into the engine
/// for the same group, or they will deadlock.
pub trait GroupEventSink: Send + Sync {
    /// Full-state push (group created, or an external snapshot accepted).
    fn on_group_state(&self, group_id: &str, state: &GroupSnapshot);

    /// Incremental playback change.
    fn on_playback_delta(&self, group_id: &str, delta: &PlaybackDelta);

    /// Queue contents changed.
    fn on_queue_delta(&self, group_id: &str, delta: &QueueDelta);

    /// A ready gate opened; clients should buffer and report readiness.
    fn on_waiting(&self, group_id: &str, waiting: &WaitingStart);

    /// A ready gate resolved; clients start playback together.
    fn on_play_at(&self, group_id: &str, play_at: &PlayAt);

    /// A member joined.
    fn on_member_joined(&self, group_id: &str, joined: &MemberJoined);

    /// A member left (with successor info when the host changed).
    fn on_member_left(&self, group_id: &str, left: &MemberLeft);

    /// The group terminated.
    fn on_group_ended(&self, group_id: &str, ended: &GroupEnded);
}

/// No-op sink for headless embedding or testing.
pub struct NoopEventSink;

impl GroupEventSink for NoopEventSink {
    fn on_group_state(&self, _group_id: &str, _state: &GroupSnapshot) {}
    fn on_playback_delta(&self, _group_id: &str, _delta: &PlaybackDelta) {}
    fn on_queue_delta(&self, _group_id: &str, _delta: &QueueDelta) {}
    fn on_waiting(&self, _group_id: &str, _waiting: &WaitingStart) {}
    fn on_play_at(&self, _group_id: &str, _play_at: &PlayAt) {}
    fn on_member_joined(&self, _group_id: &str, _joined: &MemberJoined) {}
    fn on_member_left(&self, _group_id: &str, _left: &MemberLeft) {}
    fn on_group_ended(&self, _group_id: &str, _ended: &GroupEnded) {}
}

/// Logging sink for debugging and development.
///
/// Logs every callback at debug level.
pub struct LoggingEventSink;

impl GroupEventSink for LoggingEventSink {
    fn on_group_state(&self, group_id: &str, state: &GroupSnapshot) {
        tracing::debug!(group_id, members = state.members.len(), "group_state");
    }

    fn on_playback_delta(&self, group_id: &str, delta: &PlaybackDelta) {
        tracing::debug!(group_id, ?delta, "playback_delta");
    }

    fn on_queue_delta(&self, group_id: &str, delta: &QueueDelta) {
        tracing::debug!(group_id, len = delta.queue.len(), "queue_delta");
    }

    fn on_waiting(&self, group_id: &str, waiting: &WaitingStart) {
        tracing::debug!(group_id, ?waiting, "waiting");
    }

    fn on_play_at(&self, group_id: &str, play_at: &PlayAt) {
        tracing::debug!(group_id, ?play_at, "play_at");
    }

    fn on_member_joined(&self, group_id: &str, joined: &MemberJoined) {
        tracing::debug!(group_id, ?joined, "member_joined");
    }

    fn on_member_left(&self, group_id: &str, left: &MemberLeft) {
        tracing::debug!(group_id, ?left, "member_left");
    }

    fn on_group_ended(&self, group_id: &str, ended: &GroupEnded) {
        tracing::debug!(group_id, ?ended, "group_ended");
    }
}
