//! Host-gated mutation of queue and playback state.
//!
//! Every entry point validates host authority before touching anything, so a
//! rejected call never leaves partial state. Authoritative mutations bump
//! `state_version` and stamp `server_time`, keeping same-group mutations
//! totally ordered for the snapshot reconciler.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GroupError, GroupResult};
use crate::events::{GroupEventSink, PlaybackDelta, QueueDelta};
use crate::model::{Group, QueueItem, SyncState};
use crate::services::{GroupStore, ReadyGateCoordinator};
use crate::utils::now_millis;

/// `previous()` restarts the current track instead of moving back while the
/// position is beyond this threshold.
pub const PREVIOUS_RESTART_THRESHOLD_MS: u64 = 3_000;

/// A queue edit requested by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum QueueChange {
    /// Append items to the end of the queue.
    Add { items: Vec<QueueItem> },
    /// Remove the item at `index`.
    Remove { index: usize },
    /// Empty the queue.
    Clear,
}

impl QueueChange {
    /// Maps a transport-level action string onto a change, rejecting
    /// anything the engine doesn't support.
    pub fn parse(
        action: &str,
        items: Vec<QueueItem>,
        index: Option<usize>,
    ) -> GroupResult<Self> {
        match action {
            "add" => Ok(Self::Add { items }),
            "remove" => {
                let index =
                    index.ok_or_else(|| GroupError::UnsupportedQueueAction(action.into()))?;
                Ok(Self::Remove { index })
            }
            "clear" => Ok(Self::Clear),
            other => Err(GroupError::UnsupportedQueueAction(other.to_string())),
        }
    }
}

/// Result of `set_track`: whether the group entered the waiting room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTrackOutcome {
    pub waiting: bool,
    pub track_index: usize,
}

/// Host-gated playback and queue mutation.
pub struct PlaybackController {
    store: Arc<GroupStore>,
    sink: Arc<dyn GroupEventSink>,
    gate: Arc<ReadyGateCoordinator>,
}

/// Rejects any actor other than the group's current host.
pub(crate) fn require_host(group: &Group, actor_id: &str) -> GroupResult<()> {
    if group.host_user_id != actor_id {
        return Err(GroupError::NotHost(actor_id.to_string()));
    }
    Ok(())
}

impl PlaybackController {
    pub fn new(
        store: Arc<GroupStore>,
        sink: Arc<dyn GroupEventSink>,
        gate: Arc<ReadyGateCoordinator>,
    ) -> Self {
        Self { store, sink, gate }
    }

    /// Resumes playback. Returns the new playing flag.
    pub fn play(&self, id: &str, actor_id: &str) -> GroupResult<bool> {
        self.toggle(id, actor_id, true)
    }

    /// Pauses playback. Returns the new playing flag.
    pub fn pause(&self, id: &str, actor_id: &str) -> GroupResult<bool> {
        self.toggle(id, actor_id, false)
    }

    fn toggle(&self, id: &str, actor_id: &str, playing: bool) -> GroupResult<bool> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        require_host(&group, actor_id)?;

        group.playback.is_playing = playing;
        group.sync_state = SyncState::derive(playing, group.playback.queue.is_empty());
        self.commit_playback(id, &mut group);
        Ok(playing)
    }

    /// Seeks within the current track; the position is always clamped into
    /// `[0, duration]`. Returns the applied position.
    pub fn seek(&self, id: &str, actor_id: &str, position_ms: u64) -> GroupResult<u64> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        require_host(&group, actor_id)?;

        let limit = group
            .playback
            .current_track()
            .map(QueueItem::duration_ms)
            .unwrap_or(0);
        let clamped = position_ms.min(limit);
        group.playback.position_ms = clamped;
        self.commit_playback(id, &mut group);
        Ok(clamped)
    }

    /// Advances to the next track, wrapping past the end of the queue.
    /// Returns the new index.
    pub fn next(&self, id: &str, actor_id: &str) -> GroupResult<usize> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        require_host(&group, actor_id)?;

        let len = group.playback.queue.len();
        if len == 0 {
            return Err(GroupError::EmptyQueue);
        }
        group.playback.current_index = (group.playback.current_index + 1) % len;
        group.playback.position_ms = 0;
        self.commit_playback(id, &mut group);
        Ok(group.playback.current_index)
    }

    /// Restarts the current track when more than
    /// [`PREVIOUS_RESTART_THRESHOLD_MS`] has elapsed, otherwise steps back
    /// one track, wrapping before the start. Returns the new index.
    pub fn previous(&self, id: &str, actor_id: &str) -> GroupResult<usize> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        require_host(&group, actor_id)?;

        let len = group.playback.queue.len();
        if len == 0 {
            return Err(GroupError::EmptyQueue);
        }
        if group.playback.position_ms <= PREVIOUS_RESTART_THRESHOLD_MS {
            group.playback.current_index = (group.playback.current_index + len - 1) % len;
        }
        group.playback.position_ms = 0;
        self.commit_playback(id, &mut group);
        Ok(group.playback.current_index)
    }

    /// Applies a queue edit. All branches bump the version and fire a queue
    /// delta.
    pub fn modify_queue(
        &self,
        id: &str,
        actor_id: &str,
        change: QueueChange,
    ) -> GroupResult<QueueDelta> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        require_host(&group, actor_id)?;

        match change {
            QueueChange::Add { items } => {
                log::debug!(
                    "[Playback] Adding {} items to group {} queue",
                    items.len(),
                    id
                );
                group.playback.queue.extend(items);
            }
            QueueChange::Remove { index } => {
                let len = group.playback.queue.len();
                if index >= len {
                    return Err(GroupError::IndexOutOfRange { index, len });
                }
                group.playback.queue.remove(index);

                if group.playback.queue.is_empty() {
                    group.playback.current_index = 0;
                    group.playback.position_ms = 0;
                    group.playback.is_playing = false;
                    group.sync_state = SyncState::Idle;
                } else if index < group.playback.current_index {
                    group.playback.current_index -= 1;
                } else if index == group.playback.current_index {
                    // The playing slot vanished; the index now names the
                    // following track (clamped at the tail) from the top.
                    let last = group.playback.queue.len() - 1;
                    group.playback.current_index = group.playback.current_index.min(last);
                    group.playback.position_ms = 0;
                }
            }
            QueueChange::Clear => {
                group.playback.queue.clear();
                group.playback.current_index = 0;
                group.playback.position_ms = 0;
                group.playback.is_playing = false;
                group.sync_state = SyncState::Idle;
            }
        }

        group.playback.touch(now_millis());
        group.dirty = true;
        let delta = QueueDelta {
            queue: group.playback.queue.clone(),
            current_index: group.playback.current_index,
            sync_state: group.sync_state,
            state_version: group.playback.state_version,
        };
        self.sink.on_queue_delta(id, &delta);
        Ok(delta)
    }

    /// Jumps to a specific track.
    ///
    /// With `auto_play` the group enters the waiting room (`waiting: true`)
    /// and playback starts only once the ready gate resolves; otherwise the
    /// track is cued paused. Rejected while a gate is open for a different
    /// target index - two racing starts must not interleave.
    pub fn set_track(
        &self,
        id: &str,
        actor_id: &str,
        index: usize,
        auto_play: bool,
    ) -> GroupResult<SetTrackOutcome> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        require_host(&group, actor_id)?;

        let len = group.playback.queue.len();
        if len == 0 {
            return Err(GroupError::EmptyQueue);
        }
        if index >= len {
            return Err(GroupError::IndexOutOfRange { index, len });
        }
        if let Some(gate) = group.ready_gate.as_ref() {
            if gate.track_index != index {
                return Err(GroupError::GateConflict {
                    open_index: gate.track_index,
                });
            }
        }

        group.playback.current_index = index;
        group.playback.position_ms = 0;
        group.playback.is_playing = false;

        if auto_play {
            self.gate.open_locked(&mut group);
            self.commit_playback(id, &mut group);
            Ok(SetTrackOutcome {
                waiting: true,
                track_index: index,
            })
        } else {
            // A gate open for this same index is now obsolete: the host
            // re-cued the track paused, so nothing may force-start it later.
            group.close_gate();
            group.sync_state = SyncState::Paused;
            self.commit_playback(id, &mut group);
            Ok(SetTrackOutcome {
                waiting: false,
                track_index: index,
            })
        }
    }

    /// Records the mutation and fires the playback delta.
    fn commit_playback(&self, id: &str, group: &mut Group) {
        group.playback.touch(now_millis());
        group.dirty = true;
        self.sink.on_playback_delta(
            id,
            &PlaybackDelta {
                is_playing: group.playback.is_playing,
                position_ms: group.playback.position_ms,
                current_index: group.playback.current_index,
                sync_state: group.sync_state,
                state_version: group.playback.state_version,
                server_time: group.playback.server_time,
            },
        );
    }
}
