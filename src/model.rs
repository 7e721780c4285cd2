//! Core domain types for Listen Together groups.
//!
//! A [`Group`] is the unit of synchronization: a set of members playing the
//! same queue in lockstep under a single host. Groups live behind per-group
//! mutexes inside the [`GroupStore`](crate::services::GroupStore); everything
//! here is plain data plus small derivation helpers.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timer::ScheduledTimer;

/// How mutation authority is distributed within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupType {
    /// Only the host mutates playback; followers mirror.
    #[default]
    HostFollower,
    /// Reserved for shared-control groups; authority checks still apply.
    Collaborative,
}

/// Whether a group is discoverable without its join code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Coarse synchronization state of a group, as shown to clients.
///
/// `Waiting` means a ready gate is open and playback is held until every
/// connected member has confirmed buffering readiness (or the gate times out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Paused,
    Playing,
    Waiting,
}

impl SyncState {
    /// Derives the steady state from the playback flags.
    ///
    /// An empty queue is always `Idle`; otherwise the state mirrors
    /// `is_playing`. Never returns `Waiting` - gates are opened explicitly.
    pub fn derive(is_playing: bool, queue_empty: bool) -> Self {
        if queue_empty {
            Self::Idle
        } else if is_playing {
            Self::Playing
        } else {
            Self::Paused
        }
    }
}

/// Artist reference on a queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// Album reference on a queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRef {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
}

/// Where a track's media is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRef {
    pub source: String,
}

/// A single track in a group's shared queue.
///
/// Produced by the catalog collaborator; the engine treats it as opaque
/// except for `id` (derived track identity) and `duration_secs` (seek clamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub title: String,
    /// Track duration in whole seconds.
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    pub artist: ArtistRef,
    pub album: AlbumRef,
    pub media_source: String,
    pub provider: ProviderRef,
}

impl QueueItem {
    /// Duration in milliseconds, the unit all positions use.
    pub fn duration_ms(&self) -> u64 {
        self.duration_secs * 1000
    }
}

/// The authoritative playback block of a group.
///
/// `state_version` is bumped on every authoritative playback mutation and,
/// together with `server_time`, forms the last-writer-wins key used by the
/// snapshot reconciler.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub queue: Vec<QueueItem>,
    pub current_index: usize,
    pub is_playing: bool,
    pub position_ms: u64,
    pub state_version: u64,
    pub server_time: u64,
}

impl PlaybackState {
    /// The current track, if the queue is non-empty.
    pub fn current_track(&self) -> Option<&QueueItem> {
        self.queue.get(self.current_index)
    }

    /// Derived track id of the current queue slot.
    pub fn track_id(&self) -> Option<&str> {
        self.current_track().map(|t| t.id.as_str())
    }

    /// Records an authoritative mutation: bumps the version and stamps the
    /// wall clock.
    pub fn touch(&mut self, now_ms: u64) {
        self.state_version += 1;
        self.server_time = now_ms;
    }
}

/// A member of a group. A member may be connected from several devices at
/// once; presence is the union of its open sockets.
#[derive(Debug, Clone)]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub is_host: bool,
    pub joined_at: u64,
    pub sockets: HashSet<String>,
    pub last_heartbeat_at: u64,
}

impl Member {
    /// A member is connected while it has at least one open socket.
    pub fn is_connected(&self) -> bool {
        !self.sockets.is_empty()
    }
}

/// An open synchronized-start barrier.
///
/// `epoch` is unique per gate within a group; a timeout callback carries the
/// epoch it was scheduled for, so a fire that lost the race against
/// cancellation is recognizable and harmless.
pub struct ReadyGate {
    pub track_index: usize,
    pub ready: HashSet<String>,
    pub epoch: u64,
    pub timer: Option<Box<dyn ScheduledTimer>>,
}

impl fmt::Debug for ReadyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyGate")
            .field("track_index", &self.track_index)
            .field("ready", &self.ready)
            .field("epoch", &self.epoch)
            .field("timer", &self.timer.is_some())
            .finish()
    }
}

/// A Listen Together group.
///
/// Mutated exclusively through the service controllers while its per-group
/// mutex is held; never handed out by reference across the crate boundary
/// (external consumers see [`GroupSnapshot`] projections).
pub struct Group {
    pub id: String,
    pub name: String,
    pub join_code: String,
    pub group_type: GroupType,
    pub visibility: Visibility,
    pub host_user_id: String,
    pub created_at: u64,
    pub members: Vec<Member>,
    pub playback: PlaybackState,
    pub sync_state: SyncState,
    pub ready_gate: Option<ReadyGate>,
    /// Monotonic per-group gate counter; see [`ReadyGate::epoch`].
    pub gate_epoch: u64,
    /// Set on every mutation, cleared by the persistence drain.
    pub dirty: bool,
}

impl Group {
    /// Looks up a member by user id.
    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// Mutable member lookup.
    pub fn member_mut(&mut self, user_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    /// User ids of members that currently hold at least one open socket.
    pub fn connected_member_ids(&self) -> HashSet<String> {
        self.members
            .iter()
            .filter(|m| m.is_connected())
            .map(|m| m.user_id.clone())
            .collect()
    }

    /// Number of members with at least one open socket.
    pub fn connected_member_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_connected()).count()
    }

    /// Cancels a pending gate timer and drops the gate, if one is open.
    ///
    /// Cancellation is observable as the stored timer handle becoming `None`
    /// before the gate itself is dropped.
    pub fn close_gate(&mut self) {
        if let Some(gate) = self.ready_gate.as_mut() {
            if let Some(timer) = gate.timer.take() {
                timer.cancel();
            }
        }
        self.ready_gate = None;
    }

    /// Builds the immutable external projection of this group.
    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            group_id: self.id.clone(),
            name: self.name.clone(),
            join_code: self.join_code.clone(),
            group_type: self.group_type,
            visibility: self.visibility,
            host_user_id: self.host_user_id.clone(),
            created_at: self.created_at,
            sync_state: self.sync_state,
            members: self
                .members
                .iter()
                .map(|m| MemberSnapshot {
                    user_id: m.user_id.clone(),
                    username: m.username.clone(),
                    is_host: m.is_host,
                    joined_at: m.joined_at,
                    connected: m.is_connected(),
                })
                .collect(),
            playback: PlaybackSnapshot {
                queue: self.playback.queue.clone(),
                current_index: self.playback.current_index,
                is_playing: self.playback.is_playing,
                position_ms: self.playback.position_ms,
                track_id: self.playback.track_id().map(str::to_owned),
                state_version: self.playback.state_version,
                server_time: self.playback.server_time,
            },
        }
    }
}

/// Member projection inside a [`GroupSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub user_id: String,
    pub username: String,
    pub is_host: bool,
    pub joined_at: u64,
    pub connected: bool,
}

/// Playback projection inside a [`GroupSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub queue: Vec<QueueItem>,
    pub current_index: usize,
    pub is_playing: bool,
    pub position_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    pub state_version: u64,
    pub server_time: u64,
}

/// Immutable external projection of a group.
///
/// Used three ways: returned to transport handlers, drained by the
/// persistence collaborator via `dirty_groups`, and consumed by the
/// reconciler when a peer process publishes its copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    pub group_id: String,
    pub name: String,
    pub join_code: String,
    pub group_type: GroupType,
    pub visibility: Visibility,
    pub host_user_id: String,
    pub created_at: u64,
    pub sync_state: SyncState,
    pub members: Vec<MemberSnapshot>,
    pub playback: PlaybackSnapshot,
}
