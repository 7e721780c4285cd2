//! Outward notification contract for the group engine.
//!
//! This module provides:
//! - [`GroupEventSink`] trait the engine invokes after every observable change
//! - payload types for each callback, serialized camelCase for the wire
//!
//! The transport collaborator owns the sink implementation and fans payloads
//! out to each member's sockets; the engine never touches sockets itself.

mod sink;

pub use sink::{GroupEventSink, LoggingEventSink, NoopEventSink};

use serde::Serialize;

use crate::model::{QueueItem, SyncState};

/// A member joined a group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberJoined {
    pub user_id: String,
    pub username: String,
    pub joined_at: u64,
}

/// A member left a group (voluntarily, or via the stale sweep).
///
/// When the departing member was the host, the new host fields carry the
/// promoted successor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberLeft {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_host_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_host_username: Option<String>,
}

/// Incremental playback change (play/pause/seek/track navigation).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackDelta {
    pub is_playing: bool,
    pub position_ms: u64,
    pub current_index: usize,
    pub sync_state: SyncState,
    pub state_version: u64,
    pub server_time: u64,
}

/// Queue contents changed (add/remove/clear).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDelta {
    pub queue: Vec<QueueItem>,
    pub current_index: usize,
    pub sync_state: SyncState,
    pub state_version: u64,
}

/// A ready gate opened: clients should buffer the target track and call
/// `report_ready` once playable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingStart {
    pub track_index: usize,
}

/// A ready gate resolved: every client starts playback of `track_index` at
/// `position_ms` now. Emitted exactly once per gate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayAt {
    pub track_index: usize,
    pub position_ms: u64,
}

/// A group terminated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEnded {
    pub reason: String,
}
