//! Centralized error type for the Ensemble core library.
//!
//! A single [`GroupError`] covers every rejection the engine can produce.
//! Validation always happens before mutation, so a returned error never
//! leaves partial state behind. Missing-entity behavior is deliberately
//! non-uniform across the API (see the service docs): group-requiring
//! operations error, `remove_member` on an unknown member returns a
//! null-result value, and `force_end` / `snapshot_by_id` degrade silently.

use serde::Serialize;
use thiserror::Error;

/// Rejection reasons for group operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum GroupError {
    /// No group with the given id exists.
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// The acting user is not the group's host.
    #[error("User {0} is not the host")]
    NotHost(String),

    /// A queue index fell outside the current queue bounds.
    #[error("Index {index} out of range (queue length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The operation needs a non-empty queue.
    #[error("Queue is empty")]
    EmptyQueue,

    /// The transport passed a queue action string the engine doesn't know.
    #[error("Unsupported queue action: {0}")]
    UnsupportedQueueAction(String),

    /// A ready gate is already open for a different target track.
    #[error("A ready gate is already open for track {open_index}")]
    GateConflict { open_index: usize },
}

impl GroupError {
    /// Machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::GroupNotFound(_) => "group_not_found",
            Self::NotHost(_) => "not_host",
            Self::IndexOutOfRange { .. } => "invalid_index",
            Self::EmptyQueue => "empty_queue",
            Self::UnsupportedQueueAction(_) => "unsupported_queue_action",
            Self::GateConflict { .. } => "gate_conflict",
        }
    }
}

/// Convenient Result alias for group operations.
pub type GroupResult<T> = Result<T, GroupError>;
