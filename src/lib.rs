//! Ensemble Core - group synchronization engine for Listen Together.
//!
//! This crate keeps a set of listeners playing the same queue in lockstep:
//! each group has one host with mutation authority, a shared queue, a
//! versioned playback block, and a synchronized-start barrier (the ready
//! gate) that holds playback until every connected member has buffered the
//! target track.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`model`]: Group, member, queue, and snapshot types
//! - [`services`]: The group store and the controllers composed by
//!   [`GroupManager`]
//! - [`events`]: Outward callback contract ([`GroupEventSink`]) and payloads
//! - [`timer`]: Timer scheduling abstraction for runtime independence
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! Two traits decouple the engine from its surroundings:
//!
//! - [`GroupEventSink`](events::GroupEventSink): receives every observable
//!   change; the transport collaborator fans payloads out to sockets
//! - [`TimerScheduler`](timer::TimerScheduler): schedules the ready-gate
//!   timeout; [`TokioScheduler`](timer::TokioScheduler) is the production
//!   implementation
//!
//! The engine itself is synchronous and runtime-agnostic; only the gate
//! timeout touches a runtime, and only through the scheduler trait.

#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod model;
pub mod services;
pub mod timer;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at the crate root
pub use error::{GroupError, GroupResult};
pub use events::{
    GroupEnded, GroupEventSink, LoggingEventSink, MemberJoined, MemberLeft, NoopEventSink, PlayAt,
    PlaybackDelta, QueueDelta, WaitingStart,
};
pub use model::{
    AlbumRef, ArtistRef, Group, GroupSnapshot, GroupType, Member, MemberSnapshot, PlaybackSnapshot,
    PlaybackState, ProviderRef, QueueItem, SyncState, Visibility,
};
pub use services::{
    snapshot_supersedes, CreateOptions, GroupManager, GroupStore, HydrateOptions, MemberSeed,
    MembershipController, PlaybackController, QueueChange, ReadyGateCoordinator, RemovalOutcome,
    SetTrackOutcome, SnapshotReconciler, PREVIOUS_RESTART_THRESHOLD_MS, READY_GATE_TIMEOUT,
    STALE_MEMBER_AFTER_MS,
};
pub use timer::{ScheduledTimer, TimerScheduler, TokioScheduler};
pub use utils::now_millis;
