//! Engine services: the group store plus the controllers composed by
//! [`GroupManager`].

pub mod group_store;
pub mod manager;
pub mod membership;
pub mod playback;
pub mod ready_gate;
pub mod reconciler;

pub use group_store::{CreateOptions, GroupStore, HydrateOptions, MemberSeed};
pub use manager::GroupManager;
pub use membership::{MembershipController, RemovalOutcome, STALE_MEMBER_AFTER_MS};
pub use playback::{
    PlaybackController, QueueChange, SetTrackOutcome, PREVIOUS_RESTART_THRESHOLD_MS,
};
pub use ready_gate::{ReadyGateCoordinator, READY_GATE_TIMEOUT};
pub use reconciler::{snapshot_supersedes, SnapshotReconciler};
