//! In-memory group table with lifecycle and dirty tracking.
//!
//! The store owns every [`Group`] behind a per-group mutex inside a
//! [`DashMap`]. Controllers fetch the shared handle, lock it for the
//! duration of one operation, and release - giving single-writer semantics
//! per group while unrelated groups proceed in parallel.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{GroupError, GroupResult};
use crate::model::{
    Group, GroupSnapshot, GroupType, Member, PlaybackState, QueueItem, SyncState, Visibility,
};
use crate::utils::{generate_join_code, now_millis};

/// Inputs for building a fresh group around its host.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub name: String,
    /// Generated when absent.
    pub join_code: Option<String>,
    pub group_type: GroupType,
    pub visibility: Visibility,
    pub host_user_id: String,
    pub host_username: String,
    pub queue: Vec<QueueItem>,
    pub current_index: usize,
    pub is_playing: bool,
    pub position_ms: u64,
}

/// A member row restored from persistence.
#[derive(Debug, Clone)]
pub struct MemberSeed {
    pub user_id: String,
    pub username: String,
    pub joined_at: u64,
}

/// Inputs for restoring a persisted group at cold start.
#[derive(Debug, Clone)]
pub struct HydrateOptions {
    pub name: String,
    pub join_code: String,
    pub group_type: GroupType,
    pub visibility: Visibility,
    pub host_user_id: String,
    pub created_at: u64,
    pub members: Vec<MemberSeed>,
    pub queue: Vec<QueueItem>,
    pub current_index: usize,
    /// The persisted playing flag. Treated as *intent* only - a hydrated
    /// group never resumes audio by itself.
    pub was_playing: bool,
    pub position_ms: u64,
    pub state_version: u64,
}

/// Owns the in-memory table of groups keyed by id.
pub struct GroupStore {
    groups: DashMap<String, Arc<Mutex<Group>>>,
}

impl GroupStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Builds a fresh group with its host as the only member.
    ///
    /// `state_version` starts at 0 and `sync_state` is derived from
    /// `is_playing` (or `idle` on an empty queue). The group is born dirty
    /// so the next persistence drain picks it up.
    pub fn create(&self, id: &str, opts: CreateOptions) -> GroupSnapshot {
        let now = now_millis();
        let host = Member {
            user_id: opts.host_user_id.clone(),
            username: opts.host_username,
            is_host: true,
            joined_at: now,
            sockets: HashSet::new(),
            last_heartbeat_at: now,
        };
        let queue_empty = opts.queue.is_empty();
        let current_index = if queue_empty { 0 } else { opts.current_index };
        let group = Group {
            id: id.to_string(),
            name: opts.name,
            join_code: opts.join_code.unwrap_or_else(generate_join_code),
            group_type: opts.group_type,
            visibility: opts.visibility,
            host_user_id: opts.host_user_id,
            created_at: now,
            members: vec![host],
            playback: PlaybackState {
                queue: opts.queue,
                current_index,
                is_playing: opts.is_playing,
                position_ms: opts.position_ms,
                state_version: 0,
                server_time: now,
            },
            sync_state: SyncState::derive(opts.is_playing, queue_empty),
            ready_gate: None,
            gate_epoch: 0,
            dirty: true,
        };
        let snapshot = group.snapshot();
        log::info!("[GroupStore] Created group {} ({})", id, snapshot.join_code);
        self.groups
            .insert(id.to_string(), Arc::new(Mutex::new(group)));
        snapshot
    }

    /// Restores a persisted group at cold start.
    ///
    /// Same construction path as [`create`](Self::create) but with an
    /// explicit `state_version` and member list. The playing flag is always
    /// forced off - no client presence is known at restart - while
    /// `sync_state` still reflects the persisted intent so transport/UI can
    /// show "was playing" without the engine resuming audio.
    pub fn hydrate(&self, id: &str, opts: HydrateOptions) -> GroupSnapshot {
        let now = now_millis();
        let queue_empty = opts.queue.is_empty();
        let members = opts
            .members
            .into_iter()
            .map(|seed| Member {
                is_host: seed.user_id == opts.host_user_id,
                user_id: seed.user_id,
                username: seed.username,
                joined_at: seed.joined_at,
                sockets: HashSet::new(),
                last_heartbeat_at: now,
            })
            .collect();
        let group = Group {
            id: id.to_string(),
            name: opts.name,
            join_code: opts.join_code,
            group_type: opts.group_type,
            visibility: opts.visibility,
            host_user_id: opts.host_user_id,
            created_at: opts.created_at,
            members,
            playback: PlaybackState {
                queue: opts.queue,
                current_index: if queue_empty { 0 } else { opts.current_index },
                is_playing: false,
                position_ms: opts.position_ms,
                state_version: opts.state_version,
                server_time: now,
            },
            sync_state: SyncState::derive(opts.was_playing, queue_empty),
            ready_gate: None,
            gate_epoch: 0,
            dirty: true,
        };
        let snapshot = group.snapshot();
        log::info!(
            "[GroupStore] Hydrated group {} (v{}, {} members)",
            id,
            snapshot.playback.state_version,
            snapshot.members.len()
        );
        self.groups
            .insert(id.to_string(), Arc::new(Mutex::new(group)));
        snapshot
    }

    /// Snapshot projection of a group, or `None` if it doesn't exist.
    pub fn get(&self, id: &str) -> Option<GroupSnapshot> {
        self.shared(id).map(|g| g.lock().snapshot())
    }

    /// Whether a group with the given id exists.
    pub fn has(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    /// Removes a group, cancelling any pending gate timer.
    ///
    /// Returns `true` if the group existed.
    pub fn remove(&self, id: &str) -> bool {
        match self.groups.remove(id) {
            Some((_, group)) => {
                group.lock().close_gate();
                log::info!("[GroupStore] Removed group {}", id);
                true
            }
            None => false,
        }
    }

    /// Ids of every live group.
    pub fn all_group_ids(&self) -> Vec<String> {
        self.groups.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshots of every group with unflushed mutations.
    ///
    /// The persistence collaborator drains this periodically and calls
    /// [`mark_clean`](Self::mark_clean) per flushed group; the cycle is
    /// at-least-once, not transactional.
    pub fn dirty_groups(&self) -> Vec<GroupSnapshot> {
        self.groups
            .iter()
            .filter_map(|r| {
                let group = r.value().lock();
                group.dirty.then(|| group.snapshot())
            })
            .collect()
    }

    /// Clears the dirty flag after a successful flush.
    pub fn mark_clean(&self, id: &str) {
        if let Some(group) = self.shared(id) {
            group.lock().dirty = false;
        }
    }

    /// Shared handle to a group for controllers. The handle outlives a
    /// concurrent `remove`; mutations on an orphaned group are simply lost.
    pub(crate) fn shared(&self, id: &str) -> Option<Arc<Mutex<Group>>> {
        self.groups.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Like [`shared`](Self::shared) but errors for operations that require
    /// an existing group.
    pub(crate) fn require(&self, id: &str) -> GroupResult<Arc<Mutex<Group>>> {
        self.shared(id)
            .ok_or_else(|| GroupError::GroupNotFound(id.to_string()))
    }
}

impl Default for GroupStore {
    fn default() -> Self {
        Self::new()
    }
}
