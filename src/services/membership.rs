//! Membership lifecycle: join/leave, per-member socket presence, host
//! election, and the stale-connection sweep.
//!
//! Host succession is pure temporal order: the remaining member with the
//! smallest `joined_at` is promoted, ties broken by `user_id` ordering
//! (usernames may collide and are never consulted).

use std::sync::Arc;

use crate::error::GroupResult;
use crate::events::{GroupEnded, GroupEventSink, MemberJoined, MemberLeft};
use crate::model::{Group, GroupSnapshot, Member};
use crate::services::{GroupStore, ReadyGateCoordinator};
use crate::utils::now_millis;

/// Members with zero open sockets unseen for longer than this are eligible
/// for the stale sweep.
pub const STALE_MEMBER_AFTER_MS: u64 = 60_000;

/// Result of removing a member.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemovalOutcome {
    /// The group ended because its last member left.
    pub ended: bool,
    pub new_host_user_id: Option<String>,
    pub new_host_username: Option<String>,
}

/// What an in-lock removal decided; the store-level deletion happens after
/// the group lock is released.
enum Removal {
    UnknownMember,
    Ended,
    Removed(RemovalOutcome),
}

/// Join/leave, socket presence, and host election for groups.
pub struct MembershipController {
    store: Arc<GroupStore>,
    sink: Arc<dyn GroupEventSink>,
    gate: Arc<ReadyGateCoordinator>,
}

impl MembershipController {
    pub fn new(
        store: Arc<GroupStore>,
        sink: Arc<dyn GroupEventSink>,
        gate: Arc<ReadyGateCoordinator>,
    ) -> Self {
        Self { store, sink, gate }
    }

    /// Adds a member, or refreshes an existing one.
    ///
    /// Re-joining a group the user is already in updates the username and
    /// heartbeat and returns the snapshot without firing a join event.
    pub fn add_member(&self, id: &str, user_id: &str, username: &str) -> GroupResult<GroupSnapshot> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        let now = now_millis();

        if let Some(member) = group.member_mut(user_id) {
            member.username = username.to_string();
            member.last_heartbeat_at = now;
            group.dirty = true;
            return Ok(group.snapshot());
        }

        group.members.push(Member {
            user_id: user_id.to_string(),
            username: username.to_string(),
            is_host: false,
            joined_at: now,
            sockets: Default::default(),
            last_heartbeat_at: now,
        });
        group.dirty = true;
        log::info!("[Membership] User {} joined group {}", user_id, id);

        let snapshot = group.snapshot();
        self.sink.on_member_joined(
            id,
            &MemberJoined {
                user_id: user_id.to_string(),
                username: username.to_string(),
                joined_at: now,
            },
        );
        Ok(snapshot)
    }

    /// Removes a member, promoting a successor or disbanding as needed.
    ///
    /// An unknown group errors; an unknown member within a known group
    /// returns a quiet `{ended: false}`. Removing the last member ends the
    /// group; removing the host promotes the longest-standing remaining
    /// member. An open ready gate is re-evaluated against the shrunk
    /// connected set in the same call.
    pub fn remove_member(&self, id: &str, user_id: &str) -> GroupResult<RemovalOutcome> {
        let shared = self.store.require(id)?;
        let removal = {
            let mut group = shared.lock();
            self.apply_removal(&mut group, user_id)
        };
        match removal {
            Removal::UnknownMember => Ok(RemovalOutcome::default()),
            Removal::Ended => {
                self.store.remove(id);
                Ok(RemovalOutcome {
                    ended: true,
                    ..RemovalOutcome::default()
                })
            }
            Removal::Removed(outcome) => Ok(outcome),
        }
    }

    /// Registers a socket for a member (multi-device presence) and
    /// refreshes the heartbeat. Unknown members are ignored - connect races
    /// against removal are routine.
    pub fn add_socket(&self, id: &str, user_id: &str, socket_id: &str) -> GroupResult<()> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        let now = now_millis();
        if let Some(member) = group.member_mut(user_id) {
            member.sockets.insert(socket_id.to_string());
            member.last_heartbeat_at = now;
        }
        Ok(())
    }

    /// Drops a socket. A disconnect that empties a member's socket set
    /// shrinks the gate's connected set, so an open gate is re-evaluated.
    pub fn remove_socket(&self, id: &str, user_id: &str, socket_id: &str) -> GroupResult<()> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();
        let now = now_millis();

        let Some(member) = group.member_mut(user_id) else {
            return Ok(());
        };
        member.sockets.remove(socket_id);
        member.last_heartbeat_at = now;

        if !member.is_connected() {
            log::debug!(
                "[Membership] User {} fully disconnected from group {}",
                user_id,
                id
            );
            if let Some(gate) = group.ready_gate.as_mut() {
                gate.ready.remove(user_id);
            }
            self.gate.try_resolve_locked(&mut group);
        }
        Ok(())
    }

    /// Open sockets held by a member (0 for unknown members).
    pub fn socket_count(&self, id: &str, user_id: &str) -> GroupResult<usize> {
        let shared = self.store.require(id)?;
        let group = shared.lock();
        Ok(group.member(user_id).map(|m| m.sockets.len()).unwrap_or(0))
    }

    /// Members with at least one open socket.
    pub fn connected_member_count(&self, id: &str) -> GroupResult<usize> {
        let shared = self.store.require(id)?;
        let count = shared.lock().connected_member_count();
        Ok(count)
    }

    /// Removes members with zero open sockets unseen for longer than
    /// [`STALE_MEMBER_AFTER_MS`], applying the full removal path (host
    /// reassignment and gate recheck included).
    ///
    /// Driven by an external periodic sweep; the caller supplies "now" so
    /// the evaluation itself stays pure. Returns the removed user ids; an
    /// unknown group yields an empty list.
    pub fn cleanup_stale_members(&self, id: &str, now_ms: u64) -> Vec<String> {
        let mut removed = Vec::new();
        loop {
            let Some(shared) = self.store.shared(id) else {
                break;
            };
            let removal = {
                let mut group = shared.lock();
                let Some(user_id) = group
                    .members
                    .iter()
                    .find(|m| {
                        !m.is_connected()
                            && now_ms.saturating_sub(m.last_heartbeat_at) > STALE_MEMBER_AFTER_MS
                    })
                    .map(|m| m.user_id.clone())
                else {
                    break;
                };
                log::info!(
                    "[Membership] Sweeping stale member {} from group {}",
                    user_id,
                    id
                );
                removed.push(user_id.clone());
                self.apply_removal(&mut group, &user_id)
            };
            if matches!(removal, Removal::Ended) {
                self.store.remove(id);
                break;
            }
        }
        removed
    }

    /// Shared removal path for explicit leaves and the stale sweep.
    ///
    /// Fires `on_group_ended` or `on_member_left` and re-evaluates an open
    /// gate. Store-level deletion on `Ended` is the caller's job, after the
    /// group lock is released.
    fn apply_removal(&self, group: &mut Group, user_id: &str) -> Removal {
        let Some(idx) = group.members.iter().position(|m| m.user_id == user_id) else {
            return Removal::UnknownMember;
        };
        let departed = group.members.remove(idx);

        if group.members.is_empty() {
            log::info!("[Membership] Last member left group {}", group.id);
            group.close_gate();
            self.sink.on_group_ended(
                &group.id,
                &GroupEnded {
                    reason: "All members left".to_string(),
                },
            );
            return Removal::Ended;
        }

        let mut outcome = RemovalOutcome::default();
        if departed.is_host {
            // The member list is non-empty here, so a successor always exists.
            if let Some(successor) = group.members.iter_mut().min_by(|a, b| {
                a.joined_at
                    .cmp(&b.joined_at)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            }) {
                successor.is_host = true;
                outcome.new_host_user_id = Some(successor.user_id.clone());
                outcome.new_host_username = Some(successor.username.clone());
            }
            if let Some(new_host) = outcome.new_host_user_id.clone() {
                group.host_user_id = new_host;
                log::info!(
                    "[Membership] Promoted {} to host of group {} after {} left",
                    group.host_user_id,
                    group.id,
                    user_id
                );
            }
        }

        if let Some(gate) = group.ready_gate.as_mut() {
            gate.ready.remove(user_id);
        }
        group.dirty = true;

        self.sink.on_member_left(
            &group.id,
            &MemberLeft {
                user_id: user_id.to_string(),
                new_host_user_id: outcome.new_host_user_id.clone(),
                new_host_username: outcome.new_host_username.clone(),
            },
        );
        self.gate.try_resolve_locked(group);

        Removal::Removed(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GroupError;
    use crate::services::manager::tests::{manager_with_group, two_member_group};
    use crate::test_support::Recorded;

    #[test]
    fn join_fires_event_and_rejoin_refreshes_quietly() {
        let (manager, sink, _scheduler) = manager_with_group("g1", "host");

        let snap = manager.add_member("g1", "guest", "Guest").unwrap();
        assert_eq!(snap.members.len(), 2);
        assert!(!snap.members.iter().find(|m| m.user_id == "guest").unwrap().is_host);

        let snap = manager.add_member("g1", "guest", "Guest Renamed").unwrap();
        assert_eq!(snap.members.len(), 2);
        assert_eq!(
            snap.members.iter().find(|m| m.user_id == "guest").unwrap().username,
            "Guest Renamed"
        );

        let joins = sink
            .events()
            .iter()
            .filter(|e| matches!(e, Recorded::MemberJoined { .. }))
            .count();
        assert_eq!(joins, 1);
    }

    #[test]
    fn add_member_on_unknown_group_errors() {
        let (manager, _sink, _scheduler) = manager_with_group("g1", "host");
        assert!(matches!(
            manager.add_member("nope", "u", "U"),
            Err(GroupError::GroupNotFound(_))
        ));
    }

    #[test]
    fn unknown_member_removal_is_quietly_null() {
        let (manager, sink, _scheduler) = manager_with_group("g1", "host");
        let outcome = manager.remove_member("g1", "stranger").unwrap();
        assert!(!outcome.ended);
        assert!(outcome.new_host_user_id.is_none());
        assert!(sink.events().iter().all(|e| !matches!(e, Recorded::MemberLeft { .. })));
    }

    #[test]
    fn last_member_leaving_ends_the_group() {
        let (manager, sink, _scheduler) = manager_with_group("g1", "host");
        let outcome = manager.remove_member("g1", "host").unwrap();
        assert!(outcome.ended);
        assert!(!manager.has("g1"));
        assert_eq!(sink.ended_reasons(), vec!["All members left".to_string()]);
    }

    #[test]
    fn host_succession_is_temporal() {
        let (manager, _sink, _scheduler) = manager_with_group("g1", "host");
        manager.add_member("g1", "second", "Second").unwrap();
        manager.add_member("g1", "third", "Third").unwrap();

        let outcome = manager.remove_member("g1", "host").unwrap();
        assert!(!outcome.ended);
        assert_eq!(outcome.new_host_user_id.as_deref(), Some("second"));
        assert_eq!(outcome.new_host_username.as_deref(), Some("Second"));

        let snap = manager.snapshot_by_id("g1").unwrap();
        assert_eq!(snap.host_user_id, "second");
        let hosts: Vec<_> = snap.members.iter().filter(|m| m.is_host).collect();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].user_id, "second");
    }

    #[test]
    fn non_host_departure_keeps_the_host() {
        let (manager, _sink, _scheduler) = two_member_group("g1", "host", "guest");
        let outcome = manager.remove_member("g1", "guest").unwrap();
        assert!(!outcome.ended);
        assert!(outcome.new_host_user_id.is_none());
        assert_eq!(manager.snapshot_by_id("g1").unwrap().host_user_id, "host");
    }

    #[test]
    fn socket_presence_counts() {
        let (manager, _sink, _scheduler) = manager_with_group("g1", "host");
        manager.add_member("g1", "guest", "Guest").unwrap();

        // Nobody has opened a socket yet.
        assert_eq!(manager.connected_member_count("g1").unwrap(), 0);

        manager.add_socket("g1", "host", "h1").unwrap();
        assert_eq!(manager.connected_member_count("g1").unwrap(), 1);

        manager.add_socket("g1", "guest", "s1").unwrap();
        manager.add_socket("g1", "guest", "s2").unwrap();
        assert_eq!(manager.socket_count("g1", "guest").unwrap(), 2);
        assert_eq!(manager.connected_member_count("g1").unwrap(), 2);

        manager.remove_socket("g1", "guest", "s1").unwrap();
        assert_eq!(manager.socket_count("g1", "guest").unwrap(), 1);
        assert_eq!(manager.connected_member_count("g1").unwrap(), 2);

        manager.remove_socket("g1", "guest", "s2").unwrap();
        assert_eq!(manager.connected_member_count("g1").unwrap(), 1);
    }

    #[test]
    fn stale_sweep_removes_only_silent_disconnected_members() {
        let (manager, _sink, _scheduler) = two_member_group("g1", "host", "guest");
        manager.add_member("g1", "idle", "Idle").unwrap();
        // "idle" never opened a socket; "host"/"guest" are connected.

        let now = now_millis();
        assert!(manager.cleanup_stale_members("g1", now).is_empty());

        let removed = manager.cleanup_stale_members("g1", now + STALE_MEMBER_AFTER_MS + 1);
        assert_eq!(removed, vec!["idle".to_string()]);
        assert_eq!(manager.snapshot_by_id("g1").unwrap().members.len(), 2);
    }

    #[test]
    fn stale_sweep_can_end_and_promotes_like_removal() {
        let (manager, sink, _scheduler) = manager_with_group("g1", "host");
        manager.add_member("g1", "guest", "Guest").unwrap();
        manager.add_socket("g1", "guest", "s1").unwrap();

        // Host is disconnected and silent; guest stays connected and
        // inherits the group.
        let removed =
            manager.cleanup_stale_members("g1", now_millis() + STALE_MEMBER_AFTER_MS + 1);
        assert_eq!(removed, vec!["host".to_string()]);
        assert_eq!(manager.snapshot_by_id("g1").unwrap().host_user_id, "guest");

        // Now the guest goes silent too; the sweep disbands the group.
        manager.remove_socket("g1", "guest", "s1").unwrap();
        let removed =
            manager.cleanup_stale_members("g1", now_millis() + 2 * STALE_MEMBER_AFTER_MS);
        assert_eq!(removed, vec!["guest".to_string()]);
        assert!(!manager.has("g1"));
        assert_eq!(sink.ended_reasons(), vec!["All members left".to_string()]);
    }

    #[test]
    fn stale_sweep_on_unknown_group_is_empty() {
        let (manager, _sink, _scheduler) = manager_with_group("g1", "host");
        assert!(manager.cleanup_stale_members("nope", now_millis()).is_empty());
    }
}
