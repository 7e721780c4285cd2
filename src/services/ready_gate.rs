//! The synchronized-start barrier ("waiting room").
//!
//! When the host selects a track with autoplay, the group enters `waiting`
//! and every connected member must confirm buffering readiness before a
//! single `on_play_at` releases playback simultaneously. A timeout forces
//! the same resolution so one slow client can never wedge the group.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GroupResult;
use crate::events::{GroupEventSink, PlayAt, WaitingStart};
use crate::model::{Group, ReadyGate, SyncState};
use crate::services::GroupStore;
use crate::timer::TimerScheduler;
use crate::utils::now_millis;

/// How long a gate stays open before resolving as a forced fallback.
pub const READY_GATE_TIMEOUT: Duration = Duration::from_millis(8_000);

/// Manages ready gates: opening, readiness bookkeeping, and the single
/// resolution (confirmation, membership shrink, or timeout).
pub struct ReadyGateCoordinator {
    store: Arc<GroupStore>,
    sink: Arc<dyn GroupEventSink>,
    scheduler: Arc<dyn TimerScheduler>,
    timeout: Duration,
}

impl ReadyGateCoordinator {
    pub fn new(
        store: Arc<GroupStore>,
        sink: Arc<dyn GroupEventSink>,
        scheduler: Arc<dyn TimerScheduler>,
    ) -> Self {
        Self {
            store,
            sink,
            scheduler,
            timeout: READY_GATE_TIMEOUT,
        }
    }

    /// Opens a gate for the group's current track.
    ///
    /// Any prior gate is discarded (its timer cancelled, its ready set
    /// cleared) and the epoch advances, invalidating stale `report_ready`
    /// calls and in-flight timeouts tied to the previous gate.
    pub(crate) fn open_locked(&self, group: &mut Group) {
        group.close_gate();
        group.gate_epoch += 1;

        let epoch = group.gate_epoch;
        let track_index = group.playback.current_index;
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);
        let group_id = group.id.clone();

        let timer = self.scheduler.schedule(
            self.timeout,
            Box::new(move || Self::handle_timeout(&store, sink.as_ref(), &group_id, epoch)),
        );

        group.ready_gate = Some(ReadyGate {
            track_index,
            ready: HashSet::new(),
            epoch,
            timer: Some(timer),
        });
        group.sync_state = SyncState::Waiting;

        log::info!(
            "[ReadyGate] Opened gate for group {} track {} (epoch {})",
            group.id,
            track_index,
            epoch
        );
        self.sink
            .on_waiting(&group.id, &WaitingStart { track_index });
    }

    /// Records a member's buffering confirmation.
    ///
    /// Returns `true` exactly when this confirmation completed the gate.
    /// No-op (`false`) without an open gate or for a member that isn't
    /// currently connected.
    pub fn report_ready(&self, id: &str, user_id: &str) -> GroupResult<bool> {
        let shared = self.store.require(id)?;
        let mut group = shared.lock();

        if group.ready_gate.is_none() {
            return Ok(false);
        }
        let connected = group
            .member(user_id)
            .map(|m| m.is_connected())
            .unwrap_or(false);
        if !connected {
            log::debug!(
                "[ReadyGate] Ignoring readiness from disconnected user {} in group {}",
                user_id,
                id
            );
            return Ok(false);
        }

        if let Some(gate) = group.ready_gate.as_mut() {
            gate.ready.insert(user_id.to_string());
        }
        if Self::gate_covered(&group) {
            Self::resolve_locked(&mut group, self.sink.as_ref());
            return Ok(true);
        }
        Ok(false)
    }

    /// Re-evaluates an open gate after the connected set shrank, resolving
    /// it when the remaining members are already fully ready.
    ///
    /// Returns whether the gate resolved.
    pub(crate) fn try_resolve_locked(&self, group: &mut Group) -> bool {
        if group.ready_gate.is_some() && Self::gate_covered(group) {
            Self::resolve_locked(group, self.sink.as_ref());
            return true;
        }
        false
    }

    /// Whether the ready set covers every currently-connected member.
    ///
    /// The connected set is recomputed at every evaluation, never frozen at
    /// gate-open time. An empty connected set does not count as covered -
    /// the timeout remains the liveness fallback there.
    fn gate_covered(group: &Group) -> bool {
        let Some(gate) = group.ready_gate.as_ref() else {
            return false;
        };
        let connected = group.connected_member_ids();
        !connected.is_empty() && connected.iter().all(|id| gate.ready.contains(id))
    }

    /// Resolves the gate: cancels the timer, flips the group to playing, and
    /// fires the single `on_play_at`.
    fn resolve_locked(group: &mut Group, sink: &dyn GroupEventSink) {
        let Some(mut gate) = group.ready_gate.take() else {
            return;
        };
        if let Some(timer) = gate.timer.take() {
            timer.cancel();
        }
        group.playback.is_playing = true;
        group.sync_state = SyncState::Playing;
        group.playback.touch(now_millis());
        group.dirty = true;

        log::info!(
            "[ReadyGate] Resolved gate for group {} track {} at {}ms",
            group.id,
            gate.track_index,
            group.playback.position_ms
        );
        sink.on_play_at(
            &group.id,
            &PlayAt {
                track_index: gate.track_index,
                position_ms: group.playback.position_ms,
            },
        );
    }

    /// Timeout path. The epoch check makes a fire that lost the race against
    /// cancellation (or whose group was replaced) a harmless no-op, so
    /// exactly one `on_play_at` is emitted per gate.
    fn handle_timeout(store: &GroupStore, sink: &dyn GroupEventSink, id: &str, epoch: u64) {
        let Some(shared) = store.shared(id) else {
            return;
        };
        let mut group = shared.lock();
        match group.ready_gate.as_ref() {
            Some(gate) if gate.epoch == epoch => {
                log::warn!(
                    "[ReadyGate] Gate timed out for group {} track {}, forcing start",
                    id,
                    gate.track_index
                );
                Self::resolve_locked(&mut group, sink);
            }
            _ => {}
        }
    }
}
