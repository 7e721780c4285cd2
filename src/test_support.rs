//! Shared test doubles: a recording event sink, a manually-driven timer
//! scheduler, and small data builders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::events::{
    GroupEnded, GroupEventSink, MemberJoined, MemberLeft, PlayAt, PlaybackDelta, QueueDelta,
    WaitingStart,
};
use crate::model::{AlbumRef, ArtistRef, GroupSnapshot, ProviderRef, QueueItem};
use crate::timer::{ScheduledTimer, TimerScheduler};

/// Builds a queue item with the given track id and duration in seconds.
pub(crate) fn track(id: &str, duration_secs: u64) -> QueueItem {
    QueueItem {
        id: id.to_string(),
        title: format!("Track {id}"),
        duration_secs,
        artist: ArtistRef {
            id: format!("artist-{id}"),
            name: "Test Artist".into(),
        },
        album: AlbumRef {
            id: format!("album-{id}"),
            title: "Test Album".into(),
            cover_art: None,
        },
        media_source: format!("/media/{id}"),
        provider: ProviderRef {
            source: "local".into(),
        },
    }
}

/// Every callback the engine can fire, captured in order.
#[derive(Debug, Clone)]
pub(crate) enum Recorded {
    GroupState { group_id: String },
    PlaybackDelta { group_id: String, is_playing: bool, current_index: usize },
    QueueDelta { group_id: String, len: usize },
    Waiting { group_id: String, track_index: usize },
    PlayAt { group_id: String, track_index: usize, position_ms: u64 },
    MemberJoined { group_id: String, user_id: String },
    MemberLeft { group_id: String, user_id: String, new_host: Option<String> },
    GroupEnded { group_id: String, reason: String },
}

/// Sink that records every callback for later assertion.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn play_at_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Recorded::PlayAt { .. }))
            .count()
    }

    pub fn last_play_at(&self) -> Option<(usize, u64)> {
        self.events.lock().iter().rev().find_map(|e| match e {
            Recorded::PlayAt { track_index, position_ms, .. } => {
                Some((*track_index, *position_ms))
            }
            _ => None,
        })
    }

    pub fn ended_reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::GroupEnded { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
    }
}

impl GroupEventSink for RecordingSink {
    fn on_group_state(&self, group_id: &str, _state: &GroupSnapshot) {
        self.push(Recorded::GroupState { group_id: group_id.into() });
    }

    fn on_playback_delta(&self, group_id: &str, delta: &PlaybackDelta) {
        self.push(Recorded::PlaybackDelta {
            group_id: group_id.into(),
            is_playing: delta.is_playing,
            current_index: delta.current_index,
        });
    }

    fn on_queue_delta(&self, group_id: &str, delta: &QueueDelta) {
        self.push(Recorded::QueueDelta {
            group_id: group_id.into(),
            len: delta.queue.len(),
        });
    }

    fn on_waiting(&self, group_id: &str, waiting: &WaitingStart) {
        self.push(Recorded::Waiting {
            group_id: group_id.into(),
            track_index: waiting.track_index,
        });
    }

    fn on_play_at(&self, group_id: &str, play_at: &PlayAt) {
        self.push(Recorded::PlayAt {
            group_id: group_id.into(),
            track_index: play_at.track_index,
            position_ms: play_at.position_ms,
        });
    }

    fn on_member_joined(&self, group_id: &str, joined: &MemberJoined) {
        self.push(Recorded::MemberJoined {
            group_id: group_id.into(),
            user_id: joined.user_id.clone(),
        });
    }

    fn on_member_left(&self, group_id: &str, left: &MemberLeft) {
        self.push(Recorded::MemberLeft {
            group_id: group_id.into(),
            user_id: left.user_id.clone(),
            new_host: left.new_host_user_id.clone(),
        });
    }

    fn on_group_ended(&self, group_id: &str, ended: &GroupEnded) {
        self.push(Recorded::GroupEnded {
            group_id: group_id.into(),
            reason: ended.reason.clone(),
        });
    }
}

struct PendingTimer {
    task: Option<Box<dyn FnOnce() + Send>>,
    cancelled: Arc<AtomicBool>,
}

struct ManualTimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTimer for ManualTimerHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Scheduler that holds timers until the test fires them explicitly.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    pending: Mutex<Vec<PendingTimer>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of timers scheduled so far (fired, cancelled, or pending).
    pub fn scheduled_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether the most recently scheduled timer was cancelled.
    pub fn last_cancelled(&self) -> bool {
        self.pending
            .lock()
            .last()
            .map(|t| t.cancelled.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Fires every pending, non-cancelled timer in scheduling order.
    ///
    /// Tasks run on the calling thread with no locks held by the scheduler,
    /// mirroring how a runtime timer fires outside of any engine call.
    pub fn fire_all(&self) {
        loop {
            let task = {
                let mut pending = self.pending.lock();
                pending.iter_mut().find_map(|t| {
                    if t.cancelled.load(Ordering::SeqCst) {
                        t.task = None;
                        None
                    } else {
                        t.task.take()
                    }
                })
            };
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl TimerScheduler for ManualScheduler {
    fn schedule(&self, _delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduledTimer> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.pending.lock().push(PendingTimer {
            task: Some(task),
            cancelled: cancelled.clone(),
        });
        Box::new(ManualTimerHandle { cancelled })
    }
}
