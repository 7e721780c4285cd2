//! Timer scheduling abstraction for runtime independence.
//!
//! The ready gate needs exactly one deferred capability: run a closure after
//! a delay unless cancelled first. Modeling it as a [`TimerScheduler`] trait
//! keeps the engine free of direct runtime calls and lets tests drive gate
//! timeouts deterministically instead of sleeping.

use std::time::Duration;

/// Handle to a scheduled timer.
///
/// Dropping the handle does not cancel the timer; cancellation is explicit.
pub trait ScheduledTimer: Send + Sync {
    /// Cancels the timer. Safe to call after the timer has already fired;
    /// a fire that raced cancellation is the callee's problem to detect
    /// (the gate epoch serves that purpose).
    fn cancel(&self);
}

/// Abstraction for scheduling cancellable deferred work.
pub trait TimerScheduler: Send + Sync {
    /// Runs `task` after `delay` unless the returned handle is cancelled.
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduledTimer>;
}

/// Tokio-based scheduler for production use.
///
/// Spawns a sleep-then-run task on the given runtime handle; cancellation
/// aborts the task.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Creates a scheduler for the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

struct TokioTimer {
    join: tokio::task::JoinHandle<()>,
}

impl ScheduledTimer for TokioTimer {
    fn cancel(&self) {
        self.join.abort();
    }
}

impl TimerScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduledTimer> {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTimer { join })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tokio_scheduler_fires_after_delay() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();

        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || fired_clone.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_timer_does_not_fire() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();

        let timer = scheduler.schedule(
            Duration::from_millis(20),
            Box::new(move || fired_clone.store(true, Ordering::SeqCst)),
        );
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
