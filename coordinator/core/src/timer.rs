//! Revert Timers
//!
//! Delayed, cancelable transitions back to the idle baseline.
//!
//! A timer never touches coordinator state itself. When it expires it posts
//! [`CoordinatorInput::RevertDue`] into the coordinator inbox, so the revert is
//! serialized behind every event that arrived before it. The coordinator then
//! checks the timer id against its pending timer: a mismatch means the timer
//! was replaced or cancelled after it fired, and the revert is dropped.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::coordinator::CoordinatorInput;

/// Identifies one scheduled revert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer_{}", self.0)
    }
}

/// Condition checked when a revert fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevertGuard {
    /// Revert only if nothing is processing or speaking at fire time
    WhenQuiet,
    /// Revert regardless of what happened meanwhile
    Always,
}

impl RevertGuard {
    /// Whether the revert may proceed given the current flags
    #[must_use]
    pub fn allows(&self, is_processing: bool, is_speaking: bool) -> bool {
        match self {
            Self::WhenQuiet => !is_processing && !is_speaking,
            Self::Always => true,
        }
    }
}

/// A scheduled revert that has not fired yet
#[derive(Debug)]
pub struct PendingRevert {
    id: TimerId,
    guard: RevertGuard,
    delay: Duration,
    handle: AbortHandle,
}

impl PendingRevert {
    /// Spawn the timer task
    ///
    /// The task holds only a weak inbox sender, so a pending timer never keeps
    /// a stopped coordinator alive. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn schedule(
        id: TimerId,
        guard: RevertGuard,
        delay: Duration,
        inbox: mpsc::WeakSender<CoordinatorInput>,
    ) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match inbox.upgrade() {
                Some(tx) => {
                    if tx.send(CoordinatorInput::RevertDue(id)).await.is_err() {
                        tracing::debug!(timer = %id, "Coordinator stopped before revert fired");
                    }
                }
                None => tracing::debug!(timer = %id, "Coordinator gone, revert dropped"),
            }
        });

        Self {
            id,
            guard,
            delay,
            handle: task.abort_handle(),
        }
    }

    /// Timer id
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Guard evaluated on fire
    #[must_use]
    pub fn guard(&self) -> RevertGuard {
        self.guard
    }

    /// Delay the timer was scheduled with
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel the timer
    ///
    /// If the task already posted its `RevertDue`, the coordinator drops that
    /// input because the id no longer matches.
    pub fn cancel(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_semantics() {
        assert!(RevertGuard::WhenQuiet.allows(false, false));
        assert!(!RevertGuard::WhenQuiet.allows(true, false));
        assert!(!RevertGuard::WhenQuiet.allows(false, true));
        assert!(RevertGuard::Always.allows(true, true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_posts_revert_due_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let pending = PendingRevert::schedule(
            TimerId(7),
            RevertGuard::Always,
            Duration::from_millis(1000),
            tx.downgrade(),
        );
        assert_eq!(pending.delay(), Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(rx.try_recv().is_err());

        let input = rx.recv().await.unwrap();
        assert!(matches!(input, CoordinatorInput::RevertDue(TimerId(7))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let pending = PendingRevert::schedule(
            TimerId(1),
            RevertGuard::WhenQuiet,
            Duration::from_millis(500),
            tx.downgrade(),
        );
        pending.cancel();

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(rx.try_recv().is_err());
    }
}
