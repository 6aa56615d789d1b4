//! Coordinator - The Expression State Authority
//!
//! The Coordinator is the only component that decides what the face shows.
//! It owns the [`CoordinatorSession`], applies the transition table to every
//! [`LifecycleEvent`], schedules and cancels revert timers, and pushes render
//! commands to an [`OutputSink`].
//!
//! # Serialization
//!
//! All mutation goes through one inbox, drained in arrival order by
//! [`Coordinator::run`]. Adapters, timers and the idle-blink ticker only ever
//! enqueue [`CoordinatorInput`]s; none of them touch the session directly.
//!
//! ```text
//!  LLM adapter ──┐
//!  Nav adapter ──┼──> inbox (mpsc, FIFO) ──> Coordinator ──> OutputSink
//!  Manual ───────┤                               │
//!  Revert timer ─┘ <──── schedule / cancel ──────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! let (sink, mut render_rx) = ChannelSink::channel(64);
//! let (handle, task) = Coordinator::spawn(CoordinatorConfig::default(), sink);
//!
//! let output = handle.handle(LifecycleEvent::ProcessingStarted).await?;
//! assert_eq!(output.state, FaceState::Thinking);
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::events::LifecycleEvent;
use crate::expression::{FaceOutput, FaceState, StatusText};
use crate::sink::{OutputSink, RenderCommand};
use crate::timer::{PendingRevert, RevertGuard, TimerId};

/// Coordinator timing and capacity settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Delay before the post-speech happy flourish reverts to idle
    pub happy_revert: Duration,
    /// Delay before the error face reverts to idle
    pub error_revert: Duration,
    /// Period of the idle blink, `None` to disable
    pub blink_interval: Option<Duration>,
    /// Inbox capacity
    pub inbox_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            happy_revert: Duration::from_millis(1000),
            error_revert: Duration::from_millis(2000),
            blink_interval: None,
            inbox_capacity: 256,
        }
    }
}

/// Errors from talking to a coordinator
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The coordinator task has stopped
    #[error("Coordinator is not running")]
    Closed,
}

/// Everything the coordinator inbox accepts
#[derive(Debug)]
pub enum CoordinatorInput {
    /// A lifecycle event, optionally with a reply slot for the resulting output
    Event {
        /// The event
        event: LifecycleEvent,
        /// Where to send the resulting output
        reply: Option<oneshot::Sender<FaceOutput>>,
    },
    /// A revert timer expired
    RevertDue(TimerId),
    /// The idle-blink ticker fired
    BlinkTick,
    /// Reply with the session as of every input queued ahead of this one
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Stop the coordinator loop
    Shutdown,
}

/// Live coordinator state
///
/// Owned exclusively by one [`Coordinator`]. Read-only views are available
/// through [`SessionSnapshot`].
#[derive(Debug, Default)]
pub struct CoordinatorSession {
    current_state: FaceState,
    expression: Option<String>,
    status: StatusText,
    is_processing: bool,
    is_speaking: bool,
    pending_revert: Option<PendingRevert>,
}

impl CoordinatorSession {
    /// Current face state
    #[must_use]
    pub fn current_state(&self) -> FaceState {
        self.current_state
    }

    /// Current status line
    #[must_use]
    pub fn status(&self) -> &StatusText {
        &self.status
    }

    /// Whether a request is being processed
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Whether a response is being spoken
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// The pending revert, if any
    #[must_use]
    pub fn pending_revert(&self) -> Option<&PendingRevert> {
        self.pending_revert.as_ref()
    }

    /// The (state, status) pair
    #[must_use]
    pub fn output(&self) -> FaceOutput {
        FaceOutput::new(self.current_state, self.status.clone())
    }

    /// Read-only copy for observers
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.current_state,
            expression: self
                .expression
                .clone()
                .unwrap_or_else(|| self.current_state.as_str().to_string()),
            status: self.status.clone(),
            is_processing: self.is_processing,
            is_speaking: self.is_speaking,
            revert_pending: self.pending_revert.is_some(),
        }
    }

    fn cancel_revert(&mut self) {
        if let Some(pending) = self.pending_revert.take() {
            tracing::debug!(timer = %pending.id(), "Cancelling pending revert");
            pending.cancel();
        }
    }
}

/// Read-only view of a [`CoordinatorSession`]
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    /// Current face state
    pub state: FaceState,
    /// Last expression string sent to the renderer
    pub expression: String,
    /// Current status line
    pub status: StatusText,
    /// Whether a request is being processed
    pub is_processing: bool,
    /// Whether a response is being spoken
    pub is_speaking: bool,
    /// Whether a revert timer is pending
    pub revert_pending: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        CoordinatorSession::default().snapshot()
    }
}

/// Whole milliseconds for logging, saturating
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Navigation state to face state
///
/// Total: anything not in the table maps to [`FaceState::Idle`].
#[must_use]
pub fn navigation_face(state: &str) -> FaceState {
    match state {
        "idle" => FaceState::Idle,
        "navigating" => FaceState::Scanning,
        "obstacle_detected" => FaceState::Surprised,
        "goal_reached" => FaceState::Happy,
        "planning" => FaceState::Thinking,
        _ => FaceState::Idle,
    }
}

/// Cloneable handle for feeding a running coordinator
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorInput>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl CoordinatorHandle {
    /// Enqueue an event without waiting for it to be handled
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the coordinator has stopped.
    pub async fn submit(&self, event: LifecycleEvent) -> Result<(), CoordinatorError> {
        self.tx
            .send(CoordinatorInput::Event { event, reply: None })
            .await
            .map_err(|_| CoordinatorError::Closed)
    }

    /// Enqueue an event and wait for the resulting (state, status)
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the coordinator has stopped.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<FaceOutput, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorInput::Event {
                event,
                reply: Some(reply),
            })
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Latest published session snapshot
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Snapshot taken after everything already queued has been handled
    ///
    /// Unlike [`CoordinatorHandle::snapshot`], this waits its turn in the
    /// inbox, so it reflects events this caller submitted before asking.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the coordinator has stopped.
    pub async fn query_snapshot(&self) -> Result<SessionSnapshot, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorInput::Snapshot(reply))
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Watch receiver for session snapshots
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Ask the coordinator to stop
    ///
    /// Events already queued ahead of the request are still handled.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the coordinator already stopped.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        self.tx
            .send(CoordinatorInput::Shutdown)
            .await
            .map_err(|_| CoordinatorError::Closed)
    }
}

/// The expression state coordinator
pub struct Coordinator<S: OutputSink> {
    /// Configuration
    config: CoordinatorConfig,
    /// Owned session state
    session: CoordinatorSession,
    /// Where render commands go
    sink: S,
    /// Weak loopback into our own inbox, for timers
    inbox: mpsc::WeakSender<CoordinatorInput>,
    /// Snapshot publisher
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Next timer id
    next_timer: u64,
}

impl<S: OutputSink + 'static> Coordinator<S> {
    /// Create a coordinator together with its handle and inbox
    ///
    /// Drive it by passing the inbox to [`Coordinator::run`], or call
    /// [`Coordinator::handle`] / [`Coordinator::dispatch`] directly.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        sink: S,
    ) -> (Self, CoordinatorHandle, mpsc::Receiver<CoordinatorInput>) {
        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
        let session = CoordinatorSession::default();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let coordinator = Self {
            config,
            session,
            sink,
            inbox: tx.downgrade(),
            snapshot_tx,
            next_timer: 0,
        };
        let handle = CoordinatorHandle {
            tx,
            snapshot: snapshot_rx,
        };

        (coordinator, handle, rx)
    }

    /// Create a coordinator and run it on a new task
    ///
    /// The task ends when every handle is dropped or on
    /// [`CoordinatorHandle::shutdown`], returning the final session.
    #[must_use]
    pub fn spawn(
        config: CoordinatorConfig,
        sink: S,
    ) -> (CoordinatorHandle, JoinHandle<CoordinatorSession>) {
        let (coordinator, handle, inbox) = Self::new(config, sink);
        let task = tokio::spawn(coordinator.run(inbox));
        (handle, task)
    }

    /// Current session
    pub fn session(&self) -> &CoordinatorSession {
        &self.session
    }

    /// Drain the inbox until shutdown or until every sender is gone
    pub async fn run(mut self, mut inbox: mpsc::Receiver<CoordinatorInput>) -> CoordinatorSession {
        let blink = self.config.blink_interval.map(|period| self.spawn_blink_ticker(period));
        tracing::info!(
            happy_revert_ms = millis(self.config.happy_revert),
            error_revert_ms = millis(self.config.error_revert),
            idle_blink = blink.is_some(),
            "Coordinator started"
        );

        while let Some(input) = inbox.recv().await {
            if matches!(input, CoordinatorInput::Shutdown) {
                tracing::info!("Coordinator shutdown requested");
                break;
            }
            self.dispatch(input);
        }

        if let Some(blink) = blink {
            blink.abort();
        }
        self.shutdown();
        self.session
    }

    /// Apply one inbox input
    pub fn dispatch(&mut self, input: CoordinatorInput) {
        match input {
            CoordinatorInput::Event { event, reply } => {
                let output = self.handle(event);
                if let Some(reply) = reply {
                    // Caller may have stopped waiting; the transition stands either way
                    let _ = reply.send(output);
                }
            }
            CoordinatorInput::RevertDue(id) => self.on_revert_due(id),
            CoordinatorInput::BlinkTick => self.on_blink_tick(),
            CoordinatorInput::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            CoordinatorInput::Shutdown => self.shutdown(),
        }
    }

    /// Apply one lifecycle event and return the resulting (state, status)
    ///
    /// Never fails. Must be called inside a Tokio runtime, since some
    /// transitions schedule a revert timer.
    pub fn handle(&mut self, event: LifecycleEvent) -> FaceOutput {
        tracing::debug!(
            event = event.kind(),
            origin = event.origin().as_str(),
            from = %self.session.current_state,
            "Handling event"
        );

        match event {
            LifecycleEvent::ListeningStarted => self.settle(StatusText::LISTENING),
            LifecycleEvent::IdleRequested => self.settle(StatusText::READY),
            LifecycleEvent::ProcessingStarted => {
                self.session.cancel_revert();
                self.session.is_processing = true;
                self.show(FaceState::Thinking);
                self.set_status(StatusText::THINKING);
            }
            LifecycleEvent::SpeakingStarted => {
                self.session.cancel_revert();
                self.session.is_speaking = true;
                self.session.is_processing = false;
                self.show(FaceState::Talking);
                self.set_status(StatusText::SPEAKING);
            }
            LifecycleEvent::SpeakingEnded => {
                self.session.is_speaking = false;
                self.show(FaceState::Happy);
                self.schedule_revert(RevertGuard::WhenQuiet, self.config.happy_revert);
            }
            LifecycleEvent::ErrorOccurred { message } => {
                tracing::warn!(error = %message, "Upstream error reported");
                self.session.is_processing = false;
                self.session.is_speaking = false;
                self.show(FaceState::Surprised);
                self.set_status(StatusText::ERROR);
                self.schedule_revert(RevertGuard::Always, self.config.error_revert);
            }
            LifecycleEvent::NavigationStateChanged { state } => {
                self.session.cancel_revert();
                let face = navigation_face(&state);
                tracing::debug!(navigation = %state, face = %face, "Navigation state mapped");
                self.show(face);
            }
            LifecycleEvent::ManualExpressionSet { expression } => {
                self.show_raw(expression);
            }
            LifecycleEvent::ManualBlink => {
                self.sink.deliver(RenderCommand::TriggerBlink);
            }
            LifecycleEvent::ManualHeadDirection { direction } => {
                self.sink.deliver(RenderCommand::MoveEyes { direction });
            }
            LifecycleEvent::ManualStatusSet { status } => {
                self.set_status(status);
            }
        }

        self.publish_snapshot();
        self.session.output()
    }

    /// Tear down: cancel the pending revert
    pub fn shutdown(&mut self) {
        self.session.cancel_revert();
        self.publish_snapshot();
    }

    /// Idle transition shared by listening, idle and fired reverts
    fn settle(&mut self, status: &str) {
        self.session.cancel_revert();
        self.session.is_processing = false;
        self.session.is_speaking = false;
        self.show(FaceState::Idle);
        self.set_status(status);
    }

    fn on_revert_due(&mut self, id: TimerId) {
        let Some(pending) = self.session.pending_revert.take_if(|p| p.id() == id) else {
            tracing::debug!(timer = %id, "Ignoring stale revert");
            return;
        };

        if !pending
            .guard()
            .allows(self.session.is_processing, self.session.is_speaking)
        {
            tracing::debug!(
                timer = %id,
                processing = self.session.is_processing,
                speaking = self.session.is_speaking,
                "Revert suppressed, work in progress"
            );
            return;
        }

        tracing::debug!(timer = %id, "Reverting to idle");
        self.settle(StatusText::READY);
        self.publish_snapshot();
    }

    fn on_blink_tick(&mut self) {
        if self.session.is_processing || self.session.is_speaking {
            tracing::trace!("Skipping idle blink, busy");
            return;
        }
        self.sink.deliver(RenderCommand::TriggerBlink);
    }

    fn schedule_revert(&mut self, guard: RevertGuard, delay: Duration) {
        self.session.cancel_revert();
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        tracing::debug!(timer = %id, ?guard, delay_ms = millis(delay), "Scheduling revert");
        self.session.pending_revert =
            Some(PendingRevert::schedule(id, guard, delay, self.inbox.clone()));
    }

    fn spawn_blink_ticker(&self, period: Duration) -> JoinHandle<()> {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(tx) = inbox.upgrade() else { break };
                // A full inbox means real work is queued; skip this blink
                if let Err(mpsc::error::TrySendError::Closed(_)) =
                    tx.try_send(CoordinatorInput::BlinkTick)
                {
                    break;
                }
            }
        })
    }

    fn show(&mut self, state: FaceState) {
        self.session.current_state = state;
        self.session.expression = None;
        self.sink.deliver(RenderCommand::ChangeExpression {
            expression: state.as_str().to_string(),
        });
    }

    /// Forward an operator-chosen expression verbatim; the session tracks what
    /// the renderer will actually display
    fn show_raw(&mut self, expression: String) {
        let state = FaceState::rendered(&expression);
        if state.as_str() != expression {
            tracing::warn!(expression = %expression, "Unknown expression, renderer will show idle");
        }
        self.session.current_state = state;
        self.session.expression = Some(expression.clone());
        self.sink
            .deliver(RenderCommand::ChangeExpression { expression });
    }

    fn set_status(&mut self, status: impl Into<StatusText>) {
        let status = status.into();
        self.sink.deliver(RenderCommand::UpdateStatus {
            status: status.as_str().to_string(),
        });
        self.session.status = status;
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    /// Coordinator driven by hand; the handle keeps the inbox open for timers
    fn coordinator() -> (
        Coordinator<MemorySink>,
        MemorySink,
        (CoordinatorHandle, mpsc::Receiver<CoordinatorInput>),
    ) {
        let sink = MemorySink::new();
        let (coordinator, handle, inbox) =
            Coordinator::new(CoordinatorConfig::default(), sink.clone());
        (coordinator, sink, (handle, inbox))
    }

    fn expression(name: &str) -> RenderCommand {
        RenderCommand::ChangeExpression {
            expression: name.to_string(),
        }
    }

    fn status(text: &str) -> RenderCommand {
        RenderCommand::UpdateStatus {
            status: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_initial_session_is_idle_ready() {
        let (coordinator, sink, _inbox) = coordinator();
        assert_eq!(coordinator.session().output(), FaceOutput::new(FaceState::Idle, "Ready"));
        assert!(!coordinator.session().is_processing());
        assert!(!coordinator.session().is_speaking());
        assert!(sink.commands().is_empty());
    }

    #[tokio::test]
    async fn test_listening_and_idle_statuses() {
        let (mut coordinator, sink, _inbox) = coordinator();

        let out = coordinator.handle(LifecycleEvent::ListeningStarted);
        assert_eq!(out, FaceOutput::new(FaceState::Idle, "Listening..."));

        let out = coordinator.handle(LifecycleEvent::IdleRequested);
        assert_eq!(out, FaceOutput::new(FaceState::Idle, "Ready"));

        assert_eq!(
            sink.commands(),
            vec![
                expression("idle"),
                status("Listening..."),
                expression("idle"),
                status("Ready"),
            ]
        );
    }

    #[tokio::test]
    async fn test_flag_bookkeeping() {
        let (mut coordinator, _sink, _inbox) = coordinator();

        coordinator.handle(LifecycleEvent::ProcessingStarted);
        assert!(coordinator.session().is_processing());

        coordinator.handle(LifecycleEvent::SpeakingStarted);
        assert!(!coordinator.session().is_processing());
        assert!(coordinator.session().is_speaking());

        coordinator.handle(LifecycleEvent::SpeakingEnded);
        assert!(!coordinator.session().is_speaking());

        coordinator.handle(LifecycleEvent::ProcessingStarted);
        coordinator.handle(LifecycleEvent::ErrorOccurred {
            message: "boom".to_string(),
        });
        assert!(!coordinator.session().is_processing());
        assert!(!coordinator.session().is_speaking());
    }

    #[tokio::test]
    async fn test_speaking_ended_keeps_status_and_schedules_guarded_revert() {
        let (mut coordinator, sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::SpeakingStarted);
        sink.drain();

        let out = coordinator.handle(LifecycleEvent::SpeakingEnded);
        assert_eq!(out, FaceOutput::new(FaceState::Happy, "Speaking..."));
        assert_eq!(sink.commands(), vec![expression("happy")]);

        let pending = coordinator.session().pending_revert().unwrap();
        assert_eq!(pending.guard(), RevertGuard::WhenQuiet);
        assert_eq!(pending.delay(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_error_schedules_unconditional_revert() {
        let (mut coordinator, _sink, _inbox) = coordinator();
        let out = coordinator.handle(LifecycleEvent::ErrorOccurred {
            message: "stt timeout".to_string(),
        });
        assert_eq!(out, FaceOutput::new(FaceState::Surprised, "Error occurred"));

        let pending = coordinator.session().pending_revert().unwrap();
        assert_eq!(pending.guard(), RevertGuard::Always);
        assert_eq!(pending.delay(), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_new_revert_replaces_old_one() {
        let (mut coordinator, _sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::SpeakingEnded);
        let first = coordinator.session().pending_revert().unwrap().id();

        coordinator.handle(LifecycleEvent::ErrorOccurred {
            message: "x".to_string(),
        });
        let second = coordinator.session().pending_revert().unwrap().id();
        assert_ne!(first, second);

        // The replaced timer's RevertDue is stale
        coordinator.dispatch(CoordinatorInput::RevertDue(first));
        assert_eq!(coordinator.session().current_state(), FaceState::Surprised);
        assert!(coordinator.session().pending_revert().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_fires_through_inbox() {
        let (mut coordinator, sink, (_handle, mut inbox)) = coordinator();
        coordinator.handle(LifecycleEvent::SpeakingEnded);
        sink.drain();

        let input = inbox.recv().await.unwrap();
        assert!(matches!(input, CoordinatorInput::RevertDue(_)));
        coordinator.dispatch(input);

        assert_eq!(coordinator.session().output(), FaceOutput::new(FaceState::Idle, "Ready"));
        assert!(coordinator.session().pending_revert().is_none());
        assert_eq!(sink.commands(), vec![expression("idle"), status("Ready")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_revert_suppressed_while_busy() {
        let (mut coordinator, _sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::SpeakingEnded);
        let id = coordinator.session().pending_revert().unwrap().id();

        // Busy flag set without touching the timer
        coordinator.session.is_processing = true;
        coordinator.dispatch(CoordinatorInput::RevertDue(id));

        assert_eq!(coordinator.session().current_state(), FaceState::Happy);
        assert!(coordinator.session().pending_revert().is_none());
    }

    #[tokio::test]
    async fn test_navigation_table() {
        let cases = [
            ("idle", FaceState::Idle),
            ("navigating", FaceState::Scanning),
            ("obstacle_detected", FaceState::Surprised),
            ("goal_reached", FaceState::Happy),
            ("planning", FaceState::Thinking),
            ("unknown_xyz", FaceState::Idle),
        ];
        for (input, expected) in cases {
            assert_eq!(navigation_face(input), expected, "navigation state {input}");
        }

        let (mut coordinator, sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::ProcessingStarted);
        sink.drain();

        let out = coordinator.handle(LifecycleEvent::NavigationStateChanged {
            state: "navigating".to_string(),
        });
        assert_eq!(out, FaceOutput::new(FaceState::Scanning, "Thinking..."));
        // Flags untouched, status untouched
        assert!(coordinator.session().is_processing());
        assert_eq!(sink.commands(), vec![expression("scanning")]);
    }

    #[tokio::test]
    async fn test_navigation_cancels_pending_revert() {
        let (mut coordinator, _sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::SpeakingEnded);
        coordinator.handle(LifecycleEvent::NavigationStateChanged {
            state: "goal_reached".to_string(),
        });
        assert!(coordinator.session().pending_revert().is_none());
    }

    #[tokio::test]
    async fn test_manual_expression_is_forwarded_verbatim() {
        let (mut coordinator, sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::SpeakingEnded);

        let out = coordinator.handle(LifecycleEvent::ManualExpressionSet {
            expression: "wink".to_string(),
        });
        assert_eq!(out.state, FaceState::Idle);
        assert_eq!(sink.last_expression().as_deref(), Some("wink"));
        assert_eq!(coordinator.session().snapshot().expression, "wink");
        // Manual expressions leave timers alone
        assert!(coordinator.session().pending_revert().is_some());

        let out = coordinator.handle(LifecycleEvent::ManualExpressionSet {
            expression: "surprised".to_string(),
        });
        assert_eq!(out.state, FaceState::Surprised);
    }

    #[tokio::test]
    async fn test_manual_expression_state_follows_exact_wire_name() {
        let (mut coordinator, sink, _inbox) = coordinator();

        let out = coordinator.handle(LifecycleEvent::ManualExpressionSet {
            expression: "HAPPY".to_string(),
        });
        assert_eq!(out.state, FaceState::Idle);
        assert_eq!(sink.last_expression().as_deref(), Some("HAPPY"));
        assert_eq!(coordinator.session().snapshot().expression, "HAPPY");
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_snapshot_input_replies_with_current_session() {
        let (mut coordinator, _sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::SpeakingStarted);

        let (reply, rx) = oneshot::channel();
        coordinator.dispatch(CoordinatorInput::Snapshot(reply));
        let snapshot = rx.await.unwrap();
        assert_eq!(snapshot.state, FaceState::Talking);
        assert!(snapshot.is_speaking);
    }

    #[tokio::test]
    async fn test_manual_cues_do_not_change_state() {
        let (mut coordinator, sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::ProcessingStarted);
        sink.drain();

        let before = coordinator.session().output();
        assert_eq!(coordinator.handle(LifecycleEvent::ManualBlink), before);
        assert_eq!(
            coordinator.handle(LifecycleEvent::ManualHeadDirection {
                direction: "left".to_string()
            }),
            before
        );
        assert_eq!(
            sink.commands(),
            vec![
                RenderCommand::TriggerBlink,
                RenderCommand::MoveEyes {
                    direction: "left".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_manual_status_override() {
        let (mut coordinator, sink, _inbox) = coordinator();
        let out = coordinator.handle(LifecycleEvent::ManualStatusSet {
            status: "Navigating to kitchen".to_string(),
        });
        assert_eq!(out, FaceOutput::new(FaceState::Idle, "Navigating to kitchen"));
        assert_eq!(sink.commands(), vec![status("Navigating to kitchen")]);
    }

    #[tokio::test]
    async fn test_blink_tick_only_when_quiet() {
        let (mut coordinator, sink, _inbox) = coordinator();
        coordinator.dispatch(CoordinatorInput::BlinkTick);
        assert_eq!(sink.drain(), vec![RenderCommand::TriggerBlink]);

        coordinator.handle(LifecycleEvent::SpeakingStarted);
        sink.drain();
        coordinator.dispatch(CoordinatorInput::BlinkTick);
        assert!(sink.commands().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_revert() {
        let (mut coordinator, _sink, _inbox) = coordinator();
        coordinator.handle(LifecycleEvent::ErrorOccurred {
            message: "x".to_string(),
        });
        coordinator.shutdown();
        assert!(coordinator.session().pending_revert().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_tracks_session() {
        let sink = MemorySink::new();
        let (mut coordinator, handle, _inbox) = Coordinator::new(CoordinatorConfig::default(), sink);
        assert_eq!(handle.snapshot(), SessionSnapshot::default());

        coordinator.handle(LifecycleEvent::SpeakingEnded);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, FaceState::Happy);
        assert_eq!(snapshot.expression, "happy");
        assert!(snapshot.revert_pending);
    }
}
