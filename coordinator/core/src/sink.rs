//! Output Sinks
//!
//! Render commands sent from the coordinator to the face, and the sinks that
//! carry them.
//!
//! Delivery is fire-and-forget. A sink must never block the coordinator, and
//! a failed delivery is logged and dropped; it never feeds back into
//! coordinator state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// Commands understood by the render surface
///
/// Serialized with the render surface's own names, e.g.
/// `{"type":"change-expression","expression":"happy"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RenderCommand {
    /// Switch the face to an expression (unknown names render as idle)
    ChangeExpression {
        /// Expression name
        expression: String,
    },
    /// Replace the status line
    UpdateStatus {
        /// Status text
        status: String,
    },
    /// Blink once
    TriggerBlink,
    /// Move the eyes
    MoveEyes {
        /// Direction name
        direction: String,
    },
}

impl RenderCommand {
    /// The command's wire name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeExpression { .. } => "change-expression",
            Self::UpdateStatus { .. } => "update-status",
            Self::TriggerBlink => "trigger-blink",
            Self::MoveEyes { .. } => "move-eyes",
        }
    }

    /// The command's argument, if it has one
    #[must_use]
    pub fn argument(&self) -> Option<&str> {
        match self {
            Self::ChangeExpression { expression } => Some(expression),
            Self::UpdateStatus { status } => Some(status),
            Self::MoveEyes { direction } => Some(direction),
            Self::TriggerBlink => None,
        }
    }
}

/// An outward `{type, data}` event for telemetry consumers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    /// Event type
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload
    pub data: serde_json::Value,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
}

impl PublishedEvent {
    /// Mirror a render command as a published event
    #[must_use]
    pub fn from_command(command: &RenderCommand) -> Self {
        let data = command
            .argument()
            .map_or(serde_json::Value::Null, |arg| {
                serde_json::Value::String(arg.to_string())
            });
        Self {
            kind: command.name().to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Something that accepts render commands
///
/// Implementations must return promptly. Anything that can stall belongs
/// behind a channel.
pub trait OutputSink: Send {
    /// Deliver one command, best-effort
    fn deliver(&self, command: RenderCommand);
}

impl OutputSink for Box<dyn OutputSink> {
    fn deliver(&self, command: RenderCommand) {
        (**self).deliver(command);
    }
}

/// Sink backed by a bounded mpsc channel (embedded render surfaces)
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<RenderCommand>,
}

impl ChannelSink {
    /// Wrap an existing sender
    #[must_use]
    pub fn new(tx: mpsc::Sender<RenderCommand>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RenderCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl OutputSink for ChannelSink {
    fn deliver(&self, command: RenderCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                tracing::warn!(command = command.name(), "Render channel full, dropping command");
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                tracing::warn!(command = command.name(), "Render surface gone, dropping command");
            }
        }
    }
}

/// Sink that fans commands out to every subscribed render surface
#[derive(Clone, Debug)]
pub struct BroadcastSink {
    tx: broadcast::Sender<RenderCommand>,
}

impl BroadcastSink {
    /// Create a sink with the given per-subscriber buffer
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a new render surface
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RenderCommand> {
        self.tx.subscribe()
    }
}

impl OutputSink for BroadcastSink {
    fn deliver(&self, command: RenderCommand) {
        let name = command.name();
        if self.tx.send(command).is_err() {
            // No surface attached yet; the face simply has nobody to show it to
            tracing::debug!(command = name, "No render surface subscribed");
        }
    }
}

/// Sink that mirrors commands outward as [`PublishedEvent`]s
#[derive(Clone, Debug)]
pub struct TelemetrySink {
    tx: broadcast::Sender<PublishedEvent>,
}

impl TelemetrySink {
    /// Create a telemetry sink with the given per-subscriber buffer
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a telemetry consumer
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }
}

impl OutputSink for TelemetrySink {
    fn deliver(&self, command: RenderCommand) {
        let event = PublishedEvent::from_command(&command);
        if self.tx.send(event).is_err() {
            tracing::trace!(command = command.name(), "No telemetry subscriber");
        }
    }
}

/// Sink that forwards each command to several sinks in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn OutputSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with(mut self, sink: impl OutputSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Number of attached sinks
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl OutputSink for FanoutSink {
    fn deliver(&self, command: RenderCommand) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.deliver(command.clone());
            }
            last.deliver(command);
        }
    }
}

/// Sink that records every command in memory (headless runs and tests)
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    commands: Arc<Mutex<Vec<RenderCommand>>>,
}

impl MemorySink {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    #[must_use]
    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands.lock().clone()
    }

    /// Take everything recorded so far
    pub fn drain(&self) -> Vec<RenderCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Last expression sent, if any
    #[must_use]
    pub fn last_expression(&self) -> Option<String> {
        self.commands.lock().iter().rev().find_map(|c| match c {
            RenderCommand::ChangeExpression { expression } => Some(expression.clone()),
            _ => None,
        })
    }

    /// Last status sent, if any
    #[must_use]
    pub fn last_status(&self) -> Option<String> {
        self.commands.lock().iter().rev().find_map(|c| match c {
            RenderCommand::UpdateStatus { status } => Some(status.clone()),
            _ => None,
        })
    }
}

impl OutputSink for MemorySink {
    fn deliver(&self, command: RenderCommand) {
        self.commands.lock().push(command);
    }
}
