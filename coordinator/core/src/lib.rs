//! BayMax Core - Expression State Coordination for the BayMax Face
//!
//! This crate decides what the robot face shows. It turns lifecycle events
//! from the voice pipeline, the navigation stack and the control panel into
//! face states, status text and timed transitions, and emits render commands
//! for whatever surface draws the face.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       Event Sources                           │
//! │   ┌───────────┐    ┌──────────────┐    ┌─────────────────┐    │
//! │   │ LlmAdapter│    │NavAdapter    │    │ ManualAdapter   │    │
//! │   └─────┬─────┘    └──────┬───────┘    └────────┬────────┘    │
//! │         └─────────────────┼─────────────────────┘             │
//! │                    LifecycleEvent                             │
//! └───────────────────────────┼───────────────────────────────────┘
//!                             │  inbox (FIFO)
//! ┌───────────────────────────┼───────────────────────────────────┐
//! │                      Coordinator                              │
//! │   ┌──────────────────┐  ┌──────────────┐  ┌───────────────┐   │
//! │   │CoordinatorSession│  │ PendingRevert│  │ Idle blink    │   │
//! │   └──────────────────┘  └──────────────┘  └───────────────┘   │
//! └───────────────────────────┼───────────────────────────────────┘
//!                             │  RenderCommand
//! ┌───────────────────────────┼───────────────────────────────────┐
//! │   OutputSink: Channel / Broadcast / Telemetry / Memory        │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Coordinator`]: owns the session and applies transitions
//! - [`CoordinatorHandle`]: cloneable way in, plus session snapshots
//! - [`LifecycleEvent`]: normalized input events
//! - [`RenderCommand`]: output understood by the render surface
//! - [`FaceState`] / [`StatusText`]: what the face shows
//!
//! # Quick Start
//!
//! ```ignore
//! use baymax_core::{Coordinator, CoordinatorConfig, ChannelSink, LifecycleEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (sink, mut render_rx) = ChannelSink::channel(64);
//!     let (handle, _task) = Coordinator::spawn(CoordinatorConfig::default(), sink);
//!
//!     handle.submit(LifecycleEvent::ProcessingStarted).await.unwrap();
//!
//!     while let Some(command) = render_rx.recv().await {
//!         // draw it
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`adapters`]: raw signal translation (voice pipeline, navigation, control panel)
//! - [`config`]: TOML / environment / CLI configuration
//! - [`coordinator`]: the state authority
//! - [`events`]: lifecycle events
//! - [`expression`]: face states and status text
//! - [`sink`]: render commands and output sinks
//! - [`timer`]: revert timers
//! - [`transport`]: socket wire types and framing

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod expression;
pub mod sink;
pub mod timer;
pub mod transport;

pub use adapters::{
    forward, ControlCommand, EventSource, LlmAdapter, LlmSignal, ManualAdapter, NavigationAdapter,
};
pub use config::{
    default_config_path, default_socket_path, load_config, load_config_from_path, ConfigError,
    ConfigOverrides, ConfigSource, FaceConfig, FaceToml,
};
pub use coordinator::{
    navigation_face, Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorHandle,
    CoordinatorInput, CoordinatorSession, SessionSnapshot,
};
pub use events::{EventOrigin, LifecycleEvent};
pub use expression::{FaceOutput, FaceState, StatusText};
pub use sink::{
    BroadcastSink, ChannelSink, FanoutSink, MemorySink, OutputSink, PublishedEvent, RenderCommand,
    TelemetrySink,
};
pub use timer::{PendingRevert, RevertGuard, TimerId};
pub use transport::{ConnectionId, InboundFrame, OutboundFrame, Topic, TransportError};
