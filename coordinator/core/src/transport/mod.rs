//! Transport Layer for Face Clients
//!
//! Wire types and framing for the daemon's Unix socket. Upstream systems (the
//! voice pipeline, the navigation stack, the control panel) push signals in;
//! render surfaces and telemetry consumers subscribe to what comes out.
//!
//! # Security
//!
//! - Socket files are created with 0600 permissions
//! - Peers running under a different UID are rejected (`SO_PEERCRED`)
//! - Frame sizes are capped before any buffer is allocated

pub mod frame;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::coordinator::SessionSnapshot;
use crate::sink::{PublishedEvent, RenderCommand};

pub use frame::{encode, read_frame, write_frame, FrameDecoder, FrameEncoder, MAX_FRAME_SIZE};

/// Errors from the socket transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A frame exceeded [`MAX_FRAME_SIZE`]
    #[error("Frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Limit in force
        max: usize,
    },

    /// The payload did not match its CRC32
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the header
        expected: u32,
        /// Checksum of the received payload
        actual: u32,
    },

    /// The peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Unique identifier for one client connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound streams a client can subscribe to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Render commands
    Render,
    /// Published telemetry events
    Events,
}

/// Frames sent by clients
///
/// Tagged by `channel`, e.g. `{"channel":"llm","signal":"processing"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Voice pipeline signal
    Llm {
        /// Signal name, e.g. `speaking-start` or `llm-error`
        signal: String,
        /// Optional payload (error message)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },

    /// Navigation state change
    Navigation {
        /// Raw navigation state name
        state: String,
    },

    /// Control panel command
    Control {
        /// Command name, e.g. `set-expression`
        command: String,
        /// Command argument
        #[serde(default, skip_serializing_if = "Option::is_none")]
        argument: Option<String>,
    },

    /// Start receiving outbound topics on this connection
    Subscribe {
        /// Requested topics
        topics: Vec<Topic>,
    },

    /// Ask for the current session snapshot
    Status,
}

/// Frames sent to clients
///
/// Tagged by `topic`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A render command for the face
    Render {
        /// The command
        command: RenderCommand,
    },

    /// A published telemetry event
    Event {
        /// The event
        event: PublishedEvent,
    },

    /// Reply to a status request
    Status {
        /// Current session snapshot
        snapshot: SessionSnapshot,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let formatted = ConnectionId::new().to_string();
        assert!(formatted.starts_with("conn-"));
        // conn- (5) + hyphenated UUID (36)
        assert_eq!(formatted.len(), 41);
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn test_inbound_frames_parse() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"channel":"llm","signal":"speaking-start"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Llm {
                signal: "speaking-start".to_string(),
                payload: None
            }
        );

        let frame: InboundFrame = serde_json::from_str(
            r#"{"channel":"control","command":"set-expression","argument":"happy"}"#,
        )
        .unwrap();
        assert!(matches!(frame, InboundFrame::Control { argument: Some(ref a), .. } if a == "happy"));

        let frame: InboundFrame =
            serde_json::from_str(r#"{"channel":"subscribe","topics":["render","events"]}"#)
                .unwrap();
        assert_eq!(
            frame,
            InboundFrame::Subscribe {
                topics: vec![Topic::Render, Topic::Events]
            }
        );

        let frame: InboundFrame = serde_json::from_str(r#"{"channel":"status"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Status);
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let result: Result<InboundFrame, _> =
            serde_json::from_str(r#"{"channel":"telepathy","signal":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_outbound_render_shape() {
        let frame = OutboundFrame::Render {
            command: RenderCommand::ChangeExpression {
                expression: "happy".to_string(),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["topic"], "render");
        assert_eq!(json["command"]["type"], "change-expression");
        assert_eq!(json["command"]["expression"], "happy");
    }
}
