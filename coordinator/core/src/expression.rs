//! Face States and Status Text
//!
//! The finite set of visual modes the face can be in, and the short status
//! line that accompanies them.
//!
//! # Boundary Rules
//!
//! Internally the coordinator only ever holds a [`FaceState`]. At the render
//! boundary expressions travel as plain strings so that newer renderers can
//! understand names this crate does not know yet. [`FaceState::from_name`]
//! is permissive for operator input. [`FaceState::rendered`] follows the
//! renderer: only exact wire names are recognized, anything else shows as
//! [`FaceState::Idle`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Visual mode of the face
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FaceState {
    /// Neutral baseline
    #[default]
    Idle,
    /// Working on a request
    Thinking,
    /// Speaking a response
    Talking,
    /// Brief flourish after speaking
    Happy,
    /// Error or obstacle
    Surprised,
    /// Moving and looking around
    Scanning,
}

impl FaceState {
    /// All states, in declaration order
    pub const ALL: [FaceState; 6] = [
        Self::Idle,
        Self::Thinking,
        Self::Talking,
        Self::Happy,
        Self::Surprised,
        Self::Scanning,
    ];

    /// Wire name understood by the render surface
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Talking => "talking",
            Self::Happy => "happy",
            Self::Surprised => "surprised",
            Self::Scanning => "scanning",
        }
    }

    /// Parse a wire name (case-insensitive, surrounding whitespace ignored)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(name))
    }

    /// What a renderer shows for an arbitrary expression string
    ///
    /// Renderers compare names exactly, so `"HAPPY"` displays as idle.
    #[must_use]
    pub fn rendered(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == name)
            .unwrap_or_default()
    }
}

impl fmt::Display for FaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status line shown alongside the face
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusText(String);

impl StatusText {
    /// Shown while the assistant is listening
    pub const LISTENING: &'static str = "Listening...";
    /// Shown while a request is being processed
    pub const THINKING: &'static str = "Thinking...";
    /// Shown while a response is spoken
    pub const SPEAKING: &'static str = "Speaking...";
    /// Shown when idle
    pub const READY: &'static str = "Ready";
    /// Shown after an upstream error
    pub const ERROR: &'static str = "Error occurred";

    /// Create a status line from arbitrary text
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The idle status line
    #[must_use]
    pub fn ready() -> Self {
        Self::new(Self::READY)
    }

    /// Borrow the text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StatusText {
    fn default() -> Self {
        Self::ready()
    }
}

impl fmt::Display for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StatusText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for StatusText {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// The externally observable (state, status) pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceOutput {
    /// Current face state
    pub state: FaceState,
    /// Current status line
    pub status: StatusText,
}

impl FaceOutput {
    /// Build an output pair
    pub fn new(state: FaceState, status: impl Into<StatusText>) -> Self {
        Self {
            state,
            status: status.into(),
        }
    }
}
