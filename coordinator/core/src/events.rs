//! Lifecycle Events
//!
//! The normalized events that drive the coordinator. Adapters translate their
//! domain-specific signals into these; nothing else produces them.
//!
//! # Design Philosophy
//!
//! Event sources are dumb translators. They report what happened upstream
//! without deciding what the face should do about it. The coordinator owns
//! every decision.

use serde::{Deserialize, Serialize};

/// Where an event came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// Voice assistant / LLM pipeline
    Llm,
    /// Robot navigation stack
    Navigation,
    /// Control panel
    Manual,
}

impl EventOrigin {
    /// Short name for logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Navigation => "navigation",
            Self::Manual => "manual",
        }
    }
}

/// Events consumed by the coordinator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    // ============================================
    // Voice Assistant Lifecycle
    // ============================================
    /// The assistant started listening to the user
    ListeningStarted,

    /// The assistant started processing a request
    ProcessingStarted,

    /// The assistant started speaking its response
    SpeakingStarted,

    /// The assistant finished speaking
    SpeakingEnded,

    /// The upstream pipeline reported an error
    ErrorOccurred {
        /// Upstream error description
        message: String,
    },

    /// The assistant went back to idle
    IdleRequested,

    // ============================================
    // Navigation Lifecycle
    // ============================================
    /// The navigation stack changed state
    NavigationStateChanged {
        /// Raw navigation state name
        state: String,
    },

    // ============================================
    // Control Panel
    // ============================================
    /// Show an expression chosen by the operator
    ManualExpressionSet {
        /// Expression name, forwarded verbatim
        expression: String,
    },

    /// Blink once
    ManualBlink,

    /// Look in a direction
    ManualHeadDirection {
        /// Direction name, forwarded verbatim
        direction: String,
    },

    /// Replace the status line
    ManualStatusSet {
        /// Status text, forwarded verbatim
        status: String,
    },
}

impl LifecycleEvent {
    /// Which source produces this kind of event
    #[must_use]
    pub fn origin(&self) -> EventOrigin {
        match self {
            Self::ListeningStarted
            | Self::ProcessingStarted
            | Self::SpeakingStarted
            | Self::SpeakingEnded
            | Self::ErrorOccurred { .. }
            | Self::IdleRequested => EventOrigin::Llm,
            Self::NavigationStateChanged { .. } => EventOrigin::Navigation,
            Self::ManualExpressionSet { .. }
            | Self::ManualBlink
            | Self::ManualHeadDirection { .. }
            | Self::ManualStatusSet { .. } => EventOrigin::Manual,
        }
    }

    /// Stable name of the variant, used as a log field
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListeningStarted => "listening_started",
            Self::ProcessingStarted => "processing_started",
            Self::SpeakingStarted => "speaking_started",
            Self::SpeakingEnded => "speaking_ended",
            Self::ErrorOccurred { .. } => "error_occurred",
            Self::IdleRequested => "idle_requested",
            Self::NavigationStateChanged { .. } => "navigation_state_changed",
            Self::ManualExpressionSet { .. } => "manual_expression_set",
            Self::ManualBlink => "manual_blink",
            Self::ManualHeadDirection { .. } => "manual_head_direction",
            Self::ManualStatusSet { .. } => "manual_status_set",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_classification() {
        assert_eq!(LifecycleEvent::SpeakingEnded.origin(), EventOrigin::Llm);
        assert_eq!(
            LifecycleEvent::NavigationStateChanged {
                state: "planning".to_string()
            }
            .origin(),
            EventOrigin::Navigation
        );
        assert_eq!(LifecycleEvent::ManualBlink.origin(), EventOrigin::Manual);
    }

    #[test]
    fn test_serde_tagging() {
        let event = LifecycleEvent::ErrorOccurred {
            message: "tts crashed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "error_occurred");
        assert_eq!(json["message"], "tts crashed");

        let back: LifecycleEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
