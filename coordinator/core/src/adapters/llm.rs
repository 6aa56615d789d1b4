//! Voice pipeline adapter
//!
//! Signal names are the pipeline's own: `listening`, `processing`,
//! `speaking-start`, `speaking-end`, `error`, `idle`, optionally prefixed with
//! `llm-`.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;

use super::EventSource;
use crate::events::LifecycleEvent;

/// Message used when an error signal carries nothing readable
pub const UNKNOWN_ERROR: &str = "unknown error";

/// One raw signal from the voice pipeline
#[derive(Clone, Debug, PartialEq)]
pub struct LlmSignal {
    /// Signal name
    pub name: String,
    /// Optional payload (only `error` uses it)
    pub payload: Option<Value>,
}

impl LlmSignal {
    /// A signal without payload
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    /// Attach a payload
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

fn error_message(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(map)) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => UNKNOWN_ERROR.to_string(),
        },
        Some(Value::Null) | None => UNKNOWN_ERROR.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Translate one signal, `None` if unrecognized
#[must_use]
pub fn translate(signal: &LlmSignal) -> Option<LifecycleEvent> {
    let name = signal.name.trim().to_ascii_lowercase();
    let name = name.strip_prefix("llm-").unwrap_or(&name);

    let event = match name {
        "listening" => LifecycleEvent::ListeningStarted,
        "processing" => LifecycleEvent::ProcessingStarted,
        "speaking-start" => LifecycleEvent::SpeakingStarted,
        "speaking-end" => LifecycleEvent::SpeakingEnded,
        "idle" => LifecycleEvent::IdleRequested,
        "error" => LifecycleEvent::ErrorOccurred {
            message: error_message(signal.payload.as_ref()),
        },
        _ => return None,
    };
    Some(event)
}

/// Adapter over any stream of [`LlmSignal`]s
pub struct LlmAdapter<S> {
    signals: S,
}

impl<S> LlmAdapter<S>
where
    S: Stream<Item = LlmSignal> + Unpin + Send,
{
    /// Wrap a signal stream
    pub fn new(signals: S) -> Self {
        Self { signals }
    }
}

#[async_trait]
impl<S> EventSource for LlmAdapter<S>
where
    S: Stream<Item = LlmSignal> + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn next_event(&mut self) -> Option<LifecycleEvent> {
        while let Some(signal) = self.signals.next().await {
            match translate(&signal) {
                Some(event) => return Some(event),
                None => tracing::warn!(signal = %signal.name, "Dropping unrecognized LLM signal"),
            }
        }
        None
    }
}
