//! Event Source Adapters
//!
//! Each adapter wraps a stream of raw, domain-specific signals and yields
//! [`LifecycleEvent`]s. Adapters never hold coordinator state and never decide
//! what the face shows; unrecognized input is logged and dropped right here.
//!
//! # Adding a Source
//!
//! Implement [`EventSource`] and hand it to [`forward`] on its own task:
//!
//! ```ignore
//! let source = LlmAdapter::new(ReceiverStream::new(llm_rx));
//! tokio::spawn(adapters::forward(source, handle.clone()));
//! ```
//!
//! Callers that must keep several sources in one order (a socket connection
//! carrying all three kinds of signal) use the per-module `translate`
//! functions and submit the results themselves.

pub mod llm;
pub mod manual;
pub mod navigation;

use async_trait::async_trait;

use crate::coordinator::CoordinatorHandle;
use crate::events::LifecycleEvent;

pub use llm::{LlmAdapter, LlmSignal};
pub use manual::{ControlCommand, ManualAdapter};
pub use navigation::NavigationAdapter;

/// A lazy sequence of lifecycle events
#[async_trait]
pub trait EventSource: Send {
    /// Short source name for logs
    fn name(&self) -> &'static str;

    /// Next translated event, or `None` once the underlying stream ends
    async fn next_event(&mut self) -> Option<LifecycleEvent>;
}

/// Pump `source` into the coordinator until either side ends
///
/// Returns the number of events forwarded.
pub async fn forward<E: EventSource>(mut source: E, handle: CoordinatorHandle) -> u64 {
    let name = source.name();
    let mut forwarded = 0u64;

    while let Some(event) = source.next_event().await {
        if handle.submit(event).await.is_err() {
            tracing::warn!(source = name, "Coordinator closed, stopping adapter");
            break;
        }
        forwarded += 1;
    }

    tracing::debug!(source = name, forwarded, "Event source finished");
    forwarded
}
