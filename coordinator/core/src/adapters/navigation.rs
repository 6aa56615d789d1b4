//! Navigation adapter
//!
//! Passes navigation state names through untouched. Mapping them to faces is
//! the coordinator's job.

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use super::EventSource;
use crate::events::LifecycleEvent;

/// Wrap one navigation state name
#[must_use]
pub fn translate(state: String) -> LifecycleEvent {
    LifecycleEvent::NavigationStateChanged { state }
}

/// Adapter over a stream of navigation state names
pub struct NavigationAdapter<S> {
    states: S,
}

impl<S> NavigationAdapter<S>
where
    S: Stream<Item = String> + Unpin + Send,
{
    /// Wrap a state stream
    pub fn new(states: S) -> Self {
        Self { states }
    }
}

#[async_trait]
impl<S> EventSource for NavigationAdapter<S>
where
    S: Stream<Item = String> + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "navigation"
    }

    async fn next_event(&mut self) -> Option<LifecycleEvent> {
        self.states.next().await.map(translate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_states_forwarded_verbatim() {
        let mut adapter = NavigationAdapter::new(futures::stream::iter(vec![
            "obstacle_detected".to_string(),
            "Warp_Drive".to_string(),
        ]));

        assert_eq!(
            adapter.next_event().await,
            Some(LifecycleEvent::NavigationStateChanged {
                state: "obstacle_detected".to_string()
            })
        );
        assert_eq!(
            adapter.next_event().await,
            Some(LifecycleEvent::NavigationStateChanged {
                state: "Warp_Drive".to_string()
            })
        );
        assert_eq!(adapter.next_event().await, None);
    }
}
