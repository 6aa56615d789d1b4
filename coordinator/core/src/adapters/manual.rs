//! Control panel adapter
//!
//! Commands: `set-expression <name>`, `blink`, `head-direction <direction>`,
//! `set-status <text>`. Arguments are not validated; the render surface
//! decides what an unknown expression or direction looks like.

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use super::EventSource;
use crate::events::LifecycleEvent;

/// One raw control panel command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlCommand {
    /// Command name
    pub command: String,
    /// Command argument, if the command takes one
    pub argument: Option<String>,
}

impl ControlCommand {
    /// A command without argument
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            argument: None,
        }
    }

    /// A command with an argument
    pub fn with_argument(command: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            argument: Some(argument.into()),
        }
    }
}

/// Translate one command, `None` if unknown or missing its argument
#[must_use]
pub fn translate(command: &ControlCommand) -> Option<LifecycleEvent> {
    let argument = command.argument.clone();
    match command.command.trim().to_ascii_lowercase().as_str() {
        "set-expression" => argument.map(|expression| LifecycleEvent::ManualExpressionSet { expression }),
        "blink" => Some(LifecycleEvent::ManualBlink),
        "head-direction" => argument.map(|direction| LifecycleEvent::ManualHeadDirection { direction }),
        "set-status" => argument.map(|status| LifecycleEvent::ManualStatusSet { status }),
        _ => None,
    }
}

/// Adapter over any stream of [`ControlCommand`]s
pub struct ManualAdapter<S> {
    commands: S,
}

impl<S> ManualAdapter<S>
where
    S: Stream<Item = ControlCommand> + Unpin + Send,
{
    /// Wrap a command stream
    pub fn new(commands: S) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl<S> EventSource for ManualAdapter<S>
where
    S: Stream<Item = ControlCommand> + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn next_event(&mut self) -> Option<LifecycleEvent> {
        while let Some(command) = self.commands.next().await {
            match translate(&command) {
                Some(event) => return Some(event),
                None => tracing::warn!(
                    command = %command.command,
                    has_argument = command.argument.is_some(),
                    "Dropping invalid control command"
                ),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation() {
        assert_eq!(
            translate(&ControlCommand::with_argument("set-expression", "wink")),
            Some(LifecycleEvent::ManualExpressionSet {
                expression: "wink".to_string()
            })
        );
        assert_eq!(
            translate(&ControlCommand::new("blink")),
            Some(LifecycleEvent::ManualBlink)
        );
        assert_eq!(
            translate(&ControlCommand::with_argument("head-direction", "up")),
            Some(LifecycleEvent::ManualHeadDirection {
                direction: "up".to_string()
            })
        );
        assert_eq!(
            translate(&ControlCommand::with_argument("set-status", "Charging")),
            Some(LifecycleEvent::ManualStatusSet {
                status: "Charging".to_string()
            })
        );
    }

    #[test]
    fn test_missing_argument_or_unknown_command() {
        assert_eq!(translate(&ControlCommand::new("set-expression")), None);
        assert_eq!(translate(&ControlCommand::new("head-direction")), None);
        assert_eq!(translate(&ControlCommand::new("self-destruct")), None);
    }

    #[tokio::test]
    async fn test_adapter_drops_invalid_commands() {
        let mut adapter = ManualAdapter::new(futures::stream::iter(vec![
            ControlCommand::new("set-expression"),
            ControlCommand::new("blink"),
        ]));

        assert_eq!(adapter.next_event().await, Some(LifecycleEvent::ManualBlink));
        assert_eq!(adapter.next_event().await, None);
    }
}
