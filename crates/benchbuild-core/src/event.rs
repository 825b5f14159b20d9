//! Container lifecycle events.

use serde::{Deserialize, Serialize};

use crate::ids::ContainerId;

/// An immutable record of a container lifecycle outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The engine created a container.
    ContainerCreated {
        name: String,
        container_id: ContainerId,
        timestamp_ms: i64,
    },
    /// The container ran and exited successfully.
    ContainerStarted {
        container_id: ContainerId,
        timestamp_ms: i64,
    },
    /// The container could not be started or its command failed.
    ContainerStartFailed {
        name: String,
        container_id: ContainerId,
        message: String,
        timestamp_ms: i64,
    },
}

impl Event {
    /// Create a ContainerCreated event.
    pub fn container_created(name: impl Into<String>, container_id: ContainerId) -> Self {
        Self::ContainerCreated {
            name: name.into(),
            container_id,
            timestamp_ms: now_ms(),
        }
    }

    /// Create a ContainerStarted event.
    pub fn container_started(container_id: ContainerId) -> Self {
        Self::ContainerStarted {
            container_id,
            timestamp_ms: now_ms(),
        }
    }

    /// Create a ContainerStartFailed event.
    pub fn container_start_failed(
        name: impl Into<String>,
        container_id: ContainerId,
        message: impl Into<String>,
    ) -> Self {
        Self::ContainerStartFailed {
            name: name.into(),
            container_id,
            message: message.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// Kind of this event, used to route it to event handlers.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ContainerCreated { .. } => EventKind::ContainerCreated,
            Self::ContainerStarted { .. } => EventKind::ContainerStarted,
            Self::ContainerStartFailed { .. } => EventKind::ContainerStartFailed,
        }
    }

    /// Container this event concerns.
    pub fn container_id(&self) -> &ContainerId {
        match self {
            Self::ContainerCreated { container_id, .. }
            | Self::ContainerStarted { container_id, .. }
            | Self::ContainerStartFailed { container_id, .. } => container_id,
        }
    }

    /// Returns true for the outcome of a start attempt.
    pub fn is_start_outcome(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::ContainerStarted | EventKind::ContainerStartFailed
        )
    }
}

/// Type of container lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ContainerCreated,
    ContainerStarted,
    ContainerStartFailed,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_started() {
        let event = Event::container_started(ContainerId::new("abc"));

        assert_eq!(event.kind(), EventKind::ContainerStarted);
        assert_eq!(event.container_id().as_str(), "abc");
        assert!(event.is_start_outcome());
    }

    #[test]
    fn test_container_start_failed() {
        let event = Event::container_start_failed("box", ContainerId::new("abc"), "boom");

        match &event {
            Event::ContainerStartFailed {
                name,
                message,
                timestamp_ms,
                ..
            } => {
                assert_eq!(name, "box");
                assert_eq!(message, "boom");
                assert!(*timestamp_ms > 0);
            }
            other => panic!("Expected ContainerStartFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_created_is_not_start_outcome() {
        let event = Event::container_created("box", ContainerId::new("abc"));
        assert_eq!(event.kind(), EventKind::ContainerCreated);
        assert!(!event.is_start_outcome());
    }

    #[test]
    fn test_serialized_tag() {
        let event = Event::container_started(ContainerId::new("abc"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "container_started");
        assert_eq!(json["container_id"], "abc");
    }
}
