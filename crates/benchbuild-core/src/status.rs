//! Dispatch status of a command.

use serde::{Deserialize, Serialize};

/// Where a command is in its dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Handed to the message bus.
    #[default]
    Submitted,
    /// Handler returned successfully, unit of work not yet committed.
    Handled,
    /// Unit of work committed.
    Committed,
    /// Handler failed; unit of work rolled back.
    Failed,
}

impl CommandStatus {
    /// Returns true if the dispatch is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    /// Returns true if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Handled)
                | (Self::Submitted, Self::Failed)
                | (Self::Handled, Self::Committed)
                | (Self::Handled, Self::Failed)
        )
    }
}
