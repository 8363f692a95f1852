use thiserror::Error;

use crate::GroupId;

#[derive(Debug, Error)]
pub enum GroupError {
    /// Swipe/continue could not work out who wrote the last message.
    #[error("no group member found to regenerate the last message")]
    NoMemberFound,
    #[error("group generation aborted")]
    GenerationAborted,
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("failed to dispatch generation: {0}")]
    Dispatch(#[from] anyhow::Error),
}

impl GroupError {
    /// Errors that the caller asked for (stop button) rather than real failures.
    pub fn is_abort(&self) -> bool {
        matches!(self, GroupError::GenerationAborted)
    }
}
