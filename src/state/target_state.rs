/// Target state definitions for tracking traversal progress
///
/// Every crawl target moves through `Pending`, one of the two dispatch
/// states, and finally `Completed` or `Failed`.
use crate::GatherError;
use std::fmt;

/// Represents the current state of a crawl target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    // ===== Active States =====
    /// Target is waiting in the frontier
    Pending,

    /// Target is being fetched and expanded as a page
    DispatchedAsPage,

    /// Target has been handed to the download manager
    DispatchedAsArtifact,

    // ===== Terminal States =====
    /// Target was processed successfully
    Completed,

    /// Target could not be processed
    Failed,
}

impl TargetState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the target has been dispatched but not finished
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::DispatchedAsPage | Self::DispatchedAsArtifact)
    }

    /// Checks whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: TargetState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::DispatchedAsPage)
                | (Self::Pending, Self::DispatchedAsArtifact)
                | (Self::DispatchedAsPage, Self::Completed)
                | (Self::DispatchedAsPage, Self::Failed)
                | (Self::DispatchedAsArtifact, Self::Completed)
                | (Self::DispatchedAsArtifact, Self::Failed)
        )
    }

    /// Performs a transition, rejecting illegal ones
    ///
    /// # Returns
    ///
    /// * `Ok(TargetState)` - The new state
    /// * `Err(GatherError::InvalidTransition)` - The move is not allowed
    pub fn transition(self, next: TargetState) -> Result<TargetState, GatherError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GatherError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::DispatchedAsPage => "dispatched_as_page",
            Self::DispatchedAsArtifact => "dispatched_as_artifact",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
