use std::time::Duration;

use thiserror::Error;

use crate::step::BranchSignal;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Target is disabled: {0}")]
    DisabledTarget(String),

    #[error("Target is not clickable: {0}")]
    UnclickableTarget(String),

    #[error("Node is stale: {0}")]
    StaleNode(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Screen is unavailable: {0}")]
    ScreenUnavailable(String),

    #[error("Step aborted: {0}")]
    StepAborted(String),

    #[error("Plan aborted: {0}")]
    PlanAborted(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// Errors that must end the current crawl immediately instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::PlanAborted(_) | AutomationError::ScreenUnavailable(_)
        )
    }
}

/// Failure of a whole `crawl` call.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(
        "Step '{label}' failed after {attempts} attempts within {timeout:?}{}",
        .last_failure.as_ref().map(|e| format!(", last failure: {e}")).unwrap_or_default()
    )]
    Timeout {
        label: String,
        attempts: u32,
        timeout: Duration,
        last_failure: Option<AutomationError>,
    },

    /// Not a failure: the current strategy is wrong and an alternate route is proposed.
    #[error("Step requested a branch: {}", .0.reason)]
    Branch(BranchSignal),

    #[error("Step '{label}' aborted: {source}")]
    Aborted {
        label: String,
        #[source]
        source: AutomationError,
    },
}

impl CrawlError {
    pub fn is_branch(&self) -> bool {
        matches!(self, CrawlError::Branch(_))
    }

    pub fn into_branch(self) -> Option<BranchSignal> {
        match self {
            CrawlError::Branch(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            CrawlError::Timeout { label, .. } | CrawlError::Aborted { label, .. } => Some(label),
            CrawlError::Branch(_) => None,
        }
    }
}
