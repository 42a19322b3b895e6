use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AutomationError;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Bounds applied to every tree traversal.
///
/// Host trees are mutated by another process and may contain cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalLimits {
    /// Nodes deeper than this are yielded but not expanded
    pub max_depth: usize,
    /// Hard cap on the number of nodes a single traversal yields
    pub max_nodes: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_nodes: 10_000,
        }
    }
}

/// Timing configuration for the crawler
///
/// All durations are in milliseconds. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Budget for a whole `crawl` call, unless the step overrides it
    pub step_timeout_ms: u64,
    /// Budget for a single attempt
    pub attempt_timeout_ms: u64,
    /// Budget for finding an acceptable window root within an attempt
    pub window_timeout_ms: u64,
    /// Delay between launching a window and looking for it
    pub settle_delay_ms: u64,
    /// Delay between rejected window roots
    pub window_poll_delay_ms: u64,
    /// Delay after a node recovery before searching again
    pub recovery_delay_ms: u64,
    /// Delay between node searches when the step has no recovery
    pub node_poll_delay_ms: u64,
    /// Delay between failed attempts
    pub retry_backoff_ms: u64,
    /// Attempt index (0-based) from which interference is cleared before the attempt
    pub clear_interference_after: u32,
    pub traversal: TraversalLimits,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 20_000,
            attempt_timeout_ms: 5_000,
            window_timeout_ms: 4_000,
            settle_delay_ms: 200,
            window_poll_delay_ms: 200,
            recovery_delay_ms: 200,
            node_poll_delay_ms: 100,
            retry_backoff_ms: 300,
            clear_interference_after: 1,
            traversal: TraversalLimits::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn from_json(json: &str) -> Result<Self, AutomationError> {
        let config: CrawlerConfig = serde_json::from_str(json)
            .map_err(|e| AutomationError::InvalidArgument(format!("Invalid crawler config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.step_timeout_ms == 0 || self.attempt_timeout_ms == 0 || self.window_timeout_ms == 0
        {
            return Err(AutomationError::InvalidArgument(
                "Timeouts must be greater than zero".to_string(),
            ));
        }
        if self.traversal.max_nodes == 0 {
            return Err(AutomationError::InvalidArgument(
                "traversal.max_nodes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = millis(timeout);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = millis(timeout);
        self
    }

    pub fn with_window_timeout(mut self, timeout: Duration) -> Self {
        self.window_timeout_ms = millis(timeout);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = millis(backoff);
        self
    }

    pub fn with_traversal(mut self, limits: TraversalLimits) -> Self {
        self.traversal = limits;
        self
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn window_timeout(&self) -> Duration {
        Duration::from_millis(self.window_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn window_poll_delay(&self) -> Duration {
        Duration::from_millis(self.window_poll_delay_ms)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    pub fn node_poll_delay(&self) -> Duration {
        Duration::from_millis(self.node_poll_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
