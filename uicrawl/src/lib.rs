//! Step-driven automation of third-party UI trees
//!
//! This crate walks accessibility trees owned by another process, waits for
//! the right window, finds a target node and acts on it. Each unit of work is
//! a declarative [`Step`]; the [`Crawler`] runs steps under nested timeouts
//! with retry and backoff, and a step's tests can redirect the surrounding
//! [`Plan`] through a [`BranchSignal`].

pub mod common;
pub mod config;
pub mod crawler;
pub mod errors;
pub mod node;
pub mod plan;
pub mod platforms;
pub mod snapshot;
pub mod step;
#[cfg(test)]
mod tests;
pub mod tree;

pub use config::{CrawlerConfig, TraversalLimits};
pub use crawler::{CrawlReport, Crawler, StepOutcome};
pub use errors::{AutomationError, CrawlError};
pub use node::{Bounds, Node, NodeAction, NodeImpl};
pub use plan::{Plan, PlanReport};
pub use platforms::{Host, ScreenState, TreeEvent, TreeEventKind, WindowIntent};
pub use snapshot::{NodeAttributes, NodeSnapshot};
pub use step::{BranchSignal, Check, Step};
pub use tree::{crawl, crawl_with_limits, CrawlNode};
