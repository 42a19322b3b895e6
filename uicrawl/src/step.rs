use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::errors::AutomationError;
use crate::node::Node;
use crate::platforms::{TreeEvent, WindowIntent};

/// Result of a window or node test.
///
/// `Err` is not a failure: it carries a [`BranchSignal`] that aborts the
/// current step and hands an alternate route to whoever runs the plan.
pub type Check = Result<bool, BranchSignal>;

pub type EventFilter = Arc<dyn Fn(&TreeEvent) -> bool + Send + Sync>;
pub type NodeTest = Arc<dyn Fn(&Node) -> Check + Send + Sync>;
pub type NodeRecovery = Arc<dyn Fn(Node) -> BoxFuture<'static, bool> + Send + Sync>;
pub type NodeMapping = Arc<dyn Fn(&Node) -> Result<Node, AutomationError> + Send + Sync>;
pub type StepAction =
    Arc<dyn Fn(Node, u32) -> BoxFuture<'static, Result<bool, AutomationError>> + Send + Sync>;

/// Abort the current strategy and continue with an alternate route instead.
#[derive(Clone)]
pub struct BranchSignal {
    pub reason: String,
    /// Steps to run in place of the invalidated ones
    pub alt_route: Vec<Step>,
    /// How many of the steps following the current one the alternate route replaces
    pub invalid_steps: usize,
}

impl BranchSignal {
    pub fn new(reason: impl Into<String>, alt_route: Vec<Step>, invalid_steps: usize) -> Self {
        Self {
            reason: reason.into(),
            alt_route,
            invalid_steps,
        }
    }
}

impl fmt::Debug for BranchSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchSignal")
            .field("reason", &self.reason)
            .field(
                "alt_route",
                &self.alt_route.iter().map(|s| s.label()).collect::<Vec<_>>(),
            )
            .field("invalid_steps", &self.invalid_steps)
            .finish()
    }
}

impl fmt::Display for BranchSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} alternate steps, {} invalidated)",
            self.reason,
            self.alt_route.len(),
            self.invalid_steps
        )
    }
}

/// Declarative description of one automation unit
///
/// Built once, then handed to [`crate::Crawler::crawl`]. Cloning is cheap;
/// all callbacks are shared.
#[derive(Clone)]
pub struct Step {
    label: String,
    source: String,
    window_intent: Option<WindowIntent>,
    window_event_filter: Option<EventFilter>,
    window_node_test: Option<NodeTest>,
    node_test: Option<NodeTest>,
    node_recovery: Option<NodeRecovery>,
    node_mapping: Option<NodeMapping>,
    action: Option<StepAction>,
    timeout: Option<Duration>,
}

impl Step {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: String::new(),
            window_intent: None,
            window_event_filter: None,
            window_node_test: None,
            node_test: None,
            node_recovery: None,
            node_mapping: None,
            action: None,
            timeout: None,
        }
    }

    /// Tag of whatever generated the step, for logs
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn window_intent(mut self, intent: WindowIntent) -> Self {
        self.window_intent = Some(intent);
        self
    }

    pub fn window_event_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&TreeEvent) -> bool + Send + Sync + 'static,
    {
        self.window_event_filter = Some(Arc::new(filter));
        self
    }

    pub fn window_node_test<F>(mut self, test: F) -> Self
    where
        F: Fn(&Node) -> Check + Send + Sync + 'static,
    {
        self.window_node_test = Some(Arc::new(test));
        self
    }

    pub fn node_test<F>(mut self, test: F) -> Self
    where
        F: Fn(&Node) -> Check + Send + Sync + 'static,
    {
        self.node_test = Some(Arc::new(test));
        self
    }

    pub fn node_recovery<F, Fut>(mut self, recovery: F) -> Self
    where
        F: Fn(Node) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.node_recovery = Some(Arc::new(move |node| recovery(node).boxed()));
        self
    }

    pub fn node_mapping<F>(mut self, mapping: F) -> Self
    where
        F: Fn(&Node) -> Result<Node, AutomationError> + Send + Sync + 'static,
    {
        self.node_mapping = Some(Arc::new(mapping));
        self
    }

    pub fn action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(Node, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, AutomationError>> + Send + 'static,
    {
        self.action = Some(Arc::new(move |node, attempt| action(node, attempt).boxed()));
        self
    }

    /// Override the crawler's overall budget for this step
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source_tag(&self) -> &str {
        &self.source
    }

    pub fn get_window_intent(&self) -> Option<&WindowIntent> {
        self.window_intent.as_ref()
    }

    pub(crate) fn get_window_event_filter(&self) -> Option<&EventFilter> {
        self.window_event_filter.as_ref()
    }

    pub(crate) fn get_window_node_test(&self) -> Option<&NodeTest> {
        self.window_node_test.as_ref()
    }

    pub(crate) fn get_node_test(&self) -> Option<&NodeTest> {
        self.node_test.as_ref()
    }

    pub(crate) fn get_node_recovery(&self) -> Option<&NodeRecovery> {
        self.node_recovery.as_ref()
    }

    pub(crate) fn get_node_mapping(&self) -> Option<&NodeMapping> {
        self.node_mapping.as_ref()
    }

    pub(crate) fn get_action(&self) -> Option<&StepAction> {
        self.action.as_ref()
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("Step");
        debug_struct.field("label", &self.label);
        if !self.source.is_empty() {
            debug_struct.field("source", &self.source);
        }
        if let Some(intent) = &self.window_intent {
            debug_struct.field("window_intent", &intent.action);
        }

        // Callbacks are opaque, only show which ones are set
        let callbacks: Vec<&str> = [
            (self.window_event_filter.is_some(), "window_event_filter"),
            (self.window_node_test.is_some(), "window_node_test"),
            (self.node_test.is_some(), "node_test"),
            (self.node_recovery.is_some(), "node_recovery"),
            (self.node_mapping.is_some(), "node_mapping"),
            (self.action.is_some(), "action"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        debug_struct.field("callbacks", &callbacks);

        if let Some(timeout) = self.timeout {
            debug_struct.field("timeout", &timeout);
        }
        debug_struct.finish()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "Step({})", self.label)
        } else {
            write!(f, "Step(source={}, label={})", self.source, self.label)
        }
    }
}
