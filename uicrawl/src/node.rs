use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Screen rectangle of a node, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Center point, unrounded.
    pub fn center(&self) -> (f64, f64) {
        (
            (f64::from(self.left) + f64::from(self.right)) / 2.0,
            (f64::from(self.top) + f64::from(self.bottom)) / 2.0,
        )
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Actions a host can be asked to perform on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    Click,
    LongClick,
    Select,
    ScrollForward,
    ScrollBackward,
}

/// Interface for platform-specific node implementations
///
/// Implementations are views into a tree owned by someone else. Every getter
/// reflects the last synchronised state; `refresh` re-reads it.
pub trait NodeImpl: Send + Sync + Debug {
    /// Identity of the underlying node, stable for the lifetime of the handle.
    fn object_id(&self) -> u64;
    fn text(&self) -> Option<String>;
    fn content_description(&self) -> Option<String>;
    fn class_name(&self) -> Option<String>;
    fn package_name(&self) -> Option<String>;
    fn view_id(&self) -> Option<String>;
    fn is_clickable(&self) -> bool;
    fn is_enabled(&self) -> bool;
    fn is_checkable(&self) -> bool;
    fn is_scrollable(&self) -> bool;
    fn bounds(&self) -> Bounds;
    fn parent(&self) -> Option<Node>;
    fn children(&self) -> Vec<Node>;
    fn perform_action(&self, action: NodeAction) -> bool;
    /// Re-synchronise with the live tree. Returns false once the node is gone.
    fn refresh(&self) -> bool;
}

/// Represents a node in a UI tree owned by the host
///
/// Handles are cheap to clone. They must not be kept beyond the crawl that
/// produced them since the tree they point into changes underneath.
#[derive(Clone)]
pub struct Node {
    inner: Arc<dyn NodeImpl>,
}

impl Node {
    pub fn new(inner: Arc<dyn NodeImpl>) -> Self {
        Self { inner }
    }

    pub fn object_id(&self) -> u64 {
        self.inner.object_id()
    }

    pub fn text(&self) -> Option<String> {
        self.inner.text()
    }

    pub fn content_description(&self) -> Option<String> {
        self.inner.content_description()
    }

    pub fn class_name(&self) -> Option<String> {
        self.inner.class_name()
    }

    pub fn package_name(&self) -> Option<String> {
        self.inner.package_name()
    }

    pub fn view_id(&self) -> Option<String> {
        self.inner.view_id()
    }

    pub fn is_clickable(&self) -> bool {
        self.inner.is_clickable()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    pub fn is_checkable(&self) -> bool {
        self.inner.is_checkable()
    }

    pub fn is_scrollable(&self) -> bool {
        self.inner.is_scrollable()
    }

    pub fn bounds(&self) -> Bounds {
        self.inner.bounds()
    }

    pub fn parent(&self) -> Option<Node> {
        self.inner.parent()
    }

    pub fn children(&self) -> Vec<Node> {
        self.inner.children()
    }

    pub fn perform_action(&self, action: NodeAction) -> bool {
        self.inner.perform_action(action)
    }

    pub fn refresh(&self) -> bool {
        self.inner.refresh()
    }

    /// Compact single line description used in logs
    pub fn short_description(&self) -> String {
        let mut out = self
            .class_name()
            .unwrap_or_else(|| "<unknown>".to_string());
        if let Some(text) = self.text().filter(|t| !t.is_empty()) {
            out.push_str(&format!(" text='{text}'"));
        }
        if let Some(desc) = self.content_description().filter(|d| !d.is_empty()) {
            out.push_str(&format!(" desc='{desc}'"));
        }
        if let Some(id) = self.view_id().filter(|i| !i.is_empty()) {
            out.push_str(&format!(" id={id}"));
        }
        if let Some(pkg) = self.package_name() {
            out.push_str(&format!(" pkg={pkg}"));
        }

        let flags: Vec<&str> = [
            (self.is_clickable(), "clickable"),
            (!self.is_enabled(), "disabled"),
            (self.is_checkable(), "checkable"),
            (self.is_scrollable(), "scrollable"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        if !flags.is_empty() {
            out.push_str(&format!(" ({})", flags.join(",")));
        }

        out.push_str(&format!(" {}", self.bounds()));
        out
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl Eq for Node {}

impl Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.short_description())
    }
}
