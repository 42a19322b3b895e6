//! Serializable copies of host trees, for diagnostics and replay

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TraversalLimits;
use crate::node::{Bounds, Node};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Attributes of a node captured at snapshot time
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clickable: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub checkable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub scrollable: bool,
    #[serde(default)]
    pub bounds: Bounds,
}

fn default_enabled() -> bool {
    true
}

impl NodeAttributes {
    pub fn from_node(node: &Node) -> Self {
        Self {
            class_name: node.class_name(),
            text: node.text(),
            content_description: node.content_description(),
            package_name: node.package_name(),
            view_id: node.view_id(),
            clickable: node.is_clickable(),
            enabled: node.is_enabled(),
            checkable: node.is_checkable(),
            scrollable: node.is_scrollable(),
            bounds: node.bounds(),
        }
    }
}

impl fmt::Debug for NodeAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("NodeAttributes");

        if let Some(ref class_name) = self.class_name {
            debug_struct.field("class_name", class_name);
        }
        if let Some(ref text) = self.text {
            if !text.is_empty() {
                debug_struct.field("text", text);
            }
        }
        if let Some(ref desc) = self.content_description {
            if !desc.is_empty() {
                debug_struct.field("content_description", desc);
            }
        }
        if let Some(ref id) = self.view_id {
            debug_struct.field("view_id", id);
        }

        // Only show flags that deviate from the common case
        if self.clickable {
            debug_struct.field("clickable", &true);
        }
        if !self.enabled {
            debug_struct.field("enabled", &false);
        }
        if self.scrollable {
            debug_struct.field("scrollable", &true);
        }

        debug_struct.field("bounds", &self.bounds);
        debug_struct.finish()
    }
}

/// A captured subtree
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub attributes: NodeAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Copy the tree under `root`, honouring the traversal limits.
    ///
    /// Built iteratively; the host tree's depth is not under our control.
    pub fn capture(root: &Node, limits: TraversalLimits) -> Self {
        struct Pending {
            node: Node,
            depth: usize,
            parent: Option<usize>,
        }

        // Flat arena first, then assembled bottom-up
        let mut flat: Vec<(NodeAttributes, Option<usize>)> = Vec::new();
        let mut stack = vec![Pending {
            node: root.clone(),
            depth: 0,
            parent: None,
        }];

        while let Some(current) = stack.pop() {
            if flat.len() >= limits.max_nodes {
                break;
            }
            let index = flat.len();
            flat.push((NodeAttributes::from_node(&current.node), current.parent));

            if current.depth < limits.max_depth {
                for child in current.node.children().into_iter().rev() {
                    stack.push(Pending {
                        node: child,
                        depth: current.depth + 1,
                        parent: Some(index),
                    });
                }
            }
        }

        let mut children: Vec<Vec<NodeSnapshot>> = vec![Vec::new(); flat.len()];
        let mut root_snapshot = None;
        for (index, (attributes, parent)) in flat.into_iter().enumerate().rev() {
            let mut own_children = std::mem::take(&mut children[index]);
            own_children.reverse();
            let snapshot = NodeSnapshot {
                attributes,
                children: own_children,
            };
            match parent {
                Some(parent) => children[parent].push(snapshot),
                None => root_snapshot = Some(snapshot),
            }
        }

        root_snapshot.unwrap_or_else(|| NodeSnapshot {
            attributes: NodeAttributes::from_node(root),
            children: Vec::new(),
        })
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            count += 1;
            stack.extend(current.children.iter());
        }
        count
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Debug output that stops expanding `levels` below this node
    fn fmt_levels(&self, f: &mut fmt::Formatter<'_>, levels: usize) -> fmt::Result {
        struct Level<'a>(&'a NodeSnapshot, usize);

        impl fmt::Debug for Level<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt_levels(f, self.1)
            }
        }

        let mut out = f.debug_struct("NodeSnapshot");
        out.field("attributes", &self.attributes);
        if !self.children.is_empty() {
            match levels.checked_sub(1) {
                Some(next) => {
                    let children: Vec<Level<'_>> =
                        self.children.iter().map(|c| Level(c, next)).collect();
                    out.field("children", &children);
                }
                None => {
                    out.field(
                        "children",
                        &format_args!("<{} not shown>", self.children.len()),
                    );
                }
            }
        }
        out.finish()
    }
}

const DEBUG_LEVELS: usize = 32;

impl fmt::Debug for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_levels(f, DEBUG_LEVELS)
    }
}
