//! Bounded traversal primitives over host-owned node trees

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::config::TraversalLimits;
use crate::node::{Node, NodeAction};

/// A node paired with its depth relative to the traversal root
#[derive(Clone)]
pub struct CrawlNode {
    pub node: Node,
    pub depth: usize,
}

impl CrawlNode {
    /// Indented one-liner for tree dumps
    pub fn info_short(&self) -> String {
        format!("{}{}", "-".repeat(self.depth), self.node.short_description())
    }
}

impl fmt::Debug for CrawlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlNode")
            .field("depth", &self.depth)
            .field("node", &self.node)
            .finish()
    }
}

/// Lazy pre-order walk of a tree, root first.
///
/// Children are pushed reversed onto the front of the frontier, so siblings are
/// visited in their natural order. Only coverage and depth are guaranteed to
/// callers, not sibling order.
pub struct Crawl {
    frontier: VecDeque<CrawlNode>,
    limits: TraversalLimits,
    yielded: usize,
}

impl Iterator for Crawl {
    type Item = CrawlNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded >= self.limits.max_nodes {
            if !self.frontier.is_empty() {
                warn!(
                    "Traversal stopped at {} nodes, {} pending",
                    self.yielded,
                    self.frontier.len()
                );
                self.frontier.clear();
            }
            return None;
        }

        let current = self.frontier.pop_front()?;
        self.yielded += 1;

        if current.depth < self.limits.max_depth {
            for child in current.node.children().into_iter().rev() {
                self.frontier.push_front(CrawlNode {
                    node: child,
                    depth: current.depth + 1,
                });
            }
        } else {
            trace!(
                "Not expanding node at depth limit {}: {}",
                current.depth,
                current.node.short_description()
            );
        }

        Some(current)
    }
}

/// Walk `root` with the default traversal limits.
pub fn crawl(root: &Node) -> Crawl {
    crawl_with_limits(root, TraversalLimits::default())
}

pub fn crawl_with_limits(root: &Node, limits: TraversalLimits) -> Crawl {
    // A root without children is often just a stale handle.
    if root.children().is_empty() {
        let refreshed = root.refresh();
        debug!("Root had no children, refresh result: {}", refreshed);
    }

    let mut frontier = VecDeque::new();
    frontier.push_back(CrawlNode {
        node: root.clone(),
        depth: 0,
    });

    Crawl {
        frontier,
        limits,
        yielded: 0,
    }
}

/// Check at most `max_nesting` ancestors of `node`, nearest first.
pub fn find_parent<P>(node: &Node, max_nesting: usize, predicate: P) -> Option<Node>
where
    P: Fn(&Node) -> bool,
{
    let mut target = node.parent()?;
    for _ in 0..max_nesting {
        if predicate(&target) {
            return Some(target);
        }
        target = target.parent()?;
    }
    None
}

/// Climb at most `max_nesting` parent links and return the topmost node reached.
pub fn root_of(node: &Node, max_nesting: usize) -> Node {
    let mut target = node.clone();
    for _ in 0..max_nesting {
        match target.parent() {
            Some(parent) => target = parent,
            None => break,
        }
    }
    target
}

/// Search the subtrees of increasingly distant ancestors for a match.
///
/// On the first level that has any match, the match closest to `node` wins.
/// `node` itself is never returned.
pub fn search_up<P>(node: &Node, max_nesting: usize, predicate: P) -> Option<Node>
where
    P: Fn(&Node) -> bool,
{
    let mut ancestor = node.clone();
    for level in 1..=max_nesting {
        ancestor = ancestor.parent()?;

        let nearest = crawl(&ancestor)
            .map(|c| c.node)
            .filter(|candidate| candidate != node && predicate(candidate))
            .map(|candidate| (center_distance(node, &candidate), candidate))
            .min_by(|(a, _), (b, _)| a.total_cmp(b));

        if let Some((distance, found)) = nearest {
            trace!(
                "search_up matched at level {} (distance {:.1}): {}",
                level,
                distance,
                found.short_description()
            );
            return Some(found);
        }
    }
    None
}

/// Request a forward scroll. Non-scrollable nodes are left alone.
pub fn scroll(node: &Node) -> bool {
    if !node.is_scrollable() {
        warn!("scroll(): Not scrollable: {}", node.short_description());
        return false;
    }

    trace!("scroll(): Scrolling node: {}", node.short_description());
    let accepted = node.perform_action(NodeAction::ScrollForward);
    debug!("scroll(): accepted={} for {}", accepted, node.short_description());
    accepted
}

/// Euclidean distance between the centers of both nodes' screen bounds
pub fn center_distance(a: &Node, b: &Node) -> f64 {
    let (x1, y1) = a.bounds().center();
    let (x2, y2) = b.bounds().center();
    ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
}
