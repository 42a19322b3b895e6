//! Reusable building blocks for steps: node matchers, window criteria,
//! mappings, click actions and recoveries.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::errors::AutomationError;
use crate::node::{Node, NodeAction};
use crate::platforms::{TreeEvent, TreeEventKind};
use crate::step::Check;
use crate::tree;

const NBSP: char = '\u{00A0}';

/// Labels some ROMs show while a size calculation is still running
pub const BUSY_INDICATORS: [&str; 2] = ["...", "…"];

pub type DisabledHandler = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

fn variants(value: Option<String>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let normalized = value.replace(NBSP, " ");
    if normalized == value {
        vec![value]
    } else {
        vec![value, normalized]
    }
}

/// The node's text, plus a copy with non-breaking spaces normalised
pub fn text_variants(node: &Node) -> Vec<String> {
    variants(node.text())
}

pub fn content_desc_variants(node: &Node) -> Vec<String> {
    variants(node.content_description())
}

pub fn text_matches(node: &Node, candidate: &str) -> bool {
    let candidate = candidate.to_lowercase();
    text_variants(node)
        .iter()
        .any(|v| v.to_lowercase() == candidate)
}

pub fn text_matches_any<S: AsRef<str>>(node: &Node, candidates: &[S]) -> bool {
    candidates.iter().any(|c| text_matches(node, c.as_ref()))
}

pub fn text_contains_any<S: AsRef<str>>(node: &Node, candidates: &[S]) -> bool {
    let texts: Vec<String> = text_variants(node)
        .iter()
        .map(|v| v.to_lowercase())
        .collect();
    candidates.iter().any(|candidate| {
        let candidate = candidate.as_ref().to_lowercase();
        texts.iter().any(|t| t.contains(&candidate))
    })
}

pub fn text_ends_with_any<S: AsRef<str>>(node: &Node, candidates: &[S]) -> bool {
    let texts: Vec<String> = text_variants(node)
        .iter()
        .map(|v| v.to_lowercase())
        .collect();
    candidates.iter().any(|candidate| {
        let candidate = candidate.as_ref().to_lowercase();
        texts.iter().any(|t| t.ends_with(&candidate))
    })
}

pub fn content_desc_matches(node: &Node, candidate: &str) -> bool {
    let candidate = candidate.to_lowercase();
    content_desc_variants(node)
        .iter()
        .any(|v| v.to_lowercase() == candidate)
}

pub fn content_desc_matches_any<S: AsRef<str>>(node: &Node, candidates: &[S]) -> bool {
    candidates
        .iter()
        .any(|c| content_desc_matches(node, c.as_ref()))
}

pub fn id_matches(node: &Node, id: &str) -> bool {
    node.view_id().as_deref() == Some(id)
}

pub fn id_contains(node: &Node, id: &str) -> bool {
    node.view_id().is_some_and(|v| v.contains(id))
}

pub fn is_clicky_button(node: &Node) -> bool {
    node.is_clickable() && node.class_name().as_deref() == Some("android.widget.Button")
}

pub fn is_text_view(node: &Node) -> bool {
    node.class_name().as_deref() == Some("android.widget.TextView")
}

pub fn is_radio_button(node: &Node) -> bool {
    node.class_name().as_deref() == Some("android.widget.RadioButton")
}

/// Accept window state/content changes coming from `package_name`
pub fn default_window_filter(
    package_name: impl Into<String>,
) -> impl Fn(&TreeEvent) -> bool + Send + Sync + Clone + 'static {
    let package_name = package_name.into();
    move |event: &TreeEvent| {
        if event.package_name.as_deref() != Some(package_name.as_str()) {
            return false;
        }
        matches!(
            event.kind,
            TreeEventKind::WindowStateChanged | TreeEventKind::WindowContentChanged
        )
    }
}

/// Accept roots that belong to `package_name` and pass `extra`
pub fn window_criteria<E>(
    package_name: impl Into<String>,
    extra: E,
) -> impl Fn(&Node) -> Check + Send + Sync + 'static
where
    E: Fn(&Node) -> bool + Send + Sync + 'static,
{
    let package_name = package_name.into();
    move |root: &Node| Ok(root.package_name().as_deref() == Some(package_name.as_str()) && extra(root))
}

/// Like [`window_criteria`], and some node in the window shows one of `candidates`.
///
/// Candidates are usually the package name and the app's resolved labels.
pub fn window_criteria_app_identifier(
    package_name: impl Into<String>,
    candidates: Vec<String>,
) -> impl Fn(&Node) -> Check + Send + Sync + 'static {
    debug!("Looking for window identifiers: {:?}", candidates);
    window_criteria(package_name, move |root: &Node| {
        tree::crawl(root).any(|crawled| {
            let Some(text) = crawled.node.text() else {
                return false;
            };
            candidates
                .iter()
                .any(|candidate| text == *candidate || text.contains(candidate.as_str()))
        })
    })
}

/// Map a node to its nearest clickable ancestor
pub fn clickable_parent(
    max_nesting: usize,
) -> impl Fn(&Node) -> Result<Node, AutomationError> + Send + Sync + 'static {
    move |node: &Node| {
        tree::find_parent(node, max_nesting, |n| n.is_clickable()).ok_or_else(|| {
            AutomationError::NodeNotFound(format!(
                "No clickable parent found (within {max_nesting})"
            ))
        })
    }
}

/// Map a node to the nearest clickable node sharing one of its close ancestors
pub fn clickable_sibling() -> impl Fn(&Node) -> Result<Node, AutomationError> + Send + Sync + 'static
{
    |node: &Node| {
        tree::search_up(node, 2, |n| n.is_clickable()).ok_or_else(|| {
            AutomationError::NodeNotFound(format!(
                "No clickable sibling found for {}",
                node.short_description()
            ))
        })
    }
}

/// Click `node`, or select it on a dry run.
///
/// Disabled nodes are handed to `on_disabled` when given; otherwise they fail
/// with [`AutomationError::DisabledTarget`].
pub fn click_node(
    node: &Node,
    dry_run: bool,
    on_disabled: Option<&DisabledHandler>,
) -> Result<bool, AutomationError> {
    trace!(
        "click_node(dry_run={}): Clicking on {}",
        dry_run,
        node.short_description()
    );

    if !node.is_enabled() {
        return match on_disabled {
            Some(handler) => Ok(handler(node)),
            None => Err(AutomationError::DisabledTarget(format!(
                "Clickable target is disabled: {}",
                node.short_description()
            ))),
        };
    }
    if dry_run {
        return Ok(node.perform_action(NodeAction::Select));
    }
    if node.is_clickable() {
        return Ok(node.perform_action(NodeAction::Click));
    }
    Err(AutomationError::UnclickableTarget(format!(
        "Target is not clickable: {}",
        node.short_description()
    )))
}

pub fn default_click(
    dry_run: bool,
    on_disabled: Option<DisabledHandler>,
) -> impl Fn(Node, u32) -> BoxFuture<'static, Result<bool, AutomationError>> + Send + Sync + 'static
{
    move |node: Node, _attempt: u32| {
        let result = click_node(&node, dry_run, on_disabled.as_ref());
        async move { result }.boxed()
    }
}

/// Click action for "clear cache" buttons, with workarounds for disabled buttons.
///
/// * every button disabled on a locked system app: abort the plan
/// * every button disabled: a size calculation is running, wait and retry
/// * only the target disabled: stale state, count it as done
pub fn clear_cache_click(
    dry_run: bool,
    locked_system_app: bool,
) -> impl Fn(Node, u32) -> BoxFuture<'static, Result<bool, AutomationError>> + Send + Sync + 'static
{
    move |node: Node, attempt: u32| {
        async move {
            match click_node(&node, dry_run, None) {
                Err(AutomationError::DisabledTarget(_)) => {}
                other => return other,
            }

            debug!("Can't click on the clear cache button because it was disabled, but why...");
            let all_buttons_disabled = tree::crawl(&tree::root_of(&node, 4))
                .all(|c| !is_clicky_button(&c.node) || !c.node.is_enabled());

            if all_buttons_disabled && locked_system_app {
                warn!("Locked system app, can't click clear cache");
                return Err(AutomationError::PlanAborted(
                    "Locked system app, can't clear cache".to_string(),
                ));
            }

            if all_buttons_disabled {
                let wait = Duration::from_millis(250 * (u64::from(attempt) + 1));
                warn!(
                    "Clear cache button disabled (others are too), assuming size calculation, waiting {:?}",
                    wait
                );
                tokio::time::sleep(wait).await;
                return Ok(false);
            }

            warn!("Only clear cache was disabled, assuming stale info, counting as success.");
            Ok(true)
        }
        .boxed()
    }
}

pub fn default_node_recovery() -> impl Fn(Node) -> BoxFuture<'static, bool> + Send + Sync + 'static
{
    node_recovery_with_busy_delay(Duration::from_secs(1))
}

/// Wait out a busy indicator if one is visible, otherwise scroll everything scrollable.
pub fn node_recovery_with_busy_delay(
    busy_delay: Duration,
) -> impl Fn(Node) -> BoxFuture<'static, bool> + Send + Sync + 'static {
    move |root: Node| {
        async move {
            let busy = tree::crawl(&root).find(|c| text_matches_any(&c.node, &BUSY_INDICATORS));
            if let Some(busy) = busy {
                debug!(
                    "Found a busy-node, attempting recovery via delay: {}",
                    busy.node.short_description()
                );
                tokio::time::sleep(busy_delay).await;
                root.refresh();
                return true;
            }

            let scrollables: Vec<Node> = tree::crawl(&root)
                .map(|c| c.node)
                .filter(|n| n.is_scrollable())
                .collect();

            let mut scrolled = false;
            for node in scrollables {
                if tree::scroll(&node) {
                    scrolled = true;
                    node.refresh();
                }
            }
            scrolled
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Bounds;
    use crate::platforms::memory::{MemoryTree, NodeSpec};

    const SETTINGS: &str = "com.android.settings";

    #[test]
    fn test_text_matching_normalizes_nbsp_and_case() {
        let tree = MemoryTree::new();
        let id = tree.add_root(NodeSpec::new("android.widget.TextView").text("Clear\u{00A0}Cache"));
        let node = tree.node(id).unwrap();

        assert!(text_matches(&node, "clear cache"));
        assert!(text_matches_any(&node, &["Storage", "CLEAR CACHE"]));
        assert!(text_contains_any(&node, &["cache"]));
        assert!(text_ends_with_any(&node, &[" cache"]));
        assert!(!text_matches(&node, "clear"));
        assert!(is_text_view(&node));
    }

    #[test]
    fn test_id_and_description_matching() {
        let tree = MemoryTree::new();
        let id = tree.add_root(
            NodeSpec::new("android.widget.Button")
                .view_id("com.android.settings:id/button2")
                .content_description("Clear cache")
                .clickable(true),
        );
        let node = tree.node(id).unwrap();

        assert!(id_matches(&node, "com.android.settings:id/button2"));
        assert!(id_contains(&node, "button2"));
        assert!(content_desc_matches_any(&node, &["clear cache"]));
        assert!(is_clicky_button(&node));
        assert!(!is_radio_button(&node));
    }

    #[test]
    fn test_default_window_filter() {
        let filter = default_window_filter(SETTINGS);
        assert!(filter(&TreeEvent::new(TreeEventKind::WindowStateChanged, SETTINGS)));
        assert!(filter(&TreeEvent::new(TreeEventKind::WindowContentChanged, SETTINGS)));
        assert!(!filter(&TreeEvent::new(TreeEventKind::Other, SETTINGS)));
        assert!(!filter(&TreeEvent::new(
            TreeEventKind::WindowStateChanged,
            "com.android.launcher"
        )));
    }

    #[test]
    fn test_window_criteria_app_identifier() {
        let tree = MemoryTree::new();
        let root = tree.add_root(NodeSpec::new("root").package(SETTINGS));
        tree.add_child(root, NodeSpec::new("title").text("App info: Example App"));
        let root = tree.node(root).unwrap();

        let matching = window_criteria_app_identifier(SETTINGS, vec!["Example App".to_string()]);
        let other = window_criteria_app_identifier(SETTINGS, vec!["Other".to_string()]);
        let wrong_pkg = window_criteria_app_identifier("com.other", vec!["Example App".to_string()]);

        assert!(matching(&root).unwrap());
        assert!(!other(&root).unwrap());
        assert!(!wrong_pkg(&root).unwrap());
    }

    #[test]
    fn test_clickable_parent_and_sibling() {
        let tree = MemoryTree::new();
        let root = tree.add_root(NodeSpec::new("root").bounds(Bounds::new(0, 0, 100, 100)));
        let row = tree.add_child(
            root,
            NodeSpec::new("row").clickable(true).bounds(Bounds::new(0, 0, 100, 50)),
        );
        let label = tree.add_child(row, NodeSpec::new("label").text("Storage"));
        let lonely = tree.add_child(root, NodeSpec::new("lonely"));

        let label = tree.node(label).unwrap();
        let mapped = clickable_parent(6)(&label).unwrap();
        assert_eq!(mapped.class_name().as_deref(), Some("row"));

        let sibling = clickable_sibling()(&label).unwrap();
        assert_eq!(sibling.class_name().as_deref(), Some("row"));

        let err = clickable_parent(6)(&tree.node(lonely).unwrap()).unwrap_err();
        assert!(matches!(err, AutomationError::NodeNotFound(_)));
    }

    #[test]
    fn test_click_node_outcomes() {
        let tree = MemoryTree::new();
        let button = tree.add_root(NodeSpec::new("android.widget.Button").clickable(true));
        let label = tree.add_root(NodeSpec::new("android.widget.TextView"));
        let disabled =
            tree.add_root(NodeSpec::new("android.widget.Button").clickable(true).enabled(false));

        assert!(click_node(&tree.node(button).unwrap(), false, None).unwrap());
        assert!(click_node(&tree.node(button).unwrap(), true, None).unwrap());
        assert!(matches!(
            click_node(&tree.node(label).unwrap(), false, None),
            Err(AutomationError::UnclickableTarget(_))
        ));
        assert!(matches!(
            click_node(&tree.node(disabled).unwrap(), false, None),
            Err(AutomationError::DisabledTarget(_))
        ));

        let handler: DisabledHandler = Arc::new(|_| true);
        assert!(click_node(&tree.node(disabled).unwrap(), false, Some(&handler)).unwrap());

        assert_eq!(
            tree.performed_actions(),
            vec![(button, NodeAction::Click), (button, NodeAction::Select)]
        );
    }

    #[tokio::test]
    async fn test_clear_cache_click_counts_stale_disabled_button_as_success() {
        let tree = MemoryTree::new();
        let root = tree.add_root(NodeSpec::new("root"));
        let target = tree.add_child(
            root,
            NodeSpec::new("android.widget.Button")
                .text("Clear cache")
                .clickable(true)
                .enabled(false),
        );
        tree.add_child(
            root,
            NodeSpec::new("android.widget.Button")
                .text("Clear storage")
                .clickable(true),
        );

        let click = clear_cache_click(false, false);
        assert!(click(tree.node(target).unwrap(), 0).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_click_waits_when_everything_is_disabled() {
        let tree = MemoryTree::new();
        let root = tree.add_root(NodeSpec::new("root"));
        let target = tree.add_child(
            root,
            NodeSpec::new("android.widget.Button")
                .text("Clear cache")
                .clickable(true)
                .enabled(false),
        );

        let start = tokio::time::Instant::now();
        let click = clear_cache_click(false, false);
        assert!(!click(tree.node(target).unwrap(), 1).await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(500));

        let locked = clear_cache_click(false, true);
        let err = locked(tree.node(target).unwrap(), 0).await.unwrap_err();
        assert!(matches!(err, AutomationError::PlanAborted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_recovery_waits_on_busy_indicator() {
        let tree = MemoryTree::new();
        let root = tree.add_root(NodeSpec::new("root"));
        tree.add_child(root, NodeSpec::new("size").text("…"));

        let start = tokio::time::Instant::now();
        let recovered = default_node_recovery()(tree.node(root).unwrap()).await;
        assert!(recovered);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(tree.refresh_count() >= 1);
    }

    #[tokio::test]
    async fn test_default_recovery_scrolls() {
        let tree = MemoryTree::new();
        let root = tree.add_root(NodeSpec::new("root"));
        let list = tree.add_child(root, NodeSpec::new("list").scrollable(true));
        tree.add_child(list, NodeSpec::new("item").text("Storage"));

        assert!(default_node_recovery()(tree.node(root).unwrap()).await);
        assert_eq!(tree.performed_actions(), vec![(list, NodeAction::ScrollForward)]);

        let flat = MemoryTree::new();
        let flat_root = flat.add_root(NodeSpec::new("root"));
        flat.add_child(flat_root, NodeSpec::new("item"));
        assert!(!default_node_recovery()(flat.node(flat_root).unwrap()).await);
    }
}
