//! Clears an app's cache on a simulated settings app.
//!
//! Run with `RUST_LOG=uicrawl=debug` to follow the crawl, or pass `--dry-run`
//! to select nodes instead of clicking them.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use uicrawl::common::{
    clear_cache_click, clickable_parent, default_click, default_node_recovery,
    default_window_filter, text_matches, window_criteria, window_criteria_app_identifier,
};
use uicrawl::platforms::memory::{MemoryHost, MemoryTree, NodeSpec};
use uicrawl::{
    Bounds, Crawler, CrawlerConfig, NodeAction, Plan, Step, TreeEvent, TreeEventKind,
    WindowIntent,
};

const SETTINGS: &str = "com.android.settings";
const TARGET: &str = "com.example.notes";

fn storage_screen() -> MemoryTree {
    let tree = MemoryTree::new();
    let root = tree.add_root(NodeSpec::new("android.widget.FrameLayout").package(SETTINGS));
    let list = tree.add_child(
        root,
        NodeSpec::new("android.widget.ListView")
            .package(SETTINGS)
            .scrollable(true)
            .bounds(Bounds::new(0, 200, 1080, 2200)),
    );
    tree.add_child(
        list,
        NodeSpec::new("android.widget.Button")
            .package(SETTINGS)
            .text("Clear storage")
            .clickable(true)
            .bounds(Bounds::new(40, 400, 520, 520)),
    );
    // The cache button is below the fold until the list scrolls
    tree.on_action(list, NodeAction::ScrollForward, move |tree| {
        tree.add_child(
            list,
            NodeSpec::new("android.widget.Button")
                .package(SETTINGS)
                .text("Clear\u{00A0}cache")
                .clickable(true)
                .bounds(Bounds::new(560, 400, 1040, 520)),
        );
    });
    tree
}

fn app_info_screen(host: Arc<MemoryHost>) -> MemoryTree {
    let tree = MemoryTree::new();
    let root = tree.add_root(NodeSpec::new("android.widget.FrameLayout").package(SETTINGS));
    tree.add_child(
        root,
        NodeSpec::new("android.widget.TextView")
            .package(SETTINGS)
            .text("Notes"),
    );
    let row = tree.add_child(
        root,
        NodeSpec::new("android.widget.LinearLayout")
            .package(SETTINGS)
            .clickable(true),
    );
    tree.add_child(
        row,
        NodeSpec::new("android.widget.TextView")
            .package(SETTINGS)
            .text("Storage & cache"),
    );
    // A dry run selects instead of clicking; both open the storage page
    let open_storage = move |_: &MemoryTree| {
        let storage = storage_screen();
        if let Some(root) = storage.node(0) {
            host.set_root(root);
        }
    };
    tree.on_action(row, NodeAction::Select, open_storage.clone());
    tree.on_action(row, NodeAction::Click, open_storage);
    tree
}

fn build_plan(dry_run: bool) -> Plan {
    let open_storage = Step::new("Open storage")
        .source("AOSP")
        .window_intent(WindowIntent::app_details(TARGET))
        .window_event_filter(default_window_filter(SETTINGS))
        .window_node_test(window_criteria_app_identifier(
            SETTINGS,
            vec![TARGET.to_string(), "Notes".to_string()],
        ))
        .node_test(|node| Ok(text_matches(node, "Storage & cache")))
        .node_mapping(clickable_parent(6))
        .action(default_click(dry_run, None));

    let clear_cache = Step::new("Clear cache")
        .source("AOSP")
        .window_node_test(window_criteria(SETTINGS, |root| {
            uicrawl::crawl(root).any(|c| text_matches(&c.node, "Clear storage"))
        }))
        .node_test(|node| Ok(text_matches(node, "Clear cache")))
        .node_recovery(default_node_recovery())
        .action(clear_cache_click(dry_run, false));

    Plan::new(format!("Clear cache of {TARGET}"), vec![open_storage, clear_cache])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("uicrawl=info,info")),
        )
        .init();

    let dry_run = std::env::args().any(|arg| arg == "--dry-run");

    let host = Arc::new(
        MemoryHost::new().with_launch_events([TreeEvent::new(
            TreeEventKind::WindowStateChanged,
            SETTINGS,
        )]),
    );
    let app_info = app_info_screen(host.clone());
    let root = app_info
        .node(0)
        .ok_or_else(|| anyhow::anyhow!("app info screen has no root"))?;
    host.set_root(root);

    let crawler = Crawler::new(host.clone(), CrawlerConfig::default());
    let report = build_plan(dry_run).run(&crawler).await?;

    for step in &report.reports {
        info!(
            "{}: {:?} after {} attempts in {:?}",
            step.label, step.outcome, step.attempts, step.elapsed
        );
    }
    info!(
        "Done: {} steps, {} branches, {} launches",
        report.reports.len(),
        report.branches,
        host.launches().len()
    );
    Ok(())
}
