use std::sync::Arc;
use std::time::Duration;

use super::{init_tracing, storage_screen, SETTINGS};
use crate::common::{clear_cache_click, clickable_parent, default_click, text_matches, window_criteria};
use crate::platforms::memory::{MemoryHost, MemoryTree, NodeSpec};
use crate::{AutomationError, BranchSignal, CrawlError, Crawler, NodeAction, Plan, Step};

fn find_and_click(label: &'static str) -> Step {
    Step::new(label)
        .window_node_test(window_criteria(SETTINGS, |_| true))
        .node_test(move |node| Ok(text_matches(node, label)))
        .action(default_click(false, None))
}

#[tokio::test(start_paused = true)]
async fn test_branch_splices_alternate_route() {
    init_tracing();
    let screen = storage_screen();
    let host = Arc::new(MemoryHost::new().with_roots([screen.root_node()]));
    let crawler = Crawler::with_default_config(host);

    let open_storage = Step::new("Clear data")
        .window_node_test(window_criteria(SETTINGS, |_| true))
        .node_test(|node| {
            if text_matches(node, "Clear storage") {
                return Err(BranchSignal::new(
                    "storage page has no 'Clear data'",
                    vec![find_and_click("Clear cache")],
                    2,
                ));
            }
            Ok(text_matches(node, "Clear data"))
        });
    let plan = Plan::new(
        "Clear app data",
        vec![
            open_storage,
            find_and_click("Confirm").timeout(Duration::from_secs(1)),
            find_and_click("OK").timeout(Duration::from_secs(1)),
            Step::new("Done"),
        ],
    );

    let report = plan.run(&crawler).await.unwrap();

    assert_eq!(report.branches, 1);
    assert_eq!(report.executed_labels(), vec!["Clear cache", "Done"]);
    assert_eq!(
        screen.tree.performed_actions(),
        vec![(screen.clear_cache, NodeAction::Click)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failure_ends_plan() {
    init_tracing();
    let screen = storage_screen();
    let host = Arc::new(MemoryHost::new().with_roots([screen.root_node()]));
    let crawler = Crawler::with_default_config(host);

    let plan = Plan::new(
        "Clear app data",
        vec![
            find_and_click("Clear data").timeout(Duration::from_secs(1)),
            find_and_click("Clear cache"),
        ],
    );

    let err = plan.run(&crawler).await.unwrap_err();

    assert!(matches!(err, CrawlError::Timeout { .. }));
    assert_eq!(err.label(), Some("Clear data"));
    assert!(screen.tree.performed_actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_skipped_step_does_not_stop_plan() {
    init_tracing();
    let screen = storage_screen();
    let host = Arc::new(MemoryHost::new().with_roots([screen.root_node()]));
    let crawler = Crawler::with_default_config(host);

    let plan = Plan::new(
        "Clear app data",
        vec![
            find_and_click("Clear storage").action(|_, _| async {
                Err::<bool, _>(AutomationError::StepAborted("nothing stored".to_string()))
            }),
            find_and_click("Clear cache"),
        ],
    );

    let report = plan.run(&crawler).await.unwrap();

    assert_eq!(report.branches, 0);
    assert_eq!(report.executed_labels(), vec!["Clear storage", "Clear cache"]);
    assert!(report.reports[0].is_skipped());
    assert!(!report.reports[1].is_skipped());
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_plan_selects_through_page_switch() {
    init_tracing();
    let storage = storage_screen();
    let host = Arc::new(MemoryHost::new());

    let app_info = MemoryTree::new();
    let root = app_info.add_root(NodeSpec::new("android.widget.FrameLayout").package(SETTINGS));
    let row = app_info.add_child(
        root,
        NodeSpec::new("android.widget.LinearLayout")
            .package(SETTINGS)
            .clickable(true),
    );
    app_info.add_child(
        row,
        NodeSpec::new("android.widget.TextView")
            .package(SETTINGS)
            .text("Storage & cache"),
    );
    let switch = host.clone();
    let storage_root = storage.root_node();
    app_info.on_action(row, NodeAction::Select, move |_| {
        switch.set_root(storage_root.clone());
    });
    host.set_root(app_info.node(root).unwrap());

    let crawler = Crawler::with_default_config(host);
    let plan = Plan::new(
        "Clear cache (dry run)",
        vec![
            Step::new("Open storage")
                .window_node_test(window_criteria(SETTINGS, |_| true))
                .node_test(|node| Ok(text_matches(node, "Storage & cache")))
                .node_mapping(clickable_parent(6))
                .action(default_click(true, None)),
            Step::new("Clear cache")
                .window_node_test(window_criteria(SETTINGS, |root| {
                    crate::crawl(root).any(|c| text_matches(&c.node, "Clear storage"))
                }))
                .node_test(|node| Ok(text_matches(node, "Clear cache")))
                .action(clear_cache_click(true, false)),
        ],
    );

    let report = plan.run(&crawler).await.unwrap();

    assert_eq!(report.executed_labels(), vec!["Open storage", "Clear cache"]);
    assert_eq!(app_info.performed_actions(), vec![(row, NodeAction::Select)]);
    assert_eq!(
        storage.tree.performed_actions(),
        vec![(storage.clear_cache, NodeAction::Select)]
    );
}
