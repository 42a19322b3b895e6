mod plan_tests;

use crate::platforms::memory::{MemoryTree, NodeId, NodeSpec};
use crate::Node;

pub const SETTINGS: &str = "com.android.settings";

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

/// A window of some other app
pub fn foreign_root(package: &str) -> Node {
    let tree = MemoryTree::new();
    let root = tree.add_root(NodeSpec::new("android.widget.FrameLayout").package(package));
    tree.add_child(root, NodeSpec::new("android.widget.TextView").text("Home"));
    // Handles keep the arena alive
    tree.node(root).expect("fresh root")
}

pub struct StorageScreen {
    pub tree: MemoryTree,
    pub root: NodeId,
    pub clear_cache: NodeId,
}

impl StorageScreen {
    pub fn root_node(&self) -> Node {
        self.tree.node(self.root).expect("storage root")
    }
}

/// App info > Storage, with a "Clear storage" and a "Clear cache" button
pub fn storage_screen() -> StorageScreen {
    let tree = MemoryTree::new();
    let root = tree.add_root(NodeSpec::new("android.widget.FrameLayout").package(SETTINGS));
    let list = tree.add_child(
        root,
        NodeSpec::new("android.widget.ListView")
            .package(SETTINGS)
            .scrollable(true),
    );
    tree.add_child(
        list,
        NodeSpec::new("android.widget.TextView")
            .package(SETTINGS)
            .text("Storage"),
    );
    tree.add_child(
        list,
        NodeSpec::new("android.widget.Button")
            .package(SETTINGS)
            .text("Clear storage")
            .clickable(true),
    );
    let clear_cache = tree.add_child(
        list,
        NodeSpec::new("android.widget.Button")
            .package(SETTINGS)
            .text("Clear cache")
            .clickable(true),
    );
    StorageScreen {
        tree,
        root,
        clear_cache,
    }
}
