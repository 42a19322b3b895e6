//! In-memory host, used for tests and for replaying captured trees.
//!
//! `MemoryTree` is a mutable arena of nodes. Handles into it go stale when
//! their node is removed, just like handles into a real accessibility tree.
//! `MemoryHost` serves scripted window roots and records every launch and
//! interference request it receives.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use super::{Host, ScreenState, TreeEvent, WindowIntent};
use crate::node::{Bounds, Node, NodeAction, NodeImpl};
use crate::AutomationError;

pub type NodeId = usize;

type ActionHook = Arc<dyn Fn(&MemoryTree) + Send + Sync>;

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Attributes of a simulated node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub class_name: String,
    pub text: Option<String>,
    pub content_description: Option<String>,
    pub package_name: Option<String>,
    pub view_id: Option<String>,
    pub clickable: bool,
    pub enabled: bool,
    pub checkable: bool,
    pub scrollable: bool,
    pub bounds: Bounds,
}

impl NodeSpec {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            text: None,
            content_description: None,
            package_name: None,
            view_id: None,
            clickable: false,
            enabled: true,
            checkable: false,
            scrollable: false,
            bounds: Bounds::default(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn content_description(mut self, desc: impl Into<String>) -> Self {
        self.content_description = Some(desc.into());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package_name = Some(package.into());
        self
    }

    pub fn view_id(mut self, id: impl Into<String>) -> Self {
        self.view_id = Some(id.into());
        self
    }

    pub fn clickable(mut self, clickable: bool) -> Self {
        self.clickable = clickable;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn checkable(mut self, checkable: bool) -> Self {
        self.checkable = checkable;
        self
    }

    pub fn scrollable(mut self, scrollable: bool) -> Self {
        self.scrollable = scrollable;
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }
}

struct Slot {
    spec: NodeSpec,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    alive: bool,
}

#[derive(Default)]
struct TreeState {
    slots: Vec<Slot>,
    actions: Vec<(NodeId, NodeAction)>,
    hooks: HashMap<(NodeId, NodeAction), ActionHook>,
    refreshes: usize,
}

/// Shared, mutable arena of simulated nodes
#[derive(Clone)]
pub struct MemoryTree {
    tree_id: u64,
    state: Arc<Mutex<TreeState>>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MemoryTree")
            .field("tree_id", &self.tree_id)
            .field("nodes", &state.slots.len())
            .finish()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        Self {
            tree_id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(Mutex::new(TreeState::default())),
        }
    }

    fn insert(&self, spec: NodeSpec, parent: Option<NodeId>) -> NodeId {
        let mut state = lock(&self.state);
        let id = state.slots.len();
        state.slots.push(Slot {
            spec,
            parent,
            children: Vec::new(),
            alive: true,
        });
        if let Some(parent) = parent {
            if let Some(slot) = state.slots.get_mut(parent) {
                slot.children.push(id);
            }
        }
        id
    }

    pub fn add_root(&self, spec: NodeSpec) -> NodeId {
        self.insert(spec, None)
    }

    pub fn add_child(&self, parent: NodeId, spec: NodeSpec) -> NodeId {
        self.insert(spec, Some(parent))
    }

    /// Append an existing node to `parent`'s children without re-parenting it.
    /// This is how cyclic trees are simulated.
    pub fn link_child(&self, parent: NodeId, child: NodeId) {
        let mut state = lock(&self.state);
        if let Some(slot) = state.slots.get_mut(parent) {
            slot.children.push(child);
        }
    }

    /// Remove a node and its subtree. Existing handles to them go stale.
    pub fn remove(&self, id: NodeId) {
        let mut state = lock(&self.state);
        let parent = state.slots.get(id).and_then(|s| s.parent);
        if let Some(parent) = parent {
            if let Some(slot) = state.slots.get_mut(parent) {
                slot.children.retain(|c| *c != id);
            }
        }

        // Already-dead slots are skipped, which also ends linked cycles.
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(slot) = state.slots.get_mut(current) {
                if !slot.alive {
                    continue;
                }
                slot.alive = false;
                pending.extend(slot.children.iter().copied());
            }
        }
    }

    pub fn update<F>(&self, id: NodeId, f: F)
    where
        F: FnOnce(&mut NodeSpec),
    {
        let mut state = lock(&self.state);
        if let Some(slot) = state.slots.get_mut(id) {
            f(&mut slot.spec);
        }
    }

    /// Run `hook` every time `action` is performed on `id`, after it was recorded.
    pub fn on_action<F>(&self, id: NodeId, action: NodeAction, hook: F)
    where
        F: Fn(&MemoryTree) + Send + Sync + 'static,
    {
        lock(&self.state).hooks.insert((id, action), Arc::new(hook));
    }

    /// Live handle for `id`, or `None` if the node was removed
    pub fn node(&self, id: NodeId) -> Option<Node> {
        let state = lock(&self.state);
        let slot = state.slots.get(id)?;
        if !slot.alive {
            return None;
        }
        Some(Node::new(Arc::new(MemoryNode {
            tree: self.clone(),
            id,
        })))
    }

    pub fn performed_actions(&self) -> Vec<(NodeId, NodeAction)> {
        lock(&self.state).actions.clone()
    }

    pub fn refresh_count(&self) -> usize {
        lock(&self.state).refreshes
    }

    fn with_slot<T>(&self, id: NodeId, f: impl FnOnce(&Slot) -> T) -> Option<T> {
        let state = lock(&self.state);
        state.slots.get(id).map(f)
    }

    fn spec_of(&self, id: NodeId) -> Option<NodeSpec> {
        self.with_slot(id, |slot| slot.spec.clone())
    }

    fn perform(&self, id: NodeId, action: NodeAction) -> bool {
        let (accepted, hook) = {
            let mut state = lock(&self.state);
            let Some(slot) = state.slots.get(id) else {
                return false;
            };
            if !slot.alive {
                return false;
            }
            let accepted = match action {
                NodeAction::Click | NodeAction::LongClick => slot.spec.clickable && slot.spec.enabled,
                NodeAction::Select => true,
                NodeAction::ScrollForward | NodeAction::ScrollBackward => slot.spec.scrollable,
            };
            state.actions.push((id, action));
            (accepted, state.hooks.get(&(id, action)).cloned())
        };

        trace!("perform({}, {:?}) accepted={}", id, action, accepted);
        if let Some(hook) = hook {
            hook(self);
        }
        accepted
    }
}

struct MemoryNode {
    tree: MemoryTree,
    id: NodeId,
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNode")
            .field("tree", &self.tree.tree_id)
            .field("id", &self.id)
            .finish()
    }
}

impl NodeImpl for MemoryNode {
    fn object_id(&self) -> u64 {
        (self.tree.tree_id << 32) | self.id as u64
    }

    fn text(&self) -> Option<String> {
        self.tree.spec_of(self.id).and_then(|s| s.text)
    }

    fn content_description(&self) -> Option<String> {
        self.tree
            .spec_of(self.id)
            .and_then(|s| s.content_description)
    }

    fn class_name(&self) -> Option<String> {
        self.tree.spec_of(self.id).map(|s| s.class_name)
    }

    fn package_name(&self) -> Option<String> {
        self.tree.spec_of(self.id).and_then(|s| s.package_name)
    }

    fn view_id(&self) -> Option<String> {
        self.tree.spec_of(self.id).and_then(|s| s.view_id)
    }

    fn is_clickable(&self) -> bool {
        self.tree
            .with_slot(self.id, |s| s.spec.clickable)
            .unwrap_or(false)
    }

    fn is_enabled(&self) -> bool {
        self.tree
            .with_slot(self.id, |s| s.spec.enabled)
            .unwrap_or(false)
    }

    fn is_checkable(&self) -> bool {
        self.tree
            .with_slot(self.id, |s| s.spec.checkable)
            .unwrap_or(false)
    }

    fn is_scrollable(&self) -> bool {
        self.tree
            .with_slot(self.id, |s| s.spec.scrollable)
            .unwrap_or(false)
    }

    fn bounds(&self) -> Bounds {
        self.tree
            .with_slot(self.id, |s| s.spec.bounds)
            .unwrap_or_default()
    }

    fn parent(&self) -> Option<Node> {
        let parent = self.tree.with_slot(self.id, |s| s.parent).flatten()?;
        self.tree.node(parent)
    }

    fn children(&self) -> Vec<Node> {
        let ids = self
            .tree
            .with_slot(self.id, |s| if s.alive { s.children.clone() } else { Vec::new() })
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.tree.node(id)).collect()
    }

    fn perform_action(&self, action: NodeAction) -> bool {
        self.tree.perform(self.id, action)
    }

    fn refresh(&self) -> bool {
        let mut state = lock(&self.tree.state);
        state.refreshes += 1;
        state.slots.get(self.id).map(|s| s.alive).unwrap_or(false)
    }
}

/// Scripted host serving roots out of `MemoryTree`s
pub struct MemoryHost {
    roots: Mutex<VecDeque<Node>>,
    root_fetches: AtomicUsize,
    events: broadcast::Sender<TreeEvent>,
    launch_events: Mutex<Vec<TreeEvent>>,
    launches: Mutex<Vec<WindowIntent>>,
    interference_requests: Mutex<Vec<u32>>,
    fail_interference: bool,
    screen: watch::Sender<ScreenState>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        let (screen, _) = watch::channel(ScreenState::Available);
        Self {
            roots: Mutex::new(VecDeque::new()),
            root_fetches: AtomicUsize::new(0),
            events,
            launch_events: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            interference_requests: Mutex::new(Vec::new()),
            fail_interference: false,
            screen,
        }
    }

    /// Serve `roots` in order. The last one keeps being served once reached.
    pub fn with_roots(self, roots: impl IntoIterator<Item = Node>) -> Self {
        *lock(&self.roots) = roots.into_iter().collect();
        self
    }

    /// Events broadcast right after every launch request
    pub fn with_launch_events(self, events: impl IntoIterator<Item = TreeEvent>) -> Self {
        *lock(&self.launch_events) = events.into_iter().collect();
        self
    }

    pub fn with_failing_interference(mut self) -> Self {
        self.fail_interference = true;
        self
    }

    pub fn push_root(&self, root: Node) {
        lock(&self.roots).push_back(root);
    }

    /// Replace whatever is queued with a single root
    pub fn set_root(&self, root: Node) {
        let mut roots = lock(&self.roots);
        roots.clear();
        roots.push_back(root);
    }

    /// Broadcast an event; returns how many subscribers received it
    pub fn emit(&self, event: TreeEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    pub fn set_screen_state(&self, state: ScreenState) {
        self.screen.send_replace(state);
    }

    pub fn root_fetches(&self) -> usize {
        self.root_fetches.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> Vec<WindowIntent> {
        lock(&self.launches).clone()
    }

    pub fn interference_requests(&self) -> Vec<u32> {
        lock(&self.interference_requests).clone()
    }
}

#[async_trait::async_trait]
impl Host for MemoryHost {
    async fn current_root(&self) -> Result<Node, AutomationError> {
        self.root_fetches.fetch_add(1, Ordering::SeqCst);
        let mut roots = lock(&self.roots);
        if roots.len() > 1 {
            return roots
                .pop_front()
                .ok_or_else(|| AutomationError::Internal("Root queue drained".to_string()));
        }
        roots
            .front()
            .cloned()
            .ok_or_else(|| AutomationError::WindowNotFound("No window available".to_string()))
    }

    fn events(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    async fn launch(&self, intent: &WindowIntent) -> Result<(), AutomationError> {
        debug!("launch({:?})", intent);
        lock(&self.launches).push(intent.clone());
        let pending = lock(&self.launch_events).clone();
        for event in pending {
            self.emit(event);
        }
        Ok(())
    }

    async fn clear_interference(&self, attempt: u32) -> Result<(), AutomationError> {
        lock(&self.interference_requests).push(attempt);
        if self.fail_interference {
            return Err(AutomationError::PlatformError(
                "Broadcasting close-dialogs failed".to_string(),
            ));
        }
        Ok(())
    }

    fn screen_state(&self) -> Option<watch::Receiver<ScreenState>> {
        Some(self.screen.subscribe())
    }
}
