//! Observable property tree shared between the session worker and UI threads.
//!
//! Every mutation goes through one internal lock, so nodes may be created,
//! re-parented, or destroyed from any thread. Destruction observers are
//! collected under the lock but always invoked after it is released, which
//! lets observers take their own locks (or touch the tree again) freely.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifier of a node within one [`PropTree`].
pub type NodeId = u64;

const MAX_LINK_DEPTH: usize = 16;

/// Value stored on a property node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropValue {
    #[default]
    Void,
    Str(String),
    Int(i64),
    Float(f64),
    /// Display text paired with a navigable URL.
    Link { title: String, url: String },
}

/// Failure modes for structural tree mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The node being moved has already been destroyed.
    NodeDestroyed,
    /// The requested parent has already been destroyed.
    ParentDestroyed,
}

type DestroyObserver = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct NodeState {
    name: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    value: PropValue,
    link: Option<NodeId>,
    observers: Vec<DestroyObserver>,
}

#[derive(Default)]
struct TreeState {
    nodes: HashMap<NodeId, NodeState>,
    next_id: NodeId,
}

impl TreeState {
    fn reserve_id(&mut self) -> NodeId {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, name: Option<&str>, parent: Option<NodeId>) -> NodeId {
        let id = self.reserve_id();
        self.nodes.insert(
            id,
            NodeState {
                name: name.map(str::to_string),
                parent,
                ..NodeState::default()
            },
        );
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                parent_node.children.push(id);
            }
        }
        id
    }

    fn resolve(&self, mut id: NodeId) -> NodeId {
        for _ in 0..MAX_LINK_DEPTH {
            match self.nodes.get(&id).and_then(|node| node.link) {
                Some(target) => id = target,
                None => break,
            }
        }
        id
    }

    fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.nodes.get(&id)?.children.iter().copied().find(|child| {
            self.nodes
                .get(child)
                .and_then(|node| node.name.as_deref())
                .is_some_and(|child_name| child_name == name)
        })
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent_id) = self.nodes.get_mut(&id).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.retain(|child| *child != id);
        }
    }

    fn attach(&mut self, id: NodeId, parent_id: NodeId, before: Option<NodeId>) {
        let Some(parent) = self.nodes.get_mut(&parent_id) else {
            return;
        };
        let position = before
            .and_then(|anchor| parent.children.iter().position(|child| *child == anchor))
            .unwrap_or(parent.children.len());
        parent.children.insert(position, id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(parent_id);
        }
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(node) = self.nodes.get(&id) {
            for child in &node.children {
                self.collect_subtree(*child, out);
            }
        }
    }
}

/// Thread-safe tree of named, valued property nodes.
pub struct PropTree {
    state: Mutex<TreeState>,
}

impl PropTree {
    /// Creates an empty tree.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TreeState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().expect("prop tree lock poisoned")
    }

    /// Creates a node without a parent.
    pub fn create_detached(self: &Arc<Self>, name: Option<&str>) -> PropNode {
        let id = self.lock().insert(name, None);
        PropNode {
            tree: Arc::clone(self),
            id,
        }
    }

    /// Number of live nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }
}

/// Cloneable handle to one node of a [`PropTree`].
#[derive(Clone)]
pub struct PropNode {
    tree: Arc<PropTree>,
    id: NodeId,
}

impl fmt::Debug for PropNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropNode").field("id", &self.id).finish()
    }
}

impl PartialEq for PropNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.tree, &other.tree)
    }
}

impl Eq for PropNode {}

impl PropNode {
    fn handle(&self, id: NodeId) -> PropNode {
        PropNode {
            tree: Arc::clone(&self.tree),
            id,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &Arc<PropTree> {
        &self.tree
    }

    /// Returns the named child, creating it when missing.
    ///
    /// On a destroyed node this returns an already-destroyed handle, so
    /// writers racing with teardown become no-ops.
    pub fn create(&self, name: &str) -> PropNode {
        let mut state = self.tree.lock();
        if !state.nodes.contains_key(&self.id) {
            let id = state.reserve_id();
            return self.handle(id);
        }
        let id = match state.find_child(self.id, name) {
            Some(existing) => existing,
            None => state.insert(Some(name), Some(self.id)),
        };
        self.handle(id)
    }

    /// Appends a new unnamed child.
    pub fn create_anonymous(&self) -> PropNode {
        let mut state = self.tree.lock();
        let id = if state.nodes.contains_key(&self.id) {
            state.insert(None, Some(self.id))
        } else {
            state.reserve_id()
        };
        self.handle(id)
    }

    /// Looks up a named child, following links.
    pub fn get(&self, name: &str) -> Option<PropNode> {
        let state = self.tree.lock();
        let resolved = state.resolve(self.id);
        state.find_child(resolved, name).map(|id| self.handle(id))
    }

    /// Ordered children, following links.
    pub fn children(&self) -> Vec<PropNode> {
        let state = self.tree.lock();
        let resolved = state.resolve(self.id);
        state
            .nodes
            .get(&resolved)
            .map(|node| node.children.iter().map(|id| self.handle(*id)).collect())
            .unwrap_or_default()
    }

    pub fn name(&self) -> Option<String> {
        self.tree.lock().nodes.get(&self.id)?.name.clone()
    }

    pub fn parent(&self) -> Option<PropNode> {
        let parent = self.tree.lock().nodes.get(&self.id)?.parent?;
        Some(self.handle(parent))
    }

    /// Current value, following links.
    pub fn value(&self) -> PropValue {
        let state = self.tree.lock();
        let resolved = state.resolve(self.id);
        state
            .nodes
            .get(&resolved)
            .map(|node| node.value.clone())
            .unwrap_or_default()
    }

    /// String form of the value (link titles included).
    pub fn string(&self) -> Option<String> {
        match self.value() {
            PropValue::Str(text) => Some(text),
            PropValue::Link { title, .. } => Some(title),
            _ => None,
        }
    }

    pub fn int(&self) -> Option<i64> {
        match self.value() {
            PropValue::Int(value) => Some(value),
            _ => None,
        }
    }

    fn set_value(&self, value: PropValue) {
        if let Some(node) = self.tree.lock().nodes.get_mut(&self.id) {
            node.value = value;
        }
    }

    pub fn set_string(&self, value: &str) {
        self.set_value(PropValue::Str(value.to_string()));
    }

    pub fn set_int(&self, value: i64) {
        self.set_value(PropValue::Int(value));
    }

    pub fn set_float(&self, value: f64) {
        self.set_value(PropValue::Float(value));
    }

    pub fn set_link(&self, title: &str, url: &str) {
        self.set_value(PropValue::Link {
            title: title.to_string(),
            url: url.to_string(),
        });
    }

    /// Makes this node mirror `source`: reads of value and children resolve
    /// to the source until the link is replaced.
    pub fn link(&self, source: &PropNode) {
        if let Some(node) = self.tree.lock().nodes.get_mut(&self.id) {
            node.link = Some(source.id);
        }
    }

    /// Re-parents this node, appending it at the end of `parent`'s children.
    pub fn set_parent(&self, parent: &PropNode) -> Result<(), TreeError> {
        self.set_parent_before(parent, None)
    }

    /// Re-parents this node immediately before `before` (or at the end when
    /// `before` is `None` or not a child of `parent`).
    pub fn set_parent_before(
        &self,
        parent: &PropNode,
        before: Option<&PropNode>,
    ) -> Result<(), TreeError> {
        let mut state = self.tree.lock();
        if !state.nodes.contains_key(&self.id) {
            return Err(TreeError::NodeDestroyed);
        }
        if !state.nodes.contains_key(&parent.id) {
            return Err(TreeError::ParentDestroyed);
        }
        state.detach(self.id);
        state.attach(self.id, parent.id, before.map(|anchor| anchor.id));
        Ok(())
    }

    /// Repositions this node among its current siblings.
    pub fn move_before(&self, before: Option<&PropNode>) {
        let mut state = self.tree.lock();
        let Some(parent) = state.nodes.get(&self.id).and_then(|node| node.parent) else {
            return;
        };
        if before.is_some_and(|anchor| anchor.id == self.id) {
            return;
        }
        state.detach(self.id);
        state.attach(self.id, parent, before.map(|anchor| anchor.id));
    }

    /// Destroys this node and its whole subtree, then notifies observers.
    ///
    /// Destroying an already-destroyed node is a no-op.
    pub fn destroy(&self) {
        let observers = {
            let mut state = self.tree.lock();
            if !state.nodes.contains_key(&self.id) {
                return;
            }
            state.detach(self.id);
            let mut doomed = Vec::new();
            state.collect_subtree(self.id, &mut doomed);
            let mut observers = Vec::new();
            for id in doomed {
                if let Some(node) = state.nodes.remove(&id) {
                    observers.extend(node.observers);
                }
            }
            observers
        };
        for observer in observers {
            observer();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        !self.tree.lock().nodes.contains_key(&self.id)
    }

    /// Registers a one-shot destruction observer.
    ///
    /// Returns `false` without registering when the node is already gone.
    pub fn subscribe_destroyed(&self, observer: impl FnOnce() + Send + 'static) -> bool {
        match self.tree.lock().nodes.get_mut(&self.id) {
            Some(node) => {
                node.observers.push(Box::new(observer));
                true
            }
            None => false,
        }
    }
}
