use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::event::{Event, Payload};

/// One trigger fire in a causal chain.
///
/// A node knows which mod fired which trigger, the node of the event that
/// caused it, and the nodes of the triggers fired while its own listeners
/// ran, in firing order. All nodes of one cascade live in a shared tree;
/// any handle keeps the whole tree reachable in both directions.
#[derive(Clone)]
pub struct EventNode {
    tree: Rc<RefCell<Vec<NodeData>>>,
    id: usize,
}

struct NodeData {
    owner: String,
    name: String,
    parent: Option<usize>,
    payload: Rc<RefCell<Payload>>,
    children: Vec<usize>,
}

impl EventNode {
    /// Create a node and hook it under `parent`, if any.
    pub(crate) fn spawn(
        owner: &str,
        name: &str,
        parent: Option<&EventNode>,
        payload: Rc<RefCell<Payload>>,
    ) -> Self {
        let data = NodeData {
            owner: owner.to_string(),
            name: name.to_string(),
            parent: parent.map(|p| p.id),
            payload,
            children: Vec::new(),
        };
        let Some(parent) = parent else {
            return Self {
                tree: Rc::new(RefCell::new(vec![data])),
                id: 0,
            };
        };

        let mut nodes = parent.tree.borrow_mut();
        let id = nodes.len();
        nodes.push(data);
        nodes[parent.id].children.push(id);
        drop(nodes);
        Self {
            tree: Rc::clone(&parent.tree),
            id,
        }
    }

    fn at(&self, id: usize) -> Self {
        Self {
            tree: Rc::clone(&self.tree),
            id,
        }
    }

    /// Name of the mod whose trigger produced this node.
    pub fn owner(&self) -> String {
        self.tree.borrow()[self.id].owner.clone()
    }

    /// Trigger name.
    pub fn name(&self) -> String {
        self.tree.borrow()[self.id].name.clone()
    }

    pub fn parent(&self) -> Option<EventNode> {
        let parent = self.tree.borrow()[self.id].parent;
        parent.map(|id| self.at(id))
    }

    pub fn is_root(&self) -> bool {
        self.tree.borrow()[self.id].parent.is_none()
    }

    pub fn children(&self) -> Vec<EventNode> {
        let ids = self.tree.borrow()[self.id].children.clone();
        ids.into_iter().map(|id| self.at(id)).collect()
    }

    /// Handle to the event this node was fired with.
    pub fn event(&self) -> Event {
        let payload = Rc::clone(&self.tree.borrow()[self.id].payload);
        Event::from_parts(payload, self.clone())
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &EventNode) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        let nodes = self.tree.borrow();
        let mut depth = 0;
        let mut cursor = nodes[self.id].parent;
        while let Some(id) = cursor {
            depth += 1;
            cursor = nodes[id].parent;
        }
        depth
    }

    /// Owned, serializable copy of the subtree rooted here.
    pub fn snapshot(&self) -> NodeSnapshot {
        fn build(nodes: &[NodeData], id: usize) -> NodeSnapshot {
            let data = &nodes[id];
            NodeSnapshot {
                owner: data.owner.clone(),
                name: data.name.clone(),
                payload: Value::Object(data.payload.borrow().clone()),
                children: data.children.iter().map(|&c| build(nodes, c)).collect(),
            }
        }
        build(&self.tree.borrow(), self.id)
    }
}

impl PartialEq for EventNode {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for EventNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.tree.borrow();
        let data = &nodes[self.id];
        f.debug_struct("EventNode")
            .field("owner", &data.owner)
            .field("name", &data.name)
            .field("root", &data.parent.is_none())
            .field("children", &data.children.len())
            .finish()
    }
}

impl fmt::Display for EventNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.snapshot()) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{}.{}", self.owner(), self.name()),
        }
    }
}

/// Detached tree used for logging and assertions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub owner: String,
    pub name: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// `owner.name` labels in depth-first pre-order.
    pub fn labels(&self) -> Vec<String> {
        let mut out = vec![format!("{}.{}", self.owner, self.name)];
        for child in &self.children {
            out.extend(child.labels());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Rc<RefCell<Payload>> {
        Rc::new(RefCell::new(Payload::new()))
    }

    #[test]
    fn child_is_appended_to_parent() {
        let root = EventNode::spawn("A", "ping", None, payload());
        let child = EventNode::spawn("B", "pong", Some(&root), payload());

        assert!(root.is_root());
        assert_eq!(root.children(), vec![child.clone()]);
        assert!(child.parent().is_some_and(|p| p.same_as(&root)));
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn children_keep_firing_order() {
        let root = EventNode::spawn("M", "A", None, payload());
        EventNode::spawn("M", "B", Some(&root), payload());
        EventNode::spawn("M", "C", Some(&root), payload());

        let names: Vec<_> = root.children().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["B", "C"]);
    }

    #[test]
    fn snapshot_lists_labels_depth_first() {
        let root = EventNode::spawn("M", "A", None, payload());
        let b = EventNode::spawn("M", "B", Some(&root), payload());
        EventNode::spawn("M", "C", Some(&b), payload());
        EventNode::spawn("M", "D", Some(&root), payload());

        assert_eq!(root.snapshot().labels(), ["M.A", "M.B", "M.C", "M.D"]);
    }

    #[test]
    fn child_keeps_its_parent_after_root_handle_is_dropped() {
        let root = EventNode::spawn("A", "ping", None, payload());
        let child = EventNode::spawn("B", "pong", Some(&root), payload());
        let grandchild = EventNode::spawn("C", "seen", Some(&child), payload());
        drop(root);
        drop(child);

        assert!(!grandchild.is_root());
        let child = grandchild.parent().unwrap();
        assert_eq!(child.owner(), "B");
        let root = child.parent().unwrap();
        assert_eq!((root.owner(), root.name()), ("A".to_string(), "ping".to_string()));
        assert!(root.is_root());
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(root.snapshot().labels(), ["A.ping", "B.pong", "C.seen"]);
    }

    #[test]
    fn separate_roots_are_distinct() {
        let a = EventNode::spawn("M", "A", None, payload());
        let b = EventNode::spawn("M", "A", None, payload());
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
    }

    #[test]
    fn event_handle_shares_node_payload() {
        let shared = payload();
        let node = EventNode::spawn("A", "ping", None, Rc::clone(&shared));
        node.event().set("hits", 3);
        assert_eq!(shared.borrow().get("hits"), Some(&Value::from(3)));
        assert!(node.event().node().is_some_and(|n| n.same_as(&node)));
    }
}
