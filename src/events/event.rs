use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::node::EventNode;

/// Free-form key/value data carried by an [`Event`].
pub type Payload = Map<String, Value>;

/// Opaque, mutable payload passed from a trigger to its listeners.
///
/// Cloning an `Event` yields another handle to the same payload, so a value
/// set by one listener is seen by every listener after it and through the
/// event's [`EventNode`]. Once the event has gone through a trigger it
/// carries the node that records where it came from.
#[derive(Clone, Default)]
pub struct Event {
    payload: Rc<RefCell<Payload>>,
    node: Option<EventNode>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_payload(payload: Payload) -> Self {
        Self {
            payload: Rc::new(RefCell::new(payload)),
            node: None,
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.borrow_mut().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.payload.borrow().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.payload.borrow_mut().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.payload.borrow().contains_key(key)
    }

    /// Copy of the current payload.
    pub fn payload(&self) -> Payload {
        self.payload.borrow().clone()
    }

    /// Provenance node, present once the event has been fired.
    pub fn node(&self) -> Option<&EventNode> {
        self.node.as_ref()
    }

    pub(crate) fn shared_payload(&self) -> Rc<RefCell<Payload>> {
        Rc::clone(&self.payload)
    }

    pub(crate) fn from_parts(payload: Rc<RefCell<Payload>>, node: EventNode) -> Self {
        Self {
            payload,
            node: Some(node),
        }
    }

    pub(crate) fn attach(&mut self, node: EventNode) {
        self.node = Some(node);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Event");
        dbg.field("payload", &*self.payload.borrow());
        if let Some(node) = &self.node {
            dbg.field("owner", &node.owner()).field("trigger", &node.name());
        }
        dbg.finish()
    }
}
