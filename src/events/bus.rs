//! Trigger tables and synchronous listener dispatch.
//!
//! Every mod that produces events owns a [`Triggers`] table. Firing a
//! trigger records an [`EventNode`] under the causing event's node and then
//! calls each listener bound to that trigger, in registration order, before
//! returning. Listeners may fire further triggers from inside the callback;
//! those nested fires complete (depth-first) before the outer fire moves on
//! to its next listener. There is no queue.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::str::FromStr;

use thiserror::Error;
use tracing::{trace, warn};

use super::event::Event;
use super::node::EventNode;
use crate::util::panic_message;

/// What a failing listener does to the trigger fire that called it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerErrorPolicy {
    /// Log the failure and keep calling the remaining listeners.
    #[default]
    Isolate,
    /// Stop the fan-out and hand the error back to the producer.
    Propagate,
}

impl FromStr for ListenerErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!(
                "unknown listener error policy `{other}` (expected `isolate` or `propagate`)"
            )),
        }
    }
}

impl fmt::Display for ListenerErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Isolate => "isolate",
            Self::Propagate => "propagate",
        })
    }
}

/// Raised synchronously by `register`.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("trigger `{trigger}` does not exist")]
    UnknownTrigger { trigger: String },
    #[error("`{name}` exists but is not a trigger")]
    NotATrigger { name: String },
    #[error("no mod named `{name}` is loaded")]
    UnknownMod { name: String },
}

/// Raised while firing a trigger.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("`{owner}` has no trigger `{trigger}`")]
    UnknownTrigger { owner: String, trigger: String },
    #[error("listener of `{listener}` failed during {owner}.{trigger}")]
    Listener {
        owner: String,
        trigger: String,
        listener: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors building a trigger table.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("trigger `{trigger}` is declared twice on `{owner}`")]
    DuplicateTrigger { owner: String, trigger: String },
}

/// Liveness flag shared by a mod and every listener it registered.
///
/// The orchestrator revokes the token when it removes the mod, after which
/// dispatch skips the mod's listeners.
#[derive(Debug, Clone)]
pub struct ModToken(Rc<Cell<bool>>);

impl ModToken {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.get()
    }

    pub fn revoke(&self) {
        self.0.set(false);
    }
}

impl Default for ModToken {
    fn default() -> Self {
        Self::new()
    }
}

type Callback = dyn Fn(&Event) -> anyhow::Result<()>;

/// A callback bound to one trigger, tagged with the mod that owns it.
#[derive(Clone)]
pub struct Listener {
    owner: Rc<str>,
    token: ModToken,
    callback: Rc<Callback>,
}

impl Listener {
    pub fn new<F>(owner: &str, token: ModToken, callback: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        Self {
            owner: Rc::from(owner),
            token,
            callback: Rc::new(callback),
        }
    }

    /// Listener that is not tied to a mod's lifetime (host code, tests).
    pub fn detached<F>(owner: &str, callback: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        Self::new(owner, ModToken::new(), callback)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_live(&self) -> bool {
        self.token.is_live()
    }

    pub fn call(&self, event: &Event) -> anyhow::Result<()> {
        (self.callback)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("owner", &self.owner)
            .field("live", &self.is_live())
            .finish()
    }
}

struct TriggerSlot {
    name: String,
    listeners: Vec<Listener>,
}

#[derive(Default)]
struct TriggersInner {
    owner: String,
    policy: ListenerErrorPolicy,
    slots: RefCell<Vec<TriggerSlot>>,
}

/// A mod's trigger table: declared trigger names and their listeners.
///
/// Cheap to clone; clones share the table, so a listener closure can carry
/// its mod's triggers and fire them re-entrantly. A default table has no
/// owner and no triggers, which is what a mod holds before `triggers_init`.
#[derive(Clone, Default)]
pub struct Triggers {
    inner: Rc<TriggersInner>,
}

impl Triggers {
    pub fn new(owner: &str, policy: ListenerErrorPolicy) -> Self {
        Self {
            inner: Rc::new(TriggersInner {
                owner: owner.to_string(),
                policy,
                slots: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn policy(&self) -> ListenerErrorPolicy {
        self.inner.policy
    }

    pub fn declare(&self, trigger: &str) -> Result<(), BusError> {
        if self.is_declared(trigger) {
            return Err(BusError::DuplicateTrigger {
                owner: self.inner.owner.clone(),
                trigger: trigger.to_string(),
            });
        }
        self.inner.slots.borrow_mut().push(TriggerSlot {
            name: trigger.to_string(),
            listeners: Vec::new(),
        });
        Ok(())
    }

    /// Declare `trigger` unless it already exists. Returns `true` when it was added.
    pub fn ensure(&self, trigger: &str) -> bool {
        if self.is_declared(trigger) {
            return false;
        }
        self.inner.slots.borrow_mut().push(TriggerSlot {
            name: trigger.to_string(),
            listeners: Vec::new(),
        });
        true
    }

    pub fn is_declared(&self, trigger: &str) -> bool {
        self.inner.slots.borrow().iter().any(|s| s.name == trigger)
    }

    /// Declared trigger names, in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .slots
            .borrow()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn listener_count(&self, trigger: &str) -> Option<usize> {
        self.inner
            .slots
            .borrow()
            .iter()
            .find(|s| s.name == trigger)
            .map(|s| s.listeners.len())
    }

    /// Append `listener` to `trigger`'s list. Other lists are never touched.
    pub fn register(&self, trigger: &str, listener: Listener) -> Result<(), RegistrationError> {
        let mut slots = self.inner.slots.borrow_mut();
        let slot = slots
            .iter_mut()
            .find(|s| s.name == trigger)
            .ok_or_else(|| RegistrationError::UnknownTrigger {
                trigger: trigger.to_string(),
            })?;
        slot.listeners.push(listener);
        Ok(())
    }

    /// Drop listeners whose mod has been retired. Returns how many went.
    pub fn prune(&self) -> usize {
        let mut removed = 0;
        for slot in self.inner.slots.borrow_mut().iter_mut() {
            let before = slot.listeners.len();
            slot.listeners.retain(Listener::is_live);
            removed += before - slot.listeners.len();
        }
        removed
    }

    /// Fire `trigger` with `event`, caused by `cause` (`None` for a root).
    ///
    /// Returns the node recorded for this fire. By the time it returns, every
    /// listener and everything they fired in turn has run.
    pub fn fire(
        &self,
        trigger: &str,
        cause: Option<&Event>,
        mut event: Event,
    ) -> Result<EventNode, DispatchError> {
        let listeners = self.snapshot(trigger)?;
        let parent = cause.and_then(Event::node);
        let node = EventNode::spawn(&self.inner.owner, trigger, parent, event.shared_payload());
        event.attach(node.clone());

        trace!(
            owner = %self.inner.owner,
            trigger,
            depth = node.depth(),
            listeners = listeners.len(),
            "trigger fired"
        );

        for listener in listeners.iter().filter(|l| l.is_live()) {
            let error = match catch_unwind(AssertUnwindSafe(|| listener.call(&event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(payload) => anyhow::anyhow!("listener panicked: {}", panic_message(payload.as_ref())),
            };
            match self.inner.policy {
                ListenerErrorPolicy::Isolate => {
                    warn!(
                        owner = %self.inner.owner,
                        trigger,
                        listener = listener.owner(),
                        error = %format!("{error:#}"),
                        "listener failed; continuing with remaining listeners"
                    );
                }
                ListenerErrorPolicy::Propagate => {
                    return Err(DispatchError::Listener {
                        owner: self.inner.owner.clone(),
                        trigger: trigger.to_string(),
                        listener: listener.owner().to_string(),
                        source: error,
                    });
                }
            }
        }

        Ok(node)
    }

    fn snapshot(&self, trigger: &str) -> Result<Vec<Listener>, DispatchError> {
        self.inner
            .slots
            .borrow()
            .iter()
            .find(|s| s.name == trigger)
            .map(|s| s.listeners.clone())
            .ok_or_else(|| DispatchError::UnknownTrigger {
                owner: self.inner.owner.clone(),
                trigger: trigger.to_string(),
            })
    }
}

impl fmt::Debug for Triggers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Triggers")
            .field("owner", &self.inner.owner)
            .field("triggers", &self.names())
            .finish()
    }
}
