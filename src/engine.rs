//! Shared runtime handle and the per-call phase context handed to mods.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::events::{BusError, Event, Listener, ListenerErrorPolicy, ModToken, Triggers};
use crate::host::HostLoop;
use crate::lifecycle::Phase;

/// A listener wired to another mod's trigger during the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerBinding {
    pub listener: String,
    pub target: String,
    pub trigger: String,
    pub phase: Phase,
}

struct EngineInner {
    policy: ListenerErrorPolicy,
    host: Rc<dyn HostLoop>,
    live: RefCell<Vec<String>>,
    tokens: RefCell<HashMap<String, ModToken>>,
    bindings: RefCell<Vec<ListenerBinding>>,
}

/// The orchestrator's state as seen by mods: which mods are live, the host
/// loop, and the listener wiring recorded so far. Clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    pub fn new(policy: ListenerErrorPolicy, host: Rc<dyn HostLoop>) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                policy,
                host,
                live: RefCell::new(Vec::new()),
                tokens: RefCell::new(HashMap::new()),
                bindings: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn policy(&self) -> ListenerErrorPolicy {
        self.inner.policy
    }

    pub fn host(&self) -> Rc<dyn HostLoop> {
        Rc::clone(&self.inner.host)
    }

    /// Defer `callback` to the host loop.
    pub fn schedule_soon(&self, callback: impl FnOnce() + 'static) {
        self.inner.host.schedule_soon(Box::new(callback));
    }

    /// Names of the mods still live, in load order.
    pub fn mod_names(&self) -> Vec<String> {
        self.inner.live.borrow().clone()
    }

    pub fn has_mod(&self, name: &str) -> bool {
        self.inner.live.borrow().iter().any(|n| n == name)
    }

    pub fn bindings(&self) -> Vec<ListenerBinding> {
        self.inner.bindings.borrow().clone()
    }

    /// Liveness token for `mod_name`, created on first use.
    pub fn token(&self, mod_name: &str) -> ModToken {
        self.inner
            .tokens
            .borrow_mut()
            .entry(mod_name.to_string())
            .or_default()
            .clone()
    }

    /// Empty trigger table owned by `owner`, using the engine's policy.
    pub fn triggers_for(&self, owner: &str) -> Triggers {
        Triggers::new(owner, self.inner.policy)
    }

    pub(crate) fn set_live(&self, names: Vec<String>) {
        *self.inner.live.borrow_mut() = names;
    }

    /// Drop `mod_name` from the live set, silence its listeners and forget
    /// every binding it took part in.
    pub(crate) fn retire(&self, mod_name: &str) {
        self.inner.live.borrow_mut().retain(|n| n != mod_name);
        if let Some(token) = self.inner.tokens.borrow().get(mod_name) {
            token.revoke();
        }
        self.inner
            .bindings
            .borrow_mut()
            .retain(|b| b.listener != mod_name && b.target != mod_name);
    }

    pub(crate) fn record_binding(&self, binding: ListenerBinding) {
        self.inner.bindings.borrow_mut().push(binding);
    }
}

pub(crate) struct PendingListen {
    pub target: String,
    pub trigger: String,
    pub listener: Listener,
}

/// What a mod gets while one of its lifecycle operations runs.
///
/// Listen requests are queued and wired once the operation returns
/// successfully, so a mod may listen to its own triggers.
pub struct PhaseContext<'a> {
    engine: &'a Engine,
    mod_name: &'a str,
    phase: Phase,
    pending: Vec<PendingListen>,
}

impl<'a> PhaseContext<'a> {
    pub fn new(engine: &'a Engine, mod_name: &'a str, phase: Phase) -> Self {
        Self {
            engine,
            mod_name,
            phase,
            pending: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        self.engine
    }

    pub fn mod_name(&self) -> &str {
        self.mod_name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// New trigger table owned by the calling mod with `names` declared.
    pub fn triggers<I, S>(&self, names: I) -> Result<Triggers, BusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let triggers = self.engine.triggers_for(self.mod_name);
        for name in names {
            triggers.declare(name.as_ref())?;
        }
        Ok(triggers)
    }

    /// Listener owned by the calling mod, silenced if the mod is removed.
    pub fn listener<F>(&self, callback: F) -> Listener
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        Listener::new(self.mod_name, self.engine.token(self.mod_name), callback)
    }

    /// Ask for `callback` to be bound to `target`'s `trigger`.
    ///
    /// The binding goes through `target`'s `register` after the current
    /// operation returns. If that fails, the calling mod fails the phase.
    pub fn listen<F>(&mut self, target: &str, trigger: &str, callback: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        let listener = self.listener(callback);
        self.pending.push(PendingListen {
            target: target.to_string(),
            trigger: trigger.to_string(),
            listener,
        });
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingListen> {
        std::mem::take(&mut self.pending)
    }
}
