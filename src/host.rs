//! Host event loop abstraction.
//!
//! Mods never touch the host directly; they reach it through the engine to
//! defer work ("call soon") or to have native events delivered into the bus.
//! [`SimulatedHost`] is the in-process loop used by the binary and the tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::events::Payload;

/// Callback deferred to the next turn of the host loop.
pub type Deferred = Box<dyn FnOnce()>;

/// Handler invoked for every occurrence of a native host event.
pub type NativeHandler = Box<dyn Fn(&Payload)>;

pub trait HostLoop {
    /// Run `callback` after the current call stack unwinds.
    fn schedule_soon(&self, callback: Deferred);

    /// Deliver every future occurrence of `native_event` to `handler`.
    fn bind(&self, native_event: &str, handler: NativeHandler);
}

/// Single-threaded host loop with a FIFO of deferred callbacks and a table of
/// native event bindings.
pub struct SimulatedHost {
    drain_limit: usize,
    pending: RefCell<VecDeque<Deferred>>,
    bindings: RefCell<Vec<(String, Rc<dyn Fn(&Payload)>)>>,
}

pub const DEFAULT_DRAIN_LIMIT: usize = 1024;

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::with_drain_limit(DEFAULT_DRAIN_LIMIT)
    }
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drain_limit(drain_limit: usize) -> Self {
        Self {
            drain_limit: drain_limit.max(1),
            pending: RefCell::new(VecDeque::new()),
            bindings: RefCell::new(Vec::new()),
        }
    }

    /// Run deferred callbacks up to the configured per-drain limit.
    pub fn run_pending(&self) -> usize {
        self.drain(self.drain_limit)
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Run deferred callbacks in scheduling order until the queue is empty or
    /// `limit` callbacks have run. Callbacks scheduled while draining are
    /// appended and run in the same drain. Returns how many ran.
    pub fn drain(&self, limit: usize) -> usize {
        let mut ran = 0;
        while ran < limit {
            let next = self.pending.borrow_mut().pop_front();
            let Some(callback) = next else { break };
            callback();
            ran += 1;
        }
        if ran == limit && self.pending() > 0 {
            debug!(ran, left = self.pending(), "drain limit reached");
        }
        ran
    }

    /// Simulate the host raising `native_event`. Returns the number of
    /// handlers called.
    pub fn emit(&self, native_event: &str, payload: &Payload) -> usize {
        let handlers: Vec<Rc<dyn Fn(&Payload)>> = self
            .bindings
            .borrow()
            .iter()
            .filter(|(name, _)| name == native_event)
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        trace!(native_event, handlers = handlers.len(), "native event");
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    pub fn binding_count(&self, native_event: &str) -> usize {
        self.bindings
            .borrow()
            .iter()
            .filter(|(name, _)| name == native_event)
            .count()
    }

    /// Native event names with at least one binding, in first-bind order.
    pub fn bound_events(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (name, _) in self.bindings.borrow().iter() {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }
}

impl HostLoop for SimulatedHost {
    fn schedule_soon(&self, callback: Deferred) {
        self.pending.borrow_mut().push_back(callback);
    }

    fn bind(&self, native_event: &str, handler: NativeHandler) {
        self.bindings
            .borrow_mut()
            .push((native_event.to_string(), Rc::from(handler)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn deferred_callbacks_run_in_order() {
        let host = Rc::new(SimulatedHost::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            host.schedule_soon(Box::new(move || log.borrow_mut().push(i)));
        }
        assert_eq!(host.pending(), 3);
        assert_eq!(host.drain(usize::MAX), 3);
        assert_eq!(*log.borrow(), [0, 1, 2]);
    }

    #[test]
    fn callbacks_scheduled_while_draining_run_too() {
        let host = Rc::new(SimulatedHost::new());
        let hits = Rc::new(Cell::new(0));
        let inner_host = Rc::clone(&host);
        let inner_hits = Rc::clone(&hits);
        host.schedule_soon(Box::new(move || {
            let hits = Rc::clone(&inner_hits);
            inner_host.schedule_soon(Box::new(move || hits.set(hits.get() + 1)));
        }));
        assert_eq!(host.drain(10), 2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn drain_stops_at_limit() {
        let host = SimulatedHost::new();
        for _ in 0..5 {
            host.schedule_soon(Box::new(|| {}));
        }
        assert_eq!(host.drain(2), 2);
        assert_eq!(host.pending(), 3);

        let bounded = SimulatedHost::with_drain_limit(4);
        for _ in 0..5 {
            bounded.schedule_soon(Box::new(|| {}));
        }
        assert_eq!(bounded.run_pending(), 4);
        assert_eq!(bounded.run_pending(), 1);
    }

    #[test]
    fn emit_reaches_only_matching_bindings() {
        let host = SimulatedHost::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        host.bind(
            "<Motion>",
            Box::new(move |p| sink.borrow_mut().push(p.get("x").cloned())),
        );
        host.bind("<Key>", Box::new(|_| panic!("wrong binding")));

        let mut payload = Payload::new();
        payload.insert("x".into(), 4.into());
        assert_eq!(host.emit("<Motion>", &payload), 1);
        assert_eq!(*seen.borrow(), [Some(serde_json::Value::from(4))]);
        assert_eq!(host.emit("<Unbound>", &payload), 0);
        assert_eq!(host.bound_events(), ["<Motion>", "<Key>"]);
    }
}
