//! Demo mods showing triggers, listeners and chained fires.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::info;

use crate::engine::PhaseContext;
use crate::events::{Event, EventNode, Triggers};
use crate::plugins::Mod;

/// Declares `trigger` and pulls it once everything is wired.
#[derive(Default)]
pub struct TriggerMod {
    triggers: Triggers,
    last: Option<EventNode>,
}

impl TriggerMod {
    /// Fire `trigger` as a root event.
    pub fn pull(&self) -> anyhow::Result<EventNode> {
        info!("pulling the trigger");
        let event = Event::new().with("event", "root cause");
        Ok(self.triggers.fire("trigger", None, event)?)
    }

    pub fn last(&self) -> Option<&EventNode> {
        self.last.as_ref()
    }
}

impl Mod for TriggerMod {
    fn triggers_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        self.triggers = ctx.triggers(["trigger"])?;
        Ok(())
    }

    fn finish_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        let node = self.pull()?;
        info!(tree = %node, "trigger fired");
        self.last = Some(node);
        Ok(())
    }

    fn triggers(&self) -> Option<&Triggers> {
        Some(&self.triggers)
    }
}

/// Listens to `TriggerMod.trigger` and counts what it hears.
#[derive(Default)]
pub struct ListenerMod {
    heard: Rc<Cell<u32>>,
}

impl ListenerMod {
    pub fn heard(&self) -> u32 {
        self.heard.get()
    }
}

impl Mod for ListenerMod {
    fn listeners_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        let heard = Rc::clone(&self.heard);
        ctx.listen("TriggerMod", "trigger", move |event| {
            heard.set(heard.get() + 1);
            info!(?event, "triggered");
            Ok(())
        });
        Ok(())
    }
}

/// Bump `counter` and stamp the event with the step that ran.
fn step(counter: &Cell<u32>, label: &str, event: &Event) {
    info!(step = label, counter = counter.get(), "chain step");
    counter.set(counter.get() + 1);
    event.set("step", label);
    event.set("counter", counter.get());
}

/// A diamond of triggers inside one mod:
///
/// ```text
/// A <- B      (B listens to A, and is a trigger itself)
/// A <- C
/// B <- C
/// C <- D      (D only listens)
/// ```
///
/// Firing `A` from `finish_init` yields the tree `A[B[C], C]`.
#[derive(Default)]
pub struct ChainMod {
    counter: Rc<Cell<u32>>,
    triggers: Triggers,
    last: Rc<RefCell<Option<EventNode>>>,
}

impl ChainMod {
    pub fn counter(&self) -> u32 {
        self.counter.get()
    }

    /// Root of the most recent chain.
    pub fn last_chain(&self) -> Option<EventNode> {
        self.last.borrow().clone()
    }

    /// Fire `A` as a root event.
    pub fn fire(&self) -> anyhow::Result<EventNode> {
        let event = Event::new();
        step(&self.counter, "A", &event);
        let node = self.triggers.fire("A", None, event)?;
        *self.last.borrow_mut() = Some(node.clone());
        Ok(node)
    }
}

impl Mod for ChainMod {
    fn triggers_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        self.triggers = ctx.triggers(["A", "B", "C"])?;
        Ok(())
    }

    fn listeners_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        let me = ctx.mod_name().to_string();

        // B and C are triggers that fire when something they listen to fires.
        for (source, relay) in [("A", "B"), ("A", "C"), ("B", "C")] {
            let counter = Rc::clone(&self.counter);
            let triggers = self.triggers.clone();
            ctx.listen(&me, source, move |cause| {
                let event = Event::new();
                step(&counter, relay, &event);
                triggers.fire(relay, Some(cause), event)?;
                Ok(())
            });
        }

        // D only listens; it leaves C's own stamp alone.
        let counter = Rc::clone(&self.counter);
        ctx.listen(&me, "C", move |event| {
            info!(step = "D", counter = counter.get(), "chain step");
            counter.set(counter.get() + 1);
            event.set("handled_by", "D");
            event.set("handled_at", counter.get());
            Ok(())
        });
        Ok(())
    }

    fn finish_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        let root = self.fire()?;
        info!(tree = %root, "chain complete");
        Ok(())
    }

    fn triggers(&self) -> Option<&Triggers> {
        Some(&self.triggers)
    }
}

/// A listener on `A` that fires `D` twice through a plain helper, giving
/// the tree `A[D, D]`. Each `D` carries the value `A` was fired with.
#[derive(Default)]
pub struct ChainMod2 {
    counter: Rc<Cell<u32>>,
    triggers: Triggers,
    last: Rc<RefCell<Option<EventNode>>>,
}

impl ChainMod2 {
    pub fn counter(&self) -> u32 {
        self.counter.get()
    }

    pub fn last_chain(&self) -> Option<EventNode> {
        self.last.borrow().clone()
    }

    pub fn fire(&self) -> anyhow::Result<EventNode> {
        self.counter.set(self.counter.get() + 1);
        let event = Event::new().with("A", self.counter.get());
        let node = self.triggers.fire("A", None, event)?;
        *self.last.borrow_mut() = Some(node.clone());
        Ok(node)
    }
}

/// Not a trigger: fires `D` twice on behalf of its caller.
fn fan_out_d(triggers: &Triggers, counter: &Cell<u32>, cause: &Event) -> anyhow::Result<Vec<EventNode>> {
    counter.set(counter.get() + 1);
    let origin = cause.get("A").unwrap_or_default();
    let mut nodes = Vec::with_capacity(2);
    for _ in 0..2 {
        counter.set(counter.get() + 1);
        let event = Event::new()
            .with("D", counter.get())
            .with("origin", origin.clone());
        nodes.push(triggers.fire("D", Some(cause), event)?);
    }
    Ok(nodes)
}

impl Mod for ChainMod2 {
    fn triggers_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        self.triggers = ctx.triggers(["A", "D"])?;
        Ok(())
    }

    fn listeners_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        let me = ctx.mod_name().to_string();
        let counter = Rc::clone(&self.counter);
        let triggers = self.triggers.clone();
        ctx.listen(&me, "A", move |event| {
            counter.set(counter.get() + 1);
            fan_out_d(&triggers, &counter, event)?;
            Ok(())
        });
        Ok(())
    }

    fn finish_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        let root = self.fire()?;
        info!(tree = %root, "second chain complete");
        Ok(())
    }

    fn triggers(&self) -> Option<&Triggers> {
        Some(&self.triggers)
    }
}
