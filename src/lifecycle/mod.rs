//! Phased lifecycle for loaded mods.
//!
//! Each phase is a barrier: every mod still in the registry is called for
//! the phase before any mod sees the next one. A mod that errors or panics
//! is recorded, allowed to finish the phase alongside the others, and then
//! removed so it never sees a later phase. Its listeners go quiet with it.

use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::anyhow;
use tracing::{debug, error, info};

use crate::engine::{Engine, ListenerBinding, PendingListen, PhaseContext};
use crate::events::RegistrationError;
use crate::plugins::{Mod, ModRegistry};
use crate::util::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Construct,
    Init,
    TriggersInit,
    ListenersInit,
    BeforeFinishInit,
    FinishInit,
}

impl Phase {
    /// Phases the orchestrator drives, in order. Construction happens in the loader.
    pub const RUN_ORDER: [Phase; 5] = [
        Phase::Init,
        Phase::TriggersInit,
        Phase::ListenersInit,
        Phase::BeforeFinishInit,
        Phase::FinishInit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Construct => "construct",
            Self::Init => "init",
            Self::TriggersInit => "triggers_init",
            Self::ListenersInit => "listeners_init",
            Self::BeforeFinishInit => "before_finish_init",
            Self::FinishInit => "finish_init",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mod dropped out of the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleFailure {
    pub mod_name: String,
    pub phase: Phase,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleReport {
    pub failures: Vec<LifecycleFailure>,
    /// Mods that made it through every phase, in registry order.
    pub survivors: Vec<String>,
}

impl LifecycleReport {
    pub fn failure_of(&self, mod_name: &str) -> Option<&LifecycleFailure> {
        self.failures.iter().find(|f| f.mod_name == mod_name)
    }
}

fn call_phase(instance: &mut dyn Mod, phase: Phase, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
    match phase {
        Phase::Construct => Ok(()),
        Phase::Init => instance.init(ctx),
        Phase::TriggersInit => instance.triggers_init(ctx),
        Phase::ListenersInit => instance.listeners_init(ctx),
        Phase::BeforeFinishInit => instance.before_finish_init(ctx),
        Phase::FinishInit => instance.finish_init(ctx),
    }
}

/// Hand each queued listen request to its target's `register`.
fn apply_listens(
    registry: &mut ModRegistry,
    engine: &Engine,
    listener_mod: &str,
    phase: Phase,
    pending: Vec<PendingListen>,
) -> anyhow::Result<()> {
    for request in pending {
        let Some(target) = registry.get_mut(&request.target) else {
            return Err(RegistrationError::UnknownMod {
                name: request.target,
            }
            .into());
        };
        let trigger = request.trigger.clone();
        match catch_unwind(AssertUnwindSafe(|| target.register(&trigger, request.listener))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("listening to {}.{trigger}", request.target)));
            }
            Err(payload) => {
                return Err(anyhow!(
                    "{}.register panicked: {}",
                    request.target,
                    panic_message(payload.as_ref())
                ));
            }
        }
        debug!(
            mod_name = listener_mod,
            target = %request.target,
            trigger = %trigger,
            "listener bound"
        );
        engine.record_binding(ListenerBinding {
            listener: listener_mod.to_string(),
            target: request.target,
            trigger,
            phase,
        });
    }
    Ok(())
}

/// Run one phase over `name` and wire whatever it asked to listen to.
fn run_one(registry: &mut ModRegistry, engine: &Engine, name: &str, phase: Phase) -> anyhow::Result<()> {
    let Some(instance) = registry.get_mut(name) else {
        return Ok(());
    };
    let mut ctx = PhaseContext::new(engine, name, phase);
    match catch_unwind(AssertUnwindSafe(|| call_phase(instance, phase, &mut ctx))) {
        Ok(result) => result?,
        Err(payload) => return Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
    let pending = ctx.take_pending();
    apply_listens(registry, engine, name, phase, pending)
}

/// Drive every mod in `registry` through all phases.
///
/// Failed mods are removed from `registry`; what is left afterwards is the
/// live system.
pub fn run_lifecycle(registry: &mut ModRegistry, engine: &Engine) -> LifecycleReport {
    let mut report = LifecycleReport::default();
    engine.set_live(registry.names());

    for phase in Phase::RUN_ORDER {
        let names = registry.names();
        let mut failed = Vec::new();

        for name in &names {
            if let Err(err) = run_one(registry, engine, name, phase) {
                let failure = LifecycleFailure {
                    mod_name: name.clone(),
                    phase,
                    error: format!("{err:#}"),
                };
                error!(
                    mod_name = %failure.mod_name,
                    phase = %phase,
                    error = %failure.error,
                    "mod failed; removing it after this phase"
                );
                failed.push(name.clone());
                report.failures.push(failure);
            }
        }

        for name in &failed {
            registry.remove(name);
            engine.retire(name);
        }
        if !failed.is_empty() {
            for name in registry.names() {
                if let Some(triggers) = registry.triggers(&name) {
                    let pruned = triggers.prune();
                    if pruned > 0 {
                        debug!(mod_name = %name, pruned, "dropped listeners of removed mods");
                    }
                }
            }
        }
        engine.set_live(registry.names());
        debug!(phase = %phase, live = registry.len(), removed = failed.len(), "phase complete");
    }

    report.survivors = registry.names();
    info!(
        survivors = report.survivors.len(),
        failures = report.failures.len(),
        "lifecycle complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, ListenerErrorPolicy, Triggers};
    use crate::host::SimulatedHost;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every phase call; optionally fails in one phase.
    struct Scripted {
        name: &'static str,
        log: Log,
        fail_in: Option<Phase>,
        panic_in: Option<Phase>,
    }

    impl Scripted {
        fn boxed(name: &'static str, log: &Log) -> Box<dyn Mod> {
            Box::new(Self {
                name,
                log: Rc::clone(log),
                fail_in: None,
                panic_in: None,
            })
        }

        fn step(&self, phase: Phase) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("{}:{phase}", self.name));
            if self.panic_in == Some(phase) {
                panic!("{} blew up", self.name);
            }
            if self.fail_in == Some(phase) {
                anyhow::bail!("{} refused {phase}", self.name);
            }
            Ok(())
        }
    }

    impl Mod for Scripted {
        fn init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            self.step(ctx.phase())
        }
        fn triggers_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            self.step(ctx.phase())
        }
        fn listeners_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            self.step(ctx.phase())
        }
        fn before_finish_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            self.step(ctx.phase())
        }
        fn finish_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            self.step(ctx.phase())
        }
    }

    fn engine() -> Engine {
        Engine::new(ListenerErrorPolicy::Isolate, Rc::new(SimulatedHost::new()))
    }

    #[test]
    fn phases_are_barriers() {
        let log = Log::default();
        let mut registry = ModRegistry::new();
        registry.insert("A", "a", Scripted::boxed("A", &log));
        registry.insert("B", "b", Scripted::boxed("B", &log));

        let report = run_lifecycle(&mut registry, &engine());
        assert!(report.failures.is_empty());
        assert_eq!(
            *log.borrow(),
            [
                "A:init",
                "B:init",
                "A:triggers_init",
                "B:triggers_init",
                "A:listeners_init",
                "B:listeners_init",
                "A:before_finish_init",
                "B:before_finish_init",
                "A:finish_init",
                "B:finish_init",
            ]
        );
    }

    #[test]
    fn failing_mod_finishes_phase_then_is_removed() {
        let log = Log::default();
        let mut registry = ModRegistry::new();
        registry.insert("P", "p", Scripted::boxed("P", &log));
        registry.insert(
            "Q",
            "q",
            Box::new(Scripted {
                name: "Q",
                log: Rc::clone(&log),
                fail_in: Some(Phase::Init),
                panic_in: None,
            }),
        );
        registry.insert("R", "r", Scripted::boxed("R", &log));

        let engine = engine();
        let report = run_lifecycle(&mut registry, &engine);

        assert_eq!(report.survivors, ["P", "R"]);
        let failure = report.failure_of("Q").unwrap();
        assert_eq!(failure.phase, Phase::Init);
        assert!(failure.error.contains("refused init"));
        assert!(log.borrow().contains(&"R:init".to_string()));
        assert!(!log.borrow().iter().any(|l| l.starts_with("Q:triggers")));
        assert_eq!(engine.mod_names(), ["P", "R"]);
    }

    #[test]
    fn panicking_mod_is_contained() {
        let log = Log::default();
        let mut registry = ModRegistry::new();
        registry.insert(
            "Boom",
            "boom",
            Box::new(Scripted {
                name: "Boom",
                log: Rc::clone(&log),
                fail_in: None,
                panic_in: Some(Phase::BeforeFinishInit),
            }),
        );
        registry.insert("Calm", "calm", Scripted::boxed("Calm", &log));

        let report = run_lifecycle(&mut registry, &engine());
        assert_eq!(report.survivors, ["Calm"]);
        let failure = report.failure_of("Boom").unwrap();
        assert_eq!(failure.phase, Phase::BeforeFinishInit);
        assert!(failure.error.contains("Boom blew up"));
    }

    #[derive(Default)]
    struct Source {
        triggers: Triggers,
    }

    impl Mod for Source {
        fn triggers_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            self.triggers = ctx.triggers(["ping"])?;
            Ok(())
        }

        fn triggers(&self) -> Option<&Triggers> {
            Some(&self.triggers)
        }
    }

    struct Sink {
        target: &'static str,
        trigger: &'static str,
        hits: Rc<RefCell<u32>>,
    }

    impl Mod for Sink {
        fn listeners_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            let hits = Rc::clone(&self.hits);
            ctx.listen(self.target, self.trigger, move |_| {
                *hits.borrow_mut() += 1;
                Ok(())
            });
            Ok(())
        }
    }

    #[test]
    fn queued_listens_are_wired_and_recorded() {
        let hits = Rc::new(RefCell::new(0));
        let mut registry = ModRegistry::new();
        registry.insert("Source", "s", Box::new(Source::default()));
        registry.insert(
            "Sink",
            "k",
            Box::new(Sink {
                target: "Source",
                trigger: "ping",
                hits: Rc::clone(&hits),
            }),
        );

        let engine = engine();
        let report = run_lifecycle(&mut registry, &engine);
        assert!(report.failures.is_empty());
        assert_eq!(engine.bindings().len(), 1);
        assert_eq!(engine.bindings()[0].listener, "Sink");

        let triggers = registry.triggers("Source").unwrap();
        triggers.fire("ping", None, Event::new()).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn bad_listen_fails_the_listening_mod() {
        let hits = Rc::new(RefCell::new(0));
        let mut registry = ModRegistry::new();
        registry.insert("Source", "s", Box::new(Source::default()));
        registry.insert(
            "Ghost",
            "g",
            Box::new(Sink {
                target: "Source",
                trigger: "nope",
                hits: Rc::clone(&hits),
            }),
        );
        registry.insert(
            "Orphan",
            "o",
            Box::new(Sink {
                target: "Missing",
                trigger: "ping",
                hits,
            }),
        );

        let report = run_lifecycle(&mut registry, &engine());
        assert_eq!(report.survivors, ["Source"]);
        assert_eq!(report.failure_of("Ghost").unwrap().phase, Phase::ListenersInit);
        assert!(report.failure_of("Ghost").unwrap().error.contains("does not exist"));
        assert!(report.failure_of("Orphan").unwrap().error.contains("Missing"));
        let triggers = registry.triggers("Source").unwrap();
        assert_eq!(triggers.listener_count("ping"), Some(0));
    }

    /// Listens to `Source.ping`, then to a trigger `Source` never declares.
    struct HalfWired {
        hits: Rc<RefCell<u32>>,
    }

    impl Mod for HalfWired {
        fn listeners_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            let hits = Rc::clone(&self.hits);
            ctx.listen("Source", "ping", move |_| {
                *hits.borrow_mut() += 1;
                Ok(())
            });
            ctx.listen("Source", "ghost", |_| Ok(()));
            Ok(())
        }
    }

    #[test]
    fn partially_wired_mod_leaves_no_bindings_behind() {
        let hits = Rc::new(RefCell::new(0));
        let mut registry = ModRegistry::new();
        registry.insert("Source", "s", Box::new(Source::default()));
        registry.insert(
            "Half",
            "h",
            Box::new(HalfWired {
                hits: Rc::clone(&hits),
            }),
        );

        let engine = engine();
        let report = run_lifecycle(&mut registry, &engine);
        assert_eq!(report.survivors, ["Source"]);
        assert!(report.failure_of("Half").unwrap().error.contains("ghost"));
        assert!(engine.bindings().is_empty());

        let triggers = registry.triggers("Source").unwrap();
        assert_eq!(triggers.listener_count("ping"), Some(0));
        triggers.fire("ping", None, Event::new()).unwrap();
        assert_eq!(*hits.borrow(), 0);
    }

    /// Listens to `Source.ping` and then fails a later phase.
    struct LateQuitter;

    impl Mod for LateQuitter {
        fn listeners_init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            ctx.listen("Source", "ping", |_| Ok(()));
            Ok(())
        }

        fn finish_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("gave up")
        }
    }

    #[test]
    fn bindings_of_mods_removed_later_are_forgotten() {
        let mut registry = ModRegistry::new();
        registry.insert("Source", "s", Box::new(Source::default()));
        registry.insert("Quitter", "q", Box::new(LateQuitter));

        let engine = engine();
        let report = run_lifecycle(&mut registry, &engine);
        assert_eq!(report.failure_of("Quitter").unwrap().phase, Phase::FinishInit);
        assert!(engine.bindings().is_empty());
        assert_eq!(
            registry.triggers("Source").unwrap().listener_count("ping"),
            Some(0)
        );
    }
}
