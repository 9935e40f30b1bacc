//! Boots a complete system: load mods, run the lifecycle, hand back the
//! live registry and everything that was reported along the way.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::engine::Engine;
use crate::events::{Event, EventNode};
use crate::host::HostLoop;
use crate::lifecycle::{run_lifecycle, LifecycleReport};
use crate::plugins::{load_mods, DiscoveredUnit, Diagnostic, ModCatalog, ModRegistry};

pub struct Sweeper {
    engine: Engine,
    registry: ModRegistry,
    units: Vec<DiscoveredUnit>,
    diagnostics: Vec<Diagnostic>,
    lifecycle: LifecycleReport,
}

impl Sweeper {
    /// Discover and load mods from the configured directories (plus
    /// `extra_dirs`, scanned last), then run every lifecycle phase.
    pub fn boot(
        config: &Config,
        extra_dirs: &[PathBuf],
        catalog: &ModCatalog,
        host: Rc<dyn HostLoop>,
    ) -> Self {
        let mut roots = config.mod_dirs();
        roots.extend(extra_dirs.iter().cloned());

        let load = load_mods(&roots, &config.discovery_rules(), catalog);
        let mut registry = load.registry;

        let engine = Engine::new(config.bus.on_listener_error, host);
        let lifecycle = run_lifecycle(&mut registry, &engine);
        info!(
            mods = registry.len(),
            failures = lifecycle.failures.len(),
            policy = %engine.policy(),
            "sweeper booted"
        );

        Self {
            engine,
            registry,
            units: load.units,
            diagnostics: load.diagnostics,
            lifecycle,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn registry(&self) -> &ModRegistry {
        &self.registry
    }

    pub fn units(&self) -> &[DiscoveredUnit] {
        &self.units
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn lifecycle(&self) -> &LifecycleReport {
        &self.lifecycle
    }

    /// Fire `mod_name`'s `trigger` as a root event from outside any mod.
    pub fn fire(&self, mod_name: &str, trigger: &str, event: Event) -> anyhow::Result<EventNode> {
        let triggers = self
            .registry
            .triggers(mod_name)
            .with_context(|| format!("`{mod_name}` is not loaded or has no triggers"))?;
        Ok(triggers.fire(trigger, None, event)?)
    }
}
