//! Compiled-in constructors that unit descriptors refer to by key.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::traits::Mod;
use super::validator::CapabilitySet;
use crate::util::panic_message;

type Constructor = Box<dyn Fn() -> Box<dyn Mod>>;

/// A zero-argument constructor plus the surface of what it builds.
pub struct ModFactory {
    key: String,
    surface: CapabilitySet,
    construct: Constructor,
}

impl ModFactory {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn surface(&self) -> &CapabilitySet {
        &self.surface
    }

    /// Build a fresh instance. A panicking constructor is reported as an error.
    pub fn instantiate(&self) -> Result<Box<dyn Mod>, String> {
        catch_unwind(AssertUnwindSafe(|| (self.construct)()))
            .map_err(|payload| format!("constructor panicked: {}", panic_message(payload.as_ref())))
    }
}

impl std::fmt::Debug for ModFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModFactory").field("key", &self.key).finish()
    }
}

/// Type name to factory key pair loaded before any discovered unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub type_name: String,
    pub factory: String,
}

/// Table of factories keyed by name, plus the builtin seeds.
#[derive(Debug, Default)]
pub struct ModCatalog {
    factories: HashMap<String, ModFactory>,
    seeds: Vec<Seed>,
}

impl ModCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M`'s `Default` constructor under `key`. Re-registering a key
    /// replaces the earlier constructor.
    pub fn register<M>(&mut self, key: &str) -> &mut Self
    where
        M: Mod + Default + 'static,
    {
        self.register_fn(key, || Box::new(M::default()) as Box<dyn Mod>)
    }

    pub fn register_fn<F>(&mut self, key: &str, construct: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Mod> + 'static,
    {
        self.factories.insert(
            key.to_string(),
            ModFactory {
                key: key.to_string(),
                surface: CapabilitySet::complete(),
                construct: Box::new(construct),
            },
        );
        self
    }

    /// Load `type_name` from factory `key` ahead of discovery, so that units
    /// on disk can shadow it.
    pub fn seed(&mut self, type_name: &str, key: &str) -> &mut Self {
        self.seeds.push(Seed {
            type_name: type_name.to_string(),
            factory: key.to_string(),
        });
        self
    }

    pub fn get(&self, key: &str) -> Option<&ModFactory> {
        self.factories.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn seeds(&self) -> &[Seed] {
        &self.seeds
    }
}
