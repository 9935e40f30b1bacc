use serde::Serialize;
use tracing::{error, info, warn};

use super::traits::{Capability, Mod};
use crate::events::Triggers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warn,
    Error,
}

/// Something the loader noticed and moved past.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub mod_name: Option<String>,
    pub source: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Capability>,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            mod_name: None,
            source: None,
            message: message.into(),
            missing: Vec::new(),
        }
    }

    pub fn with_mod(mut self, name: impl Into<String>) -> Self {
        self.mod_name = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_missing(mut self, missing: Vec<Capability>) -> Self {
        self.missing = missing;
        self
    }

    pub(crate) fn log(&self) {
        let name = self.mod_name.as_deref().unwrap_or("-");
        let source = self.source.as_deref().unwrap_or("-");
        match self.level {
            DiagnosticLevel::Info => info!(mod_name = name, source, "{}", self.message),
            DiagnosticLevel::Warn => warn!(mod_name = name, source, "{}", self.message),
            DiagnosticLevel::Error => error!(mod_name = name, source, "{}", self.message),
        }
    }
}

struct ModEntry {
    name: String,
    source: String,
    instance: Box<dyn Mod>,
}

/// Constructed mods keyed by type name, in load order.
///
/// Inserting a name that is already present replaces the instance in place,
/// so a later definition shadows an earlier one without moving it.
#[derive(Default)]
pub struct ModRegistry {
    entries: Vec<ModEntry>,
}

impl ModRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. Returns the source of the replaced entry.
    pub fn insert(&mut self, name: &str, source: &str, instance: Box<dyn Mod>) -> Option<String> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            let previous = std::mem::replace(&mut entry.source, source.to_string());
            entry.instance = instance;
            return Some(previous);
        }
        self.entries.push(ModEntry {
            name: name.to_string(),
            source: source.to_string(),
            instance,
        });
        None
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Mod>> {
        let idx = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(idx).instance)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Mod> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.instance.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Mod + 'static)> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .map(|e| e.instance.as_mut())
    }

    /// Where `name` was loaded from.
    pub fn source(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.source.as_str())
    }

    /// Handle to `name`'s trigger table, if it exposes one.
    pub fn triggers(&self, name: &str) -> Option<Triggers> {
        self.get(name).and_then(|m| m.triggers().cloned())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ModRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.name, &e.source)))
            .finish()
    }
}
