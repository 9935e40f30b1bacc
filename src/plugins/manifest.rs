//! Unit descriptors — the TOML files that declare mod types.
//!
//! A unit lists the types it defines under `[[mods]]` and the names it only
//! imports under `uses`. Each defined type either points at a compiled-in
//! constructor (`factory`) or spells out its surface (`exports`).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default entry file that marks a directory as a package unit.
pub const PACKAGE_ENTRY_FILENAME: &str = "mod.toml";

/// Parsed unit descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitManifest {
    /// Names imported from other units. Never instantiated here.
    #[serde(default)]
    pub uses: Vec<String>,
    /// Types defined by this unit, in declaration order.
    #[serde(default)]
    pub mods: Vec<TypeEntry>,
}

/// One type defined by a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeEntry {
    /// Type name; the registry key of the constructed mod.
    pub name: String,
    /// Key of a constructor in the [`ModCatalog`](super::catalog::ModCatalog).
    pub factory: Option<String>,
    /// Explicit method surface. When absent the factory's surface is used.
    pub exports: Option<Vec<String>>,
    pub description: Option<String>,
}

impl UnitManifest {
    /// Types this unit defines itself, skipping anything it only imports.
    pub fn defined(&self) -> impl Iterator<Item = &TypeEntry> {
        self.mods
            .iter()
            .filter(|entry| !self.uses.iter().any(|u| *u == entry.name))
    }
}

#[derive(Debug, Error)]
pub enum UnitLoadError {
    #[error("failed to read unit {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse unit {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid unit {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
    #[error("unit {} references unknown factory `{factory}` for `{type_name}`", .path.display())]
    UnknownFactory {
        path: PathBuf,
        type_name: String,
        factory: String,
    },
}

/// Parse a unit descriptor from text. `path` is used for error reporting.
pub fn parse_unit(raw: &str, path: &Path) -> Result<UnitManifest, UnitLoadError> {
    let manifest: UnitManifest = toml::from_str(raw).map_err(|source| UnitLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seen = HashSet::new();
    for entry in &manifest.mods {
        if entry.name.trim().is_empty() {
            return Err(UnitLoadError::Invalid {
                path: path.to_path_buf(),
                reason: "every [[mods]] entry requires a non-empty `name`".into(),
            });
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(UnitLoadError::Invalid {
                path: path.to_path_buf(),
                reason: format!("type `{}` is defined twice", entry.name),
            });
        }
    }
    Ok(manifest)
}

/// Read and parse the unit descriptor at `path`.
pub fn read_unit(path: &Path) -> Result<UnitManifest, UnitLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| UnitLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_unit(&raw, path)
}
