//! Unit discovery — walks the configured mod directories for unit descriptors.
//!
//! Roots are scanned in order and recursively. A `*.toml` file is a
//! single-file unit; a directory holding the package entry file is a package
//! unit and is not descended into. Every entry is resolved to its canonical
//! path and visited at most once per pass, which keeps symlink loops and
//! overlapping roots from loading anything twice. A unit whose name was
//! already found replaces the earlier one in place.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::manifest::PACKAGE_ENTRY_FILENAME;
use super::registry::{Diagnostic, DiagnosticLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    File,
    Package,
}

/// A unit found on disk, before its descriptor is read.
#[derive(Debug, Clone)]
pub struct DiscoveredUnit {
    pub name: String,
    pub kind: UnitKind,
    /// The unit file, or the package directory.
    pub path: PathBuf,
    /// The descriptor to read.
    pub entry: PathBuf,
}

/// What counts as a unit and what is skipped.
#[derive(Debug, Clone)]
pub struct DiscoveryRules {
    pub ignore_prefixes: Vec<String>,
    pub package_entry: String,
    pub unit_extension: String,
}

impl Default for DiscoveryRules {
    fn default() -> Self {
        Self {
            ignore_prefixes: vec!["_".into(), ".".into()],
            package_entry: PACKAGE_ENTRY_FILENAME.into(),
            unit_extension: "toml".into(),
        }
    }
}

impl DiscoveryRules {
    fn is_ignored(&self, name: &str) -> bool {
        self.ignore_prefixes
            .iter()
            .any(|p| !p.is_empty() && name.starts_with(p.as_str()))
    }
}

/// Result of a discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub units: Vec<DiscoveredUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

struct Walker<'a> {
    rules: &'a DiscoveryRules,
    visited: HashSet<PathBuf>,
    by_name: HashMap<String, usize>,
    result: DiscoveryResult,
}

impl Walker<'_> {
    fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.result.diagnostics.push(diagnostic);
    }

    /// Record `path` as visited. Returns its canonical form the first time.
    fn first_visit(&mut self, path: &Path) -> Option<PathBuf> {
        let canonical = match fs::canonicalize(path) {
            Ok(p) => p,
            Err(e) => {
                self.push_diagnostic(
                    Diagnostic::new(DiagnosticLevel::Warn, format!("cannot resolve path: {e}"))
                        .with_source(path.display().to_string()),
                );
                return None;
            }
        };
        if self.visited.insert(canonical.clone()) {
            Some(canonical)
        } else {
            self.push_diagnostic(
                Diagnostic::new(DiagnosticLevel::Info, "skipped: already visited")
                    .with_source(path.display().to_string()),
            );
            None
        }
    }

    fn scan_root(&mut self, root: &Path) {
        if !root.is_dir() {
            self.push_diagnostic(
                Diagnostic::new(DiagnosticLevel::Warn, "skipped: mod directory not found")
                    .with_source(root.display().to_string()),
            );
            return;
        }
        if self.first_visit(root).is_some() {
            self.scan_dir(root);
        }
    }

    fn scan_dir(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.push_diagnostic(
                    Diagnostic::new(DiagnosticLevel::Warn, format!("cannot read directory: {e}"))
                        .with_source(dir.display().to_string()),
                );
                return;
            }
        };

        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let path = entry.path();

            if self.rules.is_ignored(&name) {
                trace!(path = %path.display(), "ignored");
                continue;
            }
            if self.first_visit(&path).is_none() {
                continue;
            }

            if path.is_dir() {
                let package_entry = path.join(&self.rules.package_entry);
                if package_entry.is_file() {
                    self.add_unit(DiscoveredUnit {
                        name: name.into_owned(),
                        kind: UnitKind::Package,
                        path,
                        entry: package_entry,
                    });
                } else {
                    self.scan_dir(&path);
                }
            } else if path
                .extension()
                .is_some_and(|ext| ext == self.rules.unit_extension.as_str())
            {
                let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
                else {
                    continue;
                };
                self.add_unit(DiscoveredUnit {
                    name: stem,
                    kind: UnitKind::File,
                    entry: path.clone(),
                    path,
                });
            }
        }
    }

    fn add_unit(&mut self, unit: DiscoveredUnit) {
        debug!(unit = %unit.name, path = %unit.path.display(), "unit found");
        if let Some(&idx) = self.by_name.get(&unit.name) {
            let previous = self.result.units[idx].path.display().to_string();
            self.push_diagnostic(
                Diagnostic::new(
                    DiagnosticLevel::Info,
                    format!("unit `{}` overrides the one at {previous}", unit.name),
                )
                .with_source(unit.path.display().to_string()),
            );
            self.result.units[idx] = unit;
        } else {
            self.by_name.insert(unit.name.clone(), self.result.units.len());
            self.result.units.push(unit);
        }
    }
}

/// Discover units under `roots`, in root order.
pub fn discover_units(roots: &[PathBuf], rules: &DiscoveryRules) -> DiscoveryResult {
    let mut walker = Walker {
        rules,
        visited: HashSet::new(),
        by_name: HashMap::new(),
        result: DiscoveryResult::default(),
    };
    for root in roots {
        walker.scan_root(root);
    }
    walker.result
}
