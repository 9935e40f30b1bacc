//! Mod loader — reads discovered units, validates their types and constructs
//! conforming ones into a [`ModRegistry`].
//!
//! Builtin seeds from the catalog are loaded first, then every discovered
//! unit in discovery order. A later definition of a type name replaces the
//! earlier instance in the registry. Nothing here is fatal: every skipped
//! unit or type ends up as a [`Diagnostic`].

use std::path::PathBuf;

use tracing::{debug, info};

use super::catalog::{ModCatalog, ModFactory};
use super::discovery::{discover_units, DiscoveredUnit, DiscoveryRules};
use super::manifest::{read_unit, TypeEntry, UnitLoadError, UnitManifest};
use super::registry::{Diagnostic, DiagnosticLevel, ModRegistry};
use super::validator::{validate, CapabilitySet};

const BUILTIN_SOURCE: &str = "(builtin)";

/// Everything the loader produced.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registry: ModRegistry,
    pub units: Vec<DiscoveredUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadReport {
    fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.diagnostics.push(diagnostic);
    }

    /// Diagnostics about `mod_name`.
    pub fn diagnostics_for(&self, mod_name: &str) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.mod_name.as_deref() == Some(mod_name))
            .collect()
    }
}

/// Check every factory a unit refers to before anything in it is built.
fn resolve_factories(
    unit: &DiscoveredUnit,
    manifest: &UnitManifest,
    catalog: &ModCatalog,
) -> Result<(), UnitLoadError> {
    for entry in manifest.defined() {
        if let Some(key) = &entry.factory {
            if !catalog.contains(key) {
                return Err(UnitLoadError::UnknownFactory {
                    path: unit.entry.clone(),
                    type_name: entry.name.clone(),
                    factory: key.clone(),
                });
            }
        }
    }
    Ok(())
}

fn surface_of(entry: &TypeEntry, factory: Option<&ModFactory>) -> CapabilitySet {
    match (&entry.exports, factory) {
        (Some(exports), _) => CapabilitySet::from_names(exports),
        (None, Some(factory)) => factory.surface().clone(),
        (None, None) => CapabilitySet::empty(),
    }
}

/// Validate, construct and insert one type.
fn load_type(
    report: &mut LoadReport,
    name: &str,
    source: &str,
    surface: &CapabilitySet,
    factory: Option<&ModFactory>,
) {
    if let Err(err) = validate(surface) {
        report.push_diagnostic(
            Diagnostic::new(DiagnosticLevel::Warn, format!("rejected: {err}"))
                .with_mod(name)
                .with_source(source)
                .with_missing(err.missing),
        );
        return;
    }

    let Some(factory) = factory else {
        report.push_diagnostic(
            Diagnostic::new(DiagnosticLevel::Warn, "skipped: no factory to construct it")
                .with_mod(name)
                .with_source(source),
        );
        return;
    };

    let instance = match factory.instantiate() {
        Ok(instance) => instance,
        Err(err) => {
            report.push_diagnostic(
                Diagnostic::new(DiagnosticLevel::Error, format!("construct failed: {err}"))
                    .with_mod(name)
                    .with_source(source),
            );
            return;
        }
    };

    match report.registry.insert(name, source, instance) {
        Some(previous) => report.push_diagnostic(
            Diagnostic::new(
                DiagnosticLevel::Info,
                format!("replaces the definition from {previous}"),
            )
            .with_mod(name)
            .with_source(source),
        ),
        None => debug!(mod_name = name, source, "mod constructed"),
    }
}

/// Load builtin seeds, then every unit found under `roots`.
pub fn load_mods(roots: &[PathBuf], rules: &DiscoveryRules, catalog: &ModCatalog) -> LoadReport {
    let mut report = LoadReport::default();

    // 1. Builtin seeds (compiled-in, shadowable by units on disk)
    for seed in catalog.seeds() {
        let Some(factory) = catalog.get(&seed.factory) else {
            report.push_diagnostic(
                Diagnostic::new(
                    DiagnosticLevel::Error,
                    format!("builtin refers to unknown factory `{}`", seed.factory),
                )
                .with_mod(seed.type_name.as_str())
                .with_source(BUILTIN_SOURCE),
            );
            continue;
        };
        load_type(
            &mut report,
            &seed.type_name,
            BUILTIN_SOURCE,
            factory.surface(),
            Some(factory),
        );
    }

    // 2. Discovered units
    let discovery = discover_units(roots, rules);
    report.diagnostics.extend(discovery.diagnostics);

    for unit in &discovery.units {
        let source = unit.entry.display().to_string();
        let manifest = match read_unit(&unit.entry)
            .and_then(|m| resolve_factories(unit, &m, catalog).map(|()| m))
        {
            Ok(manifest) => manifest,
            Err(err) => {
                report.push_diagnostic(
                    Diagnostic::new(DiagnosticLevel::Warn, format!("unit skipped: {err}"))
                        .with_source(source),
                );
                continue;
            }
        };

        for entry in manifest.defined() {
            let factory = entry.factory.as_deref().and_then(|key| catalog.get(key));
            let surface = surface_of(entry, factory);
            load_type(&mut report, &entry.name, &source, &surface, factory);
        }
    }

    info!(
        units = discovery.units.len(),
        mods = report.registry.len(),
        diagnostics = report.diagnostics.len(),
        "mods loaded"
    );
    report.units = discovery.units;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::traits::{Capability, Mod};
    use std::fs;

    #[derive(Default)]
    struct Quiet;
    impl Mod for Quiet {}

    fn catalog() -> ModCatalog {
        let mut catalog = ModCatalog::new();
        catalog.register::<Quiet>("test.quiet");
        catalog
    }

    fn load(root: &std::path::Path, catalog: &ModCatalog) -> LoadReport {
        load_mods(&[root.to_path_buf()], &DiscoveryRules::default(), catalog)
    }

    #[test]
    fn constructs_types_with_factories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("quiet.toml"),
            "[[mods]]\nname = \"Quiet\"\nfactory = \"test.quiet\"\n",
        )
        .unwrap();

        let report = load(tmp.path(), &catalog());
        assert_eq!(report.registry.names(), ["Quiet"]);
        assert_eq!(report.units.len(), 1);
    }

    #[test]
    fn plain_data_type_is_rejected_with_everything_missing() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("data.toml"), "[[mods]]\nname = \"Point\"\n").unwrap();

        let report = load(tmp.path(), &catalog());
        assert!(report.registry.is_empty());
        let diags = report.diagnostics_for("Point");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].missing, Capability::REQUIRED.to_vec());
    }

    #[test]
    fn conforming_type_without_factory_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("ghost.toml"),
            r#"
[[mods]]
name = "Ghost"
exports = ["init", "triggers_init", "listeners_init", "before_finish_init", "finish_init", "register"]
"#,
        )
        .unwrap();

        let report = load(tmp.path(), &catalog());
        assert!(report.registry.is_empty());
        assert!(report.diagnostics_for("Ghost")[0].message.contains("no factory"));
    }

    #[test]
    fn unknown_factory_skips_whole_unit() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("mixed.toml"),
            r#"
[[mods]]
name = "Quiet"
factory = "test.quiet"

[[mods]]
name = "Missing"
factory = "test.nowhere"
"#,
        )
        .unwrap();

        let report = load(tmp.path(), &catalog());
        assert!(report.registry.is_empty());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.message.contains("test.nowhere")));
    }

    #[test]
    fn imported_names_are_not_instantiated() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("reexport.toml"),
            "uses = [\"Quiet\"]\n[[mods]]\nname = \"Quiet\"\nfactory = \"test.quiet\"\n",
        )
        .unwrap();

        let report = load(tmp.path(), &catalog());
        assert!(report.registry.is_empty());
    }

    #[test]
    fn seeds_load_first_and_can_be_shadowed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("b.toml"),
            "[[mods]]\nname = \"Seeded\"\nfactory = \"test.quiet\"\n",
        )
        .unwrap();
        let mut catalog = catalog();
        catalog.seed("Seeded", "test.quiet").seed("Other", "test.quiet");

        let report = load(tmp.path(), &catalog);
        assert_eq!(report.registry.names(), ["Seeded", "Other"]);
        assert!(report.registry.source("Seeded").unwrap().ends_with("b.toml"));
        assert_eq!(report.registry.source("Other"), Some(BUILTIN_SOURCE));
    }

    #[test]
    fn panicking_constructor_is_a_diagnostic() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("boom.toml"),
            "[[mods]]\nname = \"Boom\"\nfactory = \"test.boom\"\n",
        )
        .unwrap();
        let mut catalog = catalog();
        catalog.register_fn("test.boom", || panic!("constructor exploded"));

        let report = load(tmp.path(), &catalog);
        assert!(report.registry.is_empty());
        let diags = report.diagnostics_for("Boom");
        let diag = diags[0];
        assert_eq!(diag.level, DiagnosticLevel::Error);
        assert!(diag.message.contains("constructor exploded"));
    }
}
