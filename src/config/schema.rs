use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::events::ListenerErrorPolicy;
use crate::host::DEFAULT_DRAIN_LIMIT;
use crate::plugins::manifest::PACKAGE_ENTRY_FILENAME;
use crate::plugins::DiscoveryRules;
use crate::util::expand_path;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path the config was read from; empty when running on defaults.
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub mods: ModsConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub host: HostConfig,
}

// ── Mods ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModsConfig {
    /// Directories scanned for units, in order. Later directories win on
    /// name clashes. `~` is expanded.
    #[serde(default = "default_mod_dirs")]
    pub dirs: Vec<String>,
    /// Entry names starting with any of these are skipped.
    #[serde(default = "default_ignore_prefixes")]
    pub ignore_prefixes: Vec<String>,
    /// File that turns a directory into a package unit.
    #[serde(default = "default_package_entry")]
    pub package_entry: String,
    /// Extension of single-file units.
    #[serde(default = "default_unit_extension")]
    pub unit_extension: String,
    /// Load the compiled-in native event bridge before anything on disk.
    #[serde(default = "default_true")]
    pub builtins: bool,
}

fn default_mod_dirs() -> Vec<String> {
    vec!["mods".into(), "~/.sweeper/mods".into()]
}

fn default_ignore_prefixes() -> Vec<String> {
    vec!["_".into(), ".".into()]
}

fn default_package_entry() -> String {
    PACKAGE_ENTRY_FILENAME.into()
}

fn default_unit_extension() -> String {
    "toml".into()
}

fn default_true() -> bool {
    true
}

impl Default for ModsConfig {
    fn default() -> Self {
        Self {
            dirs: default_mod_dirs(),
            ignore_prefixes: default_ignore_prefixes(),
            package_entry: default_package_entry(),
            unit_extension: default_unit_extension(),
            builtins: true,
        }
    }
}

// ── Bus ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// `isolate` keeps dispatching after a listener fails; `propagate`
    /// hands the failure back to whoever fired the trigger.
    #[serde(default)]
    pub on_listener_error: ListenerErrorPolicy,
}

// ── Host ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Upper bound on deferred callbacks run per drain of the host loop.
    #[serde(default = "default_max_callbacks_per_drain")]
    pub max_callbacks_per_drain: usize,
}

fn default_max_callbacks_per_drain() -> usize {
    DEFAULT_DRAIN_LIMIT
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_callbacks_per_drain: default_max_callbacks_per_drain(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Config {
    /// `~/.sweeper/config.toml`, if a home directory can be found.
    pub fn default_path() -> Option<PathBuf> {
        UserDirs::new().map(|u| u.home_dir().join(".sweeper").join("config.toml"))
    }

    /// Load `path` if given (it must exist), else the user config if present,
    /// else defaults. Environment overrides are applied last.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load_from(&path)?,
                _ => {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var_os(key));
    }

    fn apply_overrides_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<std::ffi::OsString>,
    {
        // Mod directories: SWEEPER_MOD_DIRS (platform path-list syntax)
        if let Some(raw) = var("SWEEPER_MOD_DIRS") {
            let dirs: Vec<String> = std::env::split_paths(&raw)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            if !dirs.is_empty() {
                self.mods.dirs = dirs;
            }
        }

        // Listener failure policy: SWEEPER_LISTENER_ERRORS
        if let Some(raw) = var("SWEEPER_LISTENER_ERRORS") {
            match raw.to_string_lossy().parse::<ListenerErrorPolicy>() {
                Ok(policy) => self.bus.on_listener_error = policy,
                Err(err) => warn!(error = %err, "ignoring SWEEPER_LISTENER_ERRORS"),
            }
        }
    }

    /// Configured mod directories with `~` expanded.
    pub fn mod_dirs(&self) -> Vec<PathBuf> {
        self.mods.dirs.iter().map(|d| expand_path(d)).collect()
    }

    pub fn discovery_rules(&self) -> DiscoveryRules {
        DiscoveryRules {
            ignore_prefixes: self.mods.ignore_prefixes.clone(),
            package_entry: self.mods.package_entry.clone(),
            unit_extension: self.mods.unit_extension.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::ffi::OsString;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), OsString::from(*v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.mods.dirs, ["mods", "~/.sweeper/mods"]);
        assert_eq!(config.mods.ignore_prefixes, ["_", "."]);
        assert_eq!(config.mods.package_entry, "mod.toml");
        assert_eq!(config.mods.unit_extension, "toml");
        assert!(config.mods.builtins);
        assert_eq!(config.bus.on_listener_error, ListenerErrorPolicy::Isolate);
        assert_eq!(config.host.max_callbacks_per_drain, DEFAULT_DRAIN_LIMIT);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[mods]
dirs = ["plugins"]

[bus]
on_listener_error = "propagate"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.config_path, path);
        assert_eq!(config.mods.dirs, ["plugins"]);
        assert_eq!(config.mods.ignore_prefixes, ["_", "."]);
        assert_eq!(config.bus.on_listener_error, ListenerErrorPolicy::Propagate);
        assert_eq!(config.host.max_callbacks_per_drain, DEFAULT_DRAIN_LIMIT);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load_or_default(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn bad_policy_fails_to_parse() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[bus]\non_listener_error = \"shrug\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn env_overrides_dirs_and_policy() {
        let joined = std::env::join_paths(["/opt/mods", "/srv/mods"]).unwrap();
        let mut config = Config::default();
        config.apply_overrides_from(env(&[
            ("SWEEPER_MOD_DIRS", joined.to_str().unwrap()),
            ("SWEEPER_LISTENER_ERRORS", "propagate"),
        ]));
        assert_eq!(config.mods.dirs, ["/opt/mods", "/srv/mods"]);
        assert_eq!(config.bus.on_listener_error, ListenerErrorPolicy::Propagate);
    }

    #[test]
    fn invalid_env_policy_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(env(&[("SWEEPER_LISTENER_ERRORS", "loud"), ("SWEEPER_MOD_DIRS", "")]));
        assert_eq!(config.bus.on_listener_error, ListenerErrorPolicy::Isolate);
        assert_eq!(config.mods.dirs, default_mod_dirs());
    }

    #[test]
    fn rules_follow_config() {
        let mut config = Config::default();
        config.mods.ignore_prefixes = vec!["x".into()];
        let rules = config.discovery_rules();
        assert_eq!(rules.ignore_prefixes, ["x"]);
        assert_eq!(rules.package_entry, "mod.toml");
        assert_eq!(config.mod_dirs()[0], PathBuf::from("mods"));
    }
}
