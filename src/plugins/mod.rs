//! Mod discovery, validation and loading.

pub mod catalog;
pub mod discovery;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod traits;
pub mod validator;

pub use catalog::{ModCatalog, ModFactory};
pub use discovery::{discover_units, DiscoveredUnit, DiscoveryRules, UnitKind};
pub use loader::{load_mods, LoadReport};
pub use manifest::{UnitLoadError, UnitManifest};
pub use registry::{Diagnostic, DiagnosticLevel, ModRegistry};
pub use traits::{Capability, Mod};
pub use validator::{validate, CapabilitySet, ValidationError};
