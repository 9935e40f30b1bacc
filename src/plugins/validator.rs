//! Capability validation for candidate mod types.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use super::traits::Capability;

/// The set of lifecycle operations a candidate type exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Everything a compiled-in [`Mod`](super::traits::Mod) implementation has.
    pub fn complete() -> Self {
        Capability::REQUIRED.into_iter().collect()
    }

    /// Build from exported names. Names that are not capabilities are ignored.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|n| n.as_ref().parse::<Capability>().ok())
            .collect()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    /// Required capabilities this set lacks, in lifecycle order.
    pub fn missing(&self) -> Vec<Capability> {
        Capability::REQUIRED
            .into_iter()
            .filter(|c| !self.0.contains(c))
            .collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A candidate type did not expose the whole lifecycle surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing capabilities {}", MissingList(.missing))]
pub struct ValidationError {
    pub missing: Vec<Capability>,
}

struct MissingList<'a>(&'a [Capability]);

impl fmt::Display for MissingList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, cap) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(cap.as_str())?;
        }
        f.write_str("}")
    }
}

/// Accept a candidate only if it exposes every required capability.
pub fn validate(surface: &CapabilitySet) -> Result<(), ValidationError> {
    let missing = surface.missing();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { missing })
    }
}
