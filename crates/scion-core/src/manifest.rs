use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// How a unit is expected to announce its entry point.
///
/// Advisory only. The dispatcher resolves the real convention from the
/// module's exports and never trusts this value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConventionHint {
    Standard,
    SelfExecuting,
    #[default]
    Unknown,
}

/// One installable unit, as declared in the suite manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    /// Stable short identifier, unique within the registry (e.g. "foundation").
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Location of the unit's source text (`http`, `https` or `file` URL).
    #[serde(alias = "source_location")]
    pub source: String,
    /// Reporting emphasis only; a critical failure does not halt a run.
    #[serde(default)]
    pub critical: bool,
    #[serde(default, alias = "export_convention")]
    pub convention: ConventionHint,
}

impl ExtensionDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            source: source.into(),
            critical: false,
            convention: ConventionHint::Unknown,
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_convention(mut self, convention: ConventionHint) -> Self {
        self.convention = convention;
        self
    }
}

/// Ordered, read-only list of extension descriptors.
///
/// Declaration order is install order. There is no dependency graph: a unit
/// that relies on another must be declared after it.
#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    descriptors: Vec<ExtensionDescriptor>,
}

impl ManifestRegistry {
    /// Build a registry, validating ids and sources. Order is preserved as given.
    pub fn new(descriptors: Vec<ExtensionDescriptor>) -> Result<Self, ManifestError> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !is_valid_id(&descriptor.id) {
                return Err(ManifestError::InvalidId(descriptor.id.clone()));
            }
            if !seen.insert(descriptor.id.as_str()) {
                return Err(ManifestError::DuplicateId(descriptor.id.clone()));
            }
            if descriptor.source.trim().is_empty() {
                return Err(ManifestError::MissingSource(descriptor.id.clone()));
            }
        }
        Ok(Self { descriptors })
    }

    pub fn get(&self, id: &str) -> Result<&ExtensionDescriptor, ManifestError> {
        self.descriptors
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ManifestError::NotFound(id.to_string()))
    }

    /// Index of `id` in install order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn is_valid_id(id: &str) -> bool {
    static ID_PATTERN: OnceLock<Regex> = OnceLock::new();
    ID_PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._-]{0,63}$").expect("static regex"))
        .is_match(id)
}
