use std::path::{Path, PathBuf};
use std::time::Duration;

use scion_core::{ExtensionDescriptor, ManifestRegistry, SettingsStore};
use scion_runtime::RuntimeLimits;
use serde::Deserialize;

use crate::error::SuiteError;

#[derive(Debug, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub suite: SuiteSection,
    #[serde(default)]
    pub runtime: RuntimeLimits,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub extensions: Vec<ExtensionDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct SuiteSection {
    /// Run `install_all` from `onload`.
    #[serde(default = "default_auto_install")]
    pub auto_install: bool,
    #[serde(default)]
    pub pacing_ms: u64,
    pub install_timeout_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
}

fn default_auto_install() -> bool {
    true
}

impl Default for SuiteSection {
    fn default() -> Self {
        Self {
            auto_install: default_auto_install(),
            pacing_ms: 0,
            install_timeout_secs: None,
            fetch_timeout_secs: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsConfig {
    /// Backing file; defaults to `~/.scion/settings.json`.
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub in_memory: bool,
}

impl SuiteConfig {
    pub fn from_file(path: &Path) -> Result<Self, SuiteError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SuiteError> {
        toml::from_str(content)
            .map_err(|e| SuiteError::Config(format!("Failed to parse config: {e}")))
    }

    /// Validate `[[extensions]]` into a registry, preserving declaration order.
    pub fn registry(&self) -> Result<ManifestRegistry, SuiteError> {
        Ok(ManifestRegistry::new(self.extensions.clone())?)
    }

    pub fn open_settings(&self) -> Result<SettingsStore, SuiteError> {
        if self.settings.in_memory {
            return Ok(SettingsStore::in_memory());
        }
        let path = self
            .settings
            .path
            .clone()
            .unwrap_or_else(SettingsStore::default_path);
        Ok(SettingsStore::open(path)?)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.suite.pacing_ms)
    }

    pub fn install_timeout(&self) -> Option<Duration> {
        self.suite.install_timeout_secs.map(Duration::from_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.suite.fetch_timeout_secs.map(Duration::from_secs)
    }

    /// Runtime limits for the suite's sandbox. An install timeout makes the
    /// sandbox preemptible so the timeout can interrupt a unit that spins.
    pub fn sandbox_limits(&self) -> RuntimeLimits {
        let preemptible = self.runtime.preemptible || self.install_timeout().is_some();
        self.runtime.clone().preemptible(preemptible)
    }
}
