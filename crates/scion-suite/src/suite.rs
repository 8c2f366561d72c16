use std::sync::Arc;

use scion_runtime::{Sandbox, TeardownReport};

use crate::config::SuiteConfig;
use crate::error::SuiteError;
use crate::fetcher::{HttpFetcher, SourceFetcher};
use crate::orchestrator::Orchestrator;
use crate::types::InstallReport;

/// The suite as the host sees it: one `onload` and one `onunload`.
pub struct Suite {
    orchestrator: Orchestrator,
    auto_install: bool,
}

impl Suite {
    /// Build a suite that fetches sources over HTTP(S) or from `file://` URLs.
    pub fn from_config(config: &SuiteConfig) -> Result<Self, SuiteError> {
        let fetcher = match config.fetch_timeout() {
            Some(timeout) => HttpFetcher::with_timeout(timeout)
                .map_err(|e| SuiteError::Config(e.to_string()))?,
            None => HttpFetcher::new(),
        };
        Self::from_config_with_fetcher(config, Arc::new(fetcher))
    }

    pub fn from_config_with_fetcher(
        config: &SuiteConfig,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<Self, SuiteError> {
        let registry = config.registry()?;
        let settings = config.open_settings()?;
        let sandbox = Sandbox::new(config.sandbox_limits())?;

        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            fetcher,
            Arc::new(sandbox),
            settings,
        )
        .with_pacing(config.pacing())
        .with_install_timeout(config.install_timeout());

        Ok(Self {
            orchestrator,
            auto_install: config.suite.auto_install,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Reset state and, when auto-install is on, install every unit.
    ///
    /// Units left over from a previous load are torn down first, so calling
    /// `onload` twice reinstalls rather than failing with `AlreadyLoaded`.
    pub async fn onload(&self) -> Option<InstallReport> {
        if !self.orchestrator.lifecycle().is_empty().await {
            tracing::info!("Tearing down units from a previous load");
            self.orchestrator.teardown().await;
        }
        self.orchestrator.clear_log();

        if !self.auto_install {
            self.orchestrator
                .log()
                .info("Auto-install disabled; waiting for manual install");
            return None;
        }

        Some(self.orchestrator.install_all().await)
    }

    /// Unload every installed unit and clear the log.
    pub async fn onunload(&self) -> TeardownReport {
        self.orchestrator.teardown().await
    }
}
