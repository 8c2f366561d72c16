use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use scion_core::{ApiCall, ExtensionDescriptor, HostApi, ManifestRegistry, SettingsStore};
use scion_runtime::{LifecycleManager, LoadedUnit, LoadedUnitRecord, Sandbox, TeardownReport};
use tokio::sync::broadcast;

use crate::error::InstallError;
use crate::fetcher::SourceFetcher;
use crate::log::InstallLog;
use crate::types::{
    InstallReport, InstalledUnit, Phase, StatusUpdate, UnitOutcome, UnitStatus, new_run_id,
};

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Installs manifest units one at a time.
///
/// For each unit the orchestrator:
/// 1. Fetches its source
/// 2. Evaluates it in the sandbox with a fresh host shim attached
/// 3. Dispatches its entry point
/// 4. Hands the loaded unit to the lifecycle manager
///
/// A failing unit is logged and counted; it never stops the run, whether or
/// not it is marked critical.
pub struct Orchestrator {
    registry: Arc<ManifestRegistry>,
    fetcher: Arc<dyn SourceFetcher>,
    sandbox: Arc<Sandbox>,
    lifecycle: Arc<LifecycleManager>,
    settings: SettingsStore,
    log: InstallLog,
    phase: Mutex<Phase>,
    in_flight: Mutex<HashSet<String>>,
    /// Delay between units during `install_all`. Cosmetic only.
    pacing: Duration,
    install_timeout: Option<Duration>,
    status_tx: broadcast::Sender<StatusUpdate>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ManifestRegistry>,
        fetcher: Arc<dyn SourceFetcher>,
        sandbox: Arc<Sandbox>,
        settings: SettingsStore,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            registry,
            fetcher,
            sandbox,
            lifecycle: Arc::new(LifecycleManager::new()),
            settings,
            log: InstallLog::new(),
            phase: Mutex::new(Phase::Idle),
            in_flight: Mutex::new(HashSet::new()),
            pacing: Duration::ZERO,
            install_timeout: None,
            status_tx,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Bound the fetch + load + dispatch of each unit.
    ///
    /// A unit that never returns is only interrupted if the sandbox yields,
    /// so pair this with a fuel budget or a preemptible sandbox.
    pub fn with_install_timeout(mut self, timeout: Option<Duration>) -> Self {
        if timeout.is_some() && !self.sandbox.limits().meters_fuel() {
            tracing::warn!(
                "Install timeout set on a sandbox that never yields; \
                 a spinning unit will not be interrupted"
            );
        }
        self.install_timeout = timeout;
        self
    }

    /// Receive per-unit status transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn log(&self) -> &InstallLog {
        &self.log
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    /// Install a single unit by id.
    ///
    /// On failure an error entry is appended to the log, no record is
    /// created, and the error is returned.
    pub async fn install_one(&self, id: &str) -> Result<InstalledUnit, InstallError> {
        self.attempt(id).await.map_err(|failure| failure.error)
    }

    /// Install every unit in manifest order, continuing past failures.
    pub async fn install_all(&self) -> InstallReport {
        let run_id = new_run_id();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, units = self.registry.len(), "Installing extensions");

        for descriptor in self.registry.iter() {
            self.emit(&descriptor.id, UnitStatus::Pending);
        }

        let mut units = Vec::with_capacity(self.registry.len());
        let mut succeeded = 0;
        let mut failed = 0;

        for (index, descriptor) in self.registry.iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let _phase = PhaseGuard::enter(&self.phase, index);
            let outcome = match self.attempt(&descriptor.id).await {
                Ok(installed) => {
                    succeeded += 1;
                    UnitOutcome {
                        unit_id: descriptor.id.clone(),
                        name: descriptor.name.clone(),
                        critical: descriptor.critical,
                        status: UnitStatus::Success,
                        convention: Some(installed.convention),
                        api_calls: installed.api_calls.len(),
                        error: None,
                        error_kind: None,
                    }
                }
                Err(UnitFailure { error, api_calls }) => {
                    failed += 1;
                    if descriptor.critical {
                        tracing::warn!(
                            unit_id = %descriptor.id,
                            "Critical extension failed; continuing"
                        );
                    }
                    UnitOutcome {
                        unit_id: descriptor.id.clone(),
                        name: descriptor.name.clone(),
                        critical: descriptor.critical,
                        status: UnitStatus::Error,
                        convention: None,
                        api_calls: api_calls.len(),
                        error: Some(error.to_string()),
                        error_kind: Some(error.kind()),
                    }
                }
            };
            units.push(outcome);
        }

        tracing::info!(run_id = %run_id, succeeded, failed, "Install run complete");

        InstallReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            succeeded,
            failed,
            units,
            log: self.log.entries(),
        }
    }

    /// Unload every installed unit, flush settings and clear the install log.
    pub async fn teardown(&self) -> TeardownReport {
        let report = self.lifecycle.teardown().await;
        if let Err(e) = self.settings.flush() {
            tracing::warn!(error = %e, "Failed to flush settings after teardown");
        }
        self.log.clear();
        tracing::info!(
            unloaded = report.unloaded.len(),
            released = report.released.len(),
            warnings = report.warnings.len(),
            "Extensions torn down"
        );
        report
    }

    pub fn clear_log(&self) {
        self.log.clear();
    }

    /// Install `id`, logging and broadcasting the result either way.
    async fn attempt(&self, id: &str) -> Result<InstalledUnit, UnitFailure> {
        match self.try_install(id).await {
            Ok(installed) => {
                tracing::info!(
                    unit_id = id,
                    convention = %installed.convention,
                    api_calls = installed.api_calls.len(),
                    "Extension installed"
                );
                self.log.success(format!(
                    "{} installed ({})",
                    installed.name, installed.convention
                ));
                self.emit(id, UnitStatus::Success);
                Ok(installed)
            }
            Err(failure) => {
                tracing::error!(
                    unit_id = id,
                    kind = failure.error.kind(),
                    api_calls = failure.api_calls.len(),
                    error = %failure.error,
                    "Extension install failed"
                );
                self.log.error(failure.error.to_string());
                self.emit(id, UnitStatus::Error);
                Err(failure)
            }
        }
    }

    async fn try_install(&self, id: &str) -> Result<InstalledUnit, UnitFailure> {
        let descriptor = self
            .registry
            .get(id)
            .map_err(|_| InstallError::NotFound(id.to_string()))?;

        let _in_flight = InFlightGuard::begin(&self.in_flight, id)?;
        if self.lifecycle.contains(id).await {
            return Err(InstallError::AlreadyLoaded(id.to_string()).into());
        }

        self.emit(id, UnitStatus::Loading);

        let unit = match self.install_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_and_load(descriptor))
                .await
                .unwrap_or_else(|_| {
                    Err(InstallError::Timeout {
                        id: id.to_string(),
                        secs: limit.as_secs(),
                    }
                    .into())
                })?,
            None => self.fetch_and_load(descriptor).await?,
        };

        if !unit.convention.matches_hint(descriptor.convention) {
            tracing::debug!(
                unit_id = id,
                hint = ?descriptor.convention,
                resolved = %unit.convention,
                "Manifest convention hint disagrees with module shape"
            );
        }

        let installed = InstalledUnit {
            unit_id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            convention: unit.convention,
            api_calls: unit.api_calls.clone(),
        };

        self.lifecycle
            .register(LoadedUnitRecord::new(&descriptor.id, &descriptor.name, unit))
            .await
            .map_err(|e| InstallError::from_runtime(id, e))?;

        Ok(installed)
    }

    async fn fetch_and_load(
        &self,
        descriptor: &ExtensionDescriptor,
    ) -> Result<LoadedUnit, UnitFailure> {
        let source = self
            .fetcher
            .fetch(descriptor)
            .await
            .map_err(|failure| InstallError::Fetch {
                id: descriptor.id.clone(),
                status: failure.status(),
                reason: failure.to_string(),
            })?;

        let shim = HostApi::new(descriptor.id.clone(), self.settings.clone());
        self.sandbox
            .load(&descriptor.id, &source, shim)
            .await
            .map_err(|failure| UnitFailure {
                error: InstallError::from_runtime(&descriptor.id, failure.error),
                api_calls: failure.api_calls,
            })
    }

    fn emit(&self, unit_id: &str, status: UnitStatus) {
        // No subscribers is fine.
        let _ = self.status_tx.send(StatusUpdate {
            unit_id: unit_id.to_string(),
            status,
        });
    }
}

/// An install error plus the host calls the unit made before failing.
struct UnitFailure {
    error: InstallError,
    api_calls: Vec<ApiCall>,
}

impl From<InstallError> for UnitFailure {
    fn from(error: InstallError) -> Self {
        Self {
            error,
            api_calls: Vec::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks an id as installing; rejects overlapping installs of the same id.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn begin(set: &'a Mutex<HashSet<String>>, id: &str) -> Result<Self, InstallError> {
        if !lock(set).insert(id.to_string()) {
            return Err(InstallError::InFlight(id.to_string()));
        }
        Ok(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

/// Holds `Installing(index)` for one unit and returns to `Idle` when dropped.
struct PhaseGuard<'a> {
    phase: &'a Mutex<Phase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a Mutex<Phase>, index: usize) -> Self {
        *lock(phase) = Phase::Installing(index);
        Self { phase }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *lock(self.phase) = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchFailure, StaticFetcher};
    use scion_runtime::RuntimeLimits;

    const ONLOAD: &str = r#"(module (func (export "onload")))"#;

    fn orchestrator(ids: &[&str], fetcher: StaticFetcher) -> Orchestrator {
        let registry = ManifestRegistry::new(
            ids.iter()
                .map(|id| {
                    ExtensionDescriptor::new(*id, id.to_uppercase(), format!("static:{id}"))
                })
                .collect(),
        )
        .unwrap();
        Orchestrator::new(
            Arc::new(registry),
            Arc::new(fetcher),
            Arc::new(Sandbox::new(RuntimeLimits::default()).unwrap()),
            SettingsStore::in_memory(),
        )
    }

    #[tokio::test]
    async fn install_one_records_the_unit_and_logs_success() {
        let orch = orchestrator(&["alpha"], StaticFetcher::new().with_source("alpha", ONLOAD));

        let installed = orch.install_one("alpha").await.unwrap();

        assert_eq!(installed.unit_id, "alpha");
        assert!(orch.lifecycle().contains("alpha").await);
        assert_eq!(orch.log().count(crate::log::Severity::Success), 1);
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_and_logged() {
        let orch = orchestrator(&["alpha"], StaticFetcher::new());

        let err = orch.install_one("omega").await.unwrap_err();

        assert!(matches!(err, InstallError::NotFound(id) if id == "omega"));
        assert_eq!(orch.log().count(crate::log::Severity::Error), 1);
    }

    #[tokio::test]
    async fn fetch_status_is_carried_in_the_error() {
        let orch = orchestrator(
            &["alpha"],
            StaticFetcher::new().with_failure("alpha", FetchFailure::Status(503)),
        );

        let err = orch.install_one("alpha").await.unwrap_err();

        assert!(matches!(err, InstallError::Fetch { status: Some(503), .. }));
        assert!(orch.lifecycle().is_empty().await);
    }

    #[tokio::test]
    async fn reinstalling_a_loaded_unit_is_rejected() {
        let orch = orchestrator(&["alpha"], StaticFetcher::new().with_source("alpha", ONLOAD));

        orch.install_one("alpha").await.unwrap();
        let err = orch.install_one("alpha").await.unwrap_err();

        assert!(matches!(err, InstallError::AlreadyLoaded(_)));
        assert_eq!(orch.lifecycle().len().await, 1);
    }

    #[tokio::test]
    async fn status_transitions_are_broadcast() {
        let orch = orchestrator(
            &["alpha", "beta"],
            StaticFetcher::new().with_source("alpha", ONLOAD),
        );
        let mut rx = orch.subscribe();

        orch.install_all().await;

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push((update.unit_id, update.status));
        }
        assert_eq!(
            seen,
            vec![
                ("alpha".to_string(), UnitStatus::Pending),
                ("beta".to_string(), UnitStatus::Pending),
                ("alpha".to_string(), UnitStatus::Loading),
                ("alpha".to_string(), UnitStatus::Success),
                ("beta".to_string(), UnitStatus::Loading),
                ("beta".to_string(), UnitStatus::Error),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn install_timeout_bounds_a_unit() {
        struct HangingFetcher;
        impl SourceFetcher for HangingFetcher {
            fn fetch<'a>(
                &'a self,
                _descriptor: &'a ExtensionDescriptor,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<Vec<u8>, FetchFailure>> + Send + 'a>,
            > {
                Box::pin(std::future::pending())
            }
        }

        let registry = ManifestRegistry::new(vec![ExtensionDescriptor::new(
            "slow",
            "Slow",
            "static:slow",
        )])
        .unwrap();
        let orch = Orchestrator::new(
            Arc::new(registry),
            Arc::new(HangingFetcher),
            Arc::new(Sandbox::new(RuntimeLimits::default()).unwrap()),
            SettingsStore::in_memory(),
        )
        .with_install_timeout(Some(Duration::from_secs(5)));

        let report = orch.install_all().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.units[0].error_kind, Some("timeout"));
        assert!(orch.sandbox().host_slot().is_vacant());
    }
}
