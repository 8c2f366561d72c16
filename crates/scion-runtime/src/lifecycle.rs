use chrono::{DateTime, Utc};
use scion_core::{Convention, HandleScope};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::dispatch::UnitHandle;
use crate::error::{RuntimeError, UnloadWarning};
use crate::loader::LoadedUnit;

/// A unit whose entry point completed successfully.
#[derive(Debug)]
pub struct LoadedUnitRecord {
    pub id: String,
    pub name: String,
    /// Always true once a record exists.
    pub executed: bool,
    pub convention: Convention,
    pub source_digest: String,
    pub loaded_at: DateTime<Utc>,
    handle: UnitHandle,
}

impl LoadedUnitRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit: LoadedUnit) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            executed: true,
            convention: unit.convention,
            source_digest: unit.source_digest,
            loaded_at: Utc::now(),
            handle: unit.handle,
        }
    }

    pub fn scope(&self) -> HandleScope {
        self.handle.scope()
    }

    pub fn summary(&self) -> UnitSummary {
        UnitSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            executed: self.executed,
            convention: self.convention,
            scope: self.scope(),
            source_digest: self.source_digest.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Serializable view of a [`LoadedUnitRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub id: String,
    pub name: String,
    pub executed: bool,
    pub convention: Convention,
    pub scope: HandleScope,
    pub source_digest: String,
    pub loaded_at: DateTime<Utc>,
}

/// Outcome of tearing down every loaded unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    /// Units whose `onunload` hook ran to completion.
    pub unloaded: Vec<String>,
    /// Units without a hook; released without a call.
    pub released: Vec<String>,
    pub warnings: Vec<UnloadWarning>,
}

impl TeardownReport {
    pub fn total(&self) -> usize {
        self.unloaded.len() + self.released.len() + self.warnings.len()
    }
}

/// Owns the set of loaded units and drives their teardown.
///
/// Records are kept in the order they were registered, which for a full run
/// is manifest order.
#[derive(Debug, Default)]
pub struct LifecycleManager {
    records: RwLock<Vec<LoadedUnitRecord>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, record: LoadedUnitRecord) -> Result<(), RuntimeError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(RuntimeError::AlreadyRegistered(record.id));
        }
        tracing::debug!(unit_id = %record.id, convention = %record.convention, "Unit recorded");
        records.push(record);
        Ok(())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.iter().any(|r| r.id == id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn list(&self) -> Vec<UnitSummary> {
        self.records
            .read()
            .await
            .iter()
            .map(LoadedUnitRecord::summary)
            .collect()
    }

    /// Invoke every unit's `onunload` hook, then drop all records.
    ///
    /// A failing hook becomes an [`UnloadWarning`]; the remaining units are
    /// still unloaded.
    pub async fn teardown(&self) -> TeardownReport {
        let mut records = self.records.write().await;
        let mut report = TeardownReport::default();

        for record in records.iter_mut() {
            match record.handle.unload().await {
                Ok(true) => {
                    tracing::info!(unit_id = %record.id, "Unit unloaded");
                    report.unloaded.push(record.id.clone());
                }
                Ok(false) => {
                    tracing::debug!(unit_id = %record.id, "Unit has no unload hook");
                    report.released.push(record.id.clone());
                }
                Err(reason) => {
                    let warning = UnloadWarning {
                        unit_id: record.id.clone(),
                        reason,
                    };
                    tracing::warn!(unit_id = %record.id, error = %warning, "Unload hook failed");
                    report.warnings.push(warning);
                }
            }
        }

        records.clear();
        report
    }
}
