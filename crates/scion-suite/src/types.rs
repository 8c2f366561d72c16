use chrono::{DateTime, Utc};
use scion_core::{ApiCall, Convention};
use serde::Serialize;

use crate::log::{InstallLogEntry, Severity};

/// Per-unit status as seen by a progress view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Loading,
    Success,
    Error,
}

/// A status transition broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub unit_id: String,
    pub status: UnitStatus,
}

/// Orchestrator state: idle, or installing the unit at a manifest index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "index", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Installing(usize),
}

/// A unit that `install_one` installed successfully.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledUnit {
    pub unit_id: String,
    pub name: String,
    pub convention: Convention,
    /// Host API calls made during evaluation and dispatch.
    pub api_calls: Vec<ApiCall>,
}

/// What happened to one unit during a run.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub unit_id: String,
    pub name: String,
    pub critical: bool,
    pub status: UnitStatus,
    /// Convention actually used, for units that loaded.
    pub convention: Option<Convention>,
    pub api_calls: usize,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
}

/// Aggregate result of `install_all`.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub units: Vec<UnitOutcome>,
    pub log: Vec<InstallLogEntry>,
}

impl InstallReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Critical units that failed. Reported only; they never stop a run.
    pub fn critical_failures(&self) -> Vec<&UnitOutcome> {
        self.units
            .iter()
            .filter(|u| u.critical && u.status == UnitStatus::Error)
            .collect()
    }

    pub fn log_count(&self, severity: Severity) -> usize {
        self.log.iter().filter(|e| e.severity == severity).count()
    }
}

pub(crate) fn new_run_id() -> String {
    format!("run_{}", uuid::Uuid::new_v4().simple())
}
