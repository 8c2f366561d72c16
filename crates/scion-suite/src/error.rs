use scion_core::{ManifestError, SettingsError};
use scion_runtime::RuntimeError;
use thiserror::Error;

/// Why a single unit failed to install.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("extension not found: {0}")]
    NotFound(String),

    #[error("fetch failed for {id}: {reason}")]
    Fetch {
        id: String,
        /// HTTP status for non-success responses; `None` for transport errors.
        status: Option<u16>,
        reason: String,
    },

    #[error("load failed for {id}: {reason}")]
    Load { id: String, reason: String },

    #[error("entry point failed for {id}: {reason}")]
    Dispatch { id: String, reason: String },

    #[error("{0} is already loaded; tear the suite down before reinstalling")]
    AlreadyLoaded(String),

    #[error("{0} is already being installed")]
    InFlight(String),

    #[error("install of {id} timed out after {secs}s")]
    Timeout { id: String, secs: u64 },
}

impl InstallError {
    pub(crate) fn from_runtime(id: &str, err: RuntimeError) -> Self {
        match err {
            RuntimeError::Dispatch(reason) => InstallError::Dispatch {
                id: id.to_string(),
                reason,
            },
            RuntimeError::AlreadyRegistered(unit) => InstallError::AlreadyLoaded(unit),
            other => InstallError::Load {
                id: id.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Short label for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            InstallError::NotFound(_) => "not_found",
            InstallError::Fetch { .. } => "fetch",
            InstallError::Load { .. } => "load",
            InstallError::Dispatch { .. } => "dispatch",
            InstallError::AlreadyLoaded(_) => "already_loaded",
            InstallError::InFlight(_) => "in_flight",
            InstallError::Timeout { .. } => "timeout",
        }
    }
}

/// Errors building a suite from configuration.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
