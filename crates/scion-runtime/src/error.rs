use scion_core::ApiCall;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The temporary module artifact could not be written.
    #[error("module artifact error: {0}")]
    Artifact(#[from] std::io::Error),

    /// Compiling or evaluating the unit failed (including traps in `start`).
    #[error("load failed: {0}")]
    Load(String),

    /// The resolved entry point trapped or has an unusable signature.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("unit {0} is already registered")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// A failed load, with the host calls the unit made before it failed.
///
/// A unit can write settings or register commands and then trap; those calls
/// still happened and are reported.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct LoadFailure {
    #[source]
    pub error: RuntimeError,
    pub api_calls: Vec<ApiCall>,
}

impl LoadFailure {
    pub(crate) fn before_attach(error: impl Into<RuntimeError>) -> Self {
        Self {
            error: error.into(),
            api_calls: Vec::new(),
        }
    }
}

impl From<LoadFailure> for RuntimeError {
    fn from(failure: LoadFailure) -> Self {
        failure.error
    }
}

/// A unit's own `onunload` failed. Logged and collected, never escalated.
#[derive(Debug, Clone, Error, serde::Serialize)]
#[error("unload hook for {unit_id} failed: {reason}")]
pub struct UnloadWarning {
    pub unit_id: String,
    pub reason: String,
}
