use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("extension not found: {0}")]
    NotFound(String),

    #[error("invalid extension id: {0:?}")]
    InvalidId(String),

    #[error("duplicate extension id: {0}")]
    DuplicateId(String),

    #[error("extension {0} has no source location")]
    MissingSource(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
