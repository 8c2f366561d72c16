use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use scion_core::ExtensionDescriptor;
use thiserror::Error;

/// Why a unit's source could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("unsupported source location: {0}")]
    Unsupported(String),
}

impl FetchFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchFailure::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Retrieves the raw source of one unit.
///
/// Implementations can hit the network, read local files, or return canned
/// sources for testing.
pub trait SourceFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        descriptor: &'a ExtensionDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchFailure>> + Send + 'a>>;
}

/// Fetches `http(s)://` sources with reqwest and `file://` sources from disk.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Client with a per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchFailure> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;
        Ok(Self::with_client(http))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        descriptor: &'a ExtensionDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchFailure>> + Send + 'a>> {
        Box::pin(async move {
            let url = reqwest::Url::parse(&descriptor.source)
                .map_err(|e| FetchFailure::Unsupported(format!("{}: {e}", descriptor.source)))?;

            match url.scheme() {
                "http" | "https" => {
                    tracing::debug!(unit_id = %descriptor.id, %url, "Fetching unit source");
                    let resp = self
                        .http
                        .get(url)
                        .send()
                        .await
                        .map_err(|e| FetchFailure::Transport(e.to_string()))?;

                    if !resp.status().is_success() {
                        return Err(FetchFailure::Status(resp.status().as_u16()));
                    }

                    let body = resp
                        .bytes()
                        .await
                        .map_err(|e| FetchFailure::Transport(e.to_string()))?;
                    Ok(body.to_vec())
                }
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| FetchFailure::Unsupported(descriptor.source.clone()))?;
                    tracing::debug!(
                        unit_id = %descriptor.id,
                        path = %path.display(),
                        "Reading unit source"
                    );
                    tokio::fs::read(&path)
                        .await
                        .map_err(|e| FetchFailure::Transport(format!("{}: {e}", path.display())))
                }
                _ => Err(FetchFailure::Unsupported(descriptor.source.clone())),
            }
        })
    }
}

/// Canned sources keyed by unit id, recording the order of fetches.
///
/// Ids with no canned entry fail with HTTP 404.
#[derive(Default)]
pub struct StaticFetcher {
    sources: HashMap<String, Result<Vec<u8>, FetchFailure>>,
    calls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, id: &str, source: impl Into<Vec<u8>>) -> Self {
        self.sources.insert(id.to_string(), Ok(source.into()));
        self
    }

    pub fn with_failure(mut self, id: &str, failure: FetchFailure) -> Self {
        self.sources.insert(id.to_string(), Err(failure));
        self
    }

    /// Unit ids in the order they were fetched.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SourceFetcher for StaticFetcher {
    fn fetch<'a>(
        &'a self,
        descriptor: &'a ExtensionDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchFailure>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(descriptor.id.clone());
            self.sources
                .get(&descriptor.id)
                .cloned()
                .unwrap_or(Err(FetchFailure::Status(404)))
        })
    }
}
