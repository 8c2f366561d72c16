//! Install orchestration for Scion.
//!
//! A [`Suite`] is built from a TOML [`SuiteConfig`]. Its `onload` walks the
//! manifest in order through the [`Orchestrator`]: fetch each unit's source,
//! load it in the sandbox, dispatch its entry point and record it with the
//! lifecycle manager. Failures are logged and counted, never fatal to the run.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod log;
pub mod orchestrator;
pub mod suite;
pub mod types;

pub use config::{SettingsConfig, SuiteConfig, SuiteSection};
pub use error::{InstallError, SuiteError};
pub use fetcher::{FetchFailure, HttpFetcher, SourceFetcher, StaticFetcher};
pub use log::{InstallLog, InstallLogEntry, Severity};
pub use orchestrator::Orchestrator;
pub use suite::Suite;
pub use types::{InstallReport, InstalledUnit, Phase, StatusUpdate, UnitOutcome, UnitStatus};
