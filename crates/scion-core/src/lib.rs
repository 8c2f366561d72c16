//! Core model for Scion.
//!
//! Holds the pieces of the extension orchestrator that need no engine or
//! network: the [`ManifestRegistry`], the per-unit [`HostApi`] shim with its
//! backing [`SettingsStore`], and entry-point [`Convention`] resolution.

pub mod convention;
pub mod error;
pub mod manifest;
pub mod settings;
pub mod shim;

pub use convention::{Convention, ExportSurface, HandleScope};
pub use error::{ManifestError, SettingsError};
pub use manifest::{ConventionHint, ExtensionDescriptor, ManifestRegistry};
pub use settings::SettingsStore;
pub use shim::{ApiCall, HostApi, NotificationSeverity, ShimHandle};
