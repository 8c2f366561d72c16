//! Embedded WASM sandbox for Scion.
//!
//! [`Sandbox`] turns fetched unit source into an isolated Wasmtime instance,
//! attaches the unit's [`HostApi`](scion_core::HostApi) through a leased
//! [`HostSlot`] and runs its entry point. [`LifecycleManager`] keeps the units
//! that loaded and drives their `onunload` hooks on teardown.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use scion_core::{HostApi, SettingsStore};
//! use scion_runtime::{LifecycleManager, LoadedUnitRecord, RuntimeLimits, Sandbox};
//!
//! # async fn run() -> Result<(), scion_runtime::RuntimeError> {
//! let sandbox = Sandbox::new(RuntimeLimits::default())?;
//! let lifecycle = LifecycleManager::new();
//! let settings = SettingsStore::in_memory();
//!
//! let source = br#"(module (func (export "onload")))"#;
//! let unit = sandbox
//!     .load("foundation", source, HostApi::new("foundation", settings))
//!     .await?;
//! lifecycle
//!     .register(LoadedUnitRecord::new("foundation", "Foundation", unit))
//!     .await?;
//!
//! let report = lifecycle.teardown().await;
//! assert!(report.warnings.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod bindings;
pub mod dispatch;
pub mod error;
pub mod host_slot;
pub mod lifecycle;
pub mod loader;
pub mod runtime_context;
pub mod unit_state;

pub use dispatch::UnitHandle;
pub use error::{LoadFailure, RuntimeError, UnloadWarning};
pub use host_slot::{HostLease, HostSlot};
pub use lifecycle::{LifecycleManager, LoadedUnitRecord, TeardownReport, UnitSummary};
pub use loader::{LoadedUnit, Sandbox};
pub use runtime_context::RuntimeLimits;
