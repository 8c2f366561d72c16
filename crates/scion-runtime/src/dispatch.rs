use scion_core::{Convention, HandleScope};
use wasmtime::{Instance, Store};

use crate::error::RuntimeError;
use crate::unit_state::UnitState;

/// Invoke the entry point selected by `convention`.
///
/// Exactly one branch runs. `SelfExecuting` makes no call: the module's
/// `start` function already ran during instantiation.
pub(crate) async fn invoke_entry(
    store: &mut Store<UnitState>,
    instance: &Instance,
    convention: Convention,
) -> Result<(), RuntimeError> {
    match convention.entry_export() {
        Some(export) => {
            tracing::debug!(%convention, export, "Invoking entry point");
            call_export(store, instance, export)
                .await
                .map_err(RuntimeError::Dispatch)
        }
        None => {
            tracing::debug!(%convention, "No entry point; evaluation was initialization");
            Ok(())
        }
    }
}

async fn call_export(
    store: &mut Store<UnitState>,
    instance: &Instance,
    export: &str,
) -> Result<(), String> {
    let func = instance
        .get_typed_func::<(), ()>(&mut *store, export)
        .map_err(|e| format!("{export}: {e:#}"))?;
    func.call_async(&mut *store, ())
        .await
        .map_err(|e| format!("{export}: {e:#}"))
}

/// Opaque reference to a loaded unit: its instance, its store, and which
/// object (default export or namespace) the unit is represented by.
pub struct UnitHandle {
    store: Store<UnitState>,
    instance: Instance,
    scope: HandleScope,
    fuel: Option<u64>,
}

impl UnitHandle {
    pub(crate) fn new(
        store: Store<UnitState>,
        instance: Instance,
        scope: HandleScope,
        fuel: Option<u64>,
    ) -> Self {
        Self {
            store,
            instance,
            scope,
            fuel,
        }
    }

    pub fn scope(&self) -> HandleScope {
        self.scope
    }

    pub fn has_unload_hook(&mut self) -> bool {
        self.instance
            .get_func(&mut self.store, self.scope.unload_export())
            .is_some()
    }

    /// Run the unit's `onunload` hook if it has one.
    ///
    /// Returns `Ok(false)` when there is no hook; absence is not an error.
    pub async fn unload(&mut self) -> Result<bool, String> {
        if !self.has_unload_hook() {
            return Ok(false);
        }
        if let Some(fuel) = self.fuel {
            self.store.set_fuel(fuel).map_err(|e| e.to_string())?;
        }
        call_export(&mut self.store, &self.instance, self.scope.unload_export()).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitHandle")
            .field("scope", &self.scope)
            .field("fuel", &self.fuel)
            .finish_non_exhaustive()
    }
}
