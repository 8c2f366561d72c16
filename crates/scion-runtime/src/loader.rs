use std::sync::Arc;

use scion_core::{ApiCall, Convention, ExportSurface, HostApi};
use wasmtime::{ExternType, Instance, Module, Store};

use crate::artifact::ModuleArtifact;
use crate::dispatch::{self, UnitHandle};
use crate::error::{LoadFailure, RuntimeError};
use crate::host_slot::HostSlot;
use crate::runtime_context::{RuntimeContext, RuntimeLimits};
use crate::unit_state::UnitState;

/// Fuel consumed between cooperative yields, so a timeout can preempt a
/// spinning unit.
const FUEL_YIELD_INTERVAL: u64 = 10_000;

/// A unit that evaluated and dispatched successfully.
#[derive(Debug)]
pub struct LoadedUnit {
    pub handle: UnitHandle,
    pub convention: Convention,
    pub source_digest: String,
    /// Host API calls the unit made while its shim was attached.
    pub api_calls: Vec<ApiCall>,
}

/// Compiles unit source into an isolated instance and runs its entry point.
///
/// Each unit gets its own `Store`, so units share nothing but the settings
/// store behind their shims. The sandbox isolates namespaces; it is not a
/// security boundary.
pub struct Sandbox {
    runtime: Arc<RuntimeContext>,
    slot: HostSlot,
    limits: RuntimeLimits,
}

impl Sandbox {
    pub fn new(limits: RuntimeLimits) -> Result<Self, RuntimeError> {
        let runtime = Arc::new(RuntimeContext::new(&limits)?);
        Ok(Self {
            runtime,
            slot: HostSlot::new(),
            limits,
        })
    }

    /// The slot through which host imports reach the current unit's shim.
    pub fn host_slot(&self) -> &HostSlot {
        &self.slot
    }

    pub fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    /// Evaluate `source` as unit `unit_id` with `shim` attached, then dispatch
    /// its entry point.
    ///
    /// The shim is attached for exactly the evaluation and dispatch of this
    /// unit and detached on every exit path. The temporary module artifact is
    /// likewise removed whether loading succeeds or fails.
    pub async fn load(
        &self,
        unit_id: &str,
        source: &[u8],
        shim: HostApi,
    ) -> Result<LoadedUnit, LoadFailure> {
        let artifact = ModuleArtifact::materialize(unit_id, source)
            .map_err(LoadFailure::before_attach)?;
        let module = artifact
            .compile(&self.runtime.engine)
            .map_err(LoadFailure::before_attach)?;
        let surface = export_surface(&module);
        let scope = surface.handle_scope();
        let convention = surface.resolve();
        let mut store = self.new_store().map_err(LoadFailure::before_attach)?;

        let lease = self.slot.lease(shim);
        let outcome = self.evaluate(unit_id, &mut store, &module, convention).await;
        let api_calls = lease
            .release()
            .map(HostApi::into_journal)
            .unwrap_or_default();

        let instance = match outcome {
            Ok(instance) => instance,
            Err(error) => return Err(LoadFailure { error, api_calls }),
        };

        tracing::info!(
            unit_id,
            %convention,
            ?scope,
            kind = ?artifact.kind(),
            api_calls = api_calls.len(),
            "Unit evaluated and dispatched"
        );

        Ok(LoadedUnit {
            handle: UnitHandle::new(store, instance, scope, self.limits.fuel_budget()),
            convention,
            source_digest: artifact.digest().to_string(),
            api_calls,
        })
    }

    /// Instantiate (running any `start` function) and dispatch the entry point.
    async fn evaluate(
        &self,
        unit_id: &str,
        store: &mut Store<UnitState>,
        module: &Module,
        convention: Convention,
    ) -> Result<Instance, RuntimeError> {
        let instance = self
            .runtime
            .linker
            .instantiate_async(&mut *store, module)
            .await
            .map_err(|e| RuntimeError::Load(format!("{unit_id}: {e:#}")))?;

        dispatch::invoke_entry(store, &instance, convention)
            .await
            .map_err(|e| match e {
                RuntimeError::Dispatch(reason) => {
                    RuntimeError::Dispatch(format!("{unit_id}: {reason}"))
                }
                other => other,
            })?;
        Ok(instance)
    }

    fn new_store(&self) -> Result<Store<UnitState>, RuntimeError> {
        let state = UnitState::new(self.slot.clone(), self.limits.max_guest_string);
        let mut store = Store::new(&self.runtime.engine, state);
        if let Some(fuel) = self.limits.fuel_budget() {
            store.set_fuel(fuel)?;
            store.fuel_async_yield_interval(Some(FUEL_YIELD_INTERVAL))?;
        }
        Ok(store)
    }
}

/// Shape of a compiled module's exports, for convention resolution.
pub fn export_surface(module: &Module) -> ExportSurface {
    ExportSurface::new(
        module
            .exports()
            .map(|export| (export.name(), matches!(export.ty(), ExternType::Func(_)))),
    )
}
