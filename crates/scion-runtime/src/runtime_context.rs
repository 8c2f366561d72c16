use anyhow::Result;
use serde::Deserialize;
use wasmtime::{Config, Engine, Linker};

use crate::bindings;
use crate::unit_state::UnitState;

const DEFAULT_MAX_GUEST_STRING: usize = 64 * 1024;

/// Resource limits applied to every unit store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuntimeLimits {
    /// Fuel budget per unit store, shared by its `start` function and entry
    /// point. The budget is refilled before the unload hook runs.
    #[serde(default)]
    pub fuel: Option<u64>,
    #[serde(default = "default_max_guest_string")]
    pub max_guest_string: usize,
    /// Yield to the async executor periodically even without a fuel budget,
    /// so an install timeout can interrupt a unit that never returns.
    #[serde(default)]
    pub preemptible: bool,
}

fn default_max_guest_string() -> usize {
    DEFAULT_MAX_GUEST_STRING
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            fuel: None,
            max_guest_string: DEFAULT_MAX_GUEST_STRING,
            preemptible: false,
        }
    }
}

impl RuntimeLimits {
    pub fn preemptible(mut self, preemptible: bool) -> Self {
        self.preemptible = preemptible;
        self
    }

    /// Whether stores meter fuel, either to enforce a budget or to yield.
    pub fn meters_fuel(&self) -> bool {
        self.fuel.is_some() || self.preemptible
    }

    /// Fuel each store starts with. A preemptible sandbox without a budget
    /// gets an effectively unlimited one, metered only to force yields.
    pub fn fuel_budget(&self) -> Option<u64> {
        match (self.fuel, self.preemptible) {
            (Some(fuel), _) => Some(fuel),
            (None, true) => Some(u64::MAX),
            (None, false) => None,
        }
    }
}

/// Shared Wasmtime engine and linker.
///
/// Constructed once per sandbox and shared by every unit. The linker carries
/// the `host` imports and WASI preview1.
pub struct RuntimeContext {
    pub engine: Engine,
    pub linker: Linker<UnitState>,
}

impl RuntimeContext {
    pub fn new(limits: &RuntimeLimits) -> Result<Self> {
        let mut config = Config::new();
        config.async_support(true);
        config.consume_fuel(limits.meters_fuel());

        let engine = Engine::new(&config)?;
        let mut linker: Linker<UnitState> = Linker::new(&engine);

        wasmtime_wasi::preview1::add_to_linker_async(&mut linker, |state: &mut UnitState| {
            state.wasi_mut()
        })?;
        bindings::add_to_linker(&mut linker)?;

        tracing::debug!(
            fuel = ?limits.fuel,
            preemptible = limits.preemptible,
            "RuntimeContext initialized (async + WASI preview1 + host imports)"
        );

        Ok(Self { engine, linker })
    }
}
