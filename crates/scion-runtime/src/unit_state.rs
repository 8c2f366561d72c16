use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::host_slot::HostSlot;

/// Per-unit store state.
///
/// A fresh `UnitState` backs every unit's `Store`. Host imports reach the
/// current shim through the shared [`HostSlot`], never through a global.
///
/// WASI posture:
/// - No filesystem preopens
/// - No host environment variables
/// - stderr inherited so unit diagnostics reach the operator
pub struct UnitState {
    wasi: WasiP1Ctx,
    host: HostSlot,
    max_guest_string: usize,
}

impl UnitState {
    pub fn new(host: HostSlot, max_guest_string: usize) -> Self {
        let wasi = WasiCtxBuilder::new().inherit_stderr().build_p1();
        Self {
            wasi,
            host,
            max_guest_string,
        }
    }

    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    pub fn host(&self) -> &HostSlot {
        &self.host
    }

    /// Longest string host imports will read out of guest memory.
    pub fn max_guest_string(&self) -> usize {
        self.max_guest_string
    }
}
