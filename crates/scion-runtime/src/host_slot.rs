use std::sync::{Arc, Mutex, MutexGuard};

use scion_core::HostApi;

/// The one shared, mutable place from which host imports reach the shim of
/// the unit currently being installed.
///
/// Every store created by a [`Sandbox`](crate::Sandbox) carries a clone of its
/// slot. The slot is filled only while a [`HostLease`] is alive, so a unit's
/// shim can never leak into the next unit's initialization.
#[derive(Debug, Clone, Default)]
pub struct HostSlot {
    inner: Arc<Mutex<Option<HostApi>>>,
}

impl HostSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `api` until the returned lease is released or dropped.
    pub fn lease(&self, api: HostApi) -> HostLease {
        let unit_id = api.unit_id().to_string();
        let previous = self.lock().replace(api);
        if let Some(stale) = previous {
            tracing::warn!(
                stale_unit = stale.unit_id(),
                unit_id = %unit_id,
                "Host slot was still occupied; replacing stale shim"
            );
        }
        tracing::trace!(unit_id = %unit_id, "Host shim attached");
        HostLease {
            slot: self.clone(),
            unit_id,
            released: false,
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.lock().is_none()
    }

    /// Id of the unit whose shim is attached, if any.
    pub fn occupant(&self) -> Option<String> {
        self.lock().as_ref().map(|api| api.unit_id().to_string())
    }

    /// Run `f` against the attached shim; `None` when the slot is vacant.
    pub fn with<R>(&self, f: impl FnOnce(&mut HostApi) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }

    fn take(&self) -> Option<HostApi> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<HostApi>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scoped ownership of the host slot. Clears the slot when dropped.
#[derive(Debug)]
#[must_use = "the shim is detached as soon as the lease is dropped"]
pub struct HostLease {
    slot: HostSlot,
    unit_id: String,
    released: bool,
}

impl HostLease {
    /// Detach the shim and hand it back (for its call journal).
    pub fn release(mut self) -> Option<HostApi> {
        self.released = true;
        let api = self.slot.take();
        tracing::trace!(unit_id = %self.unit_id, "Host shim released");
        api
    }
}

impl Drop for HostLease {
    fn drop(&mut self) {
        if !self.released {
            self.slot.take();
            tracing::trace!(unit_id = %self.unit_id, "Host shim dropped with lease");
        }
    }
}
