//! `host` imports exposed to units.
//!
//! Strings cross the boundary as `(ptr, len)` pairs in the unit's exported
//! `memory`. Every import is total: bad pointers, invalid UTF-8 or a missing
//! memory degrade to an empty string, and calls made while no shim is
//! attached are ignored.

use scion_core::{HostApi, NotificationSeverity, ShimHandle};
use wasmtime::{Caller, Extern, Linker, Memory};

use crate::unit_state::UnitState;

pub const HOST_MODULE: &str = "host";

/// Returned by `settings_get` for a missing key.
const ABSENT: i32 = -1;
/// Returned by handle-producing imports when no shim is attached.
const NO_HANDLE: i32 = 0;

pub fn add_to_linker(linker: &mut Linker<UnitState>) -> anyhow::Result<()> {
    linker.func_wrap(
        HOST_MODULE,
        "settings_get",
        |mut caller: Caller<'_, UnitState>,
         key_ptr: i32,
         key_len: i32,
         out_ptr: i32,
         out_cap: i32|
         -> i32 {
            let key = read_string(&mut caller, key_ptr, key_len);
            let Some(value) =
                with_shim(&caller, "settings_get", |api| api.settings_get(&key)).flatten()
            else {
                return ABSENT;
            };
            let len = i32::try_from(value.len()).unwrap_or(i32::MAX);
            let fits = usize::try_from(out_cap).is_ok_and(|cap| value.len() <= cap);
            if fits && !write_bytes(&mut caller, out_ptr, value.as_bytes()) {
                return ABSENT;
            }
            len
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "settings_set",
        |mut caller: Caller<'_, UnitState>,
         key_ptr: i32,
         key_len: i32,
         val_ptr: i32,
         val_len: i32| {
            let key = read_string(&mut caller, key_ptr, key_len);
            let value = read_string(&mut caller, val_ptr, val_len);
            with_shim(&caller, "settings_set", |api| api.settings_set(&key, &value));
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "settings_panel_create",
        |mut caller: Caller<'_, UnitState>, cfg_ptr: i32, cfg_len: i32| -> i32 {
            let config = read_string(&mut caller, cfg_ptr, cfg_len);
            with_shim(&caller, "settings_panel_create", |api| {
                api.create_settings_panel(&config).as_i32()
            })
            .unwrap_or(NO_HANDLE)
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "add_command",
        |mut caller: Caller<'_, UnitState>, cfg_ptr: i32, cfg_len: i32| -> i32 {
            let command = read_string(&mut caller, cfg_ptr, cfg_len);
            with_shim(&caller, "add_command", |api| api.add_command(&command).as_i32())
                .unwrap_or(NO_HANDLE)
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "remove_command",
        |caller: Caller<'_, UnitState>, handle: i32| -> i32 {
            let Ok(handle) = u32::try_from(handle) else {
                return 0;
            };
            let removed = with_shim(&caller, "remove_command", |api| {
                api.remove_command(ShimHandle(handle))
            });
            i32::from(removed.unwrap_or(false))
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "create_button",
        |mut caller: Caller<'_, UnitState>, cfg_ptr: i32, cfg_len: i32| -> i32 {
            let config = read_string(&mut caller, cfg_ptr, cfg_len);
            with_shim(&caller, "create_button", |api| api.create_button(&config).as_i32())
                .unwrap_or(NO_HANDLE)
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "show_notification",
        |mut caller: Caller<'_, UnitState>, msg_ptr: i32, msg_len: i32, severity: i32| {
            let message = read_string(&mut caller, msg_ptr, msg_len);
            let severity = NotificationSeverity::from_code(severity);
            with_shim(&caller, "show_notification", |api| {
                api.show_notification(&message, severity)
            });
        },
    )?;

    Ok(())
}

fn with_shim<R>(
    caller: &Caller<'_, UnitState>,
    call: &str,
    f: impl FnOnce(&mut HostApi) -> R,
) -> Option<R> {
    let result = caller.data().host().with(f);
    if result.is_none() {
        tracing::debug!(call, "Host call with no attached shim ignored");
    }
    result
}

fn guest_memory(caller: &mut Caller<'_, UnitState>) -> Option<Memory> {
    caller.get_export("memory").and_then(Extern::into_memory)
}

fn read_string(caller: &mut Caller<'_, UnitState>, ptr: i32, len: i32) -> String {
    let (Ok(offset), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return String::new();
    };
    if len == 0 {
        return String::new();
    }
    let limit = caller.data().max_guest_string();
    if len > limit {
        tracing::warn!(len, limit, "Guest string exceeds limit; truncating");
    }
    let Some(memory) = guest_memory(caller) else {
        return String::new();
    };
    let mut buf = vec![0u8; len.min(limit)];
    if memory.read(&*caller, offset, &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

fn write_bytes(caller: &mut Caller<'_, UnitState>, ptr: i32, bytes: &[u8]) -> bool {
    let Ok(offset) = usize::try_from(ptr) else {
        return false;
    };
    let Some(memory) = guest_memory(caller) else {
        return false;
    };
    memory.write(&mut *caller, offset, bytes).is_ok()
}
