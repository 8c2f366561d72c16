//! Sandbox integration tests.
//!
//! Units are inline WAT modules compiled by the embedded engine, so these run
//! without any external toolchain.

use std::time::Duration;

use scion_core::{ApiCall, Convention, HandleScope, HostApi, NotificationSeverity, SettingsStore};
use scion_runtime::{RuntimeError, RuntimeLimits, Sandbox};

const BOTH_ONLOADS: &str = r#"
(module
  (import "host" "show_notification" (func $notify (param i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "default")
  (data (i32.const 16) "named")
  (func (export "default.onload")
    (call $notify (i32.const 0) (i32.const 7) (i32.const 1)))
  (func (export "onload")
    (call $notify (i32.const 16) (i32.const 5) (i32.const 1))))
"#;

const SELF_EXECUTING: &str = r#"
(module
  (import "host" "settings_set" (func $set (param i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "booted")
  (data (i32.const 8) "yes")
  (func $init
    (call $set (i32.const 0) (i32.const 6) (i32.const 8) (i32.const 3)))
  (start $init))
"#;

const COPIES_SETTING: &str = r#"
(module
  (import "host" "settings_get" (func $get (param i32 i32 i32 i32) (result i32)))
  (import "host" "settings_set" (func $set (param i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "theme")
  (data (i32.const 8) "copy")
  (func (export "onload")
    (local $len i32)
    (local.set $len
      (call $get (i32.const 0) (i32.const 5) (i32.const 64) (i32.const 32)))
    (call $set (i32.const 8) (i32.const 4) (i32.const 64) (local.get $len))))
"#;

const REGISTERS_COMMANDS: &str = r#"
(module
  (import "host" "add_command" (func $add (param i32 i32) (result i32)))
  (import "host" "remove_command" (func $remove (param i32) (result i32)))
  (import "host" "create_button" (func $button (param i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "{\"id\":\"open-today\"}")
  (func (export "default")
    (drop (call $remove (call $add (i32.const 0) (i32.const 19))))
    (drop (call $button (i32.const 0) (i32.const 19)))))
"#;

const TRAPPING_ONLOAD: &str = r#"
(module
  (func (export "onload") unreachable))
"#;

const TRAPPING_START: &str = r#"
(module
  (func $init unreachable)
  (start $init))
"#;

const UNKNOWN_IMPORT: &str = r#"
(module
  (import "host" "open_window" (func $open))
  (func (export "onload") (call $open)))
"#;

const NO_MEMORY: &str = r#"
(module
  (import "host" "settings_set" (func $set (param i32 i32 i32 i32)))
  (func (export "onload")
    (call $set (i32.const 0) (i32.const 4) (i32.const 0) (i32.const 4))))
"#;

const WRITES_THEN_TRAPS: &str = r#"
(module
  (import "host" "settings_set" (func $set (param i32 i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "draftv")
  (func (export "onload")
    (call $set (i32.const 0) (i32.const 5) (i32.const 5) (i32.const 1))
    unreachable))
"#;

const SPINS_FOREVER: &str = r#"
(module
  (func (export "onload")
    (loop $spin (br $spin))))
"#;

fn sandbox() -> Sandbox {
    Sandbox::new(RuntimeLimits::default()).unwrap()
}

#[tokio::test]
async fn default_onload_takes_priority_over_named_onload() {
    let sandbox = sandbox();
    let shim = HostApi::new("calendar", SettingsStore::in_memory());

    let unit = sandbox.load("calendar", BOTH_ONLOADS.as_bytes(), shim).await.unwrap();

    assert_eq!(unit.convention, Convention::DefaultOnload);
    assert_eq!(unit.handle.scope(), HandleScope::Default);
    assert_eq!(
        unit.api_calls,
        vec![ApiCall::ShowNotification {
            message: "default".into(),
            severity: NotificationSeverity::Success,
        }]
    );
}

#[tokio::test]
async fn self_executing_unit_initializes_during_evaluation() {
    let sandbox = sandbox();
    let settings = SettingsStore::in_memory();

    let unit = sandbox
        .load("boot", SELF_EXECUTING.as_bytes(), HostApi::new("boot", settings.clone()))
        .await
        .unwrap();

    assert_eq!(unit.convention, Convention::SelfExecuting);
    assert_eq!(unit.handle.scope(), HandleScope::Namespace);
    assert_eq!(settings.get("boot:booted").as_deref(), Some("yes"));
}

#[tokio::test]
async fn settings_round_trip_through_guest_memory() {
    let sandbox = sandbox();
    let settings = SettingsStore::in_memory();
    settings.set("prefs:theme", "dark");
    settings.set("other:theme", "light");

    sandbox
        .load("prefs", COPIES_SETTING.as_bytes(), HostApi::new("prefs", settings.clone()))
        .await
        .unwrap();

    assert_eq!(settings.get("prefs:copy").as_deref(), Some("dark"));
    assert_eq!(settings.get("other:copy"), None);
}

#[tokio::test]
async fn callable_default_can_use_the_command_palette() {
    let sandbox = sandbox();
    let shim = HostApi::new("palette", SettingsStore::in_memory());

    let unit = sandbox
        .load("palette", REGISTERS_COMMANDS.as_bytes(), shim)
        .await
        .unwrap();

    assert_eq!(unit.convention, Convention::CallableDefault);
    assert!(matches!(unit.api_calls[0], ApiCall::AddCommand { .. }));
    assert!(matches!(unit.api_calls[1], ApiCall::RemoveCommand { removed: true, .. }));
    assert!(matches!(unit.api_calls[2], ApiCall::CreateButton { .. }));
}

#[tokio::test]
async fn trapping_entry_point_is_a_dispatch_error_and_slot_is_cleared() {
    let sandbox = sandbox();
    let shim = HostApi::new("broken", SettingsStore::in_memory());

    let err = sandbox.load("broken", TRAPPING_ONLOAD.as_bytes(), shim).await.unwrap_err();

    assert!(matches!(err.error, RuntimeError::Dispatch(ref reason) if reason.contains("broken")));
    assert!(sandbox.host_slot().is_vacant());
}

#[tokio::test]
async fn trap_during_evaluation_is_a_load_error() {
    let sandbox = sandbox();
    let shim = HostApi::new("crashy", SettingsStore::in_memory());

    let err = sandbox.load("crashy", TRAPPING_START.as_bytes(), shim).await.unwrap_err();

    assert!(matches!(err.error, RuntimeError::Load(_)));
    assert!(sandbox.host_slot().is_vacant());
}

#[tokio::test]
async fn unresolved_import_and_bad_source_are_load_errors() {
    let sandbox = sandbox();

    let err = sandbox
        .load("needy", UNKNOWN_IMPORT.as_bytes(), HostApi::new("needy", SettingsStore::in_memory()))
        .await
        .unwrap_err();
    assert!(matches!(err.error, RuntimeError::Load(_)));

    let err = sandbox
        .load("garbled", b"<html>404</html>", HostApi::new("garbled", SettingsStore::in_memory()))
        .await
        .unwrap_err();
    assert!(matches!(err.error, RuntimeError::Load(_)));
    assert!(sandbox.host_slot().is_vacant());
}

#[tokio::test]
async fn host_calls_without_memory_degrade_to_empty_strings() {
    let sandbox = sandbox();
    let settings = SettingsStore::in_memory();

    sandbox
        .load("bare", NO_MEMORY.as_bytes(), HostApi::new("bare", settings.clone()))
        .await
        .unwrap();

    assert_eq!(settings.get("bare:").as_deref(), Some(""));
}

#[tokio::test]
async fn slot_is_vacant_between_units() {
    let sandbox = sandbox();
    let settings = SettingsStore::in_memory();

    let _ = sandbox
        .load("first", TRAPPING_ONLOAD.as_bytes(), HostApi::new("first", settings.clone()))
        .await;
    assert!(sandbox.host_slot().is_vacant());

    sandbox
        .load("second", SELF_EXECUTING.as_bytes(), HostApi::new("second", settings.clone()))
        .await
        .unwrap();
    assert!(sandbox.host_slot().is_vacant());
    assert_eq!(settings.get("second:booted").as_deref(), Some("yes"));
    assert_eq!(settings.get("first:booted"), None);
}

#[tokio::test]
async fn fuel_limit_stops_a_spinning_unit() {
    let sandbox = Sandbox::new(RuntimeLimits {
        fuel: Some(100_000),
        ..RuntimeLimits::default()
    })
    .unwrap();
    let shim = HostApi::new("spinner", SettingsStore::in_memory());

    let err = sandbox.load("spinner", SPINS_FOREVER.as_bytes(), shim).await.unwrap_err();

    assert!(matches!(err.error, RuntimeError::Dispatch(_)));
    assert!(sandbox.host_slot().is_vacant());
}

#[tokio::test]
async fn failed_load_keeps_the_calls_made_before_the_trap() {
    let sandbox = sandbox();
    let settings = SettingsStore::in_memory();

    let failure = sandbox
        .load("drafts", WRITES_THEN_TRAPS.as_bytes(), HostApi::new("drafts", settings.clone()))
        .await
        .unwrap_err();

    assert!(matches!(failure.error, RuntimeError::Dispatch(_)));
    assert_eq!(
        failure.api_calls,
        vec![ApiCall::SettingsSet {
            key: "draft".into(),
        }]
    );
    assert_eq!(settings.get("drafts:draft").as_deref(), Some("v"));
}

#[tokio::test]
async fn load_failures_before_instantiation_have_no_calls() {
    let sandbox = sandbox();

    let failure = sandbox
        .load("garbled", b"(module", HostApi::new("garbled", SettingsStore::in_memory()))
        .await
        .unwrap_err();

    assert!(matches!(failure.error, RuntimeError::Load(_)));
    assert!(failure.api_calls.is_empty());
}

#[tokio::test]
async fn preemptible_sandbox_yields_without_a_fuel_budget() {
    let limits = RuntimeLimits::default().preemptible(true);
    assert_eq!(limits.fuel_budget(), Some(u64::MAX));
    let sandbox = Sandbox::new(limits).unwrap();
    let shim = HostApi::new("spinner", SettingsStore::in_memory());

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        sandbox.load("spinner", SPINS_FOREVER.as_bytes(), shim),
    )
    .await;

    assert!(outcome.is_err(), "spinning unit should be interrupted");
    assert!(sandbox.host_slot().is_vacant());
}

#[test]
fn limits_meter_fuel_only_when_asked() {
    let limits = RuntimeLimits::default();
    assert!(!limits.meters_fuel());
    assert_eq!(limits.fuel_budget(), None);

    let budgeted = RuntimeLimits {
        fuel: Some(5_000),
        ..RuntimeLimits::default()
    };
    assert!(budgeted.meters_fuel());
    assert_eq!(budgeted.preemptible(true).fuel_budget(), Some(5_000));
}
