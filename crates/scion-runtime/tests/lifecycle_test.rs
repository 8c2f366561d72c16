use scion_core::{HostApi, SettingsStore};
use scion_runtime::{LifecycleManager, LoadedUnitRecord, RuntimeError, RuntimeLimits, Sandbox};

const CLEAN_UNLOAD: &str = r#"
(module
  (func (export "onload"))
  (func (export "onunload")))
"#;

const FAILING_UNLOAD: &str = r#"
(module
  (func (export "onload"))
  (func (export "onunload") unreachable))
"#;

const NO_UNLOAD: &str = r#"
(module
  (func (export "onload")))
"#;

const DEFAULT_SCOPED_UNLOAD: &str = r#"
(module
  (func (export "default"))
  (func (export "default.onunload")))
"#;

// The handle is the default export, so a namespace-level hook is not seen.
const NAMESPACE_HOOK_ON_DEFAULT_UNIT: &str = r#"
(module
  (func (export "default.onload"))
  (func (export "onunload") unreachable))
"#;

const UNLOAD_CALLS_HOST: &str = r#"
(module
  (import "host" "show_notification" (func $notify (param i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "bye")
  (func (export "onload"))
  (func (export "onunload")
    (call $notify (i32.const 0) (i32.const 3) (i32.const 0))))
"#;

async fn load_into(
    sandbox: &Sandbox,
    lifecycle: &LifecycleManager,
    settings: &SettingsStore,
    id: &str,
    source: &str,
) {
    let unit = sandbox
        .load(id, source.as_bytes(), HostApi::new(id, settings.clone()))
        .await
        .unwrap();
    lifecycle
        .register(LoadedUnitRecord::new(id, id.to_uppercase(), unit))
        .await
        .unwrap();
}

#[tokio::test]
async fn failing_unload_hook_does_not_stop_the_others() {
    let sandbox = Sandbox::new(RuntimeLimits::default()).unwrap();
    let lifecycle = LifecycleManager::new();
    let settings = SettingsStore::in_memory();

    load_into(&sandbox, &lifecycle, &settings, "first", CLEAN_UNLOAD).await;
    load_into(&sandbox, &lifecycle, &settings, "second", FAILING_UNLOAD).await;
    load_into(&sandbox, &lifecycle, &settings, "third", CLEAN_UNLOAD).await;
    assert_eq!(lifecycle.len().await, 3);

    let report = lifecycle.teardown().await;

    assert_eq!(report.unloaded, vec!["first", "third"]);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].unit_id, "second");
    assert!(lifecycle.is_empty().await);
}

#[tokio::test]
async fn units_without_hooks_are_released_silently() {
    let sandbox = Sandbox::new(RuntimeLimits::default()).unwrap();
    let lifecycle = LifecycleManager::new();
    let settings = SettingsStore::in_memory();

    load_into(&sandbox, &lifecycle, &settings, "plain", NO_UNLOAD).await;
    load_into(&sandbox, &lifecycle, &settings, "defaulted", DEFAULT_SCOPED_UNLOAD).await;
    load_into(&sandbox, &lifecycle, &settings, "mixed", NAMESPACE_HOOK_ON_DEFAULT_UNIT).await;

    let report = lifecycle.teardown().await;

    assert_eq!(report.unloaded, vec!["defaulted"]);
    assert_eq!(report.released, vec!["plain", "mixed"]);
    assert!(report.warnings.is_empty());
    assert_eq!(report.total(), 3);
}

#[tokio::test]
async fn host_calls_from_unload_hooks_are_inert() {
    let sandbox = Sandbox::new(RuntimeLimits::default()).unwrap();
    let lifecycle = LifecycleManager::new();
    let settings = SettingsStore::in_memory();

    load_into(&sandbox, &lifecycle, &settings, "farewell", UNLOAD_CALLS_HOST).await;

    let report = lifecycle.teardown().await;

    assert_eq!(report.unloaded, vec!["farewell"]);
    assert!(sandbox.host_slot().is_vacant());
}

#[tokio::test]
async fn records_are_listed_in_registration_order_and_unique() {
    let sandbox = Sandbox::new(RuntimeLimits::default()).unwrap();
    let lifecycle = LifecycleManager::new();
    let settings = SettingsStore::in_memory();

    load_into(&sandbox, &lifecycle, &settings, "foundation", NO_UNLOAD).await;
    load_into(&sandbox, &lifecycle, &settings, "utilities", NO_UNLOAD).await;

    let summaries = lifecycle.list().await;
    let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["foundation", "utilities"]);
    assert!(summaries.iter().all(|s| s.executed));
    assert!(lifecycle.contains("utilities").await);

    let again = sandbox
        .load("foundation", NO_UNLOAD.as_bytes(), HostApi::new("foundation", settings.clone()))
        .await
        .unwrap();
    let err = lifecycle
        .register(LoadedUnitRecord::new("foundation", "Foundation", again))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyRegistered(ref id) if id == "foundation"));
    assert_eq!(lifecycle.len().await, 2);
}
