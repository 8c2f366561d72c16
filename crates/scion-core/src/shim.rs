//! Synthetic host API handed to each unit during installation.
//!
//! A [`HostApi`] is built fresh for every install and dropped once the unit's
//! entry point returns. Its only lasting effects are settings writes and the
//! journal of calls it recorded. Every operation is total: no argument can make
//! it fail, so a unit's own error handling around host calls never trips.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::settings::SettingsStore;

/// Opaque handle returned for panels, commands and buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShimHandle(pub u32);

impl ShimHandle {
    /// Guest-facing representation.
    pub fn as_i32(self) -> i32 {
        i32::try_from(self.0).unwrap_or(i32::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationSeverity {
    /// Map the guest's numeric severity; unknown codes fall back to `Info`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::Warning,
            3 => Self::Error,
            _ => Self::Info,
        }
    }
}

/// One recorded host API invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ApiCall {
    SettingsGet { key: String, found: bool },
    SettingsSet { key: String },
    SettingsPanelCreate { handle: ShimHandle, config: serde_json::Value },
    AddCommand { handle: ShimHandle, command: serde_json::Value },
    RemoveCommand { handle: ShimHandle, removed: bool },
    CreateButton { handle: ShimHandle, config: serde_json::Value },
    ShowNotification { message: String, severity: NotificationSeverity },
}

/// Per-unit host capability surface.
#[derive(Debug)]
pub struct HostApi {
    unit_id: String,
    settings: SettingsStore,
    next_handle: u32,
    commands: BTreeMap<ShimHandle, serde_json::Value>,
    journal: Vec<ApiCall>,
}

impl HostApi {
    pub fn new(unit_id: impl Into<String>, settings: SettingsStore) -> Self {
        Self {
            unit_id: unit_id.into(),
            settings,
            next_handle: 1,
            commands: BTreeMap::new(),
            journal: Vec::new(),
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    /// Persisted key for `key` as seen by this unit.
    pub fn namespaced_key(&self, key: &str) -> String {
        format!("{}:{key}", self.unit_id)
    }

    // ── settings ────────────────────────────────────────────────────────────

    pub fn settings_get(&mut self, key: &str) -> Option<String> {
        let value = self.settings.get(&self.namespaced_key(key));
        tracing::debug!(unit_id = %self.unit_id, key, found = value.is_some(), "settings.get");
        self.journal.push(ApiCall::SettingsGet {
            key: key.to_string(),
            found: value.is_some(),
        });
        value
    }

    pub fn settings_set(&mut self, key: &str, value: &str) {
        self.settings.set(&self.namespaced_key(key), value);
        tracing::debug!(unit_id = %self.unit_id, key, "settings.set");
        self.journal.push(ApiCall::SettingsSet { key: key.to_string() });
    }

    /// Register a settings panel. Nothing is rendered.
    pub fn create_settings_panel(&mut self, config: &str) -> ShimHandle {
        let handle = self.allocate_handle();
        tracing::debug!(unit_id = %self.unit_id, ?handle, "settings.panel.create");
        self.journal.push(ApiCall::SettingsPanelCreate {
            handle,
            config: parse_config(config),
        });
        handle
    }

    // ── ui ──────────────────────────────────────────────────────────────────

    pub fn add_command(&mut self, command: &str) -> ShimHandle {
        let handle = self.allocate_handle();
        let command = parse_config(command);
        tracing::debug!(unit_id = %self.unit_id, ?handle, "ui.commandPalette.addCommand");
        self.commands.insert(handle, command.clone());
        self.journal.push(ApiCall::AddCommand { handle, command });
        handle
    }

    /// Returns whether `handle` referred to a live command.
    pub fn remove_command(&mut self, handle: ShimHandle) -> bool {
        let removed = self.commands.remove(&handle).is_some();
        tracing::debug!(
            unit_id = %self.unit_id,
            ?handle,
            removed,
            "ui.commandPalette.removeCommand"
        );
        self.journal.push(ApiCall::RemoveCommand { handle, removed });
        removed
    }

    pub fn create_button(&mut self, config: &str) -> ShimHandle {
        let handle = self.allocate_handle();
        tracing::debug!(unit_id = %self.unit_id, ?handle, "ui.createButton");
        self.journal.push(ApiCall::CreateButton {
            handle,
            config: parse_config(config),
        });
        handle
    }

    pub fn show_notification(&mut self, message: &str, severity: NotificationSeverity) {
        tracing::info!(unit_id = %self.unit_id, ?severity, message, "Unit notification");
        self.journal.push(ApiCall::ShowNotification {
            message: message.to_string(),
            severity,
        });
    }

    // ── diagnostics ─────────────────────────────────────────────────────────

    pub fn live_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn journal(&self) -> &[ApiCall] {
        &self.journal
    }

    pub fn into_journal(self) -> Vec<ApiCall> {
        self.journal
    }

    fn allocate_handle(&mut self) -> ShimHandle {
        let handle = ShimHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        handle
    }
}

/// Configs arrive as JSON text; anything unparseable is kept verbatim.
fn parse_config(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
