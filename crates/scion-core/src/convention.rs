//! Entry-point convention resolution.
//!
//! A loaded unit announces its entry point in one of four shapes. Resolution
//! looks only at the names of the module's function exports, so it can be
//! tested without an engine.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manifest::ConventionHint;

pub const DEFAULT_EXPORT: &str = "default";
pub const DEFAULT_ONLOAD: &str = "default.onload";
pub const DEFAULT_ONUNLOAD: &str = "default.onunload";
pub const NAMED_ONLOAD: &str = "onload";
pub const NAMED_ONUNLOAD: &str = "onunload";

const DEFAULT_MEMBER_PREFIX: &str = "default.";

/// The resolved entry-point shape of a unit, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    /// `default.onload` is a function.
    DefaultOnload,
    /// The namespace exports an `onload` function.
    NamedOnload,
    /// `default` is itself a function.
    CallableDefault,
    /// No entry point; evaluating the module was the initialization.
    SelfExecuting,
}

impl Convention {
    /// Export to invoke, or `None` when evaluation already initialized the unit.
    pub fn entry_export(self) -> Option<&'static str> {
        match self {
            Convention::DefaultOnload => Some(DEFAULT_ONLOAD),
            Convention::NamedOnload => Some(NAMED_ONLOAD),
            Convention::CallableDefault => Some(DEFAULT_EXPORT),
            Convention::SelfExecuting => None,
        }
    }

    /// Whether the manifest hint agrees with what was resolved.
    pub fn matches_hint(self, hint: ConventionHint) -> bool {
        match hint {
            ConventionHint::Unknown => true,
            ConventionHint::SelfExecuting => self == Convention::SelfExecuting,
            ConventionHint::Standard => self != Convention::SelfExecuting,
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Convention::DefaultOnload => "default-onload",
            Convention::NamedOnload => "named-onload",
            Convention::CallableDefault => "callable-default",
            Convention::SelfExecuting => "self-executing",
        };
        f.write_str(name)
    }
}

/// What the recorded module handle refers to: the default export or the
/// module namespace itself. Teardown looks for `onunload` on this object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleScope {
    Default,
    Namespace,
}

impl HandleScope {
    pub fn unload_export(self) -> &'static str {
        match self {
            HandleScope::Default => DEFAULT_ONUNLOAD,
            HandleScope::Namespace => NAMED_ONUNLOAD,
        }
    }
}

/// The function exports of an evaluated module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSurface {
    functions: BTreeSet<String>,
    has_default: bool,
}

impl ExportSurface {
    /// `exports` yields `(name, is_function)` pairs.
    pub fn new<I, S>(exports: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let mut surface = Self::default();
        for (name, is_function) in exports {
            let name = name.into();
            if name == DEFAULT_EXPORT || name.starts_with(DEFAULT_MEMBER_PREFIX) {
                surface.has_default = true;
            }
            if is_function {
                surface.functions.insert(name);
            }
        }
        surface
    }

    /// Convenience for a surface made only of functions.
    pub fn from_functions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(|n| (n, true)))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn handle_scope(&self) -> HandleScope {
        if self.has_default {
            HandleScope::Default
        } else {
            HandleScope::Namespace
        }
    }

    /// Resolve the entry-point convention. Total: every surface maps to
    /// exactly one variant.
    pub fn resolve(&self) -> Convention {
        if self.has_function(DEFAULT_ONLOAD) {
            Convention::DefaultOnload
        } else if self.has_function(NAMED_ONLOAD) {
            Convention::NamedOnload
        } else if self.has_function(DEFAULT_EXPORT) {
            Convention::CallableDefault
        } else {
            Convention::SelfExecuting
        }
    }
}
