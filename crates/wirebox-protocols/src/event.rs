//! Lifecycle events emitted by the registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ModuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleEventKind {
    Installed,
    Resolved,
    ResolutionFailed,
    Starting,
    Started,
    Stopping,
    Stopped,
    Unresolved,
    Updated,
    Uninstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkEventKind {
    Started,
    Error,
    Warning,
    StartLevelChanged,
    PackagesRefreshed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEvent {
    pub kind: ModuleEventKind,
    pub module: ModuleId,
    pub symbolic_name: String,
}

impl fmt::Display for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} [{}]", self.kind, self.symbolic_name, self.module)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkEvent {
    pub kind: FrameworkEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FrameworkEvent {
    pub fn new(kind: FrameworkEventKind) -> Self {
        Self {
            kind,
            module: None,
            message: None,
        }
    }

    pub fn error(module: Option<ModuleId>, message: impl Into<String>) -> Self {
        Self {
            kind: FrameworkEventKind::Error,
            module,
            message: Some(message.into()),
        }
    }
}

/// Receiver of registry events. Delivery and ordering towards listeners is
/// the sink's business.
pub trait EventSink: Send + Sync {
    fn module_event(&self, event: &ModuleEvent);

    fn framework_event(&self, event: &FrameworkEvent);
}
