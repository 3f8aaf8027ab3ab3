//! Module lifecycle states.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a module.
///
/// The discriminants double as [`StateMask`] bits so a state can be tested
/// against a caller-supplied mask without a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum ModuleState {
    Installed = 1,
    Resolved = 2,
    Starting = 4,
    Stopping = 8,
    Active = 16,
    Uninstalled = 32,
}

impl ModuleState {
    pub fn mask(self) -> StateMask {
        StateMask::from_bits_truncate(self as u8)
    }
}

impl From<u8> for ModuleState {
    fn from(v: u8) -> Self {
        match v {
            1 => ModuleState::Installed,
            2 => ModuleState::Resolved,
            4 => ModuleState::Starting,
            8 => ModuleState::Stopping,
            16 => ModuleState::Active,
            32 => ModuleState::Uninstalled,
            _ => ModuleState::Installed,
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Installed => "INSTALLED",
            ModuleState::Resolved => "RESOLVED",
            ModuleState::Starting => "STARTING",
            ModuleState::Stopping => "STOPPING",
            ModuleState::Active => "ACTIVE",
            ModuleState::Uninstalled => "UNINSTALLED",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Set of states a caller accepts when locking a module.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateMask: u8 {
        const INSTALLED = 1;
        const RESOLVED = 2;
        const STARTING = 4;
        const STOPPING = 8;
        const ACTIVE = 16;
        const UNINSTALLED = 32;
    }
}

impl StateMask {
    pub fn allows(self, state: ModuleState) -> bool {
        self.contains(state.mask())
    }
}
