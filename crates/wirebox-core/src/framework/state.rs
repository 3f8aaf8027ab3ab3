//! Framework lifecycle state and shutdown notification.

use std::fmt;

use tokio::sync::broadcast;

/// Framework state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameworkState {
    /// Built, not started.
    Created = 0,
    /// Raising to the beginning start level.
    Starting = 1,
    /// Running and ready.
    Running = 2,
    /// Lowering to start level 0.
    ShuttingDown = 3,
    /// Stopped.
    Stopped = 4,
}

impl FrameworkState {
    /// Whether modules may still be installed and resolved.
    pub fn accepts_operations(self) -> bool {
        matches!(
            self,
            FrameworkState::Created | FrameworkState::Starting | FrameworkState::Running
        )
    }
}

impl From<u8> for FrameworkState {
    fn from(v: u8) -> Self {
        match v {
            0 => FrameworkState::Created,
            1 => FrameworkState::Starting,
            2 => FrameworkState::Running,
            3 => FrameworkState::ShuttingDown,
            4 => FrameworkState::Stopped,
            _ => FrameworkState::Created,
        }
    }
}

impl fmt::Display for FrameworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameworkState::Created => "created",
            FrameworkState::Starting => "starting",
            FrameworkState::Running => "running",
            FrameworkState::ShuttingDown => "shutting down",
            FrameworkState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shutdown signal for graceful shutdown.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Trigger shutdown.
    pub fn trigger(&self) {
        let _ = self.sender.send(());
    }

    /// Subscribe to shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
