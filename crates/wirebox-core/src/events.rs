//! Default event sink.

use tracing::{debug, error, info, warn};

use wirebox_protocols::{EventSink, FrameworkEvent, FrameworkEventKind, ModuleEvent, ModuleEventKind};

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn module_event(&self, event: &ModuleEvent) {
        match event.kind {
            ModuleEventKind::ResolutionFailed => {
                warn!(module = %event.module, name = %event.symbolic_name, "Module failed to resolve")
            }
            ModuleEventKind::Installed
            | ModuleEventKind::Started
            | ModuleEventKind::Stopped
            | ModuleEventKind::Updated
            | ModuleEventKind::Uninstalled => {
                info!(module = %event.module, name = %event.symbolic_name, kind = ?event.kind, "Module event")
            }
            _ => debug!(module = %event.module, name = %event.symbolic_name, kind = ?event.kind, "Module event"),
        }
    }

    fn framework_event(&self, event: &FrameworkEvent) {
        let message = event.message.as_deref().unwrap_or_default();
        match event.kind {
            FrameworkEventKind::Error => match event.module {
                Some(module) => error!(module = %module, "{}", message),
                None => error!("{}", message),
            },
            FrameworkEventKind::Warning => warn!(module = ?event.module, "{}", message),
            kind => info!(kind = ?kind, "Framework event"),
        }
    }
}
