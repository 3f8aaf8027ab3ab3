//! Run subcommand: install descriptors, start the framework and optionally
//! stay up until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use wirebox_config::Config;
use wirebox_core::{Framework, StartOptions};
use wirebox_protocols::RegistryError;

use crate::cmd_resolve::{install_all, print_table, reports};
use crate::setup;

pub(crate) async fn run(
    config: Config,
    descriptors: Vec<PathBuf>,
    level: Option<u32>,
    wait: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let sources = setup::load_modules(&config, &descriptors)?;
    let autostart = config.modules.autostart;
    let framework = setup::build_framework(&config)?;

    let fw = framework.clone();
    tokio::task::spawn_blocking(move || -> Result<(), RegistryError> {
        install_all(&fw, sources)?;
        if autostart {
            mark_started(&fw);
        }
        fw.start()?;
        if let Some(level) = level {
            fw.set_active_start_level_and_wait(level)?;
        }
        Ok(())
    })
    .await??;

    info!(
        level = framework.active_start_level(),
        modules = framework.modules().len(),
        "Framework running"
    );
    print_table(&reports(&framework));

    if wait {
        let mut shutdown = framework.shutdown_signal().subscribe();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = shutdown.recv() => {
                info!("Received shutdown signal");
            }
        }
    }

    let fw = framework.clone();
    tokio::task::spawn_blocking(move || fw.stop()).await??;
    Ok(())
}

/// Mark every non-fragment module persistently started. The framework is
/// still at level 0, so each start waits for its level.
fn mark_started(framework: &Arc<Framework>) {
    for module in framework.modules().iter().filter(|m| !m.is_fragment()) {
        if let Err(e) = framework.start_module(module.id(), StartOptions::default()) {
            warn!(module = %module.id(), "Autostart failed: {}", e);
        }
    }
}
