//! Resolve subcommand: install descriptors and report the wiring.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use wirebox_config::Config;
use wirebox_core::{Framework, Module};
use wirebox_protocols::{ModuleState, RegistryError};

use crate::cli::OutputFormat;
use crate::setup::{self, ModuleSource};

/// One row of module output.
#[derive(Debug, Serialize)]
pub(crate) struct ModuleReport {
    pub id: u64,
    pub name: String,
    pub version: String,
    pub state: String,
    pub start_level: u32,
    pub wires: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub(crate) async fn resolve(
    config: Config,
    descriptors: Vec<PathBuf>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let sources = setup::load_modules(&config, &descriptors)?;
    let reports = tokio::task::spawn_blocking(move || resolve_all(&config, sources)).await??;

    if reports.is_empty() {
        println!("No modules installed.");
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Table => print_table(&reports),
    }
    Ok(())
}

fn resolve_all(
    config: &Config,
    sources: Vec<ModuleSource>,
) -> Result<Vec<ModuleReport>, RegistryError> {
    let framework = setup::build_framework(config)?;
    install_all(&framework, sources)?;
    framework.resolve_modules(None)?;

    let reports = framework
        .modules()
        .iter()
        .map(|module| {
            // Retry alone to learn why it did not resolve.
            let reason = match module.state() {
                ModuleState::Installed => framework.resolve_module(module.id()).err(),
                _ => None,
            };
            ModuleReport {
                reason: reason.map(|e| e.to_string()),
                ..report(&framework, module)
            }
        })
        .collect();
    Ok(reports)
}

pub(crate) fn install_all(
    framework: &Arc<Framework>,
    sources: Vec<ModuleSource>,
) -> Result<(), RegistryError> {
    for source in sources {
        if let Err(e) = framework.install(&source.location, source.descriptor) {
            warn!(location = %source.location, "Install failed: {}", e);
            return Err(e);
        }
    }
    Ok(())
}

pub(crate) fn reports(framework: &Framework) -> Vec<ModuleReport> {
    framework
        .modules()
        .iter()
        .map(|module| report(framework, module))
        .collect()
}

fn report(framework: &Framework, module: &Module) -> ModuleReport {
    ModuleReport {
        id: module.id().0,
        name: module.symbolic_name(),
        version: module.version().to_string(),
        state: module.state().to_string(),
        start_level: module.start_level(),
        wires: framework
            .wires(module.id())
            .iter()
            .map(|wire| wire.to_string())
            .collect(),
        reason: None,
    }
}

pub(crate) fn print_table(reports: &[ModuleReport]) {
    println!(
        "{:<6} {:<30} {:<12} {:<12} {:<6} {}",
        "ID", "NAME", "VERSION", "STATE", "LEVEL", "WIRES"
    );
    println!("{}", "-".repeat(80));
    for report in reports {
        println!(
            "{:<6} {:<30} {:<12} {:<12} {:<6} {}",
            report.id,
            report.name,
            report.version,
            report.state,
            report.start_level,
            report.wires.len()
        );
        for wire in &report.wires {
            println!("       {}", wire);
        }
        if let Some(reason) = &report.reason {
            println!("       unresolved: {}", reason);
        }
    }
}
