use anyhow::Context;
use colored::*;
use qosgen_common::document::load_document;
use qosgen_core::output::DirectorySink;
use qosgen_core::render::ShellRenderer;
use qosgen_core::{Inventory, LatencyPolicy, Report};
use tracing::{info, info_span};

use crate::commands::CommandLine;
use crate::terminal::print;

pub fn generate(commands: &CommandLine) -> anyhow::Result<Report> {
    let cfg = commands
        .to_config()
        .context("cannot resolve the output directory")?;

    let span = info_span!("generate", output = %cfg.output_dir.display());

    let inventory = Inventory::from_value(load_document(&commands.inventory)?, span.clone())
        .with_context(|| format!("invalid inventory {}", commands.inventory.display()))?;
    let policy = LatencyPolicy::from_value(load_document(&commands.latency)?)
        .with_context(|| format!("invalid latency policy {}", commands.latency.display()))?;
    info!(
        parent: &span,
        "Loaded {} hosts in {} roles, {} latency classes",
        inventory.hosts().len(),
        inventory.roles().len(),
        policy.all_latency_marks().len()
    );

    let sink = DirectorySink::create(&cfg.output_dir, span.clone())
        .with_context(|| format!("cannot create {}", cfg.output_dir.display()))?;

    let report = qosgen_core::generate(&inventory, &policy, &cfg, &ShellRenderer, &sink, span)?;
    Ok(report)
}

pub fn summary(report: &Report) {
    let dir = report
        .distribution_script
        .parent()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();

    print::fat_separator();
    print::aligned_line("Scripts", report.host_scripts.len().to_string());
    print::aligned_line("Output", dir.as_str());
    print::print_status(format!("The generated scripts are in {}", dir.bold()));
    print::print_status(format!(
        "Run \"{}\" to distribute them on all nodes",
        report.distribution_script.display().to_string().bold()
    ));
}
