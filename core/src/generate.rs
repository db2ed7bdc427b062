//! One generation run, from loaded models to written scripts.

use std::path::PathBuf;

use qosgen_common::config::{Config, DISTRIBUTION_SCRIPT};
use tracing::{Span, debug, info};

use crate::error::GenerateError;
use crate::inventory::Inventory;
use crate::output::ScriptSink;
use crate::plan::ScriptPlanGenerator;
use crate::policy::LatencyPolicy;
use crate::render::ScriptRenderer;
use crate::resolver::LatencyResolver;

/// Files produced by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub host_scripts: Vec<PathBuf>,
    pub distribution_script: PathBuf,
}

/// Plans, renders and writes every script.
///
/// All scripts are planned and rendered before the first one is written, so an
/// invalid inventory or policy never leaves partial output behind.
pub fn generate(
    inventory: &Inventory,
    policy: &LatencyPolicy,
    config: &Config,
    renderer: &dyn ScriptRenderer,
    sink: &dyn ScriptSink,
    span: Span,
) -> Result<Report, GenerateError> {
    let resolver = LatencyResolver::new(inventory, policy, span.clone());
    let generator = ScriptPlanGenerator::new(resolver, config, span.clone());

    let plan = generator.plan()?;
    info!(parent: &span, "Planned latency rules for {} hosts", plan.hosts.len());
    for (latency, mark) in policy.all_latency_marks().iter() {
        debug!(parent: &span, "Mark {mark} -> {latency}");
    }

    let mut rendered = Vec::with_capacity(plan.hosts.len() + 1);
    for bundle in &plan.hosts {
        let script = renderer.render_host(bundle)?;
        rendered.push((Config::host_script_name(&bundle.host), script));
    }
    let distribution = renderer.render_distribution(&plan.distribution)?;

    let mut host_scripts = Vec::with_capacity(rendered.len());
    for (name, script) in &rendered {
        host_scripts.push(write(sink, name, script)?);
    }
    let distribution_script = write(sink, DISTRIBUTION_SCRIPT, &distribution)?;
    info!(parent: &span, "Wrote {} scripts", host_scripts.len() + 1);

    Ok(Report {
        host_scripts,
        distribution_script,
    })
}

fn write(sink: &dyn ScriptSink, name: &str, script: &str) -> Result<PathBuf, GenerateError> {
    sink.write_script(name, script)
        .map_err(|source| GenerateError::Write {
            path: PathBuf::from(name),
            source,
        })
}
