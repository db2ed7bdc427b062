pub mod generate;

use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use qosgen_common::config::{Config, DEFAULT_DISTRIBUTION_NETWORK, DEFAULT_SSH_USER};

pub const SAMPLE_LATENCY: &str = "\
DefaultLatency: 5ms
IntraRoleLatency:
  Controller: 20ms
  Compute: 10ms
InterRoleLatency:
  Controller_Compute: 100ms
  Compute_CephStorage: 100ms
  Controller_CephStorage: 100ms";

#[derive(Parser, Debug)]
#[command(name = "qosgen")]
#[command(about = "Generates tc scripts emulating inter-host latency in a cluster.")]
#[command(after_help = format!("Example latency file:\n\n{SAMPLE_LATENCY}"))]
pub struct CommandLine {
    /// Ansible inventory describing hosts, roles and networks
    pub inventory: PathBuf,

    /// YAML file describing the latencies to emulate
    pub latency: PathBuf,

    /// Directory the scripts are written to
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// User the distribution script logs in as
    #[arg(long, default_value = DEFAULT_SSH_USER)]
    pub ssh_user: String,

    /// Network used to reach each host when distributing scripts
    #[arg(long, default_value = DEFAULT_DISTRIBUTION_NETWORK)]
    pub network: String,

    /// Worker threads used to plan hosts, 0 picks one per core
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Printed after a usage error.
pub fn usage_guidance() -> String {
    format!(
        "\nPass an inventory file and a YAML file describing latencies. For example:\n  \
         qosgen example-cloud.yaml example-latencies.yaml\n\n{SAMPLE_LATENCY}\n"
    )
}

fn is_usage_error(kind: ErrorKind) -> bool {
    !matches!(kind, ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

impl CommandLine {
    /// Parses the process arguments, printing usage and an example latency
    /// file before exiting with status 1 when they are wrong.
    pub fn parse_args() -> Self {
        match Self::try_parse() {
            Ok(commands) => commands,
            Err(err) if !is_usage_error(err.kind()) => err.exit(),
            Err(err) => {
                let _ = err.print();
                eprint!("{}", usage_guidance());
                std::process::exit(1);
            }
        }
    }

    pub fn to_config(&self) -> std::io::Result<Config> {
        let mut cfg = Config::new(std::path::absolute(&self.output_dir)?);
        cfg.ssh_user = self.ssh_user.clone();
        cfg.distribution_network = self.network.clone();
        cfg.jobs = self.jobs;
        Ok(cfg)
    }
}
