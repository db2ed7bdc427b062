use std::path::PathBuf;

/// Network whose address is used to reach a host when distributing scripts.
pub const DEFAULT_DISTRIBUTION_NETWORK: &str = "ctlplane";

/// Remote user the distribution script logs in as.
pub const DEFAULT_SSH_USER: &str = "heat-admin";

/// Name of the fleet-wide script that pushes and runs every host script.
pub const DISTRIBUTION_SCRIPT: &str = "distribute-tc-scripts.sh";

/// Settings for a single generation run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the scripts are written to. Created if missing.
    pub output_dir: PathBuf,
    /// User the distribution script connects as.
    pub ssh_user: String,
    /// Network whose per-host address the distribution script targets.
    pub distribution_network: String,
    /// Worker threads used to plan hosts.
    ///
    /// `0` lets rayon pick based on the available cores.
    pub jobs: usize,
}

impl Config {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ssh_user: DEFAULT_SSH_USER.to_string(),
            distribution_network: DEFAULT_DISTRIBUTION_NETWORK.to_string(),
            jobs: 0,
        }
    }

    /// File name of the shaping script generated for `host`.
    pub fn host_script_name(host: &str) -> String {
        format!("{host}-tc.sh")
    }
}
