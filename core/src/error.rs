use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// The inventory is structurally invalid or ambiguous.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory does not have the expected group layout")]
    Structure(#[from] serde_yaml::Error),
    #[error("group {group} declares {count} hosts, expected exactly one")]
    AmbiguousHostGroup { group: String, count: usize },
    #[error("{ip} is claimed by multiple hosts: {}", .hosts.join(", "))]
    DuplicateAddress { ip: IpAddr, hosts: Vec<String> },
    #[error("host {host} is a member of multiple roles: {}", .roles.join(", "))]
    MultipleRoles { host: String, roles: Vec<String> },
    #[error("unknown host {0}")]
    UnknownHost(String),
    #[error("unknown role {0}")]
    UnknownRole(String),
    #[error("role {role} lists {member}, which is not a host group")]
    UnknownRoleMember { role: String, member: String },
    #[error("host {host} enables network {network} but declares no {network}_ip")]
    MissingNetworkAddress { host: String, network: String },
    #[error("{group}: {key} is not a valid address: {value}")]
    InvalidAddress {
        group: String,
        key: String,
        value: String,
    },
    #[error("{group}: invalid {key}: {reason}")]
    InvalidVar {
        group: String,
        key: String,
        reason: String,
    },
}

/// The latency policy is invalid, or a lookup broke one of its invariants.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("latency policy does not have the expected layout")]
    Structure(#[from] serde_yaml::Error),
    #[error("inter-role latency is declared as both {forward} and {reverse}")]
    ConflictingInterRole { forward: String, reverse: String },
    #[error("latency {0} has no mark assigned")]
    UnregisteredLatency(String),
    #[error("{key}: invalid latency {value:?}")]
    InvalidLatency { key: String, value: String },
}

/// A failed `(host, ip)` resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Error)]
#[error("failed to render {script}")]
pub struct RenderError {
    pub script: String,
    #[source]
    pub source: std::fmt::Error,
}

/// Everything that can abort a generation run.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start planning workers")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

impl From<ResolveError> for GenerateError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Inventory(err) => Self::Inventory(err),
            ResolveError::Policy(err) => Self::Policy(err),
        }
    }
}
