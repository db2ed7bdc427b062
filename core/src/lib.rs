//! # qosgen core
//!
//! Derives per-host latency emulation rules from a cluster inventory and a
//! latency policy.
//!
//! * **[`inventory`]**: hosts, roles, their addresses and the VIPs.
//! * **[`policy`]**: default, intra-role and inter-role latencies, and the mark table.
//! * **[`resolver`]**: which latency a host applies to a given remote address.
//! * **[`plan`]**: the per-host and fleet-wide data handed to the renderer.
//! * **[`render`]** and **[`output`]**: turning plans into executable scripts.

pub mod error;
pub mod generate;
pub mod inventory;
pub mod output;
pub mod plan;
pub mod policy;
pub mod render;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use error::{GenerateError, InventoryError, PolicyError, ResolveError};
pub use generate::{Report, generate};
pub use inventory::Inventory;
pub use policy::LatencyPolicy;
