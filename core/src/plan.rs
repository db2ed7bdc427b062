//! # Script Planning
//!
//! Assembles the data each rendered script needs. Nothing here formats text:
//! a [`HostBundle`] describes one host's shaping rules and the
//! [`DistributionBundle`] describes how to reach every host.
//!
//! Hosts are planned independently of each other, so planning fans out over a
//! rayon pool. The models are only ever read.

use std::net::IpAddr;
use std::path::PathBuf;

use indexmap::{IndexMap, IndexSet};
use qosgen_common::config::Config;
use rayon::prelude::*;
use tracing::{Span, debug, warn};

use crate::error::{GenerateError, InventoryError, ResolveError};
use crate::inventory::Host;
use crate::policy::LatencyMarks;
use crate::resolver::{LatencyResolver, Resolution};

/// Hosts whose name starts with this prefix orchestrate the cluster and are never shaped.
pub const ADMIN_HOST_PREFIX: &str = "undercloud";

/// Everything needed to render one host's shaping script.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBundle {
    pub host: String,
    /// The host's own addresses, in network order.
    pub own_ips: Vec<IpAddr>,
    /// Addresses of every other host, followed by the VIPs.
    pub remote_ips: Vec<IpAddr>,
    /// Every other host of the inventory, by name.
    pub other_hosts: Vec<String>,
    /// Remote addresses with a latency rule, in `remote_ips` order.
    pub latencies: IndexMap<IpAddr, Resolution>,
    /// The full mark table, including marks no remote address uses.
    pub marks: LatencyMarks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTarget {
    pub host: String,
    /// Address on the distribution network, `None` if the host is not on it.
    pub address: Option<IpAddr>,
}

/// Everything needed to render the fleet-wide distribution script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionBundle {
    pub output_dir: PathBuf,
    pub ssh_user: String,
    pub network: String,
    pub targets: Vec<DistributionTarget>,
}

/// The complete, validated set of bundles for a run.
#[derive(Debug, Clone)]
pub struct Plan {
    pub hosts: Vec<HostBundle>,
    pub distribution: DistributionBundle,
}

pub struct ScriptPlanGenerator<'a> {
    resolver: LatencyResolver<'a>,
    config: &'a Config,
    span: Span,
}

impl<'a> ScriptPlanGenerator<'a> {
    pub fn new(resolver: LatencyResolver<'a>, config: &'a Config, span: Span) -> Self {
        Self {
            resolver,
            config,
            span,
        }
    }

    /// Hosts that get a shaping script.
    ///
    /// Administrative hosts are skipped, and so are hosts without networks
    /// since they have no address to shape traffic from.
    pub fn eligible_hosts(&self) -> Vec<&'a Host> {
        let mut hosts: Vec<&Host> = self
            .resolver
            .inventory()
            .host_records()
            .filter(|host| {
                let eligible = !host.name.starts_with(ADMIN_HOST_PREFIX) && host.has_networks();
                if !eligible {
                    debug!(parent: &self.span, "Skipping {}", host.name);
                }
                eligible
            })
            .collect();
        hosts.sort_by(|a, b| a.name.cmp(&b.name));
        hosts
    }

    /// Validates both models, then plans every host.
    ///
    /// Any ambiguity in the inventory or the policy surfaces here, before a
    /// single script is rendered or written.
    pub fn plan(&self) -> Result<Plan, GenerateError> {
        let inventory = self.resolver.inventory();
        inventory.validate()?;
        for (first, second) in inventory.role_connections() {
            self.resolver.policy().inter_role_latency(first, second)?;
        }

        let eligible = self.eligible_hosts();
        let plan_all = || -> Result<Vec<HostBundle>, ResolveError> {
            eligible
                .par_iter()
                .map(|host| self.host_bundle(host))
                .collect()
        };

        let hosts = if self.config.jobs > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.jobs)
                .build()?
                .install(plan_all)?
        } else {
            plan_all()?
        };

        Ok(Plan {
            hosts,
            distribution: self.distribution_bundle()?,
        })
    }

    pub fn host_bundle(&self, host: &Host) -> Result<HostBundle, ResolveError> {
        let inventory = self.resolver.inventory();

        let mut other_hosts: Vec<&Host> = inventory
            .host_records()
            .filter(|other| other.name != host.name)
            .collect();
        other_hosts.sort_by(|a, b| a.name.cmp(&b.name));

        let mut remote_ips: IndexSet<IpAddr> = IndexSet::new();
        for remote in &other_hosts {
            let ips: Vec<IpAddr> = remote.addresses().collect();
            if !ips.is_empty() {
                debug!(
                    parent: &self.span,
                    "{}: adding {} addresses of {}",
                    host.name,
                    ips.len(),
                    remote.name
                );
            }
            remote_ips.extend(ips);
        }
        let vips = inventory.all_vips();
        debug!(parent: &self.span, "{}: adding VIPs {vips:?}", host.name);
        remote_ips.extend(vips.iter().copied());

        let mut latencies = IndexMap::new();
        for ip in &remote_ips {
            if let Some(resolution) = self.resolver.resolve(&host.name, ip)? {
                latencies.insert(*ip, resolution);
            }
        }

        debug!(
            parent: &self.span,
            "{}: {} remote addresses, {} shaped",
            host.name,
            remote_ips.len(),
            latencies.len()
        );

        Ok(HostBundle {
            host: host.name.clone(),
            own_ips: host.addresses().collect(),
            remote_ips: remote_ips.into_iter().collect(),
            other_hosts: other_hosts
                .iter()
                .map(|other| other.name.clone())
                .collect(),
            latencies,
            marks: self.resolver.policy().all_latency_marks().clone(),
        })
    }

    pub fn distribution_bundle(&self) -> Result<DistributionBundle, InventoryError> {
        let inventory = self.resolver.inventory();
        let network = &self.config.distribution_network;

        let targets = self
            .eligible_hosts()
            .into_iter()
            .map(|host| -> Result<_, InventoryError> {
                let address = inventory.host_ip_on_network(&host.name, network)?;
                if address.is_none() {
                    warn!(
                        parent: &self.span,
                        "{} has no {network} address and will not be distributed to",
                        host.name
                    );
                }
                Ok(DistributionTarget {
                    host: host.name.clone(),
                    address,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DistributionBundle {
            output_dir: self.config.output_dir.clone(),
            ssh_user: self.config.ssh_user.clone(),
            network: network.clone(),
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use crate::inventory::Inventory;
    use crate::inventory::tests::{INVENTORY, inventory};
    use crate::policy::LatencyPolicy;
    use crate::policy::tests::{POLICY, policy};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn generator<'a>(
        inv: &'a Inventory,
        pol: &'a LatencyPolicy,
        cfg: &'a Config,
    ) -> ScriptPlanGenerator<'a> {
        let resolver = LatencyResolver::new(inv, pol, Span::none());
        ScriptPlanGenerator::new(resolver, cfg, Span::none())
    }

    fn target(host: &str, address: Option<&str>) -> DistributionTarget {
        DistributionTarget {
            host: host.to_string(),
            address: address.map(ip),
        }
    }

    #[test]
    fn eligible_hosts_skip_admin_and_unnetworked() {
        let text = r#"
undercloud-0:
  hosts: { undercloud-0: {} }
  vars: { enabled_networks: [ctlplane], ctlplane_ip: 192.168.24.1 }
Undercloud:
  hosts: { undercloud: {} }
ctrl1:
  hosts: { ctrl1: {} }
  vars: { enabled_networks: [ctlplane], ctlplane_ip: 192.168.24.10 }
"#;
        let inv = inventory(text);
        let pol = policy(POLICY);
        let cfg = Config::new("/tmp/out");
        let generator = generator(&inv, &pol, &cfg);

        let names: Vec<&str> = generator
            .eligible_hosts()
            .iter()
            .map(|host| host.name.as_str())
            .collect();
        assert_eq!(names, vec!["ctrl1"]);
    }

    #[test]
    fn host_bundle_lists_remote_and_own_addresses() {
        let inv = inventory(INVENTORY);
        let pol = policy(POLICY);
        let cfg = Config::new("/tmp/out");
        let generator = generator(&inv, &pol, &cfg);

        let bundle = generator.host_bundle(inv.host("ctrl1").unwrap()).unwrap();
        assert_eq!(bundle.own_ips, vec![ip("192.168.24.10"), ip("172.16.2.10")]);
        assert_eq!(
            bundle.remote_ips,
            vec![
                ip("192.168.24.20"),
                ip("172.16.2.20"),
                ip("192.168.24.11"),
                ip("172.16.2.11"),
                ip("192.168.24.5"),
                ip("172.16.2.5"),
            ]
        );
        assert_eq!(bundle.other_hosts, vec!["Undercloud", "comp1", "ctrl2"]);
        assert_eq!(bundle.marks.len(), 3);

        let to_compute = &bundle.latencies[&ip("172.16.2.20")];
        assert_eq!(to_compute.latency.as_str(), "100ms");
        assert_eq!(to_compute.remote_host.as_deref(), Some("comp1"));
        let to_peer = &bundle.latencies[&ip("192.168.24.11")];
        assert_eq!(to_peer.latency.as_str(), "20ms");
        assert_eq!(bundle.latencies.len(), 6);
    }

    #[test]
    fn plan_covers_eligible_hosts() {
        let inv = inventory(INVENTORY);
        let pol = policy(POLICY);
        let mut cfg = Config::new("/tmp/out");
        cfg.jobs = 2;
        let generator = generator(&inv, &pol, &cfg);

        let plan = generator.plan().unwrap();
        let hosts: Vec<&str> = plan
            .hosts
            .iter()
            .map(|bundle| bundle.host.as_str())
            .collect();
        assert_eq!(hosts, vec!["comp1", "ctrl1", "ctrl2"]);

        assert_eq!(plan.distribution.network, "ctlplane");
        assert_eq!(
            plan.distribution.targets,
            vec![
                target("comp1", Some("192.168.24.20")),
                target("ctrl1", Some("192.168.24.10")),
                target("ctrl2", Some("192.168.24.11")),
            ]
        );
    }

    #[test]
    fn distribution_tolerates_hosts_off_network() {
        let inv = inventory(INVENTORY);
        let pol = policy(POLICY);
        let mut cfg = Config::new("/tmp/out");
        cfg.distribution_network = "storage".to_string();
        let generator = generator(&inv, &pol, &cfg);

        let bundle = generator.distribution_bundle().unwrap();
        assert!(bundle.targets.iter().all(|target| target.address.is_none()));
    }

    #[test]
    fn unused_role_pair_conflict_fails_the_plan() {
        let text = r#"
Controller:
  children: { ctrl1: {} }
  vars: { role_name: Controller }
CephStorage:
  children: {}
  vars: { role_name: CephStorage }
ctrl1:
  hosts: { ctrl1: {} }
  vars: { enabled_networks: [ctlplane], ctlplane_ip: 192.168.24.10 }
"#;
        let inv = inventory(text);
        let pol = policy(
            r#"
InterRoleLatency:
  Controller_CephStorage: 100ms
  CephStorage_Controller: 100ms
"#,
        );
        let cfg = Config::new("/tmp/out");
        let generator = generator(&inv, &pol, &cfg);

        assert!(matches!(
            generator.plan(),
            Err(GenerateError::Policy(PolicyError::ConflictingInterRole { .. }))
        ));
    }
}
