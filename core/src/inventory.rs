//! # Inventory Model
//!
//! Turns an Ansible-style cluster inventory into validated host and role records.
//!
//! The inventory is a mapping of group name to group. A group can carry:
//! * `vars`: arbitrary variables, notably `role_name`, `enabled_networks` and `<network>_ip`.
//! * `hosts`: a mapping with exactly one entry, which makes the group a **host**.
//! * `children`: member group names, which together with `role_name` make the group a **role**.
//!
//! The special `overcloud` group declares the virtual IPs in its `vars`.
//!
//! Hosts are identified by their group name throughout this crate.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{Span, debug};

use crate::error::InventoryError;

/// Role the virtual IPs are attributed to.
pub const CONTROLLER_ROLE: &str = "Controller";

/// Group whose variables declare the virtual IPs.
pub const VIP_GROUP: &str = "overcloud";

const ROLE_NAME_VAR: &str = "role_name";
const ENABLED_NETWORKS_VAR: &str = "enabled_networks";

#[derive(Debug, Default, Deserialize)]
struct RawGroup {
    #[serde(default)]
    vars: Option<IndexMap<String, Value>>,
    #[serde(default)]
    hosts: Option<IndexMap<String, Value>>,
    #[serde(default)]
    children: Option<IndexMap<String, Value>>,
}

/// A single machine of the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Name of the group declaring the host.
    pub name: String,
    /// The one member listed under the group's `hosts`.
    pub hostname: String,
    /// Address per enabled network, in `enabled_networks` order.
    pub networks: IndexMap<String, IpAddr>,
}

impl Host {
    /// Every address of the host, across all enabled networks.
    pub fn ips(&self) -> BTreeSet<IpAddr> {
        self.networks.values().copied().collect()
    }

    /// Addresses in network declaration order, without repeats.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        let mut seen = BTreeSet::new();
        self.networks
            .values()
            .copied()
            .filter(move |ip| seen.insert(*ip))
    }

    pub fn ip_on_network(&self, network: &str) -> Option<IpAddr> {
        self.networks.get(network).copied()
    }

    /// Hosts without `enabled_networks` (the undercloud, usually) have no addresses.
    pub fn has_networks(&self) -> bool {
        !self.networks.is_empty()
    }
}

/// A group of hosts sharing a `role_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub role_name: String,
    /// Member group names, in declaration order.
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Inventory {
    hosts: IndexMap<String, Host>,
    roles: IndexMap<String, Role>,
    vips: Vec<IpAddr>,
    span: Span,
}

impl Inventory {
    /// Builds the model from a parsed inventory document.
    ///
    /// Host groups and their addresses are validated here. Ambiguities spanning
    /// several groups (shared addresses, hosts in several roles) are reported by
    /// the queries that trip over them, or up front by [`Inventory::validate`].
    pub fn from_value(value: Value, span: Span) -> Result<Self, InventoryError> {
        let groups: IndexMap<String, Option<RawGroup>> = serde_yaml::from_value(value)?;

        let mut hosts = IndexMap::new();
        let mut roles = IndexMap::new();
        let mut vips = Vec::new();

        for (name, group) in groups {
            let group = group.unwrap_or_default();
            let vars = group.vars.unwrap_or_default();

            if name == VIP_GROUP {
                vips = parse_vips(&vars, &span);
            }

            if let Some(role_name) = vars.get(ROLE_NAME_VAR) {
                let role = parse_role(&name, role_name, group.children.as_ref())?;
                roles.insert(name.clone(), role);
            }

            if let Some(members) = &group.hosts {
                let host = parse_host(&name, members, &vars)?;
                hosts.insert(name, host);
            }
        }

        debug!(
            parent: &span,
            "Inventory has {} hosts, {} roles and {} VIPs",
            hosts.len(),
            roles.len(),
            vips.len()
        );

        Ok(Self {
            hosts,
            roles,
            vips,
            span,
        })
    }

    /// Checks every cross-group invariant, so that an ambiguous inventory is
    /// rejected before anything is generated from it.
    pub fn validate(&self) -> Result<(), InventoryError> {
        for role in self.roles.values() {
            self.role_hosts(&role.name)?;
        }
        for host in self.hosts.keys() {
            self.host_role(host)?;
        }

        let mut owners: BTreeMap<IpAddr, Vec<String>> = BTreeMap::new();
        for host in self.hosts.values() {
            for ip in host.ips() {
                owners.entry(ip).or_default().push(host.name.clone());
            }
        }
        if let Some((ip, hosts)) = owners.into_iter().find(|(_, hosts)| hosts.len() > 1) {
            return Err(InventoryError::DuplicateAddress { ip, hosts });
        }

        Ok(())
    }

    /// Names of the groups declaring a `role_name`.
    pub fn roles(&self) -> Vec<&str> {
        self.roles.keys().map(String::as_str).collect()
    }

    pub fn role(&self, role: &str) -> Result<&Role, InventoryError> {
        self.roles
            .get(role)
            .ok_or_else(|| InventoryError::UnknownRole(role.to_string()))
    }

    /// Host group name to the host it declares.
    pub fn hosts(&self) -> IndexMap<&str, &str> {
        self.hosts
            .values()
            .map(|host| (host.name.as_str(), host.hostname.as_str()))
            .collect()
    }

    pub fn host(&self, host: &str) -> Result<&Host, InventoryError> {
        self.hosts
            .get(host)
            .ok_or_else(|| InventoryError::UnknownHost(host.to_string()))
    }

    /// Host records in declaration order.
    pub fn host_records(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Every address of `host`; empty when it enables no networks.
    pub fn host_ips(&self, host: &str) -> Result<BTreeSet<IpAddr>, InventoryError> {
        Ok(self.host(host)?.ips())
    }

    pub fn host_ip_on_network(
        &self,
        host: &str,
        network: &str,
    ) -> Result<Option<IpAddr>, InventoryError> {
        Ok(self.host(host)?.ip_on_network(network))
    }

    pub fn all_vips(&self) -> &[IpAddr] {
        &self.vips
    }

    pub fn is_vip(&self, ip: &IpAddr) -> bool {
        self.vips.contains(ip)
    }

    /// Finds the host owning `ip`.
    ///
    /// VIPs float between controllers, so they are always attributed to the
    /// alphabetically first host of the Controller role. This is a heuristic:
    /// the VIP may live on another controller at any given time.
    pub fn ip_to_host(&self, ip: &IpAddr) -> Result<Option<&str>, InventoryError> {
        if self.is_vip(ip) {
            return self.first_controller();
        }

        let owners: Vec<&Host> = self
            .hosts
            .values()
            .filter(|host| host.networks.values().any(|owned| owned == ip))
            .collect();

        match owners.as_slice() {
            [] => Ok(None),
            [host] => Ok(Some(host.name.as_str())),
            _ => Err(InventoryError::DuplicateAddress {
                ip: *ip,
                hosts: owners.iter().map(|host| host.name.clone()).collect(),
            }),
        }
    }

    /// Member hosts of `role`, in declaration order.
    pub fn role_hosts(&self, role: &str) -> Result<Vec<&Host>, InventoryError> {
        let role = self.role(role)?;
        role.members
            .iter()
            .map(|member| {
                self.hosts
                    .get(member)
                    .ok_or_else(|| InventoryError::UnknownRoleMember {
                        role: role.name.clone(),
                        member: member.clone(),
                    })
            })
            .collect()
    }

    /// The role listing `host` as a member, if any.
    pub fn host_role(&self, host: &str) -> Result<Option<&str>, InventoryError> {
        let roles: Vec<&str> = self
            .roles
            .values()
            .filter(|role| role.members.iter().any(|member| member == host))
            .map(|role| role.name.as_str())
            .collect();

        match roles.as_slice() {
            [] => Ok(None),
            [role] => Ok(Some(*role)),
            _ => Err(InventoryError::MultipleRoles {
                host: host.to_string(),
                roles: roles.iter().map(|role| role.to_string()).collect(),
            }),
        }
    }

    /// Role owning `ip`. VIPs always belong to the Controller role.
    pub fn ip_to_role(&self, ip: &IpAddr) -> Result<Option<&str>, InventoryError> {
        if self.is_vip(ip) {
            return Ok(Some(CONTROLLER_ROLE));
        }
        match self.ip_to_host(ip)? {
            Some(host) => self.host_role(host),
            None => Ok(None),
        }
    }

    /// Every unordered pair of distinct roles.
    pub fn role_connections(&self) -> Vec<(&str, &str)> {
        let roles = self.roles();
        let mut pairs = Vec::new();
        for (idx, first) in roles.iter().enumerate() {
            for second in &roles[idx + 1..] {
                pairs.push((*first, *second));
            }
        }
        pairs
    }

    fn first_controller(&self) -> Result<Option<&str>, InventoryError> {
        if !self.roles.contains_key(CONTROLLER_ROLE) {
            debug!(parent: &self.span, "No {CONTROLLER_ROLE} role to attribute VIPs to");
            return Ok(None);
        }
        let first = self
            .role_hosts(CONTROLLER_ROLE)?
            .into_iter()
            .map(|host| host.name.as_str())
            .min();
        Ok(first)
    }
}

fn parse_role(
    group: &str,
    role_name: &Value,
    children: Option<&IndexMap<String, Value>>,
) -> Result<Role, InventoryError> {
    let role_name = scalar_to_string(role_name).ok_or_else(|| InventoryError::InvalidVar {
        group: group.to_string(),
        key: ROLE_NAME_VAR.to_string(),
        reason: "expected a string".to_string(),
    })?;
    let members = children
        .map(|children| children.keys().cloned().collect())
        .unwrap_or_default();

    Ok(Role {
        name: group.to_string(),
        role_name,
        members,
    })
}

fn parse_host(
    group: &str,
    members: &IndexMap<String, Value>,
    vars: &IndexMap<String, Value>,
) -> Result<Host, InventoryError> {
    let hostname = match members.keys().collect::<Vec<_>>().as_slice() {
        [hostname] => hostname.to_string(),
        _ => {
            return Err(InventoryError::AmbiguousHostGroup {
                group: group.to_string(),
                count: members.len(),
            });
        }
    };

    let mut networks = IndexMap::new();
    for network in enabled_networks(group, vars)? {
        let key = format!("{network}_ip");
        let value = vars
            .get(&key)
            .ok_or_else(|| InventoryError::MissingNetworkAddress {
                host: group.to_string(),
                network: network.clone(),
            })?;
        let ip = parse_address(group, &key, value)?;
        networks.insert(network, ip);
    }

    Ok(Host {
        name: group.to_string(),
        hostname,
        networks,
    })
}

fn enabled_networks(
    group: &str,
    vars: &IndexMap<String, Value>,
) -> Result<Vec<String>, InventoryError> {
    let invalid = |reason: &str| InventoryError::InvalidVar {
        group: group.to_string(),
        key: ENABLED_NETWORKS_VAR.to_string(),
        reason: reason.to_string(),
    };

    match vars.get(ENABLED_NETWORKS_VAR) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(networks)) => networks
            .iter()
            .map(|network| {
                scalar_to_string(network).ok_or_else(|| invalid("expected network names"))
            })
            .collect(),
        Some(_) => Err(invalid("expected a list")),
    }
}

fn parse_address(group: &str, key: &str, value: &Value) -> Result<IpAddr, InventoryError> {
    let invalid = || InventoryError::InvalidAddress {
        group: group.to_string(),
        key: key.to_string(),
        value: format!("{value:?}"),
    };
    value
        .as_str()
        .ok_or_else(invalid)?
        .trim()
        .parse()
        .map_err(|_| invalid())
}

/// Every `overcloud` variable holding an address is a VIP.
fn parse_vips(vars: &IndexMap<String, Value>, span: &Span) -> Vec<IpAddr> {
    vars.iter()
        .filter_map(|(name, value)| {
            let vip = value.as_str().and_then(|s| s.trim().parse::<IpAddr>().ok());
            if vip.is_none() {
                debug!(parent: span, "Ignoring {VIP_GROUP} var {name}, not an address");
            }
            vip
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
