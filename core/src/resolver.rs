//! Decides which latency applies between a host and a remote address.
//!
//! Precedence is strict: an inter-role rule beats an intra-role rule, which
//! beats the default.

use std::net::IpAddr;

use tracing::{Span, debug};

use crate::error::ResolveError;
use crate::inventory::Inventory;
use crate::policy::{Latency, LatencyPolicy, Mark};

/// The latency rule applying to one remote address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub latency: Latency,
    pub mark: Mark,
    /// Host the address was attributed to, if any.
    pub remote_host: Option<String>,
}

pub struct LatencyResolver<'a> {
    inventory: &'a Inventory,
    policy: &'a LatencyPolicy,
    span: Span,
}

impl<'a> LatencyResolver<'a> {
    pub fn new(inventory: &'a Inventory, policy: &'a LatencyPolicy, span: Span) -> Self {
        Self {
            inventory,
            policy,
            span,
        }
    }

    pub fn inventory(&self) -> &'a Inventory {
        self.inventory
    }

    pub fn policy(&self) -> &'a LatencyPolicy {
        self.policy
    }

    /// Latency `host` should apply to traffic sent to `ip`.
    ///
    /// Returns `None` when `ip` belongs to `host` itself or when no rule
    /// matches. Unknown addresses are not an error: they only pick up the
    /// default latency.
    pub fn resolve(&self, host: &str, ip: &IpAddr) -> Result<Option<Resolution>, ResolveError> {
        if self.inventory.host_ips(host)?.contains(ip) {
            return Ok(None);
        }

        let host_role = self.inventory.host_role(host)?;
        let remote_host = self.inventory.ip_to_host(ip)?;
        let remote_role = match remote_host {
            Some(remote) => self.inventory.host_role(remote)?,
            None => None,
        };

        let mut latency = self.policy.default_latency();

        if host_role == remote_role
            && let Some(role) = host_role
            && let Some(intra) = self.policy.intra_role_latency(role)
        {
            latency = Some(intra);
        }

        if let (Some(local), Some(remote)) = (host_role, remote_role)
            && let Some(inter) = self.policy.inter_role_latency(local, remote)?
        {
            latency = Some(inter);
        }

        debug!(
            parent: &self.span,
            "{host} ({}) -> {ip} on {} ({}): {}",
            host_role.unwrap_or("no role"),
            remote_host.unwrap_or("unknown host"),
            remote_role.unwrap_or("no role"),
            latency.map(Latency::as_str).unwrap_or("none"),
        );

        let Some(latency) = latency else {
            return Ok(None);
        };

        Ok(Some(Resolution {
            latency: latency.clone(),
            mark: self.policy.mark_for(latency)?,
            remote_host: remote_host.map(str::to_string),
        }))
    }
}
