//! # Script Rendering
//!
//! Turns planned bundles into shell scripts.
//!
//! Each host script builds one HTB class per mark with a `netem` delay below
//! it, binds the class to its mark with an `fw` filter and marks outgoing
//! packets per destination in a dedicated mangle chain:
//!
//! ```text
//! htb 1: ── 1:1  (default, unshaped)
//!        ├─ 1:a  ── netem a: delay 5ms     <- fw handle 10
//!        └─ 1:b  ── netem b: delay 20ms    <- fw handle 11
//! ```
//!
//! Class and qdisc ids are written in hex, as tc parses them; marks stay decimal.

use std::fmt::Write;
use std::net::IpAddr;

use qosgen_common::config::{Config, DISTRIBUTION_SCRIPT};

use crate::error::RenderError;
use crate::plan::{DistributionBundle, HostBundle};

const MANGLE_CHAIN: &str = "QOSGEN";
const CLASS_RATE: &str = "100gbit";
const SSH_OPTS: &str = "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null";

/// Produces script text from bundles.
pub trait ScriptRenderer: Sync {
    fn render_host(&self, bundle: &HostBundle) -> Result<String, RenderError>;
    fn render_distribution(&self, bundle: &DistributionBundle) -> Result<String, RenderError>;
}

/// Renders bash scripts driving `tc`, `iptables` and `ssh`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRenderer;

impl ScriptRenderer for ShellRenderer {
    fn render_host(&self, bundle: &HostBundle) -> Result<String, RenderError> {
        let mut out = String::new();
        write_host_script(&mut out, bundle).map_err(|source| RenderError {
            script: Config::host_script_name(&bundle.host),
            source,
        })?;
        Ok(out)
    }

    fn render_distribution(&self, bundle: &DistributionBundle) -> Result<String, RenderError> {
        let mut out = String::new();
        write_distribution_script(&mut out, bundle).map_err(|source| RenderError {
            script: DISTRIBUTION_SCRIPT.to_string(),
            source,
        })?;
        Ok(out)
    }
}

fn write_host_script(out: &mut String, bundle: &HostBundle) -> std::fmt::Result {
    writeln!(out, "#!/bin/bash")?;
    writeln!(out, "# Latency emulation for {}, generated by qosgen.", bundle.host)?;
    for (latency, mark) in bundle.marks.iter() {
        writeln!(out, "#   mark {mark}: {latency}")?;
    }
    if !bundle.other_hosts.is_empty() {
        writeln!(out, "# Peers: {}", bundle.other_hosts.join(" "))?;
    }
    writeln!(out, "set -eu")?;
    writeln!(out)?;
    writeln!(out, "OWN_IPS=\"{}\"", join(&bundle.own_ips))?;
    writeln!(out, "REMOTE_IPS=\"{}\"", join(&bundle.remote_ips))?;
    writeln!(out)?;
    writeln!(out, "interfaces() {{")?;
    writeln!(out, "    for addr in $OWN_IPS; do")?;
    writeln!(
        out,
        "        ip -o addr show | awk -v addr=\"$addr\" '{{ split($4, a, \"/\"); if (a[1] == addr) print $2 }}'"
    )?;
    writeln!(out, "    done | sort -u")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "for dev in $(interfaces); do")?;
    writeln!(out, "    tc qdisc del dev \"$dev\" root 2>/dev/null || true")?;
    writeln!(out, "    tc qdisc add dev \"$dev\" root handle 1: htb default 1")?;
    writeln!(out, "    tc class add dev \"$dev\" parent 1: classid 1:1 htb rate {CLASS_RATE}")?;
    for (latency, mark) in bundle.marks.iter() {
        writeln!(
            out,
            "    tc class add dev \"$dev\" parent 1: classid 1:{mark:x} htb rate {CLASS_RATE}"
        )?;
        writeln!(
            out,
            "    tc qdisc add dev \"$dev\" parent 1:{mark:x} handle {mark:x}: netem delay {latency}"
        )?;
        writeln!(
            out,
            "    tc filter add dev \"$dev\" parent 1: protocol all prio 1 handle {mark} fw flowid 1:{mark:x}"
        )?;
    }
    writeln!(out, "done")?;

    let families = [
        ("iptables", bundle.latencies.keys().any(IpAddr::is_ipv4)),
        ("ip6tables", bundle.latencies.keys().any(IpAddr::is_ipv6)),
    ];
    for (command, _) in families.iter().filter(|(_, used)| *used) {
        writeln!(out)?;
        writeln!(
            out,
            "{command} -t mangle -N {MANGLE_CHAIN} 2>/dev/null || {command} -t mangle -F {MANGLE_CHAIN}"
        )?;
        writeln!(
            out,
            "{command} -t mangle -C OUTPUT -j {MANGLE_CHAIN} 2>/dev/null || {command} -t mangle -A OUTPUT -j {MANGLE_CHAIN}"
        )?;
    }

    if !bundle.latencies.is_empty() {
        writeln!(out)?;
    }
    for (ip, resolution) in &bundle.latencies {
        let command = if ip.is_ipv6() { "ip6tables" } else { "iptables" };
        writeln!(
            out,
            "# {ip} ({}): {}",
            resolution.remote_host.as_deref().unwrap_or("unknown host"),
            resolution.latency
        )?;
        writeln!(
            out,
            "{command} -t mangle -A {MANGLE_CHAIN} -d {ip} -j MARK --set-mark {}",
            resolution.mark
        )?;
    }

    Ok(())
}

fn write_distribution_script(out: &mut String, bundle: &DistributionBundle) -> std::fmt::Result {
    writeln!(out, "#!/bin/bash")?;
    writeln!(out, "# Pushes and runs every latency emulation script, generated by qosgen.")?;
    writeln!(out, "set -eu")?;
    writeln!(out)?;
    let output_dir = bundle.output_dir.to_string_lossy();
    writeln!(out, "OUTPUT_DIR={}", shell_quote(&output_dir))?;
    writeln!(out, "DEFAULT_SSH_USER={}", shell_quote(&bundle.ssh_user))?;
    writeln!(out, "SSH_USER=\"${{SSH_USER:-$DEFAULT_SSH_USER}}\"")?;
    writeln!(out, "SSH_OPTS=\"{SSH_OPTS}\"")?;
    writeln!(out)?;
    writeln!(out, "push() {{")?;
    writeln!(out, "    local host=$1 addr=$2 scp_addr=$3")?;
    writeln!(out, "    echo \"Applying latency rules on $host ($addr)\"")?;
    writeln!(
        out,
        "    scp $SSH_OPTS \"$OUTPUT_DIR/$host-tc.sh\" \"$SSH_USER@$scp_addr:/tmp/$host-tc.sh\""
    )?;
    writeln!(out, "    ssh $SSH_OPTS \"$SSH_USER@$addr\" \"sudo bash /tmp/$host-tc.sh\"")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    for target in &bundle.targets {
        let host = shell_quote(&target.host);
        match target.address {
            Some(addr @ IpAddr::V4(_)) => writeln!(out, "push {host} {addr} {addr}")?,
            Some(addr @ IpAddr::V6(_)) => writeln!(out, "push {host} {addr} [{addr}]")?,
            None => writeln!(out, "# {}: no {} address, skipped", target.host, bundle.network)?,
        }
    }

    Ok(())
}

fn join(ips: &[IpAddr]) -> String {
    ips.iter()
        .map(IpAddr::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quotes `value` for bash unless it is made of safe characters only.
fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
