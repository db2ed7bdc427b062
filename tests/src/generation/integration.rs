use std::net::IpAddr;

use qosgen_common::config::Config;
use qosgen_common::document::parse_document;
use qosgen_core::output::DirectorySink;
use qosgen_core::render::ShellRenderer;
use qosgen_core::resolver::LatencyResolver;
use qosgen_core::{GenerateError, LatencyPolicy, PolicyError, generate};
use tracing::Span;

use crate::fixtures;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn read(tmp: &tempfile::TempDir, name: &str) -> String {
    std::fs::read_to_string(tmp.path().join("output").join(name)).unwrap()
}

/// Runs a full generation into a fresh temporary directory.
fn run(policy: &LatencyPolicy) -> (tempfile::TempDir, Result<qosgen_core::Report, GenerateError>) {
    let inventory = fixtures::inventory().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config::new(tmp.path().join("output"));
    let sink = DirectorySink::create(&cfg.output_dir, Span::none()).unwrap();

    let report = generate(&inventory, policy, &cfg, &ShellRenderer, &sink, Span::none());
    (tmp, report)
}

#[test]
fn generates_a_script_per_overcloud_host() {
    let policy = fixtures::policy().unwrap();
    let (tmp, report) = run(&policy);
    let report = report.expect("generation should succeed");
    let output = tmp.path().join("output");

    let mut written: Vec<String> = std::fs::read_dir(&output)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    written.sort();

    assert_eq!(
        written,
        vec![
            "distribute-tc-scripts.sh",
            "overcloud-cephstorage-0-tc.sh",
            "overcloud-controller-0-tc.sh",
            "overcloud-controller-1-tc.sh",
            "overcloud-novacompute-0-tc.sh",
        ]
    );
    assert_eq!(report.host_scripts.len(), 4);
    assert_eq!(report.distribution_script, output.join("distribute-tc-scripts.sh"));
}

#[cfg(unix)]
#[test]
fn scripts_are_executable() {
    use std::os::unix::fs::PermissionsExt;

    let policy = fixtures::policy().unwrap();
    let (_tmp, report) = run(&policy);
    let report = report.unwrap();

    for path in report.host_scripts.iter().chain([&report.distribution_script]) {
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "{} is not executable", path.display());
    }
}

#[test]
fn controller_script_applies_role_latencies() {
    let policy = fixtures::policy().unwrap();
    let (tmp, report) = run(&policy);
    report.unwrap();

    let script = read(&tmp, "overcloud-controller-0-tc.sh");

    // Every mark gets a class, used or not.
    for handle in ["a:", "b:", "c:", "d:", "e:"] {
        assert!(script.contains(&format!("handle {handle} netem delay")), "missing {handle}");
    }
    // Peer controller: intra-role 20ms.
    assert!(script.contains("-d 172.16.2.11 -j MARK --set-mark 11"));
    // Compute: inter-role 100ms.
    assert!(script.contains("-d 172.16.2.20 -j MARK --set-mark 13"));
    // Ceph: inter-role 40ms.
    assert!(script.contains("-d 172.16.3.30 -j MARK --set-mark 14"));
    // VIPs are attributed to controller-0 itself, hence intra-role.
    assert!(script.contains("-d 172.16.2.5 -j MARK --set-mark 11"));
    // Own addresses are never shaped.
    assert!(!script.contains("-d 172.16.2.10 "));
}

#[test]
fn compute_script_treats_vips_as_controller() {
    let policy = fixtures::policy().unwrap();
    let (tmp, report) = run(&policy);
    report.unwrap();

    let script = read(&tmp, "overcloud-novacompute-0-tc.sh");
    assert!(script.contains("# 192.168.24.5 (overcloud-controller-0): 100ms"));
    assert!(script.contains("-d 172.16.1.30 -j MARK --set-mark 13"));
}

#[test]
fn distribution_script_targets_ctlplane() {
    let policy = fixtures::policy().unwrap();
    let (tmp, report) = run(&policy);
    report.unwrap();

    let script = read(&tmp, "distribute-tc-scripts.sh");
    assert!(script.contains("push overcloud-controller-0 192.168.24.10 192.168.24.10"));
    assert!(script.contains("push overcloud-cephstorage-0 192.168.24.30 192.168.24.30"));
    assert!(!script.contains("undercloud"));
}

#[test]
fn conflicting_policy_writes_nothing() {
    let policy = LatencyPolicy::from_value(
        parse_document(
            r#"
DefaultLatency: 5ms
InterRoleLatency:
  Controller_CephStorage: 40ms
  CephStorage_Controller: 50ms
"#,
        )
        .unwrap(),
    )
    .unwrap();
    let (tmp, report) = run(&policy);

    assert!(matches!(
        report,
        Err(GenerateError::Policy(PolicyError::ConflictingInterRole { .. }))
    ));
    let entries = std::fs::read_dir(tmp.path().join("output")).unwrap().count();
    assert_eq!(entries, 0);
}

#[test]
fn resolves_the_fixture_scenario() {
    let inventory = fixtures::inventory().unwrap();
    let policy = fixtures::policy().unwrap();
    let resolver = LatencyResolver::new(&inventory, &policy, Span::none());

    let peer = resolver
        .resolve("overcloud-controller-0", &ip("192.168.24.11"))
        .unwrap()
        .unwrap();
    assert_eq!(peer.latency.as_str(), "20ms");
    assert_eq!(peer.remote_host.as_deref(), Some("overcloud-controller-1"));

    let compute = resolver
        .resolve("overcloud-controller-0", &ip("192.168.24.20"))
        .unwrap()
        .unwrap();
    assert_eq!(compute.latency.as_str(), "100ms");
    assert_eq!(compute.mark, policy.mark_for(&compute.latency).unwrap());

    assert!(resolver
        .resolve("overcloud-novacompute-0", &ip("192.168.24.20"))
        .unwrap()
        .is_none());
}
