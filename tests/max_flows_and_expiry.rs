//! A shard at its flow cap drops new flows rather than evicting an existing
//! one, and the scan cycle only detaches flows that have actually gone
//! idle (spec §4.4/§4.5).

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use flowprobe::fingerprint::Fingerprint;
use flowprobe::flow::shard::LookupOutcome;
use flowprobe::flow::{scanner, ExpiryReason, Shard};

fn fp(src_port: u16) -> Fingerprint {
    Fingerprint {
        vlan_id: 0,
        src_addr: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)),
        dst_addr: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
        protocol: 17,
        src_port,
        dst_port: 53,
        tos: 0,
        input_if: 1,
        tunnel_id: 0,
    }
}

#[test]
fn shard_at_capacity_drops_new_flows_not_existing_ones() {
    let shard = Shard::new(8, 2);
    let now = Instant::now();
    for port in [1, 2] {
        let outcome = shard.lookup_or_insert(fp(port), 100, 0, now, false, b"", |_| {}, |_, _| {});
        assert!(matches!(outcome, LookupOutcome::Created));
    }
    let outcome = shard.lookup_or_insert(fp(3), 100, 0, now, false, b"", |_| {}, |_, _| {});
    assert!(matches!(outcome, LookupOutcome::DroppedMaxFlows));
    assert_eq!(shard.active_flows(), 2);

    // Existing flows still accept updates even while the shard is full.
    let outcome = shard.lookup_or_insert(fp(1), 50, 0, now, false, b"", |_| {}, |_, _| {});
    assert!(matches!(outcome, LookupOutcome::Updated));
}

#[test]
fn scan_cycle_only_expires_idle_flows() {
    let shard = Shard::new(8, 100);
    let t0 = Instant::now();
    shard.lookup_or_insert(fp(1), 100, 0, t0, false, b"", |_| {}, |_, _| {});
    shard.lookup_or_insert(fp(2), 100, 0, t0, false, b"", |_| {}, |_, _| {});

    let cfg = scanner::ScanConfig {
        scan_interval: Duration::from_secs(1),
        idle_timeout: Duration::from_secs(5),
        lifetime_timeout: Duration::from_secs(3600),
    };

    // Touch port 2 again just before the idle window closes.
    let touch = t0 + Duration::from_secs(3);
    shard.lookup_or_insert(fp(2), 20, 0, touch, false, b"", |_| {}, |_, _| {});

    let scan_time = t0 + Duration::from_secs(6);
    let expired = scanner::scan_once(std::slice::from_ref(&shard), scan_time, &cfg);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].1, ExpiryReason::Idle);
    assert_eq!(expired[0].0.fingerprint.src_port, 1);
    assert_eq!(shard.active_flows(), 1);
}
