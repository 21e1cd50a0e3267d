//! The scan/expiry engine (spec §4.5), grounded in the original probe's
//! `hashWalker`/`msecSleep` scan-cycle loop: wake on a fixed interval, walk
//! every shard once, hand expired records to the exporter, sleep again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::flow::record::{ExpiryReason, FlowRecord};
use crate::flow::shard::Shard;

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub scan_interval: Duration,
    pub idle_timeout: Duration,
    pub lifetime_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(15),
            lifetime_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Walk every shard once, detaching every record whose expiry fires.
/// Returns the detached records paired with why each one expired, in shard
/// order (no cross-shard ordering guarantee, matching spec §8: expiry order
/// within a scan cycle is unspecified).
pub fn scan_once<S: std::borrow::Borrow<Shard>>(
    shards: &[S],
    now: Instant,
    cfg: &ScanConfig,
) -> Vec<(FlowRecord, ExpiryReason)> {
    let mut expired = Vec::new();
    for shard in shards {
        let shard = shard.borrow();
        let mut reasons = Vec::new();
        let drained = shard.drain_expired(|record| {
            match record.expiry(now, cfg.idle_timeout, cfg.lifetime_timeout) {
                Some(reason) => {
                    reasons.push(reason);
                    true
                }
                None => false,
            }
        });
        expired.extend(drained.into_iter().zip(reasons));
    }
    expired
}

/// Drains every shard unconditionally, tagging every record `Forced`. Used
/// on shutdown so no live flow is silently lost.
pub fn drain_all<S: std::borrow::Borrow<Shard>>(shards: &[S]) -> Vec<(FlowRecord, ExpiryReason)> {
    shards
        .iter()
        .flat_map(|shard| shard.borrow().drain_all())
        .map(|record| (record, ExpiryReason::Forced))
        .collect()
}

/// Runs the scan loop until `shutdown` is set, sleeping in short slices
/// between cycles (mirrors the original probe's `msecSleep` polling rather
/// than a condvar, since the scanner has nothing event-driven to wait on).
pub fn run<S: std::borrow::Borrow<Shard>>(
    shards: &[S],
    cfg: ScanConfig,
    shutdown: Arc<AtomicBool>,
    mut on_expired: impl FnMut(FlowRecord, ExpiryReason),
) {
    run_with_cycle_hook(shards, cfg, shutdown, on_expired, |_| {})
}

/// Same as [`run`], but also calls `on_cycle` once per scan cycle (not on
/// shutdown drain). Lets the engine piggyback unrelated per-cycle
/// housekeeping, such as fragment table purging, on the scanner's own
/// wake cadence instead of running a second timer thread.
pub fn run_with_cycle_hook<S: std::borrow::Borrow<Shard>>(
    shards: &[S],
    cfg: ScanConfig,
    shutdown: Arc<AtomicBool>,
    mut on_expired: impl FnMut(FlowRecord, ExpiryReason),
    mut on_cycle: impl FnMut(Instant),
) {
    const SLEEP_SLICE: Duration = Duration::from_millis(100);
    let mut next_scan = Instant::now() + cfg.scan_interval;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= next_scan {
            for (record, reason) in scan_once(shards, now, &cfg) {
                on_expired(record, reason);
            }
            on_cycle(now);
            next_scan = now + cfg.scan_interval;
        }
        std::thread::sleep(SLEEP_SLICE.min(next_scan.saturating_duration_since(Instant::now())));
    }
    for (record, reason) in drain_all(shards) {
        on_expired(record, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use std::net::{IpAddr, Ipv4Addr};

    fn fp(src: u8) -> Fingerprint {
        Fingerprint {
            vlan_id: 0,
            src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, src)),
            dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 99)),
            protocol: 17,
            src_port: 1111,
            dst_port: 53,
            tos: 0,
            input_if: 1,
            tunnel_id: 0,
        }
    }

    #[test]
    fn scan_once_detaches_idle_flows_only() {
        let shard = Shard::new(16, 100);
        let t0 = Instant::now();
        shard.lookup_or_insert(fp(1), 100, 0, t0, false, b"", |_| {}, |_, _| {});
        shard.lookup_or_insert(fp(2), 100, 0, t0, false, b"", |_| {}, |_, _| {});

        let cfg = ScanConfig {
            scan_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(5),
            lifetime_timeout: Duration::from_secs(3600),
        };
        let still_young = scan_once(std::slice::from_ref(&shard), t0, &cfg);
        assert!(still_young.is_empty());

        let later = t0 + Duration::from_secs(10);
        let expired = scan_once(std::slice::from_ref(&shard), later, &cfg);
        assert_eq!(expired.len(), 2);
        assert!(expired.iter().all(|(_, r)| *r == ExpiryReason::Idle));
        assert_eq!(shard.active_flows(), 0);
    }

    #[test]
    fn drain_all_tags_forced() {
        let shard = Shard::new(16, 100);
        shard.lookup_or_insert(fp(1), 100, 0, Instant::now(), false, b"", |_| {}, |_, _| {});
        let drained = drain_all(std::slice::from_ref(&shard));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1, ExpiryReason::Forced);
    }
}
