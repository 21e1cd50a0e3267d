//! Aggregate run counters (spec §4.8), grounded in the same
//! `AtomicU64`-per-counter style as
//! [`crate::wire::variable_versions::metrics::CacheMetrics`].

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct ProbeStats {
    pub packets_captured: AtomicU64,
    pub packets_decoded: AtomicU64,
    pub packets_decode_failed: AtomicU64,
    pub packets_dropped_queue_full: AtomicU64,
    pub fragments_reassembled: AtomicU64,
    pub fragments_purged: AtomicU64,
    pub flows_created: AtomicU64,
    pub flows_dropped_max_flows: AtomicU64,
    pub flows_expired_idle: AtomicU64,
    pub flows_expired_lifetime: AtomicU64,
    pub flows_expired_tcp_closed: AtomicU64,
    pub flows_expired_forced: AtomicU64,
    pub export_packets_sent: AtomicU64,
    pub export_send_errors: AtomicU64,
    pub template_sets_sent: AtomicU64,
}

impl ProbeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_expiry(&self, reason: crate::flow::ExpiryReason) {
        use crate::flow::ExpiryReason::*;
        let counter = match reason {
            Idle => &self.flows_expired_idle,
            Lifetime => &self.flows_expired_lifetime,
            TcpClosed => &self.flows_expired_tcp_closed,
            Forced => &self.flows_expired_forced,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProbeStatsSnapshot {
        ProbeStatsSnapshot {
            packets_captured: self.packets_captured.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            packets_decode_failed: self.packets_decode_failed.load(Ordering::Relaxed),
            packets_dropped_queue_full: self.packets_dropped_queue_full.load(Ordering::Relaxed),
            fragments_reassembled: self.fragments_reassembled.load(Ordering::Relaxed),
            fragments_purged: self.fragments_purged.load(Ordering::Relaxed),
            flows_created: self.flows_created.load(Ordering::Relaxed),
            flows_dropped_max_flows: self.flows_dropped_max_flows.load(Ordering::Relaxed),
            flows_expired_idle: self.flows_expired_idle.load(Ordering::Relaxed),
            flows_expired_lifetime: self.flows_expired_lifetime.load(Ordering::Relaxed),
            flows_expired_tcp_closed: self.flows_expired_tcp_closed.load(Ordering::Relaxed),
            flows_expired_forced: self.flows_expired_forced.load(Ordering::Relaxed),
            export_packets_sent: self.export_packets_sent.load(Ordering::Relaxed),
            export_send_errors: self.export_send_errors.load(Ordering::Relaxed),
            template_sets_sent: self.template_sets_sent.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeStatsSnapshot {
    pub packets_captured: u64,
    pub packets_decoded: u64,
    pub packets_decode_failed: u64,
    pub packets_dropped_queue_full: u64,
    pub fragments_reassembled: u64,
    pub fragments_purged: u64,
    pub flows_created: u64,
    pub flows_dropped_max_flows: u64,
    pub flows_expired_idle: u64,
    pub flows_expired_lifetime: u64,
    pub flows_expired_tcp_closed: u64,
    pub flows_expired_forced: u64,
    pub export_packets_sent: u64,
    pub export_send_errors: u64,
    pub template_sets_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_expiry_routes_to_the_right_counter() {
        let stats = ProbeStats::new();
        stats.record_expiry(crate::flow::ExpiryReason::Idle);
        stats.record_expiry(crate::flow::ExpiryReason::Idle);
        stats.record_expiry(crate::flow::ExpiryReason::TcpClosed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.flows_expired_idle, 2);
        assert_eq!(snapshot.flows_expired_tcp_closed, 1);
    }
}
