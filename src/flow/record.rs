//! The flow record (spec §3) — the unit of work that travels from a flow
//! hash bucket onto the export queue.

use std::time::Instant;

use crate::fingerprint::Fingerprint;
use crate::plugin::PluginData;

/// Per-direction counters. NetFlow v5 only ever populates the forward side;
/// v9/IPFIX populate both when bidirectional merge is enabled.
#[derive(Debug, Clone, Default)]
pub struct DirectionCounters {
    pub packets: u64,
    pub bytes: u64,
    pub tcp_flags_or: u8,
    pub first_seen: Option<Instant>,
    pub last_seen: Option<Instant>,
}

impl DirectionCounters {
    fn observe(&mut self, bytes: u32, tcp_flags: u8, at: Instant) {
        self.observe_n(bytes, tcp_flags, at, 1);
    }

    /// Same as [`Self::observe`], but credits `packet_count` packets instead
    /// of always exactly one (smart UDP fragment accounting, spec §4.2).
    fn observe_n(&mut self, bytes: u32, tcp_flags: u8, at: Instant, packet_count: u32) {
        self.packets += u64::from(packet_count);
        self.bytes += u64::from(bytes);
        self.tcp_flags_or |= tcp_flags;
        if self.first_seen.is_none() {
            self.first_seen = Some(at);
        }
        self.last_seen = Some(at);
    }
}

/// Why a flow was moved to the export queue; kept on the record purely for
/// statistics/debugging, carries no wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    Idle,
    Lifetime,
    TcpClosed,
    Forced,
}

#[derive(Debug, Clone, Default)]
pub struct IcmpInfo {
    pub icmp_type: u8,
    pub icmp_code: u8,
}

/// A live (or just-expired) flow. Immutable once handed to the export
/// queue (spec §3 invariant).
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub fingerprint: Fingerprint,
    pub forward: DirectionCounters,
    pub reverse: DirectionCounters,
    pub fragments: u32,
    pub mpls_labels: Vec<u32>,
    pub icmp: Option<IcmpInfo>,
    pub src_as: u32,
    pub dst_as: u32,
    pub src_mask: u8,
    pub dst_mask: u8,
    pub output_if: u32,
    pub payload_snapshot: Option<Vec<u8>>,
    pub plugin_data: Vec<PluginData>,
}

impl FlowRecord {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            forward: DirectionCounters::default(),
            reverse: DirectionCounters::default(),
            fragments: 0,
            mpls_labels: Vec::new(),
            icmp: None,
            src_as: 0,
            dst_as: 0,
            src_mask: 0,
            dst_mask: 0,
            output_if: 0,
            payload_snapshot: None,
            plugin_data: Vec::new(),
        }
    }

    /// Record one packet on the forward direction (the direction the
    /// fingerprint itself was created from).
    pub fn observe_forward(&mut self, bytes: u32, tcp_flags: u8, at: Instant) {
        self.forward.observe(bytes, tcp_flags, at);
    }

    /// Record one packet on the reverse direction (bidirectional merge).
    pub fn observe_reverse(&mut self, bytes: u32, tcp_flags: u8, at: Instant) {
        self.reverse.observe(bytes, tcp_flags, at);
    }

    /// Same as [`Self::observe_forward`], crediting `packet_count` packets.
    pub fn observe_forward_n(&mut self, bytes: u32, tcp_flags: u8, at: Instant, packet_count: u32) {
        self.forward.observe_n(bytes, tcp_flags, at, packet_count);
    }

    /// Same as [`Self::observe_reverse`], crediting `packet_count` packets.
    pub fn observe_reverse_n(&mut self, bytes: u32, tcp_flags: u8, at: Instant, packet_count: u32) {
        self.reverse.observe_n(bytes, tcp_flags, at, packet_count);
    }

    pub fn first_seen(&self) -> Option<Instant> {
        match (self.forward.first_seen, self.reverse.first_seen) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    pub fn last_seen(&self) -> Option<Instant> {
        match (self.forward.last_seen, self.reverse.last_seen) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// TCP termination per spec §4.4: FIN observed on both directions, or
    /// any RST. `0x01` = FIN, `0x04` = RST (standard TCP flag bit layout).
    pub fn tcp_closed(&self) -> bool {
        const FIN: u8 = 0x01;
        const RST: u8 = 0x04;
        let rst = self.forward.tcp_flags_or & RST != 0 || self.reverse.tcp_flags_or & RST != 0;
        let both_fin = self.forward.tcp_flags_or & FIN != 0 && self.reverse.tcp_flags_or & FIN != 0;
        rst || both_fin
    }

    /// Evaluate expiry against the scan thread's current wall-clock view.
    pub fn expiry(
        &self,
        now: Instant,
        idle_timeout: std::time::Duration,
        lifetime_timeout: std::time::Duration,
    ) -> Option<ExpiryReason> {
        if self.fingerprint.protocol == 6 && self.tcp_closed() {
            return Some(ExpiryReason::TcpClosed);
        }
        let last = self.last_seen()?;
        if now.saturating_duration_since(last) >= idle_timeout {
            return Some(ExpiryReason::Idle);
        }
        let first = self.first_seen()?;
        if now.saturating_duration_since(first) >= lifetime_timeout {
            return Some(ExpiryReason::Lifetime);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn fingerprint() -> Fingerprint {
        Fingerprint {
            vlan_id: 0,
            src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            protocol: 6,
            src_port: 1234,
            dst_port: 80,
            tos: 0,
            input_if: 1,
            tunnel_id: 0,
        }
    }

    #[test]
    fn tcp_closed_on_both_fin() {
        let mut record = FlowRecord::new(fingerprint());
        let now = Instant::now();
        record.observe_forward(100, 0x02, now);
        record.observe_forward(100, 0x01, now);
        assert!(!record.tcp_closed());
        record.observe_reverse(100, 0x01, now);
        assert!(record.tcp_closed());
    }

    #[test]
    fn tcp_closed_on_any_rst() {
        let mut record = FlowRecord::new(fingerprint());
        record.observe_forward(100, 0x04, Instant::now());
        assert!(record.tcp_closed());
    }

    #[test]
    fn idle_expiry_uses_last_seen() {
        let mut record = FlowRecord::new(fingerprint());
        let t0 = Instant::now();
        record.observe_forward(10, 0, t0);
        let later = t0 + Duration::from_secs(10);
        assert_eq!(
            record.expiry(later, Duration::from_secs(5), Duration::from_secs(3600)),
            Some(ExpiryReason::Idle)
        );
    }
}
