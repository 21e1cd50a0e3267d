//! IPv4 fragment table (spec §4.2). Only the first fragment of a datagram
//! carries the L4 header; this table remembers the ports the first fragment
//! saw so later fragments (which carry none) can still be attributed to the
//! same flow. This is the plain port-recovery path, used when the "smart
//! UDP fragment" mode (`RunConfig::smart_udp_fragments`) is off; that mode
//! instead ignores non-first UDP fragments outright and credits the first
//! fragment with an estimated full-datagram size, bypassing this table
//! entirely (see [`crate::decoder::decode`]). Entries here are purged on the
//! scan thread's cadence rather than by a dedicated timer thread.

use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const NUM_BUCKETS: usize = 512;
pub const PURGE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub protocol: u8,
    pub identification: u16,
}

struct FragmentEntry {
    key: FragmentKey,
    l4_src_port: u16,
    l4_dst_port: u16,
    created_at: Instant,
}

pub struct FragmentTable {
    buckets: Vec<Mutex<Vec<FragmentEntry>>>,
}

fn bucket_index(key: &FragmentKey) -> usize {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % NUM_BUCKETS as u64) as usize
}

impl Default for FragmentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentTable {
    pub fn new() -> Self {
        Self {
            buckets: (0..NUM_BUCKETS).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Record the L4 ports seen on a datagram's first fragment, so later
    /// fragments (which carry no L4 header) can still be attributed.
    pub fn record_first_fragment(
        &self,
        key: FragmentKey,
        l4_src_port: u16,
        l4_dst_port: u16,
        now: Instant,
    ) {
        let idx = bucket_index(&key);
        let mut bucket = self.buckets[idx].lock().unwrap();
        bucket.retain(|e| e.key != key);
        bucket.push(FragmentEntry {
            key,
            l4_src_port,
            l4_dst_port,
            created_at: now,
        });
    }

    /// Fast-path lookup for a non-first fragment: the ports cached from the
    /// matching datagram's first fragment, if it has already been seen and
    /// hasn't aged out.
    pub fn lookup_ports(&self, key: &FragmentKey, now: Instant) -> Option<(u16, u16)> {
        let idx = bucket_index(key);
        let bucket = self.buckets[idx].lock().unwrap();
        bucket
            .iter()
            .find(|e| &e.key == key && now.saturating_duration_since(e.created_at) < PURGE_AFTER)
            .map(|e| (e.l4_src_port, e.l4_dst_port))
    }

    /// Sweep every bucket for entries older than [`PURGE_AFTER`]. Returns
    /// the number of entries removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut purged = 0;
        for bucket in &self.buckets {
            let mut bucket = bucket.lock().unwrap();
            let before = bucket.len();
            bucket.retain(|e| now.saturating_duration_since(e.created_at) < PURGE_AFTER);
            purged += before - bucket.len();
        }
        if purged > 0 {
            tracing::debug!(purged, "purged stale fragment entries");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key() -> FragmentKey {
        FragmentKey {
            src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            protocol: 17,
            identification: 4242,
        }
    }

    #[test]
    fn later_fragment_inherits_first_fragments_ports() {
        let table = FragmentTable::new();
        let now = Instant::now();
        table.record_first_fragment(key(), 5353, 6000, now);
        assert_eq!(table.lookup_ports(&key(), now), Some((5353, 6000)));
    }

    #[test]
    fn purge_removes_stale_entries() {
        let table = FragmentTable::new();
        let now = Instant::now();
        table.record_first_fragment(key(), 1, 2, now);
        let later = now + PURGE_AFTER + Duration::from_secs(1);
        assert_eq!(table.purge_expired(later), 1);
        assert_eq!(table.lookup_ports(&key(), later), None);
    }
}
