//! One independent flow hash (spec §4.4). There is one `Shard` per worker
//! thread; only that worker ever inserts into or updates its own shard, so
//! the per-stripe locks mainly exist to let the scan thread (and an
//! optional rebuild) walk a shard concurrently with the owning worker.

use std::sync::RwLock;

use crate::fingerprint::Fingerprint;
use crate::flow::record::FlowRecord;

/// Mirrors the original probe's `MAX_HASH_MUTEXES`: an upper bound on how
/// many independent locks one shard's bucket array is striped across, so
/// lock count doesn't grow linearly with (potentially very large) bucket
/// counts.
pub const MAX_HASH_MUTEXES: usize = 64;

struct Stripe {
    /// Buckets owned by this stripe, indexed by `bucket_idx / num_stripes`.
    buckets: RwLock<Vec<Vec<FlowRecord>>>,
}

pub struct Shard {
    stripes: Vec<Stripe>,
    num_buckets: usize,
    num_stripes: usize,
    max_active_flows: usize,
}

/// Outcome of a lookup-or-insert (spec §4.4).
pub enum LookupOutcome {
    /// An existing record (forward or, if bidirectional merge applies,
    /// reverse-matched) was updated in place.
    Updated,
    /// A new record was created; plugin create-hooks still need to run.
    Created,
    /// The shard is at `max_active_flows`; the packet must be dropped.
    DroppedMaxFlows,
}

impl Shard {
    pub fn new(num_buckets: usize, max_active_flows: usize) -> Self {
        let num_buckets = num_buckets.max(1);
        let num_stripes = MAX_HASH_MUTEXES.min(num_buckets);
        let buckets_per_stripe = num_buckets.div_ceil(num_stripes);
        let stripes = (0..num_stripes)
            .map(|_| Stripe {
                buckets: RwLock::new(vec![Vec::new(); buckets_per_stripe]),
            })
            .collect();
        Self {
            stripes,
            num_buckets,
            num_stripes,
            max_active_flows,
        }
    }

    fn locate(&self, bucket_idx: usize) -> (usize, usize) {
        let stripe_idx = bucket_idx % self.num_stripes;
        let slot = bucket_idx / self.num_stripes;
        (stripe_idx, slot)
    }

    fn bucket_idx(&self, fingerprint: &Fingerprint) -> usize {
        (fingerprint.stable_hash() % self.num_buckets as u64) as usize
    }

    pub fn active_flows(&self) -> usize {
        self.stripes
            .iter()
            .map(|s| s.buckets.read().unwrap().iter().map(Vec::len).sum::<usize>())
            .sum()
    }

    /// Lookup-or-insert with optional bidirectional merge. `bidirectional`
    /// additionally probes the reverse-direction bucket on miss. `on_packet`
    /// fires only when an existing record is folded into (not on creation,
    /// matching [`crate::plugin::FlowPlugin::on_packet`]'s contract).
    #[allow(clippy::too_many_arguments)]
    pub fn lookup_or_insert(
        &self,
        fingerprint: Fingerprint,
        bytes: u32,
        tcp_flags: u8,
        at: std::time::Instant,
        bidirectional: bool,
        payload: &[u8],
        on_create: impl FnOnce(&mut FlowRecord),
        on_packet: impl FnOnce(&mut FlowRecord, &[u8]),
    ) -> LookupOutcome {
        self.lookup_or_insert_n(fingerprint, bytes, tcp_flags, at, 1, bidirectional, payload, on_create, on_packet)
    }

    /// Same as [`Self::lookup_or_insert`], crediting `packet_count` packets
    /// instead of always crediting exactly one (used by the smart UDP
    /// fragment accounting shortcut, spec §4.2, which credits 2 for a single
    /// observed first fragment).
    ///
    /// When `bidirectional` is set, the record is always stored and keyed
    /// under its canonical (lower-addressed-endpoint) fingerprint (spec §8
    /// invariant 9), regardless of which direction's packet arrives first;
    /// `is_canonical_direction` decides whether this packet folds into the
    /// forward or reverse counters.
    #[allow(clippy::too_many_arguments)]
    pub fn lookup_or_insert_n(
        &self,
        fingerprint: Fingerprint,
        bytes: u32,
        tcp_flags: u8,
        at: std::time::Instant,
        packet_count: u32,
        bidirectional: bool,
        payload: &[u8],
        on_create: impl FnOnce(&mut FlowRecord),
        on_packet: impl FnOnce(&mut FlowRecord, &[u8]),
    ) -> LookupOutcome {
        if !bidirectional {
            return self.lookup_or_insert_keyed(
                fingerprint,
                bytes,
                tcp_flags,
                at,
                packet_count,
                false,
                payload,
                on_create,
                on_packet,
            );
        }

        let is_reverse = !fingerprint.is_canonical_direction();
        let canonical = if is_reverse { fingerprint.reversed() } else { fingerprint };
        self.lookup_or_insert_keyed(
            canonical,
            bytes,
            tcp_flags,
            at,
            packet_count,
            is_reverse,
            payload,
            on_create,
            on_packet,
        )
    }

    /// Core lookup-or-insert against `key` as stored. `is_reverse` picks
    /// which direction's counters this packet folds into once the record is
    /// found or created; callers decide the key (exact match for
    /// unidirectional flows, canonical for bidirectional ones).
    #[allow(clippy::too_many_arguments)]
    fn lookup_or_insert_keyed(
        &self,
        key: Fingerprint,
        bytes: u32,
        tcp_flags: u8,
        at: std::time::Instant,
        packet_count: u32,
        is_reverse: bool,
        payload: &[u8],
        on_create: impl FnOnce(&mut FlowRecord),
        on_packet: impl FnOnce(&mut FlowRecord, &[u8]),
    ) -> LookupOutcome {
        let idx = self.bucket_idx(&key);
        let (stripe_idx, slot) = self.locate(idx);
        let mut buckets = self.stripes[stripe_idx].buckets.write().unwrap();
        if let Some(record) = buckets[slot].iter_mut().find(|r| r.fingerprint == key) {
            if is_reverse {
                record.observe_reverse_n(bytes, tcp_flags, at, packet_count);
            } else {
                record.observe_forward_n(bytes, tcp_flags, at, packet_count);
            }
            on_packet(record, payload);
            return LookupOutcome::Updated;
        }
        drop(buckets);

        if self.active_flows() >= self.max_active_flows {
            return LookupOutcome::DroppedMaxFlows;
        }

        let mut record = FlowRecord::new(key);
        if is_reverse {
            record.observe_reverse_n(bytes, tcp_flags, at, packet_count);
        } else {
            record.observe_forward_n(bytes, tcp_flags, at, packet_count);
        }
        on_create(&mut record);
        let mut buckets = self.stripes[stripe_idx].buckets.write().unwrap();
        buckets[slot].push(record);
        LookupOutcome::Created
    }

    /// Remove and return every record for which `predicate` holds. Used by
    /// the scanner to detach expired flows; one stripe at a time so the
    /// owning worker is blocked for at most one stripe's width.
    pub fn drain_expired(
        &self,
        mut predicate: impl FnMut(&FlowRecord) -> bool,
    ) -> Vec<FlowRecord> {
        let mut drained = Vec::new();
        for stripe in &self.stripes {
            let mut buckets = stripe.buckets.write().unwrap();
            for bucket in buckets.iter_mut() {
                let mut i = 0;
                while i < bucket.len() {
                    if predicate(&bucket[i]) {
                        drained.push(bucket.swap_remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
        }
        drained
    }

    /// Drain every record unconditionally (shutdown / forced flush).
    pub fn drain_all(&self) -> Vec<FlowRecord> {
        self.drain_expired(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

    fn fp(src: u8) -> Fingerprint {
        Fingerprint {
            vlan_id: 0,
            src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, src)),
            dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 99)),
            protocol: 6,
            src_port: 1111,
            dst_port: 80,
            tos: 0,
            input_if: 1,
            tunnel_id: 0,
        }
    }

    #[test]
    fn insert_then_update() {
        let shard = Shard::new(16, 100);
        let outcome = shard.lookup_or_insert(fp(1), 100, 0x02, Instant::now(), false, b"", |_| {}, |_, _| {});
        assert!(matches!(outcome, LookupOutcome::Created));
        let outcome = shard.lookup_or_insert(fp(1), 200, 0x01, Instant::now(), false, b"", |_| {}, |_, _| {});
        assert!(matches!(outcome, LookupOutcome::Updated));
        assert_eq!(shard.active_flows(), 1);
    }

    #[test]
    fn max_flows_drops() {
        let shard = Shard::new(16, 1);
        shard.lookup_or_insert(fp(1), 100, 0, Instant::now(), false, b"", |_| {}, |_, _| {});
        let outcome = shard.lookup_or_insert(fp(2), 100, 0, Instant::now(), false, b"", |_| {}, |_, _| {});
        assert!(matches!(outcome, LookupOutcome::DroppedMaxFlows));
    }

    #[test]
    fn bidirectional_merge_updates_reverse() {
        let shard = Shard::new(16, 100);
        shard.lookup_or_insert(fp(1), 100, 0, Instant::now(), true, b"", |_| {}, |_, _| {});
        let reverse = fp(1).reversed();
        let outcome = shard.lookup_or_insert(reverse, 50, 0, Instant::now(), true, b"", |_| {}, |_, _| {});
        assert!(matches!(outcome, LookupOutcome::Updated));
        assert_eq!(shard.active_flows(), 1);
    }

    #[test]
    fn drain_expired_removes_matching_only() {
        let shard = Shard::new(16, 100);
        shard.lookup_or_insert(fp(1), 100, 0, Instant::now(), false, b"", |_| {}, |_, _| {});
        shard.lookup_or_insert(fp(2), 100, 0, Instant::now(), false, b"", |_| {}, |_, _| {});
        let drained = shard.drain_expired(|r| r.fingerprint.src_addr == fp(1).src_addr);
        assert_eq!(drained.len(), 1);
        assert_eq!(shard.active_flows(), 1);
    }
}
