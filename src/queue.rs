//! Bounded capture-to-worker hand-off queues (spec §4.3). One queue per
//! worker thread; the capture thread picks a queue via
//! `fingerprint.shard_index(num_workers)` so every packet of a flow lands
//! on the same worker for the run's lifetime. Full queues drop the packet
//! rather than block the capture thread.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub struct PacketSlot {
    pub fingerprint: crate::fingerprint::Fingerprint,
    pub bytes: u32,
    pub tcp_flags: u8,
    pub payload: Vec<u8>,
    pub captured_at: std::time::Instant,
    /// Packets this slot represents; normally 1, but the smart UDP fragment
    /// accounting shortcut (spec §4.2) credits 2 for a single observed first
    /// fragment standing in for the datagram's other fragments.
    pub packet_count: u32,
    pub icmp: Option<crate::flow::IcmpInfo>,
    pub mpls_labels: Vec<u32>,
}

struct Inner {
    items: VecDeque<PacketSlot>,
    closed: bool,
}

/// A single bounded SPSC-ish queue (one capture-side producer, one worker
/// consumer). `Mutex` + `Condvar` matches the original probe's plain
/// blocking hand-off rather than a lock-free ring, which the probe's scale
/// (tens of worker queues, not millions of independent producers) doesn't
/// need.
pub struct HandoffQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    capacity: usize,
}

impl HandoffQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Attempt to push a slot. Returns `false` (and drops the slot) if the
    /// queue is at capacity.
    pub fn try_push(&self, slot: PacketSlot) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.items.len() >= self.capacity {
            return false;
        }
        inner.items.push_back(slot);
        self.not_empty.notify_one();
        true
    }

    /// Block until a slot is available or the queue is closed, in which
    /// case `None` is returned once drained.
    pub fn pop(&self) -> Option<PacketSlot> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(slot) = inner.items.pop_front() {
                return Some(slot);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn slot() -> PacketSlot {
        PacketSlot {
            fingerprint: crate::fingerprint::Fingerprint {
                vlan_id: 0,
                src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                protocol: 17,
                src_port: 1,
                dst_port: 2,
                tos: 0,
                input_if: 0,
                tunnel_id: 0,
            },
            bytes: 100,
            tcp_flags: 0,
            payload: Vec::new(),
            captured_at: std::time::Instant::now(),
            packet_count: 1,
            icmp: None,
            mpls_labels: Vec::new(),
        }
    }

    #[test]
    fn drops_when_full() {
        let queue = HandoffQueue::new(1);
        assert!(queue.try_push(slot()));
        assert!(!queue.try_push(slot()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_returns_none_after_close_when_drained() {
        let queue = HandoffQueue::new(4);
        queue.try_push(slot());
        queue.close();
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }
}
