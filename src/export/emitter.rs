//! Export dispatch: round-robin vs. reflector fan-out, pacing between
//! packets, and template retransmit cadence (spec §4.6).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::ExportError;
use crate::export::collector::Collector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Each packet goes to exactly one collector, cycling through the list.
    RoundRobin,
    /// Every packet is mirrored to every collector.
    Reflector,
}

/// Tracks, per (collector, template id), when a template set was last sent
/// so the assembly stage knows whether to prepend a retransmit.
pub struct TemplateRetransmitTracker {
    interval: Duration,
    last_sent: HashMap<(usize, u16), Instant>,
}

impl TemplateRetransmitTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    /// Returns true if a template set for `template_id` must be included
    /// for `collector_idx` at `now`, and records that it was sent.
    pub fn should_send(&mut self, collector_idx: usize, template_id: u16, now: Instant) -> bool {
        match self.last_sent.get(&(collector_idx, template_id)) {
            Some(&last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_sent.insert((collector_idx, template_id), now);
                true
            }
        }
    }

    /// Force the next `should_send` to return true, used after a template
    /// rebuild or a collector reconnect.
    pub fn invalidate(&mut self, collector_idx: usize, template_id: u16) {
        self.last_sent.remove(&(collector_idx, template_id));
    }
}

pub struct Emitter {
    collectors: Vec<Box<dyn Collector>>,
    mode: DispatchMode,
    pacing: Option<Duration>,
    next: usize,
    last_sent_at: Option<Instant>,
}

impl Emitter {
    pub fn new(collectors: Vec<Box<dyn Collector>>, mode: DispatchMode, pacing: Option<Duration>) -> Self {
        Self {
            collectors,
            mode,
            pacing,
            next: 0,
            last_sent_at: None,
        }
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    fn pace(&mut self) {
        if let Some(min_gap) = self.pacing {
            if let Some(last) = self.last_sent_at {
                let elapsed = last.elapsed();
                if elapsed < min_gap {
                    std::thread::sleep(min_gap - elapsed);
                }
            }
        }
        self.last_sent_at = Some(Instant::now());
    }

    /// Send one assembled packet according to the configured dispatch mode.
    /// `packet_for` lets the caller assemble a per-collector packet (e.g. to
    /// decide per-collector template retransmit via
    /// [`TemplateRetransmitTracker`]) without this type needing to know
    /// about templates at all.
    pub fn dispatch(
        &mut self,
        mut packet_for: impl FnMut(usize) -> Vec<u8>,
    ) -> Vec<Result<(), ExportError>> {
        if self.collectors.is_empty() {
            return vec![Err(ExportError::NoReachableCollectors)];
        }
        self.pace();
        match self.mode {
            DispatchMode::RoundRobin => {
                let idx = self.next;
                self.next = (self.next + 1) % self.collectors.len();
                let packet = packet_for(idx);
                vec![self.collectors[idx].send(&packet)]
            }
            DispatchMode::Reflector => (0..self.collectors.len())
                .map(|idx| {
                    let packet = packet_for(idx);
                    self.collectors[idx].send(&packet)
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    struct RecordingCollector {
        addr: SocketAddr,
        sent: Vec<Vec<u8>>,
    }

    impl Collector for RecordingCollector {
        fn addr(&self) -> SocketAddr {
            self.addr
        }

        fn send(&mut self, packet: &[u8]) -> Result<(), ExportError> {
            self.sent.push(packet.to_vec());
            Ok(())
        }
    }

    fn collector() -> Box<dyn Collector> {
        Box::new(RecordingCollector {
            addr: "127.0.0.1:2055".parse().unwrap(),
            sent: Vec::new(),
        })
    }

    #[test]
    fn round_robin_cycles_collectors() {
        let mut emitter = Emitter::new(vec![collector(), collector()], DispatchMode::RoundRobin, None);
        let results = emitter.dispatch(|idx| vec![idx as u8]);
        assert_eq!(results.len(), 1);
        let results = emitter.dispatch(|idx| vec![idx as u8]);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn reflector_sends_to_all() {
        let mut emitter = Emitter::new(vec![collector(), collector()], DispatchMode::Reflector, None);
        let results = emitter.dispatch(|idx| vec![idx as u8]);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn template_retransmit_respects_interval() {
        let mut tracker = TemplateRetransmitTracker::new(Duration::from_secs(60));
        let now = Instant::now();
        assert!(tracker.should_send(0, 256, now));
        assert!(!tracker.should_send(0, 256, now + Duration::from_secs(1)));
        assert!(tracker.should_send(0, 256, now + Duration::from_secs(61)));
    }
}
