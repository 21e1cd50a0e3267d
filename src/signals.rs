//! Runtime control (spec §4.8/§9). Reload is delivered as an explicit
//! message over an `mpsc` channel rather than handled reentrantly inside a
//! signal handler — an external adapter (e.g. a SIGHUP handler) is expected
//! to translate an OS signal into a `ControlMessage::Reload` send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Rebuild templates and flush export buffers, then resume.
    Reload,
    /// Stop capture, drain every shard, flush the exporter, and exit.
    Shutdown,
}

pub fn control_channel() -> (Sender<ControlMessage>, Receiver<ControlMessage>) {
    mpsc::channel()
}

/// Shared barrier flags the capture/worker/scanner/emitter threads all
/// poll. `stop_packet_capture` is raised first so the capture thread stops
/// feeding new packets in while templates are rebuilt; `shutdown` is the
/// final, irreversible stop-everything flag. Each flag is its own `Arc` so
/// it can be handed to a thread (e.g. the scanner) independently of the
/// rest of `RunSignals`.
pub struct RunSignals {
    pub stop_packet_capture: Arc<AtomicBool>,
    pub shutdown: Arc<AtomicBool>,
}

impl Default for RunSignals {
    fn default() -> Self {
        Self {
            stop_packet_capture: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl RunSignals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_shutdown(&self) {
        self.stop_packet_capture.store(true, Ordering::SeqCst);
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Raise `stop_packet_capture` without touching `shutdown`, so the
    /// capture thread pauses for a template rebuild but every other thread
    /// keeps running.
    pub fn request_capture_pause(&self) {
        self.stop_packet_capture.store(true, Ordering::SeqCst);
    }

    pub fn resume_capture(&self) {
        self.stop_packet_capture.store(false, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_capture_stopped(&self) -> bool {
        self.stop_packet_capture.load(Ordering::SeqCst)
    }

    /// A clone of the shutdown flag, for handing to a thread (e.g. the
    /// scanner) that only needs to observe shutdown, not the full struct.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_implies_capture_stopped() {
        let signals = RunSignals::new();
        assert!(!signals.is_shutting_down());
        signals.request_shutdown();
        assert!(signals.is_shutting_down());
        assert!(signals.is_capture_stopped());
    }

    #[test]
    fn reload_message_is_delivered_once() {
        let (tx, rx) = control_channel();
        tx.send(ControlMessage::Reload).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), ControlMessage::Reload));
        assert!(rx.try_recv().is_err());
    }
}
