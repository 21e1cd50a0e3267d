//! Capture source abstraction (spec §6): live interface capture and
//! offline pcap replay share one trait so the engine's capture thread body
//! doesn't care which one it's driving.

use crate::error::CaptureError;

pub struct CapturedFrame {
    pub data: Vec<u8>,
    pub input_if: u32,
}

pub trait CaptureSource: Send {
    /// Returns the next captured frame, `None` on a clean end (offline
    /// replay exhausted), or an error on a transient read failure.
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError>;
}

/// Captures from a live interface via `pcap`.
pub struct LiveCapture {
    capture: pcap::Capture<pcap::Active>,
    input_if: u32,
}

impl LiveCapture {
    pub fn open(
        device_name: &str,
        input_if: u32,
        filter: Option<&str>,
        snaplen: u32,
    ) -> Result<Self, CaptureError> {
        let device = pcap::Device::list()
            .map_err(|e| CaptureError::Open(e.to_string()))?
            .into_iter()
            .find(|d| d.name == device_name)
            .ok_or_else(|| CaptureError::Open(format!("no such interface: {device_name}")))?;
        let mut capture = pcap::Capture::from_device(device)
            .map_err(|e| CaptureError::Open(e.to_string()))?
            .promisc(true)
            .snaplen(snaplen as i32)
            .timeout(1000)
            .open()
            .map_err(|e| CaptureError::Open(e.to_string()))?;
        if let Some(filter) = filter {
            capture
                .filter(filter, true)
                .map_err(|e| CaptureError::Filter {
                    filter: filter.to_string(),
                    source: e.to_string(),
                })?;
        }
        Ok(Self { capture, input_if })
    }
}

impl CaptureSource for LiveCapture {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(CapturedFrame {
                data: packet.data.to_vec(),
                input_if: self.input_if,
            })),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(CaptureError::Transient(e.to_string())),
        }
    }
}

/// Replays a pcap file, used for offline analysis and tests.
pub struct OfflineCapture {
    capture: pcap::Capture<pcap::Offline>,
    input_if: u32,
}

impl OfflineCapture {
    pub fn open(path: &str, input_if: u32) -> Result<Self, CaptureError> {
        let capture =
            pcap::Capture::from_file(path).map_err(|e| CaptureError::Open(e.to_string()))?;
        Ok(Self { capture, input_if })
    }
}

impl CaptureSource for OfflineCapture {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(CapturedFrame {
                data: packet.data.to_vec(),
                input_if: self.input_if,
            })),
            Err(pcap::Error::NoMorePackets) => Err(CaptureError::ReplayExhausted),
            Err(e) => Err(CaptureError::Transient(e.to_string())),
        }
    }
}

/// An in-memory capture source, used in tests so engine wiring can be
/// exercised without a real interface or pcap file.
pub struct VecCapture {
    frames: std::vec::IntoIter<CapturedFrame>,
}

impl VecCapture {
    pub fn new(frames: Vec<CapturedFrame>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl CaptureSource for VecCapture {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        match self.frames.next() {
            Some(frame) => Ok(Some(frame)),
            None => Err(CaptureError::ReplayExhausted),
        }
    }
}
