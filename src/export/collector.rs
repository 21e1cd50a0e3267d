//! Collector transports (spec §4.6/§6). UDP and TCP are real; SCTP is a
//! documented non-implementation rather than a fabricated dependency, since
//! no vetted SCTP crate exists anywhere in this codebase's ecosystem slice.

use std::net::{SocketAddr, TcpStream, UdpSocket};

use crate::error::{ConfigError, ExportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Udp,
    Tcp,
    Sctp,
}

/// One collector endpoint this probe can send packets to.
pub trait Collector: Send {
    fn addr(&self) -> SocketAddr;
    fn send(&mut self, packet: &[u8]) -> Result<(), ExportError>;
}

pub struct UdpCollector {
    socket: UdpSocket,
    addr: SocketAddr,
}

impl UdpCollector {
    pub fn connect(addr: SocketAddr) -> Result<Self, ExportError> {
        let bind_addr: SocketAddr = if addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr).map_err(ExportError::Send)?;
        socket.connect(addr).map_err(ExportError::Send)?;
        Ok(Self { socket, addr })
    }
}

impl Collector for UdpCollector {
    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), ExportError> {
        self.socket.send(packet).map_err(|err| {
            tracing::warn!(addr = %self.addr, error = %err, "udp collector send failed");
            ExportError::Send(err)
        })?;
        Ok(())
    }
}

/// TCP collector that reconnects lazily on the next send after a failure,
/// rather than treating one dropped connection as fatal to the whole run.
pub struct TcpCollector {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpCollector {
    pub fn connect(addr: SocketAddr) -> Result<Self, ExportError> {
        let stream = TcpStream::connect(addr).map_err(ExportError::Send)?;
        Ok(Self {
            addr,
            stream: Some(stream),
        })
    }

    fn ensure_connected(&mut self) -> Result<&mut TcpStream, ExportError> {
        if self.stream.is_none() {
            self.stream = Some(TcpStream::connect(self.addr).map_err(ExportError::Send)?);
        }
        Ok(self.stream.as_mut().unwrap())
    }
}

impl Collector for TcpCollector {
    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), ExportError> {
        use std::io::Write;
        let stream = self.ensure_connected()?;
        match stream.write_all(packet) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(addr = %self.addr, error = %err, "tcp collector send failed, will reconnect");
                self.stream = None;
                Err(ExportError::Send(err))
            }
        }
    }
}

/// Build a collector for the requested transport. SCTP is rejected at
/// config-validation time, not discovered as a runtime surprise.
pub fn build_collector(
    kind: TransportKind,
    addr: SocketAddr,
) -> Result<Box<dyn Collector>, ConfigError> {
    let collector: Box<dyn Collector> = match kind {
        TransportKind::Udp => Box::new(
            UdpCollector::connect(addr)
                .map_err(|source| ConfigError::CollectorConnect { addr, source })?,
        ),
        TransportKind::Tcp => Box::new(
            TcpCollector::connect(addr)
                .map_err(|source| ConfigError::CollectorConnect { addr, source })?,
        ),
        TransportKind::Sctp => return Err(ConfigError::UnsupportedTransport),
    };
    tracing::info!(addr = %addr, transport = ?kind, "collector ready");
    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sctp_is_rejected_at_build_time() {
        let addr: SocketAddr = "127.0.0.1:2055".parse().unwrap();
        let err = build_collector(TransportKind::Sctp, addr).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedTransport));
    }

    #[test]
    fn udp_collector_connects_locally() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = UdpSocket::bind(addr).unwrap();
        let real_addr = listener.local_addr().unwrap();
        let collector = build_collector(TransportKind::Udp, real_addr);
        assert!(collector.is_ok());
    }
}
