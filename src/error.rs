//! Error domains for the ambient (non-wire-parsing) parts of the probe.
//!
//! The wire-format parse path keeps the teacher's own hand-rolled
//! `Display`/`std::error::Error` style where it still parses bytes (none of
//! that survives directly in this crate's public surface, since the probe
//! only ever serializes), but every new error domain introduced for the
//! engine uses `thiserror`, matching the error-handling idiom used across
//! the rest of the retrieval corpus.

use std::net::AddrParseError;

/// Fatal at startup: something in a [`crate::config::RunConfig`] could not
/// be turned into a running probe.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("template references unknown field `{0}`")]
    UnknownTemplateField(String),
    #[error("template must name at least one field")]
    EmptyTemplate,
    #[error("plugin field `{name}` (id {id}) collides with a core field id")]
    PluginFieldCollision { name: String, id: u16 },
    #[error("worker count must be at least 1")]
    ZeroWorkers,
    #[error("hash size must be at least worker count ({workers})")]
    HashSizeTooSmall { workers: usize },
    #[error("no collectors configured")]
    NoCollectors,
    #[error("invalid collector address `{0}`: {1}")]
    InvalidCollectorAddress(String, AddrParseError),
    #[error("SCTP collectors are not supported: no vetted SCTP crate is in this build")]
    UnsupportedTransport,
    #[error("failed to connect to collector {addr}: {source}")]
    CollectorConnect {
        addr: std::net::SocketAddr,
        #[source]
        source: ExportError,
    },
    #[error("flow version {0} is not one of 5, 9, 10")]
    UnsupportedFlowVersion(u16),
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
}

/// Errors surfaced by the capture source.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open capture source: {0}")]
    Open(String),
    #[error("failed to apply capture filter `{filter}`: {source}")]
    Filter { filter: String, source: String },
    #[error("live interface read failed: {0}")]
    Transient(String),
    #[error("offline replay file exhausted")]
    ReplayExhausted,
}

/// Errors surfaced by the export path. Most of these are logged and
/// swallowed rather than propagated, per spec §7; this type exists so the
/// emitter has something concrete to log and count.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("collector send failed: {0}")]
    Send(#[from] std::io::Error),
    #[error("no collectors reachable")]
    NoReachableCollectors,
}
