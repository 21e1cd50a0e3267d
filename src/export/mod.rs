//! Export buffering and emission (spec §4.6): template/record assembly in
//! v5/v9/IPFIX, transport dispatch, pacing, and template retransmit.

pub mod collector;
pub mod emitter;
pub mod template;
pub mod writer;

pub use collector::{build_collector, Collector, TransportKind};
pub use emitter::{DispatchMode, Emitter, TemplateRetransmitTracker};
pub use template::Template;
