//! Wire-format building blocks: the IANA protocol catalog, the fixed NetFlow
//! v5 layout, and the field-value/template machinery shared by the
//! variable-length v9 and IPFIX formats.
//!
//! These types are reused from both directions: the [`crate::export`] module
//! drives them to serialize [`crate::flow::FlowRecord`]s onto the wire, and
//! they double as the decode side used by this crate's own tests to assert
//! byte-for-byte correctness of what the emitter produces.

pub mod protocol;
pub mod static_versions;
pub mod variable_versions;
