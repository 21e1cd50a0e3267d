//! Shared field-value machinery for the variable-length NetFlow v9 and IPFIX
//! wire formats: the typed post-parse value (`data_number::FieldValue`), the
//! standard field catalogs (`v9_lookup`, `ipfix_lookup`), per-exporter
//! template TTL tracking (`ttl`), cache instrumentation (`metrics`), and the
//! registry third parties use to teach the writer about vendor fields not
//! built in (`enterprise_registry`).

pub mod data_number;
pub mod enterprise_registry;
pub mod ipfix_lookup;
pub mod metrics;
pub mod ttl;
pub mod v9_lookup;
