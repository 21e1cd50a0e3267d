//! Wire writers for the three export versions (spec §4.6/§6).
//!
//! NetFlow v5 reuses [`crate::wire::static_versions::v5::V5::to_be_bytes`]
//! directly: v5 has no templates, so a fixed record shape is exactly what's
//! needed. v9 and IPFIX share a template-driven writer built on the same
//! byte-concatenation style, generalized to an arbitrary ordered field list
//! resolved by [`crate::export::template::Template`].

use std::time::Duration;

use crate::export::template::Template;
use crate::flow::FlowRecord;
use crate::plugin::PluginRegistry;
use crate::wire::static_versions::v5::{FlowSet as V5FlowSet, Header as V5Header, V5};
use crate::wire::variable_versions::ipfix_lookup::NTOP_ENTERPRISE_ID;

pub const V5_MAX_RECORDS_PER_PACKET: usize = 30;

/// Maximum payload the probe targets per export packet, matching the
/// original probe's conservative default MTU assumption.
pub const TARGET_PACKET_BYTES: usize = 1440;

/// `floor(TARGET_PACKET_BYTES / flow_size) - 1` (spec §4.6): leaves room for
/// one template-flowset retransmit riding along in the same packet.
pub fn max_records_per_packet(flow_record_size: usize) -> usize {
    if flow_record_size == 0 {
        return 0;
    }
    (TARGET_PACKET_BYTES / flow_record_size).saturating_sub(1).max(1)
}

/// Build one NetFlow v5 packet from up to [`V5_MAX_RECORDS_PER_PACKET`]
/// flows. `boot_time` anchors `sys_up_time`; `flow_sequence` is the running
/// export sequence counter.
pub fn encode_v5_packet(
    flows: &[FlowRecord],
    boot_time: std::time::Instant,
    now: std::time::Instant,
    unix_secs: u32,
    unix_nsecs: u32,
    flow_sequence: u32,
    sampling_interval: u16,
) -> Vec<u8> {
    let sets = flows
        .iter()
        .take(V5_MAX_RECORDS_PER_PACKET)
        .map(|flow| {
            let (src, dst) = match (flow.fingerprint.src_addr, flow.fingerprint.dst_addr) {
                (std::net::IpAddr::V4(s), std::net::IpAddr::V4(d)) => (s, d),
                _ => (std::net::Ipv4Addr::UNSPECIFIED, std::net::Ipv4Addr::UNSPECIFIED),
            };
            let first = flow
                .first_seen()
                .map(|t| t.saturating_duration_since(boot_time))
                .unwrap_or_default();
            let last = flow
                .last_seen()
                .map(|t| t.saturating_duration_since(boot_time))
                .unwrap_or_default();
            V5FlowSet {
                src_addr: src,
                dst_addr: dst,
                next_hop: std::net::Ipv4Addr::UNSPECIFIED,
                input: flow.fingerprint.input_if as u16,
                output: flow.output_if as u16,
                d_pkts: flow.forward.packets.min(u32::MAX as u64) as u32,
                d_octets: flow.forward.bytes.min(u32::MAX as u64) as u32,
                first,
                last,
                src_port: flow.fingerprint.src_port,
                dst_port: flow.fingerprint.dst_port,
                pad1: 0,
                tcp_flags: flow.forward.tcp_flags_or,
                protocol_number: flow.fingerprint.protocol,
                protocol_type: crate::wire::protocol::ProtocolTypes::from(flow.fingerprint.protocol),
                tos: flow.fingerprint.tos,
                src_as: flow.src_as.min(u16::MAX as u32) as u16,
                dst_as: flow.dst_as.min(u16::MAX as u32) as u16,
                src_mask: flow.src_mask,
                dst_mask: flow.dst_mask,
                pad2: 0,
            }
        })
        .collect::<Vec<_>>();

    let packet = V5 {
        header: V5Header {
            version: 5,
            count: sets.len() as u16,
            sys_up_time: now.saturating_duration_since(boot_time),
            unix_secs,
            unix_nsecs,
            flow_sequence,
            engine_type: 0,
            engine_id: 0,
            sampling_interval,
        },
        sets,
    };
    packet.to_be_bytes()
}

fn u16_field_bytes(n: usize, what: &str) -> u16 {
    u16::try_from(n).unwrap_or_else(|_| panic!("{what} exceeds u16 range ({n})"))
}

/// A resolved template's field ids and byte lengths, computed once and
/// reused for every template-set retransmit and data record.
pub struct WireTemplate<'a> {
    pub template_id: u16,
    pub fields: &'a Template,
    plugins: &'a PluginRegistry,
}

impl<'a> WireTemplate<'a> {
    pub fn new(template_id: u16, fields: &'a Template, plugins: &'a PluginRegistry) -> Self {
        Self {
            template_id,
            fields,
            plugins,
        }
    }

    fn field_ids(&self) -> Vec<(u16, u32, u16)> {
        self.fields
            .fields
            .iter()
            .map(|field| match field {
                crate::export::template::TemplateField::Core(core) => {
                    (core.field_type.clone() as u16, 0u32, core.length)
                }
                crate::export::template::TemplateField::Plugin {
                    plugin_id,
                    field_id,
                } => {
                    let enterprise = self
                        .plugins
                        .get(*plugin_id)
                        .and_then(|p| {
                            p.describe_fields()
                                .into_iter()
                                .find(|f| f.field_id == *field_id)
                        })
                        .map(|f| f.enterprise_number)
                        .unwrap_or(NTOP_ENTERPRISE_ID);
                    (*field_id, enterprise, 4)
                }
            })
            .collect()
    }

    /// NetFlow v9 template flowset (flowset id 0) for this template.
    pub fn encode_v9_template_set(&self) -> Vec<u8> {
        let field_ids = self.field_ids();
        let mut record = Vec::new();
        record.extend_from_slice(&self.template_id.to_be_bytes());
        record.extend_from_slice(&u16_field_bytes(field_ids.len(), "v9 field count").to_be_bytes());
        for (id, _enterprise, length) in &field_ids {
            record.extend_from_slice(&id.to_be_bytes());
            record.extend_from_slice(&length.to_be_bytes());
        }
        let length = 4 + record.len();
        let mut flowset = Vec::new();
        flowset.extend_from_slice(&0u16.to_be_bytes());
        flowset.extend_from_slice(&u16_field_bytes(length, "v9 template flowset length").to_be_bytes());
        flowset.extend(record);
        pad_to_4(&mut flowset);
        flowset
    }

    /// IPFIX template set (set id 2) for this template.
    pub fn encode_ipfix_template_set(&self) -> Vec<u8> {
        let field_ids = self.field_ids();
        let mut record = Vec::new();
        record.extend_from_slice(&self.template_id.to_be_bytes());
        record.extend_from_slice(&u16_field_bytes(field_ids.len(), "ipfix field count").to_be_bytes());
        for (id, enterprise, length) in &field_ids {
            if *enterprise != 0 {
                record.extend_from_slice(&(id | 0x8000).to_be_bytes());
                record.extend_from_slice(&length.to_be_bytes());
                record.extend_from_slice(&enterprise.to_be_bytes());
            } else {
                record.extend_from_slice(&id.to_be_bytes());
                record.extend_from_slice(&length.to_be_bytes());
            }
        }
        let length = 4 + record.len();
        let mut set = Vec::new();
        set.extend_from_slice(&2u16.to_be_bytes());
        set.extend_from_slice(&u16_field_bytes(length, "ipfix template set length").to_be_bytes());
        set.extend(record);
        pad_to_4(&mut set);
        set
    }

    /// A data set (v9 flowset id == template id; IPFIX set id == template
    /// id, which must be >= 256) holding one record per flow.
    pub fn encode_data_set(&self, flows: &[FlowRecord]) -> Vec<u8> {
        self.encode_data_set_where(flows, |_| true)
    }

    /// Same as [`Self::encode_data_set`], but only flows for which
    /// `filter` returns true are encoded. Used to split a batch containing
    /// both IPv4 and IPv6 flows across their respective v4/v6 templates
    /// (spec §3/§4.6/§6).
    pub fn encode_data_set_where(&self, flows: &[FlowRecord], mut filter: impl FnMut(&FlowRecord) -> bool) -> Vec<u8> {
        let mut records = Vec::new();
        let mut count = 0usize;
        for flow in flows.iter().filter(|f| filter(f)) {
            count += 1;
            for field in &self.fields.fields {
                let value = field
                    .extract(flow, self.plugins)
                    .map(|v| v.to_be_bytes().unwrap_or_default())
                    .unwrap_or_else(|| vec![0u8; field_byte_len(field)]);
                records.extend(value);
            }
        }
        if count == 0 {
            return Vec::new();
        }
        let length = 4 + records.len();
        let mut set = Vec::new();
        set.extend_from_slice(&self.template_id.to_be_bytes());
        set.extend_from_slice(&u16_field_bytes(length, "data set length").to_be_bytes());
        set.extend(records);
        pad_to_4(&mut set);
        set
    }

    /// Total encoded byte length of one data record for this template,
    /// used to derive a per-template records-per-packet budget (spec
    /// §4.6) instead of assuming the fixed v5 record size.
    pub fn record_byte_len(&self) -> usize {
        self.fields.fields.iter().map(field_byte_len).sum()
    }
}

fn field_byte_len(field: &crate::export::template::TemplateField) -> usize {
    match field {
        crate::export::template::TemplateField::Core(core) => core.length as usize,
        crate::export::template::TemplateField::Plugin { .. } => 4,
    }
}

fn pad_to_4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// NetFlow v9 packet header.
pub fn encode_v9_header(
    count: u16,
    sys_uptime: Duration,
    unix_secs: u32,
    flow_sequence: u32,
    source_id: u32,
) -> Vec<u8> {
    let mut header = Vec::with_capacity(20);
    header.extend_from_slice(&9u16.to_be_bytes());
    header.extend_from_slice(&count.to_be_bytes());
    header.extend_from_slice(&(sys_uptime.as_millis() as u32).to_be_bytes());
    header.extend_from_slice(&unix_secs.to_be_bytes());
    header.extend_from_slice(&flow_sequence.to_be_bytes());
    header.extend_from_slice(&source_id.to_be_bytes());
    header
}

/// IPFIX message header. `length` is the total message length including
/// this 16-byte header, filled in by the caller once the body is known.
pub fn encode_ipfix_header(
    length: u16,
    export_time: u32,
    sequence_number: u32,
    observation_domain_id: u32,
) -> Vec<u8> {
    let mut header = Vec::with_capacity(16);
    header.extend_from_slice(&10u16.to_be_bytes());
    header.extend_from_slice(&length.to_be_bytes());
    header.extend_from_slice(&export_time.to_be_bytes());
    header.extend_from_slice(&sequence_number.to_be_bytes());
    header.extend_from_slice(&observation_domain_id.to_be_bytes());
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::template::Template;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

    fn sample_flow() -> FlowRecord {
        let fingerprint = crate::fingerprint::Fingerprint {
            vlan_id: 0,
            src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            protocol: 6,
            src_port: 1234,
            dst_port: 443,
            tos: 0,
            input_if: 1,
            tunnel_id: 0,
        };
        let mut flow = FlowRecord::new(fingerprint);
        flow.observe_forward(1500, 0x02, Instant::now());
        flow
    }

    #[test]
    fn v5_packet_has_expected_header_count() {
        let flow = sample_flow();
        let now = Instant::now();
        let bytes = encode_v5_packet(&[flow], now, now, 0, 0, 1, 0);
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 5);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 1);
        assert_eq!(bytes.len(), 24 + 48);
    }

    #[test]
    fn v9_template_and_data_set_round_trip_lengths() {
        let plugins = PluginRegistry::new();
        let template = Template::parse("%IN_BYTES %IN_PKTS %L4_SRC_PORT", &plugins).unwrap();
        let wire = WireTemplate::new(256, &template, &plugins);
        let template_set = wire.encode_v9_template_set();
        assert_eq!(u16::from_be_bytes([template_set[0], template_set[1]]), 0);
        let flow = sample_flow();
        let data_set = wire.encode_data_set(std::slice::from_ref(&flow));
        assert_eq!(
            u16::from_be_bytes([data_set[0], data_set[1]]),
            256
        );
        assert_eq!(data_set.len() % 4, 0);
    }

    #[test]
    fn max_records_per_packet_leaves_template_headroom() {
        assert_eq!(max_records_per_packet(48), 29);
    }

    #[test]
    fn encode_data_set_where_filters_and_skips_empty() {
        let plugins = PluginRegistry::new();
        let template = Template::parse("%IN_BYTES %IN_PKTS %L4_SRC_PORT", &plugins).unwrap();
        let wire = WireTemplate::new(256, &template, &plugins);
        let flow = sample_flow();
        let filtered_out = wire.encode_data_set_where(std::slice::from_ref(&flow), |_| false);
        assert!(filtered_out.is_empty());
        let filtered_in = wire.encode_data_set_where(std::slice::from_ref(&flow), |_| true);
        assert!(!filtered_in.is_empty());
    }

    #[test]
    fn record_byte_len_sums_field_widths() {
        let plugins = PluginRegistry::new();
        let template = Template::parse("%IN_BYTES %IN_PKTS %L4_SRC_PORT", &plugins).unwrap();
        let wire = WireTemplate::new(256, &template, &plugins);
        assert_eq!(wire.record_byte_len(), 4 + 4 + 2);
    }
}
