//! Field catalog and template-macro parsing (spec §6 "template macro
//! syntax"). A template is an ordered list of fields named by a
//! `%FIELD_NAME` macro string; this module resolves those names against
//! the core IE catalog (grounded in
//! [`crate::wire::variable_versions::v9_lookup::DataFieldType`]) and,
//! failing that, against whatever plugins are registered.

use std::net::IpAddr;

use crate::error::ConfigError;
use crate::flow::FlowRecord;
use crate::plugin::{PluginId, PluginRegistry};
use crate::wire::variable_versions::data_number::{DataNumber, FieldValue};
use crate::wire::variable_versions::v9_lookup::DataFieldType;

/// One resolvable field: its macro name, its standard IE id/length, and how
/// to pull a value for it out of a [`FlowRecord`].
pub struct CoreField {
    pub name: &'static str,
    pub field_type: DataFieldType,
    pub length: u16,
    extractor: fn(&FlowRecord) -> Option<FieldValue>,
}

fn ipaddr_field(addr: IpAddr) -> FieldValue {
    match addr {
        IpAddr::V4(v4) => FieldValue::Ip4Addr(v4),
        IpAddr::V6(v6) => FieldValue::Ip6Addr(v6),
    }
}

macro_rules! core_field {
    ($name:expr, $ty:ident, $len:expr, $extract:expr) => {
        CoreField {
            name: $name,
            field_type: DataFieldType::$ty,
            length: $len,
            extractor: $extract,
        }
    };
}

/// The fixed set of fields this probe knows how to fill in without help
/// from a plugin. Ordered roughly the way nprobe-derived catalogs are: byte
/// and packet counters first, then the 5-tuple, then the rest.
pub static CORE_FIELDS: &[CoreField] = &[
    core_field!("IN_BYTES", INBYTES, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.forward.bytes.min(u32::MAX as u64) as u32)
    ))),
    core_field!("IN_PKTS", INPKTS, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.forward.packets.min(u32::MAX as u64) as u32)
    ))),
    core_field!("OUT_BYTES", OUTBYTES, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.reverse.bytes.min(u32::MAX as u64) as u32)
    ))),
    core_field!("OUT_PKTS", OUTPKTS, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.reverse.packets.min(u32::MAX as u64) as u32)
    ))),
    core_field!("PROTOCOL", PROTOCOL, 1, |f| Some(FieldValue::DataNumber(
        DataNumber::U8(f.fingerprint.protocol)
    ))),
    core_field!("SRC_TOS", SRCTOS, 1, |f| Some(FieldValue::DataNumber(
        DataNumber::U8(f.fingerprint.tos)
    ))),
    core_field!("TCP_FLAGS", TCPFLAGS, 1, |f| Some(FieldValue::DataNumber(
        DataNumber::U8(f.forward.tcp_flags_or | f.reverse.tcp_flags_or)
    ))),
    core_field!("L4_SRC_PORT", L4SRCPORT, 2, |f| Some(FieldValue::DataNumber(
        DataNumber::U16(f.fingerprint.src_port)
    ))),
    core_field!("L4_DST_PORT", L4DSTPORT, 2, |f| Some(FieldValue::DataNumber(
        DataNumber::U16(f.fingerprint.dst_port)
    ))),
    core_field!("IPV4_SRC_ADDR", IPV4SRCADDR, 4, |f| match f.fingerprint.src_addr {
        IpAddr::V4(_) => Some(ipaddr_field(f.fingerprint.src_addr)),
        IpAddr::V6(_) => None,
    }),
    core_field!("IPV4_DST_ADDR", IPV4DSTADDR, 4, |f| match f.fingerprint.dst_addr {
        IpAddr::V4(_) => Some(ipaddr_field(f.fingerprint.dst_addr)),
        IpAddr::V6(_) => None,
    }),
    core_field!("IPV6_SRC_ADDR", IPV6SRCADDR, 16, |f| match f.fingerprint.src_addr {
        IpAddr::V6(_) => Some(ipaddr_field(f.fingerprint.src_addr)),
        IpAddr::V4(_) => None,
    }),
    core_field!("IPV6_DST_ADDR", IPV6DSTADDR, 16, |f| match f.fingerprint.dst_addr {
        IpAddr::V6(_) => Some(ipaddr_field(f.fingerprint.dst_addr)),
        IpAddr::V4(_) => None,
    }),
    core_field!("SRC_MASK", SRCMASK, 1, |f| Some(FieldValue::DataNumber(
        DataNumber::U8(f.src_mask)
    ))),
    core_field!("DST_MASK", DSTMASK, 1, |f| Some(FieldValue::DataNumber(
        DataNumber::U8(f.dst_mask)
    ))),
    core_field!("SRC_AS", SRCAS, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.src_as)
    ))),
    core_field!("DST_AS", DSTAS, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.dst_as)
    ))),
    core_field!("INPUT_SNMP", INPUTSNMP, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.fingerprint.input_if)
    ))),
    core_field!("OUTPUT_SNMP", OUTPUTSNMP, 4, |f| Some(FieldValue::DataNumber(
        DataNumber::U32(f.output_if)
    ))),
    core_field!("SRC_VLAN", SRCVLAN, 2, |f| Some(FieldValue::DataNumber(
        DataNumber::U16(f.fingerprint.vlan_id)
    ))),
    core_field!("ICMP_TYPE", ICMPTYPE, 2, |f| f.icmp.as_ref().map(|icmp| {
        FieldValue::DataNumber(DataNumber::U16(
            (u16::from(icmp.icmp_type) << 8) | u16::from(icmp.icmp_code),
        ))
    })),
    core_field!("MPLS_LABEL_1", MPLSLABEL1, 3, |f| f
        .mpls_labels
        .first()
        .map(|l| FieldValue::DataNumber(DataNumber::U24(*l)))),
];

pub fn lookup_core(name: &str) -> Option<&'static CoreField> {
    CORE_FIELDS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

/// One field in a resolved template, either core or contributed by a
/// plugin.
#[derive(Clone, Copy)]
pub enum TemplateField {
    Core(&'static CoreField),
    Plugin { plugin_id: PluginId, field_id: u16 },
}

impl TemplateField {
    pub fn name(&self, plugins: &PluginRegistry) -> String {
        match self {
            TemplateField::Core(field) => field.name.to_string(),
            TemplateField::Plugin {
                plugin_id,
                field_id,
            } => plugins
                .get(*plugin_id)
                .and_then(|p| p.describe_fields().into_iter().find(|f| f.field_id == *field_id))
                .map(|f| f.name.to_string())
                .unwrap_or_else(|| format!("plugin[{plugin_id}]/{field_id}")),
        }
    }

    /// Produce the wire value for this field out of a flow, consulting the
    /// plugin registry for plugin-sourced fields.
    pub fn extract(&self, flow: &FlowRecord, plugins: &PluginRegistry) -> Option<FieldValue> {
        match self {
            TemplateField::Core(field) => (field.extractor)(flow),
            TemplateField::Plugin {
                plugin_id,
                field_id,
            } => {
                let plugin = plugins.get(*plugin_id)?;
                let data = flow
                    .plugin_data
                    .iter()
                    .find(|d| d.plugin_id == *plugin_id)
                    .map(|d| &d.data);
                plugin.serialize_field(*field_id, flow, data)
            }
        }
    }
}

/// A resolved, ordered field list ready to drive a template-set/data-set
/// writer (spec §4.6).
pub struct Template {
    pub fields: Vec<TemplateField>,
}

impl Template {
    /// Parse a whitespace-separated `%FIELD_NAME` macro string (spec §6).
    /// Core fields are matched by name first; anything unmatched is looked
    /// up against every registered plugin's `describe_fields()`.
    pub fn parse(macro_string: &str, plugins: &PluginRegistry) -> Result<Self, ConfigError> {
        let mut fields = Vec::new();
        for token in macro_string.split_whitespace() {
            let name = token.trim_start_matches('%');
            if let Some(core) = lookup_core(name) {
                fields.push(TemplateField::Core(core));
                continue;
            }
            let mut matched = false;
            for (plugin_id, plugin) in plugins.iter() {
                if let Some(field) = plugin
                    .describe_fields()
                    .into_iter()
                    .find(|f| f.name.eq_ignore_ascii_case(name))
                {
                    fields.push(TemplateField::Plugin {
                        plugin_id,
                        field_id: field.field_id,
                    });
                    matched = true;
                    break;
                }
            }
            if !matched {
                return Err(ConfigError::UnknownTemplateField(name.to_string()));
            }
        }
        if fields.is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }
        Ok(Self { fields })
    }

    /// Split this template into an IPv4-only and an IPv6-only variant (spec
    /// §3/§4.6/§6): every field is shared except the address fields, which
    /// are swapped for their address-family counterpart. A template with no
    /// address fields at all produces two identical variants.
    pub fn address_family_variants(&self) -> (Template, Template) {
        let mut v4_fields = Vec::with_capacity(self.fields.len());
        let mut v6_fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match field {
                TemplateField::Core(core) if core.name.eq_ignore_ascii_case("IPV4_SRC_ADDR") => {
                    v4_fields.push(*field);
                    v6_fields.push(TemplateField::Core(lookup_core("IPV6_SRC_ADDR").expect("core field")));
                }
                TemplateField::Core(core) if core.name.eq_ignore_ascii_case("IPV4_DST_ADDR") => {
                    v4_fields.push(*field);
                    v6_fields.push(TemplateField::Core(lookup_core("IPV6_DST_ADDR").expect("core field")));
                }
                TemplateField::Core(core) if core.name.eq_ignore_ascii_case("IPV6_SRC_ADDR") => {
                    v6_fields.push(*field);
                    v4_fields.push(TemplateField::Core(lookup_core("IPV4_SRC_ADDR").expect("core field")));
                }
                TemplateField::Core(core) if core.name.eq_ignore_ascii_case("IPV6_DST_ADDR") => {
                    v6_fields.push(*field);
                    v4_fields.push(TemplateField::Core(lookup_core("IPV4_DST_ADDR").expect("core field")));
                }
                other => {
                    v4_fields.push(*other);
                    v6_fields.push(*other);
                }
            }
        }
        (Template { fields: v4_fields }, Template { fields: v6_fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_core_fields() {
        let plugins = PluginRegistry::new();
        let template = Template::parse("%IN_BYTES %IN_PKTS %IPV4_SRC_ADDR", &plugins).unwrap();
        assert_eq!(template.fields.len(), 3);
    }

    #[test]
    fn rejects_unknown_field() {
        let plugins = PluginRegistry::new();
        let err = Template::parse("%NOT_A_REAL_FIELD", &plugins).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTemplateField(_)));
    }

    #[test]
    fn rejects_empty_template() {
        let plugins = PluginRegistry::new();
        let err = Template::parse("   ", &plugins).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTemplate));
    }

    #[test]
    fn address_family_variants_swap_ip_fields_only() {
        let plugins = PluginRegistry::new();
        let template = Template::parse("%IN_BYTES %IPV4_SRC_ADDR %IPV4_DST_ADDR", &plugins).unwrap();
        let (v4, v6) = template.address_family_variants();
        assert_eq!(v4.fields.len(), 3);
        assert_eq!(v6.fields.len(), 3);
        assert!(matches!(v4.fields[1], TemplateField::Core(f) if f.name == "IPV4_SRC_ADDR"));
        assert!(matches!(v6.fields[1], TemplateField::Core(f) if f.name == "IPV6_SRC_ADDR"));
        assert!(matches!(v4.fields[2], TemplateField::Core(f) if f.name == "IPV4_DST_ADDR"));
        assert!(matches!(v6.fields[2], TemplateField::Core(f) if f.name == "IPV6_DST_ADDR"));
    }
}
