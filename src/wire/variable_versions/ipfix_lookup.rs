//! IPFIX information element catalog.
//!
//! References:
//! - <https://www.iana.org/assignments/ipfix/ipfix.xhtml>
//! - <https://www.cisco.com/en/US/technologies/tk648/tk362/technologies_white_paper09186a00800a3db9.html>

use serde::Serialize;

/// IANA standard information elements (enterprise number 0).
///
/// This mirrors the NetFlow v9 field catalog in
/// [`super::v9_lookup::DataFieldType`] since IPFIX inherited the v9 element
/// registry and numbers most fields identically; a handful of IDs are
/// IPFIX-only and have no v9 counterpart.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
#[repr(u16)]
pub enum IANAIPFixField {
    OctetDeltaCount = 1,
    PacketDeltaCount = 2,
    ProtocolIdentifier = 4,
    IpClassOfService = 5,
    TcpControlBits = 6,
    SourceTransportPort = 7,
    SourceIPv4Address = 8,
    SourceIPv4PrefixLength = 9,
    IngressInterface = 10,
    DestinationTransportPort = 11,
    DestinationIPv4Address = 12,
    DestinationIPv4PrefixLength = 13,
    EgressInterface = 14,
    IpNextHopIPv4Address = 15,
    BgpSourceAsNumber = 16,
    BgpDestinationAsNumber = 17,
    BgpNextHopIPv4Address = 18,
    PostMCastPacketDeltaCount = 19,
    PostMCastOctetDeltaCount = 20,
    FlowEndSysUpTime = 21,
    FlowStartSysUpTime = 22,
    PostOctetDeltaCount = 23,
    PostPacketDeltaCount = 24,
    MinimumIpTotalLength = 25,
    MaximumIpTotalLength = 26,
    SourceIPv6Address = 27,
    DestinationIPv6Address = 28,
    SourceIPv6PrefixLength = 29,
    DestinationIPv6PrefixLength = 30,
    FlowLabelIPv6 = 31,
    IcmpTypeCodeIPv4 = 32,
    IgmpType = 33,
    SamplingInterval = 34,
    SamplingAlgorithm = 35,
    FlowActiveTimeout = 36,
    FlowIdleTimeout = 37,
    EngineType = 38,
    EngineId = 39,
    ExportedOctetTotalCount = 40,
    ExportedMessageTotalCount = 41,
    ExportedFlowRecordTotalCount = 42,
    SourceIPv4Prefix = 44,
    DestinationIPv4Prefix = 45,
    MplsTopLabelType = 46,
    MplsTopLabelIPv4Address = 47,
    SamplerId = 48,
    SamplerMode = 49,
    SamplerRandomInterval = 50,
    MinimumTtl = 52,
    MaximumTtl = 53,
    IdentificationIPv4 = 54,
    PostIpClassOfService = 55,
    SourceMacAddress = 56,
    PostDestinationMacAddress = 57,
    VlanId = 58,
    PostVlanId = 59,
    IpVersion = 60,
    FlowDirection = 61,
    IpNextHopIPv6Address = 62,
    BgpNextHopIPv6Address = 63,
    Ipv6ExtensionHeaders = 64,
    MplsTopLabelStackSection = 70,
    MplsLabelStackSection2 = 71,
    MplsLabelStackSection3 = 72,
    MplsLabelStackSection4 = 73,
    MplsLabelStackSection5 = 74,
    MplsLabelStackSection6 = 75,
    MplsLabelStackSection7 = 76,
    MplsLabelStackSection8 = 77,
    MplsLabelStackSection9 = 78,
    MplsLabelStackSection10 = 79,
    DestinationMacAddress = 80,
    PostSourceMacAddress = 81,
    InterfaceName = 82,
    InterfaceDescription = 83,
    SamplerName = 84,
    OctetTotalCount = 85,
    PacketTotalCount = 86,
    FragmentOffsetIPv4 = 88,
    ForwardingStatus = 89,
    MplsVpnRouteDistinguisher = 90,
    MplsTopLabelPrefixLength = 91,
    SrcTrafficIndex = 92,
    DstTrafficIndex = 93,
    ApplicationDescription = 94,
    ApplicationId = 95,
    ApplicationName = 96,
    PostIpDiffServCodePoint = 98,
    ReplicationFactor = 99,
    Layer2PacketSectionOffset = 102,
    Layer2PacketSectionSize = 103,
    Layer2PacketSectionData = 104,
    FlowStartSeconds = 150,
    FlowEndSeconds = 151,
    FlowStartMilliseconds = 152,
    FlowEndMilliseconds = 153,
    FlowStartMicroseconds = 154,
    FlowEndMicroseconds = 155,
    FlowStartNanoseconds = 156,
    FlowEndNanoseconds = 157,
    Unknown,
}

impl From<u16> for IANAIPFixField {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::OctetDeltaCount,
            2 => Self::PacketDeltaCount,
            4 => Self::ProtocolIdentifier,
            5 => Self::IpClassOfService,
            6 => Self::TcpControlBits,
            7 => Self::SourceTransportPort,
            8 => Self::SourceIPv4Address,
            9 => Self::SourceIPv4PrefixLength,
            10 => Self::IngressInterface,
            11 => Self::DestinationTransportPort,
            12 => Self::DestinationIPv4Address,
            13 => Self::DestinationIPv4PrefixLength,
            14 => Self::EgressInterface,
            15 => Self::IpNextHopIPv4Address,
            16 => Self::BgpSourceAsNumber,
            17 => Self::BgpDestinationAsNumber,
            18 => Self::BgpNextHopIPv4Address,
            19 => Self::PostMCastPacketDeltaCount,
            20 => Self::PostMCastOctetDeltaCount,
            21 => Self::FlowEndSysUpTime,
            22 => Self::FlowStartSysUpTime,
            23 => Self::PostOctetDeltaCount,
            24 => Self::PostPacketDeltaCount,
            25 => Self::MinimumIpTotalLength,
            26 => Self::MaximumIpTotalLength,
            27 => Self::SourceIPv6Address,
            28 => Self::DestinationIPv6Address,
            29 => Self::SourceIPv6PrefixLength,
            30 => Self::DestinationIPv6PrefixLength,
            31 => Self::FlowLabelIPv6,
            32 => Self::IcmpTypeCodeIPv4,
            33 => Self::IgmpType,
            34 => Self::SamplingInterval,
            35 => Self::SamplingAlgorithm,
            36 => Self::FlowActiveTimeout,
            37 => Self::FlowIdleTimeout,
            38 => Self::EngineType,
            39 => Self::EngineId,
            40 => Self::ExportedOctetTotalCount,
            41 => Self::ExportedMessageTotalCount,
            42 => Self::ExportedFlowRecordTotalCount,
            44 => Self::SourceIPv4Prefix,
            45 => Self::DestinationIPv4Prefix,
            46 => Self::MplsTopLabelType,
            47 => Self::MplsTopLabelIPv4Address,
            48 => Self::SamplerId,
            49 => Self::SamplerMode,
            50 => Self::SamplerRandomInterval,
            52 => Self::MinimumTtl,
            53 => Self::MaximumTtl,
            54 => Self::IdentificationIPv4,
            55 => Self::PostIpClassOfService,
            56 => Self::SourceMacAddress,
            57 => Self::PostDestinationMacAddress,
            58 => Self::VlanId,
            59 => Self::PostVlanId,
            60 => Self::IpVersion,
            61 => Self::FlowDirection,
            62 => Self::IpNextHopIPv6Address,
            63 => Self::BgpNextHopIPv6Address,
            64 => Self::Ipv6ExtensionHeaders,
            70 => Self::MplsTopLabelStackSection,
            71 => Self::MplsLabelStackSection2,
            72 => Self::MplsLabelStackSection3,
            73 => Self::MplsLabelStackSection4,
            74 => Self::MplsLabelStackSection5,
            75 => Self::MplsLabelStackSection6,
            76 => Self::MplsLabelStackSection7,
            77 => Self::MplsLabelStackSection8,
            78 => Self::MplsLabelStackSection9,
            79 => Self::MplsLabelStackSection10,
            80 => Self::DestinationMacAddress,
            81 => Self::PostSourceMacAddress,
            82 => Self::InterfaceName,
            83 => Self::InterfaceDescription,
            84 => Self::SamplerName,
            85 => Self::OctetTotalCount,
            86 => Self::PacketTotalCount,
            88 => Self::FragmentOffsetIPv4,
            89 => Self::ForwardingStatus,
            90 => Self::MplsVpnRouteDistinguisher,
            91 => Self::MplsTopLabelPrefixLength,
            92 => Self::SrcTrafficIndex,
            93 => Self::DstTrafficIndex,
            94 => Self::ApplicationDescription,
            95 => Self::ApplicationId,
            96 => Self::ApplicationName,
            98 => Self::PostIpDiffServCodePoint,
            99 => Self::ReplicationFactor,
            102 => Self::Layer2PacketSectionOffset,
            103 => Self::Layer2PacketSectionSize,
            104 => Self::Layer2PacketSectionData,
            150 => Self::FlowStartSeconds,
            151 => Self::FlowEndSeconds,
            152 => Self::FlowStartMilliseconds,
            153 => Self::FlowEndMilliseconds,
            154 => Self::FlowStartMicroseconds,
            155 => Self::FlowEndMicroseconds,
            156 => Self::FlowStartNanoseconds,
            157 => Self::FlowEndNanoseconds,
            _ => Self::Unknown,
        }
    }
}

impl From<IANAIPFixField> for u16 {
    fn from(value: IANAIPFixField) -> Self {
        value as u16
    }
}

/// Cisco enterprise-specific fields (enterprise number 9). Only the subset
/// ntop's probe and this crate's template macros actually reference.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
#[repr(u16)]
pub enum CiscoIPFixField {
    TransportPacketsExpected = 298,
    TransportRttMean = 300,
    ApplicationHttpUri = 12235,
    Unknown,
}

impl From<u16> for CiscoIPFixField {
    fn from(value: u16) -> Self {
        match value {
            298 => Self::TransportPacketsExpected,
            300 => Self::TransportRttMean,
            12235 => Self::ApplicationHttpUri,
            _ => Self::Unknown,
        }
    }
}

/// NetScaler enterprise-specific fields (enterprise number 5951).
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
#[repr(u16)]
pub enum NetscalerIPFixField {
    TransactionId = 140,
    ConnectionId = 141,
    Unknown,
}

impl From<u16> for NetscalerIPFixField {
    fn from(value: u16) -> Self {
        match value {
            140 => Self::TransactionId,
            141 => Self::ConnectionId,
            _ => Self::Unknown,
        }
    }
}

/// YAF enterprise-specific fields (enterprise number 6871).
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
#[repr(u16)]
pub enum YafIPFixField {
    PayloadEntropy = 35,
    EntropySourcePayload = 36,
    Unknown,
}

impl From<u16> for YafIPFixField {
    fn from(value: u16) -> Self {
        match value {
            35 => Self::PayloadEntropy,
            36 => Self::EntropySourcePayload,
            _ => Self::Unknown,
        }
    }
}

/// VMware enterprise-specific fields (enterprise number 6876).
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
#[repr(u16)]
pub enum VMWareIPFixField {
    VxlanId = 1,
    Unknown,
}

impl From<u16> for VMWareIPFixField {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::VxlanId,
            _ => Self::Unknown,
        }
    }
}

/// ntop's own enterprise fields (enterprise number 35632, `NTOP_ENTERPRISE_ID`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
#[repr(u16)]
pub enum NtopIPFixField {
    L7Protocol = 36880,
    L7ProtocolName = 36881,
    FlowUserName = 36882,
    Unknown,
}

impl From<u16> for NtopIPFixField {
    fn from(value: u16) -> Self {
        match value {
            36880 => Self::L7Protocol,
            36881 => Self::L7ProtocolName,
            36882 => Self::FlowUserName,
            _ => Self::Unknown,
        }
    }
}

/// The enterprise number ntop registers its own fields under.
pub const NTOP_ENTERPRISE_ID: u32 = 35632;
pub const IANA_ENTERPRISE_ID: u32 = 0;
pub const CISCO_ENTERPRISE_ID: u32 = 9;
pub const NETSCALER_ENTERPRISE_ID: u32 = 5951;
pub const YAF_ENTERPRISE_ID: u32 = 6871;
pub const VMWARE_ENTERPRISE_ID: u32 = 6876;

/// A resolved IPFIX information element, tagged by the enterprise number it
/// was looked up under. The high bit of the wire field id marks an
/// enterprise-scoped element per RFC 7011 §3.2; this type is what the
/// element id plus that bit resolve to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
pub enum IPFixField {
    Iana(IANAIPFixField),
    Cisco(CiscoIPFixField),
    Netscaler(NetscalerIPFixField),
    Yaf(YafIPFixField),
    VMWare(VMWareIPFixField),
    Ntop(NtopIPFixField),
    /// An enterprise field whose enterprise number has no dedicated catalog above.
    OtherEnterprise { enterprise_number: u32, field_id: u16 },
}

impl IPFixField {
    /// Resolve a field id against an (optional) enterprise number.
    pub fn resolve(field_id: u16, enterprise_number: Option<u32>) -> Self {
        match enterprise_number {
            None | Some(IANA_ENTERPRISE_ID) => Self::Iana(IANAIPFixField::from(field_id)),
            Some(CISCO_ENTERPRISE_ID) => Self::Cisco(CiscoIPFixField::from(field_id)),
            Some(NETSCALER_ENTERPRISE_ID) => Self::Netscaler(NetscalerIPFixField::from(field_id)),
            Some(YAF_ENTERPRISE_ID) => Self::Yaf(YafIPFixField::from(field_id)),
            Some(VMWARE_ENTERPRISE_ID) => Self::VMWare(VMWareIPFixField::from(field_id)),
            Some(NTOP_ENTERPRISE_ID) => Self::Ntop(NtopIPFixField::from(field_id)),
            Some(other) => Self::OtherEnterprise {
                enterprise_number: other,
                field_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_standard_fields() {
        assert_eq!(
            IPFixField::resolve(8, None),
            IPFixField::Iana(IANAIPFixField::SourceIPv4Address)
        );
    }

    #[test]
    fn resolves_ntop_enterprise_fields() {
        assert_eq!(
            IPFixField::resolve(36880, Some(NTOP_ENTERPRISE_ID)),
            IPFixField::Ntop(NtopIPFixField::L7Protocol)
        );
    }

    #[test]
    fn falls_back_to_other_enterprise() {
        assert_eq!(
            IPFixField::resolve(1, Some(99999)),
            IPFixField::OtherEnterprise {
                enterprise_number: 99999,
                field_id: 1
            }
        );
    }
}
