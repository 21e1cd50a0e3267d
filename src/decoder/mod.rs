//! Packet decoding (spec §4.1): link layer (Ethernet/VLAN/MPLS/PPPoE, Linux
//! "any", raw IP, BSD null/loopback, PPP), IPv4/IPv6, one level of tunnel
//! unwrapping, and TCP/UDP/ICMP transport headers, built on `etherparse`'s
//! header-slice parsers the same way the teacher's own pcap-driven tests
//! read packets. Non-Ethernet link types and MPLS/PPPoE framing have no
//! `etherparse` slice type, so those are parsed by hand below.

pub mod tunnel;

use std::net::IpAddr;
use std::time::Instant;

use etherparse::{
    EtherType, Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, SingleVlanHeaderSlice,
    TcpHeaderSlice, UdpHeaderSlice,
};

use crate::fingerprint::Fingerprint;
use crate::flow::IcmpInfo;
use crate::fragment::{FragmentKey, FragmentTable};

const ETHERTYPE_MPLS_UNICAST: u16 = 0x8847;
const ETHERTYPE_MPLS_MULTICAST: u16 = 0x8848;
const ETHERTYPE_PPPOE_SESSION: u16 = 0x8864;
const PPP_PROTO_IPV4: u16 = 0x0021;
const PPP_PROTO_IPV6: u16 = 0x0057;
const GTP_U_PORT: u16 = 2152;
/// Refuse to peel more than this many MPLS labels off one frame; a well
/// formed stack is rarely more than 2-3 deep and this bounds the loop
/// against a corrupt or adversarial capture.
const MAX_MPLS_LABELS: usize = 8;

/// Capture link type, matching the pcap `DLT_*` families named in spec
/// §4.1. The capture layer maps its interface/file's actual datalink onto
/// one of these before calling [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Linux "cooked" capture (`DLT_LINUX_SLL`), seen on the `any` pseudo
    /// interface.
    LinuxCooked,
    /// No link layer at all; the frame starts directly at the IP header.
    RawIp,
    /// BSD null/loopback (`DLT_NULL`): a 4-byte host-byte-order address
    /// family header.
    NullLoopback,
    /// Point-to-point (`DLT_PPP`): an optional `0xff03` address/control
    /// prefix followed by a 2-byte PPP protocol field.
    Ppp,
}

/// One fully decoded packet, ready to be folded into the flow hash.
pub struct DecodedPacket {
    pub fingerprint: Fingerprint,
    pub bytes: u32,
    pub tcp_flags: u8,
    pub icmp: Option<IcmpInfo>,
    pub mpls_labels: Vec<u32>,
    pub is_fragment_continuation: bool,
    pub payload: Vec<u8>,
    /// Packets this decode stands for; always 1 except the smart UDP
    /// fragment shortcut's synthetic first-fragment credit (spec §4.2).
    pub packet_count: u32,
}

struct L3Info {
    src_addr: IpAddr,
    dst_addr: IpAddr,
    protocol: u8,
    tos: u8,
    identification: u16,
    fragment_offset: u16,
    more_fragments: bool,
    header_len: usize,
}

fn parse_ipv4(bytes: &[u8]) -> Option<(L3Info, &[u8])> {
    let header = Ipv4HeaderSlice::from_slice(bytes).ok()?;
    let header_len = header.slice().len();
    let info = L3Info {
        src_addr: IpAddr::V4(header.source_addr()),
        dst_addr: IpAddr::V4(header.destination_addr()),
        protocol: header.protocol().0,
        tos: header.dscp().value() << 2 | header.ecn().value(),
        identification: header.identification(),
        fragment_offset: header.fragments_offset().value(),
        more_fragments: header.more_fragments(),
        header_len,
    };
    Some((info, &bytes[header_len..]))
}

fn parse_ipv6(bytes: &[u8]) -> Option<(L3Info, &[u8])> {
    let header = Ipv6HeaderSlice::from_slice(bytes).ok()?;
    // Resolved Open Question: IPv6 payload length is `ntohs(ip6_plen)`
    // directly, no double subtraction of the fixed 40-byte header.
    let info = L3Info {
        src_addr: IpAddr::V6(header.source_addr()),
        dst_addr: IpAddr::V6(header.destination_addr()),
        protocol: header.next_header().0,
        tos: header.traffic_class(),
        identification: 0,
        fragment_offset: 0,
        more_fragments: false,
        header_len: 40,
    };
    Some((info, &bytes[40..]))
}

struct L4Info {
    src_port: u16,
    dst_port: u16,
    tcp_flags: u8,
    icmp: Option<IcmpInfo>,
}

fn parse_transport(protocol: u8, bytes: &[u8]) -> Option<L4Info> {
    match protocol {
        6 => {
            let tcp = TcpHeaderSlice::from_slice(bytes).ok()?;
            let mut flags = 0u8;
            if tcp.fin() {
                flags |= 0x01;
            }
            if tcp.syn() {
                flags |= 0x02;
            }
            if tcp.rst() {
                flags |= 0x04;
            }
            if tcp.psh() {
                flags |= 0x08;
            }
            if tcp.ack() {
                flags |= 0x10;
            }
            if tcp.urg() {
                flags |= 0x20;
            }
            Some(L4Info {
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                tcp_flags: flags,
                icmp: None,
            })
        }
        17 => {
            let udp = UdpHeaderSlice::from_slice(bytes).ok()?;
            Some(L4Info {
                src_port: udp.source_port(),
                dst_port: udp.destination_port(),
                tcp_flags: 0,
                icmp: None,
            })
        }
        1 => {
            // ICMPv4: fixed 8-byte header, type/code in the first two bytes
            // (resolved Open Question: payload starts after this header).
            let icmp_type = *bytes.first()?;
            let icmp_code = *bytes.get(1)?;
            Some(L4Info {
                src_port: 0,
                dst_port: 0,
                tcp_flags: 0,
                icmp: Some(IcmpInfo {
                    icmp_type,
                    icmp_code,
                }),
            })
        }
        58 => {
            // ICMPv6: same 8-byte fixed-header shift as ICMPv4.
            let icmp_type = *bytes.first()?;
            let icmp_code = *bytes.get(1)?;
            Some(L4Info {
                src_port: 0,
                dst_port: 0,
                tcp_flags: 0,
                icmp: Some(IcmpInfo {
                    icmp_type,
                    icmp_code,
                }),
            })
        }
        _ => None,
    }
}

/// The result of stripping a frame's link layer: the ethertype of whatever
/// follows, the outermost VLAN id (0 if untagged), any MPLS labels peeled
/// off (outermost first), and the remaining bytes.
struct LinkLayerInfo<'a> {
    ether_type: u16,
    vlan_id: u16,
    mpls_labels: Vec<u32>,
    rest: &'a [u8],
}

/// Strip an Ethernet2 header, any single/double VLAN tags, one MPLS label
/// stack, and a PPPoE session header, in that order -- each only present if
/// the prior layer's type code says so.
fn strip_ethernet(bytes: &[u8]) -> Option<LinkLayerInfo<'_>> {
    let eth = Ethernet2HeaderSlice::from_slice(bytes).ok()?;
    let mut ether_type = eth.ether_type();
    let mut rest = &bytes[eth.slice().len()..];
    let mut vlan_id = 0u16;
    while ether_type == EtherType::VLAN_TAGGED_FRAME || ether_type == EtherType::PROVIDER_BRIDGING {
        let vlan = SingleVlanHeaderSlice::from_slice(rest).ok()?;
        vlan_id = vlan.vlan_identifier().value();
        ether_type = vlan.ether_type();
        rest = &rest[vlan.slice().len()..];
    }

    if ether_type.0 == ETHERTYPE_MPLS_UNICAST || ether_type.0 == ETHERTYPE_MPLS_MULTICAST {
        let (mpls_labels, after_mpls) = peel_mpls_stack(rest)?;
        let ether_type = guess_ip_version_ethertype(after_mpls)?;
        return Some(LinkLayerInfo { ether_type, vlan_id, mpls_labels, rest: after_mpls });
    }

    if ether_type.0 == ETHERTYPE_PPPOE_SESSION {
        let (ether_type, after_pppoe) = strip_pppoe(rest)?;
        return Some(LinkLayerInfo { ether_type, vlan_id, mpls_labels: Vec::new(), rest: after_pppoe });
    }

    Some(LinkLayerInfo { ether_type: ether_type.0, vlan_id, mpls_labels: Vec::new(), rest })
}

/// Peel a stack of 4-byte MPLS label entries (20-bit label, 3-bit exp,
/// bottom-of-stack bit, 8-bit TTL) until the bottom-of-stack bit is set.
fn peel_mpls_stack(bytes: &[u8]) -> Option<(Vec<u32>, &[u8])> {
    let mut labels = Vec::new();
    let mut rest = bytes;
    loop {
        if rest.len() < 4 || labels.len() >= MAX_MPLS_LABELS {
            return None;
        }
        let word = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        labels.push(word >> 12);
        let bottom_of_stack = word & 0x100 != 0;
        rest = &rest[4..];
        if bottom_of_stack {
            return Some((labels, rest));
        }
    }
}

/// PPPoE session header: ver/type(1) code(1) session_id(2) length(2),
/// followed by a 2-byte PPP protocol field.
fn strip_pppoe(bytes: &[u8]) -> Option<(u16, &[u8])> {
    let rest = bytes.get(6..)?;
    let ppp_proto = u16::from_be_bytes([*rest.first()?, *rest.get(1)?]);
    let rest = &rest[2..];
    match ppp_proto {
        PPP_PROTO_IPV4 => Some((EtherType::IPV4.0, rest)),
        PPP_PROTO_IPV6 => Some((EtherType::IPV6.0, rest)),
        _ => None,
    }
}

/// Linux "any" pseudo-interface capture (`DLT_LINUX_SLL`): packet_type(2)
/// arphrd_type(2) addr_len(2) addr(8) protocol(2), no VLAN/MPLS framing.
fn strip_linux_cooked(bytes: &[u8]) -> Option<LinkLayerInfo<'_>> {
    let ether_type = u16::from_be_bytes([*bytes.get(14)?, *bytes.get(15)?]);
    Some(LinkLayerInfo { ether_type, vlan_id: 0, mpls_labels: Vec::new(), rest: bytes.get(16..)? })
}

/// No link layer at all; sniff the IP version off the first nibble.
fn strip_raw_ip(bytes: &[u8]) -> Option<LinkLayerInfo<'_>> {
    let ether_type = guess_ip_version_ethertype(bytes)?;
    Some(LinkLayerInfo { ether_type, vlan_id: 0, mpls_labels: Vec::new(), rest: bytes })
}

/// BSD null/loopback (`DLT_NULL`): 4-byte host-byte-order address family.
fn strip_null_loopback(bytes: &[u8]) -> Option<LinkLayerInfo<'_>> {
    let header = bytes.get(0..4)?;
    let family = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
    let ether_type = match family {
        2 => EtherType::IPV4.0,
        24 | 28 | 30 => EtherType::IPV6.0,
        _ => return None,
    };
    Some(LinkLayerInfo { ether_type, vlan_id: 0, mpls_labels: Vec::new(), rest: &bytes[4..] })
}

/// Point-to-point (`DLT_PPP`): an optional `0xff03` address/control prefix
/// then a 2-byte PPP protocol field.
fn strip_ppp(bytes: &[u8]) -> Option<LinkLayerInfo<'_>> {
    let bytes = if bytes.first() == Some(&0xff) && bytes.get(1) == Some(&0x03) {
        &bytes[2..]
    } else {
        bytes
    };
    let ppp_proto = u16::from_be_bytes([*bytes.first()?, *bytes.get(1)?]);
    let rest = &bytes[2..];
    let ether_type = match ppp_proto {
        PPP_PROTO_IPV4 => EtherType::IPV4.0,
        PPP_PROTO_IPV6 => EtherType::IPV6.0,
        _ => return None,
    };
    Some(LinkLayerInfo { ether_type, vlan_id: 0, mpls_labels: Vec::new(), rest })
}

fn guess_ip_version_ethertype(bytes: &[u8]) -> Option<u16> {
    match bytes.first()? >> 4 {
        4 => Some(EtherType::IPV4.0),
        6 => Some(EtherType::IPV6.0),
        _ => None,
    }
}

fn strip_link_layer(link_type: LinkType, bytes: &[u8]) -> Option<LinkLayerInfo<'_>> {
    match link_type {
        LinkType::Ethernet => strip_ethernet(bytes),
        LinkType::LinuxCooked => strip_linux_cooked(bytes),
        LinkType::RawIp => strip_raw_ip(bytes),
        LinkType::NullLoopback => strip_null_loopback(bytes),
        LinkType::Ppp => strip_ppp(bytes),
    }
}

/// Decode one captured frame into a flow-attributable packet. `input_if`
/// is the ingress interface index supplied by the capture layer.
/// `tunnel_mode` gates GRE/ESP/GTP-U unwrapping (spec §4.1); disabled by
/// default since it costs an extra parse attempt on every packet that isn't
/// already a recognized transport. `smart_udp_fragments` gates the
/// ignore-and-credit UDP fragment accounting shortcut (spec §4.2).
pub fn decode(
    raw: &[u8],
    input_if: u32,
    fragments: &FragmentTable,
    now: Instant,
    link_type: LinkType,
    tunnel_mode: bool,
    smart_udp_fragments: bool,
) -> Option<DecodedPacket> {
    let link = strip_link_layer(link_type, raw)?;

    let (l3, after_l3) = match link.ether_type {
        t if t == EtherType::IPV4.0 => parse_ipv4(link.rest)?,
        t if t == EtherType::IPV6.0 => parse_ipv6(link.rest)?,
        _ => return None,
    };

    let bytes = raw.len() as u32;
    let is_fragment = l3.more_fragments || l3.fragment_offset > 0;

    if is_fragment && l3.protocol == 17 && smart_udp_fragments {
        if l3.fragment_offset > 0 {
            // Non-first UDP fragments carry no L4 header and are ignored
            // outright under this accounting mode.
            return None;
        }
        let l4 = parse_transport(l3.protocol, after_l3)?;
        let credited_bytes = after_l3.len() as u32 + 2 * l3.header_len as u32;
        let mut packet = finish(l3, link.vlan_id, link.mpls_labels, input_if, credited_bytes, l4, after_l3);
        packet.packet_count = 2;
        return Some(packet);
    }

    if is_fragment {
        let key = FragmentKey {
            src_addr: l3.src_addr,
            dst_addr: l3.dst_addr,
            protocol: l3.protocol,
            identification: l3.identification,
        };
        if l3.fragment_offset == 0 {
            if let Some(l4) = parse_transport(l3.protocol, after_l3) {
                fragments.record_first_fragment(key, l4.src_port, l4.dst_port, now);
                return Some(finish(l3, link.vlan_id, link.mpls_labels, input_if, bytes, l4, after_l3));
            }
            return None;
        }
        let (src_port, dst_port) = fragments.lookup_ports(&key, now).unwrap_or((0, 0));
        let l4 = L4Info {
            src_port,
            dst_port,
            tcp_flags: 0,
            icmp: None,
        };
        let mut packet = finish(l3, link.vlan_id, link.mpls_labels, input_if, bytes, l4, after_l3);
        packet.is_fragment_continuation = true;
        return Some(packet);
    }

    if tunnel_mode && l3.protocol == 17 {
        if let Some(packet) = try_gtp_u(after_l3, link.vlan_id, &link.mpls_labels, input_if, bytes) {
            return Some(packet);
        }
    }

    if let Some(l4) = parse_transport(l3.protocol, after_l3) {
        return Some(finish(l3, link.vlan_id, link.mpls_labels, input_if, bytes, l4, after_l3));
    }

    if !tunnel_mode {
        return None;
    }

    // One level of tunnel unwrapping for GRE (47) / ESP (50); GTP-U over
    // UDP is tried above, before falling through to a plain transport
    // match (spec §4.1 "one nesting level").
    if let Some(inner) = tunnel::unwrap(l3.protocol, after_l3) {
        let tunnel_id = inner.tunnel_id;
        let (inner_l3, inner_after_l3) = match inner.ip_version {
            4 => parse_ipv4(inner.payload)?,
            6 => parse_ipv6(inner.payload)?,
            _ => return None,
        };
        let l4 = parse_transport(inner_l3.protocol, inner_after_l3)?;
        let mut packet = finish(inner_l3, link.vlan_id, Vec::new(), input_if, bytes, l4, inner_after_l3);
        packet.fingerprint.tunnel_id = tunnel_id;
        return Some(packet);
    }

    None
}

/// Check a UDP datagram for GTP-U encapsulation (dst or src port 2152) and,
/// if so, unwrap and decode the inner IP packet.
fn try_gtp_u(
    after_l3: &[u8],
    vlan_id: u16,
    mpls_labels: &[u32],
    input_if: u32,
    bytes: u32,
) -> Option<DecodedPacket> {
    let udp = UdpHeaderSlice::from_slice(after_l3).ok()?;
    let dst_port = udp.destination_port();
    if dst_port != GTP_U_PORT && udp.source_port() != GTP_U_PORT {
        return None;
    }
    let udp_payload = &after_l3[udp.slice().len()..];
    let inner = tunnel::unwrap_gtp_u(udp_payload, dst_port)?;
    let tunnel_id = inner.tunnel_id;
    let (inner_l3, inner_after_l3) = match inner.ip_version {
        4 => parse_ipv4(inner.payload)?,
        6 => parse_ipv6(inner.payload)?,
        _ => return None,
    };
    let l4 = parse_transport(inner_l3.protocol, inner_after_l3)?;
    let mut packet = finish(inner_l3, vlan_id, mpls_labels.to_vec(), input_if, bytes, l4, inner_after_l3);
    packet.fingerprint.tunnel_id = tunnel_id;
    Some(packet)
}

fn finish(
    l3: L3Info,
    vlan_id: u16,
    mpls_labels: Vec<u32>,
    input_if: u32,
    bytes: u32,
    l4: L4Info,
    payload: &[u8],
) -> DecodedPacket {
    let fingerprint = Fingerprint {
        vlan_id,
        src_addr: l3.src_addr,
        dst_addr: l3.dst_addr,
        protocol: l3.protocol,
        src_port: l4.src_port,
        dst_port: l4.dst_port,
        tos: l3.tos,
        input_if,
        tunnel_id: 0,
    };
    DecodedPacket {
        fingerprint,
        bytes,
        tcp_flags: l4.tcp_flags,
        icmp: l4.icmp,
        mpls_labels,
        is_fragment_continuation: false,
        payload: payload.to_vec(),
        packet_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_udp_v4_packet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        use etherparse::PacketBuilder;
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(src_port, dst_port);
        let mut out = Vec::new();
        builder.write(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn decodes_udp_over_ipv4() {
        let table = FragmentTable::new();
        let packet = build_udp_v4_packet(5353, 53, b"hello");
        let decoded = decode(&packet, 1, &table, Instant::now(), LinkType::Ethernet, false, false).expect("decode");
        assert_eq!(decoded.fingerprint.src_port, 5353);
        assert_eq!(decoded.fingerprint.dst_port, 53);
        assert_eq!(decoded.fingerprint.protocol, 17);
        assert_eq!(decoded.packet_count, 1);
    }

    #[test]
    fn raw_ip_link_type_has_no_ethernet_header() {
        let table = FragmentTable::new();
        let packet = build_udp_v4_packet(5353, 53, b"hello");
        // Strip the 14-byte Ethernet2 header off the synthetic frame to get
        // a bare IPv4 datagram, the way DLT_RAW captures arrive.
        let raw_ip = &packet[14..];
        let decoded = decode(raw_ip, 1, &table, Instant::now(), LinkType::RawIp, false, false).expect("decode");
        assert_eq!(decoded.fingerprint.dst_port, 53);
    }

    #[test]
    fn smart_udp_fragment_mode_ignores_non_first_fragments() {
        let table = FragmentTable::new();
        let mut packet = build_udp_v4_packet(5353, 53, b"hello");
        // Flip the IPv4 fragment offset field (bytes 20-21 of the Ethernet2
        // frame) to a nonzero value, simulating a non-first fragment.
        packet[20] = 0x00;
        packet[21] = 0x01;
        let decoded = decode(&packet, 1, &table, Instant::now(), LinkType::Ethernet, false, true);
        assert!(decoded.is_none());
    }

    #[test]
    fn smart_udp_fragment_mode_credits_first_fragment_double() {
        let table = FragmentTable::new();
        // more_fragments bit is byte 20's top bit in the Ethernet2 frame.
        let mut packet = build_udp_v4_packet(5353, 53, b"hello");
        packet[20] = 0x20;
        let decoded = decode(&packet, 1, &table, Instant::now(), LinkType::Ethernet, false, true).expect("decode");
        assert_eq!(decoded.packet_count, 2);
    }
}
