//! IPv4 fragments of the same packet share an identification; the first
//! fragment's UDP ports are remembered and attributed to every later
//! continuation fragment that otherwise carries no transport header
//! (spec §4.1/§4.4).

use std::net::Ipv4Addr;
use std::time::Instant;

use flowprobe::decoder;
use flowprobe::fragment::FragmentTable;

const ETH_TYPE_IPV4: [u8; 2] = [0x08, 0x00];

fn eth_header() -> Vec<u8> {
    let mut eth = Vec::with_capacity(14);
    eth.extend_from_slice(&[6, 5, 4, 3, 2, 1]); // dst mac
    eth.extend_from_slice(&[1, 2, 3, 4, 5, 6]); // src mac
    eth.extend_from_slice(&ETH_TYPE_IPV4);
    eth
}

fn ipv4_header(
    total_len: u16,
    identification: u16,
    more_fragments: bool,
    fragment_offset_units: u16,
    protocol: u8,
    src: Ipv4Addr,
    dst: Ipv4Addr,
) -> Vec<u8> {
    let mut header = vec![0u8; 20];
    header[0] = 0x45;
    header[1] = 0;
    header[2..4].copy_from_slice(&total_len.to_be_bytes());
    header[4..6].copy_from_slice(&identification.to_be_bytes());
    let flags_and_offset = ((more_fragments as u16) << 13) | (fragment_offset_units & 0x1FFF);
    header[6..8].copy_from_slice(&flags_and_offset.to_be_bytes());
    header[8] = 64; // ttl
    header[9] = protocol;
    header[10..12].copy_from_slice(&[0, 0]); // checksum, unvalidated by the decoder
    header[12..16].copy_from_slice(&src.octets());
    header[16..20].copy_from_slice(&dst.octets());
    header
}

fn udp_header(src_port: u16, dst_port: u16, payload_len: u16) -> Vec<u8> {
    let mut udp = vec![0u8; 8];
    udp[0..2].copy_from_slice(&src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    udp[4..6].copy_from_slice(&(8 + payload_len).to_be_bytes());
    udp[6..8].copy_from_slice(&[0, 0]); // checksum, zero is valid (disabled)
    udp
}

#[test]
fn continuation_fragment_inherits_first_fragments_ports() {
    let fragments = FragmentTable::new();
    let now = Instant::now();
    let src = Ipv4Addr::new(10, 0, 0, 1);
    let dst = Ipv4Addr::new(10, 0, 0, 2);
    let identification = 0xBEEF;

    let first_payload = vec![0xAA; 16];
    let udp = udp_header(5353, 53, first_payload.len() as u16);
    let first_ip = ipv4_header(
        (20 + udp.len() + first_payload.len()) as u16,
        identification,
        true,
        0,
        17,
        src,
        dst,
    );
    let mut first_frame = eth_header();
    first_frame.extend(first_ip);
    first_frame.extend(udp);
    first_frame.extend(first_payload);

    let decoded_first = decoder::decode(&first_frame, 1, &fragments, now, decoder::LinkType::Ethernet, false, false).expect("first fragment decodes");
    assert_eq!(decoded_first.fingerprint.src_port, 5353);
    assert_eq!(decoded_first.fingerprint.dst_port, 53);
    assert!(!decoded_first.is_fragment_continuation);

    let second_payload = vec![0xBB; 32];
    let second_ip = ipv4_header(
        (20 + second_payload.len()) as u16,
        identification,
        false,
        2, // 2 * 8 = 16 bytes into the original datagram
        17,
        src,
        dst,
    );
    let mut second_frame = eth_header();
    second_frame.extend(second_ip);
    second_frame.extend(second_payload);

    let decoded_second =
        decoder::decode(&second_frame, 1, &fragments, now, decoder::LinkType::Ethernet, false, false).expect("continuation fragment decodes");
    assert!(decoded_second.is_fragment_continuation);
    assert_eq!(decoded_second.fingerprint.src_port, 5353);
    assert_eq!(decoded_second.fingerprint.dst_port, 53);
    assert_eq!(decoded_second.fingerprint.src_addr, decoded_first.fingerprint.src_addr);
}
