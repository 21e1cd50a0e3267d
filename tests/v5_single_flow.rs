//! A single UDP packet decoded, folded into a flow, force-drained, and
//! encoded as a NetFlow v5 export packet: the end-to-end path with no
//! bidirectional merge or templates involved.

use std::time::Instant;

use etherparse::PacketBuilder;
use flowprobe::decoder;
use flowprobe::export::writer::encode_v5_packet;
use flowprobe::flow::{scanner, ExpiryReason, Shard};
use flowprobe::fragment::FragmentTable;

fn build_udp_packet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .udp(src_port, dst_port);
    let mut out = Vec::new();
    builder.write(&mut out, payload).unwrap();
    out
}

#[test]
fn single_flow_round_trips_to_a_v5_packet() {
    let fragments = FragmentTable::new();
    let now = Instant::now();
    let frame = build_udp_packet(5353, 53, b"hello");
    let decoded = decoder::decode(&frame, 1, &fragments, now, decoder::LinkType::Ethernet, false, false).expect("decodes");

    let shard = Shard::new(16, 100);
    let outcome = shard.lookup_or_insert(
        decoded.fingerprint.clone(),
        decoded.bytes,
        decoded.tcp_flags,
        now,
        false,
        &decoded.payload,
        |_| {},
        |_, _| {},
    );
    assert!(matches!(outcome, flowprobe::flow::LookupOutcome::Created));

    let drained = scanner::drain_all(std::slice::from_ref(&shard));
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].1, ExpiryReason::Forced);

    let flows: Vec<_> = drained.into_iter().map(|(flow, _)| flow).collect();
    let packet = encode_v5_packet(&flows, now, now, 0, 0, 1, 0);
    assert_eq!(u16::from_be_bytes([packet[0], packet[1]]), 5);
    assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 1);
    assert_eq!(packet.len(), 24 + 48);
}
