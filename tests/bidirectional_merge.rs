//! Forward and reverse-direction packets of the same TCP connection fold
//! into one record when bidirectional merge is enabled (spec §4.4).

use std::time::Instant;

use etherparse::PacketBuilder;
use flowprobe::decoder;
use flowprobe::flow::{LookupOutcome, Shard};
use flowprobe::fragment::FragmentTable;

fn build_tcp_packet(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
    let mut tcp = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
        .ipv4(src, dst, 64)
        .tcp(src_port, dst_port, 1, 4096);
    if flags & 0x02 != 0 {
        tcp = tcp.syn();
    }
    if flags & 0x10 != 0 {
        tcp = tcp.ack(1);
    }
    let mut out = Vec::new();
    tcp.write(&mut out, b"").unwrap();
    out
}

#[test]
fn reverse_packet_merges_into_forward_record() {
    let fragments = FragmentTable::new();
    let now = Instant::now();
    let shard = Shard::new(16, 100);

    let forward = build_tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1234, 443, 0x02);
    let forward = decoder::decode(&forward, 1, &fragments, now, decoder::LinkType::Ethernet, false, false).expect("decode forward");
    let outcome = shard.lookup_or_insert(
        forward.fingerprint.clone(),
        forward.bytes,
        forward.tcp_flags,
        now,
        true,
        &forward.payload,
        |_| {},
        |_, _| {},
    );
    assert!(matches!(outcome, LookupOutcome::Created));

    let reverse = build_tcp_packet([10, 0, 0, 2], [10, 0, 0, 1], 443, 1234, 0x10);
    let reverse = decoder::decode(&reverse, 1, &fragments, now, decoder::LinkType::Ethernet, false, false).expect("decode reverse");
    let outcome = shard.lookup_or_insert(
        reverse.fingerprint.clone(),
        reverse.bytes,
        reverse.tcp_flags,
        now,
        true,
        &reverse.payload,
        |_| {},
        |_, _| {},
    );
    assert!(matches!(outcome, LookupOutcome::Updated));
    assert_eq!(shard.active_flows(), 1);

    let drained = flowprobe::flow::scanner::drain_all(std::slice::from_ref(&shard));
    assert_eq!(drained.len(), 1);
    let flow = &drained[0].0;
    assert_eq!(flow.forward.packets, 1);
    assert_eq!(flow.reverse.packets, 1);
    assert_eq!(flow.forward.tcp_flags_or, 0x02);
    assert_eq!(flow.reverse.tcp_flags_or, 0x10);
}
