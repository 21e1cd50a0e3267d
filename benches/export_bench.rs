use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion};
use flowprobe::export::template::Template;
use flowprobe::export::writer::{encode_v5_packet, WireTemplate};
use flowprobe::fingerprint::Fingerprint;
use flowprobe::plugin::PluginRegistry;
use flowprobe::FlowRecord;

fn sample_flows(n: usize) -> Vec<FlowRecord> {
    (0..n)
        .map(|i| {
            let fingerprint = Fingerprint {
                vlan_id: 0,
                src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, (i % 255) as u8)),
                dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1)),
                protocol: 6,
                src_port: 1024 + (i as u16 % 1000),
                dst_port: 443,
                tos: 0,
                input_if: 1,
                tunnel_id: 0,
            };
            let mut flow = FlowRecord::new(fingerprint);
            flow.observe_forward(1500, 0x18, Instant::now());
            flow
        })
        .collect()
}

fn v5_packet_bench(c: &mut Criterion) {
    let flows = sample_flows(30);
    c.bench_function("v5 packet encode (30 flows)", |b| {
        let now = Instant::now();
        b.iter(|| encode_v5_packet(black_box(&flows), now, now, 0, 0, 1, 0));
    });
}

fn v9_data_set_bench(c: &mut Criterion) {
    let plugins = PluginRegistry::new();
    let template =
        Template::parse("%IN_BYTES %IN_PKTS %PROTOCOL %L4_SRC_PORT %L4_DST_PORT %IPV4_SRC_ADDR %IPV4_DST_ADDR", &plugins)
            .unwrap();
    let wire = WireTemplate::new(256, &template, &plugins);
    let flows = sample_flows(40);
    c.bench_function("v9 data set encode (40 flows)", |b| {
        b.iter(|| wire.encode_data_set(black_box(&flows)));
    });
}

fn v9_template_set_bench(c: &mut Criterion) {
    let plugins = PluginRegistry::new();
    let template = Template::parse("%IN_BYTES %IN_PKTS %PROTOCOL %L4_SRC_PORT", &plugins).unwrap();
    let wire = WireTemplate::new(256, &template, &plugins);
    c.bench_function("v9 template set encode", |b| {
        b.iter(|| wire.encode_v9_template_set());
    });
}

criterion_group!(benches, v5_packet_bench, v9_data_set_bench, v9_template_set_bench);
criterion_main!(benches);
