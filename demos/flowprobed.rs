//! Minimal example wiring for the probe engine: replay a pcap file through
//! the full capture -> flow -> export pipeline and print periodic stats.
//! Argument parsing is deliberately primitive; a real deployment wraps
//! `RunConfigBuilder` with `clap` instead (spec's CLI surface is an external
//! collaborator, not part of this crate).

use std::time::Duration;

use flowprobe::capture::OfflineCapture;
use flowprobe::export::TransportKind;
use flowprobe::{FlowVersion, RunConfigBuilder};

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let pcap_path = args.next().unwrap_or_else(|| {
        eprintln!("usage: flowprobed <pcap-file> [collector-addr]");
        std::process::exit(2);
    });
    let collector_addr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:2055".to_string());

    let config = RunConfigBuilder::new()
        .flow_version(FlowVersion::V9)
        .add_collector(collector_addr, TransportKind::Udp)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        });

    let capture = OfflineCapture::open(&pcap_path, 1).unwrap_or_else(|e| {
        eprintln!("failed to open {pcap_path}: {e}");
        std::process::exit(1);
    });

    let engine = flowprobe::engine::spawn(config, Box::new(capture)).unwrap_or_else(|e| {
        eprintln!("failed to start engine: {e}");
        std::process::exit(1);
    });

    // Offline replay drains on its own once the file is exhausted; poll
    // stats in the meantime so a long-running replay still reports
    // progress.
    let stats = engine.stats.clone();
    for _ in 0..30 {
        std::thread::sleep(Duration::from_secs(1));
        let snapshot = stats.snapshot();
        tracing::info!(
            captured = snapshot.packets_captured,
            decoded = snapshot.packets_decoded,
            flows_created = snapshot.flows_created,
            exported = snapshot.export_packets_sent,
            "probe progress"
        );
    }

    engine.shutdown();
}
