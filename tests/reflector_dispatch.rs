//! Reflector dispatch mirrors one export packet to every collector, each
//! tracking its own template retransmit cadence independently (spec §4.6).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flowprobe::error::ExportError;
use flowprobe::export::collector::Collector;
use flowprobe::export::template::Template;
use flowprobe::export::writer::WireTemplate;
use flowprobe::export::{DispatchMode, Emitter, TemplateRetransmitTracker};
use flowprobe::fingerprint::Fingerprint;
use flowprobe::plugin::PluginRegistry;
use flowprobe::FlowRecord;

struct RecordingCollector {
    addr: SocketAddr,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Collector for RecordingCollector {
    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), ExportError> {
        self.sent.lock().unwrap().push(packet.to_vec());
        Ok(())
    }
}

fn sample_flow() -> FlowRecord {
    let fingerprint = Fingerprint {
        vlan_id: 0,
        src_addr: "10.0.0.1".parse().unwrap(),
        dst_addr: "10.0.0.2".parse().unwrap(),
        protocol: 17,
        src_port: 1111,
        dst_port: 53,
        tos: 0,
        input_if: 1,
        tunnel_id: 0,
    };
    let mut flow = FlowRecord::new(fingerprint);
    flow.observe_forward(512, 0, Instant::now());
    flow
}

#[test]
fn reflector_mirrors_to_every_collector_with_independent_template_cadence() {
    let plugins = PluginRegistry::new();
    let template = Template::parse("%IN_BYTES %IN_PKTS %L4_SRC_PORT", &plugins).unwrap();
    let wire = WireTemplate::new(256, &template, &plugins);

    let sent_a = Arc::new(Mutex::new(Vec::new()));
    let sent_b = Arc::new(Mutex::new(Vec::new()));
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(RecordingCollector {
            addr: "127.0.0.1:2055".parse().unwrap(),
            sent: sent_a.clone(),
        }),
        Box::new(RecordingCollector {
            addr: "127.0.0.1:2056".parse().unwrap(),
            sent: sent_b.clone(),
        }),
    ];
    let mut emitter = Emitter::new(collectors, DispatchMode::Reflector, None);
    let mut tracker = TemplateRetransmitTracker::new(Duration::from_secs(60));
    let flows = vec![sample_flow()];

    let now = Instant::now();
    let results = emitter.dispatch(|collector_idx| {
        let mut packet = Vec::new();
        if tracker.should_send(collector_idx, wire.template_id, now) {
            packet.extend(wire.encode_v9_template_set());
        }
        packet.extend(wire.encode_data_set(&flows));
        packet
    });
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(sent_a.lock().unwrap().len(), 1);
    assert_eq!(sent_b.lock().unwrap().len(), 1);

    // Every collector's first send carries its own template set.
    let template_flowset_id = u16::from_be_bytes([sent_a.lock().unwrap()[0][0], sent_a.lock().unwrap()[0][1]]);
    assert_eq!(template_flowset_id, 0);

    // A second dispatch within the retransmit interval omits the template
    // for both collectors.
    let results = emitter.dispatch(|collector_idx| {
        let mut packet = Vec::new();
        if tracker.should_send(collector_idx, wire.template_id, now) {
            packet.extend(wire.encode_v9_template_set());
        }
        packet.extend(wire.encode_data_set(&flows));
        packet
    });
    assert!(results.iter().all(Result::is_ok));
    let second_set_id = u16::from_be_bytes([sent_a.lock().unwrap()[1][0], sent_a.lock().unwrap()[1][1]]);
    assert_eq!(second_set_id, 256);
}
