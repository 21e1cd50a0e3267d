//! Thread wiring (spec §5): one capture thread, `N` worker threads (one per
//! flow-hash shard), one scan/expiry thread, one export/emitter thread, and
//! an implicit control channel for reload/shutdown.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::CaptureSource;
use crate::config::{should_snapshot_payload, FlowVersion, PayloadPolicyConfig, RunConfig};
use crate::decoder::LinkType;
use crate::export::emitter::{Emitter, TemplateRetransmitTracker};
use crate::export::writer::WireTemplate;
use crate::export::{build_collector, Template};
use crate::flow::{scanner, ExpiryReason, FlowRecord, Shard};
use crate::fragment::FragmentTable;
use crate::plugin::PluginRegistry;
use crate::queue::{HandoffQueue, PacketSlot};
use crate::signals::{control_channel, ControlMessage, RunSignals};
use crate::stats::ProbeStats;
use crate::{decoder, error::CaptureError, error::ConfigError};

const V4_TEMPLATE_ID: u16 = 256;
const V6_TEMPLATE_ID: u16 = 257;

/// How long the capture thread waits before retrying after a transient
/// live-capture read error (spec §7): only a replay file running out
/// terminates the thread, a transient interface error just backs off.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// How long the control thread waits for every worker queue to drain
/// before resuming capture after a reload (spec §4.8/§9).
const RELOAD_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Handle to a running probe: join handles for every worker thread plus the
/// control channel used to request a reload or shutdown.
pub struct RunningEngine {
    pub control: Sender<ControlMessage>,
    pub stats: Arc<ProbeStats>,
    handles: Vec<JoinHandle<()>>,
}

impl RunningEngine {
    /// Request shutdown and wait for every thread to exit.
    pub fn shutdown(self) {
        tracing::info!("engine shutdown requested, waiting for threads to join");
        let _ = self.control.send(ControlMessage::Shutdown);
        for handle in self.handles {
            let _ = handle.join();
        }
        tracing::info!("engine shutdown complete");
    }
}

pub fn spawn(
    config: RunConfig,
    mut capture: Box<dyn CaptureSource>,
) -> Result<RunningEngine, ConfigError> {
    tracing::info!(
        workers = config.num_workers,
        flow_version = ?config.flow_version,
        collectors = config.collectors.len(),
        "spawning flow probe engine"
    );
    let num_workers = config.num_workers;
    let shards: Vec<Arc<Shard>> = (0..num_workers)
        .map(|_| Arc::new(Shard::new(config.hash_buckets_per_shard, config.max_active_flows_per_shard)))
        .collect();
    let queues: Vec<Arc<HandoffQueue>> = (0..num_workers)
        .map(|_| Arc::new(HandoffQueue::new(config.queue_capacity)))
        .collect();

    let signals = RunSignals::new();
    let stats = Arc::new(ProbeStats::new());
    let fragments = Arc::new(FragmentTable::new());
    let plugins = Arc::new(config.plugins);
    let template = Arc::new(config.template);
    let (control_tx, control_rx) = control_channel();
    let (expired_tx, expired_rx) = mpsc::channel::<(FlowRecord, ExpiryReason)>();

    let mut handles = Vec::new();

    // Capture thread.
    {
        let queues = queues.clone();
        let signals = signals.clone();
        let stats = stats.clone();
        let fragments = fragments.clone();
        let aggregation_mask = config.aggregation_mask;
        let sample_rate = config.sample_rate;
        let link_type = config.link_type;
        let tunnel_mode = config.tunnel_mode;
        let smart_udp_fragments = config.smart_udp_fragments;
        handles.push(std::thread::spawn(move || {
            capture_loop(
                &mut *capture,
                &queues,
                &signals,
                &stats,
                &fragments,
                aggregation_mask,
                sample_rate,
                link_type,
                tunnel_mode,
                smart_udp_fragments,
            );
        }));
    }

    // Worker threads, one per shard.
    let bidirectional_merge = config.bidirectional_merge;
    let payload_policy = config.payload_policy;
    let payload_length = config.payload_length;
    for (idx, (shard, queue)) in shards.iter().cloned().zip(queues.iter().cloned()).enumerate() {
        let stats = stats.clone();
        let plugins = plugins.clone();
        handles.push(std::thread::spawn(move || {
            worker_loop(idx, &shard, &queue, &stats, &plugins, bidirectional_merge, &payload_policy, payload_length);
        }));
    }

    // Scan/expiry thread. Also purges stale fragment-table entries on the
    // same wake cadence, since neither needs its own timer thread.
    {
        let shards = shards.clone();
        let signals = signals.clone();
        let plugins = plugins.clone();
        let stats = stats.clone();
        let fragments = fragments.clone();
        let expired_tx = expired_tx.clone();
        let scan_cfg = scanner::ScanConfig {
            scan_interval: config.scan_interval,
            idle_timeout: config.idle_timeout,
            lifetime_timeout: config.lifetime_timeout,
        };
        handles.push(std::thread::spawn(move || {
            scanner::run_with_cycle_hook(
                &shards,
                scan_cfg,
                signals.shutdown_flag(),
                |record, reason| {
                    plugins.dispatch_delete(&record);
                    stats.record_expiry(reason);
                    let _ = expired_tx.send((record, reason));
                },
                scan_cycle_hook(fragments, stats),
            );
        }));
    }
    drop(expired_tx);

    // Export/emitter thread.
    {
        let plugins = plugins.clone();
        let template = template.clone();
        let stats = stats.clone();
        let flow_version = config.flow_version;
        let collectors = config
            .collectors
            .into_iter()
            .map(|c| build_collector(c.transport, c.addr))
            .collect::<Result<Vec<_>, _>>()?;
        let dispatch_mode = config.dispatch_mode;
        let pacing = config.pacing;
        let retransmit_interval = config.template_retransmit_interval;
        let send_timeout = config.send_timeout;
        let min_records_per_packet = config.min_records_per_packet;
        let max_records_per_packet_override = config.max_records_per_packet_override;
        handles.push(std::thread::spawn(move || {
            emitter_loop(
                expired_rx,
                collectors,
                dispatch_mode,
                pacing,
                retransmit_interval,
                flow_version,
                &template,
                &plugins,
                &stats,
                send_timeout,
                min_records_per_packet,
                max_records_per_packet_override,
            );
        }));
    }

    // Control thread: relays reload/shutdown into the signal barriers.
    {
        let signals = signals.clone();
        let queues = queues.clone();
        handles.push(std::thread::spawn(move || {
            for msg in control_rx {
                match msg {
                    ControlMessage::Reload => {
                        tracing::info!("reload requested, pausing capture");
                        signals.request_capture_pause();
                        // Template/run configuration is immutable for a
                        // run's lifetime, so there is nothing to actually
                        // rebuild here; this pause only gives any in-flight
                        // reload side effect (e.g. an external template
                        // file swap a future version might read) a clean
                        // window with no new packets arriving.
                        let deadline = Instant::now() + RELOAD_DRAIN_DEADLINE;
                        while queues.iter().any(|q| !q.is_empty()) && Instant::now() < deadline {
                            std::thread::sleep(Duration::from_millis(20));
                        }
                        tracing::info!("reload complete, resuming capture");
                        signals.resume_capture();
                    }
                    ControlMessage::Shutdown => {
                        tracing::info!("shutdown requested");
                        signals.request_shutdown();
                        for queue in &queues {
                            queue.close();
                        }
                        break;
                    }
                }
            }
        }));
    }

    Ok(RunningEngine {
        control: control_tx,
        stats,
        handles,
    })
}

/// Deterministic 1-in-`sample_rate` packet sampling (spec §3/§6 `pkt:flow`
/// sample rate): every `sample_rate`-th captured packet is decoded and
/// folded in, with its byte/packet counters scaled back up so exported
/// flows approximate the unsampled totals.
#[allow(clippy::too_many_arguments)]
fn capture_loop(
    capture: &mut dyn CaptureSource,
    queues: &[Arc<HandoffQueue>],
    signals: &RunSignals,
    stats: &ProbeStats,
    fragments: &FragmentTable,
    aggregation_mask: crate::fingerprint::AggregationMask,
    sample_rate: u32,
    link_type: LinkType,
    tunnel_mode: bool,
    smart_udp_fragments: bool,
) {
    tracing::info!("capture thread starting");
    let mut since_last_sample: u32 = 0;
    while !signals.is_shutting_down() {
        if signals.is_capture_stopped() {
            std::thread::sleep(std::time::Duration::from_millis(50));
            continue;
        }
        match capture.next_frame() {
            Ok(Some(frame)) => {
                stats.packets_captured.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                since_last_sample += 1;
                if since_last_sample < sample_rate.max(1) {
                    continue;
                }
                since_last_sample = 0;
                let now = Instant::now();
                match decoder::decode(
                    &frame.data,
                    frame.input_if,
                    fragments,
                    now,
                    link_type,
                    tunnel_mode,
                    smart_udp_fragments,
                ) {
                    Some(decoded) => {
                        stats.packets_decoded.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        if decoded.is_fragment_continuation {
                            stats
                                .fragments_reassembled
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                        let fingerprint = decoded.fingerprint.masked(aggregation_mask);
                        let shard_idx = fingerprint.shard_index(queues.len());
                        let slot = PacketSlot {
                            fingerprint,
                            bytes: decoded.bytes.saturating_mul(sample_rate.max(1)),
                            tcp_flags: decoded.tcp_flags,
                            payload: decoded.payload,
                            captured_at: now,
                            packet_count: decoded.packet_count,
                            icmp: decoded.icmp,
                            mpls_labels: decoded.mpls_labels,
                        };
                        if !queues[shard_idx].try_push(slot) {
                            stats
                                .packets_dropped_queue_full
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                    None => {
                        stats.packets_decode_failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                }
            }
            Ok(None) => continue,
            Err(CaptureError::ReplayExhausted) => {
                tracing::info!("replay file exhausted, stopping capture thread");
                break;
            }
            Err(err @ CaptureError::Transient(_)) => {
                tracing::warn!(error = %err, delay = ?CAPTURE_RETRY_DELAY, "transient capture error, retrying");
                std::thread::sleep(CAPTURE_RETRY_DELAY);
            }
            Err(err) => {
                tracing::error!(error = %err, "unrecoverable capture error, stopping capture thread");
                break;
            }
        }
    }
    for queue in queues {
        queue.close();
    }
    tracing::info!("capture thread exiting");
}

/// Per-cycle housekeeping for the scan thread: purge stale fragment
/// entries, and surface packet/flow drops at `debug` once per cycle
/// rather than per drop (spec §7: "logged at debug once per scan cycle,
/// not per packet").
fn scan_cycle_hook(
    fragments: Arc<FragmentTable>,
    stats: Arc<ProbeStats>,
) -> impl FnMut(Instant) {
    let mut last_queue_drops = 0u64;
    let mut last_flow_drops = 0u64;
    move |now| {
        let purged = fragments.purge_expired(now);
        if purged > 0 {
            stats
                .fragments_purged
                .fetch_add(purged as u64, std::sync::atomic::Ordering::Relaxed);
        }

        let queue_drops = stats.packets_dropped_queue_full.load(std::sync::atomic::Ordering::Relaxed);
        let flow_drops = stats.flows_dropped_max_flows.load(std::sync::atomic::Ordering::Relaxed);
        if queue_drops > last_queue_drops || flow_drops > last_flow_drops {
            tracing::debug!(
                queue_drops_this_cycle = queue_drops - last_queue_drops,
                flow_drops_this_cycle = flow_drops - last_flow_drops,
                "packets or flows dropped this scan cycle"
            );
            last_queue_drops = queue_drops;
            last_flow_drops = flow_drops;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    _idx: usize,
    shard: &Shard,
    queue: &HandoffQueue,
    stats: &ProbeStats,
    plugins: &PluginRegistry,
    bidirectional_merge: bool,
    payload_policy: &PayloadPolicyConfig,
    payload_length: u16,
) {
    while let Some(slot) = queue.pop() {
        let snapshot = should_snapshot_payload(slot.fingerprint.protocol, slot.tcp_flags, payload_policy)
            .then(|| slot.payload.iter().take(payload_length as usize).copied().collect::<Vec<u8>>());
        let snapshot_for_create = snapshot.clone();
        let icmp = slot.icmp;
        let mpls_labels = slot.mpls_labels;
        let outcome = shard.lookup_or_insert_n(
            slot.fingerprint,
            slot.bytes,
            slot.tcp_flags,
            slot.captured_at,
            slot.packet_count,
            bidirectional_merge,
            &slot.payload,
            |record| {
                record.icmp = icmp;
                record.mpls_labels = mpls_labels;
                if let Some(snapshot) = snapshot_for_create {
                    record.payload_snapshot = Some(snapshot);
                }
                plugins.dispatch_create(record);
            },
            |record, payload| {
                if let Some(snapshot) = snapshot {
                    record.payload_snapshot = Some(snapshot);
                }
                plugins.dispatch_packet(record, payload);
            },
        );
        match outcome {
            crate::flow::LookupOutcome::Created => {
                stats.flows_created.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            crate::flow::LookupOutcome::DroppedMaxFlows => {
                stats
                    .flows_dropped_max_flows
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            crate::flow::LookupOutcome::Updated => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn emitter_loop(
    expired_rx: std::sync::mpsc::Receiver<(FlowRecord, ExpiryReason)>,
    collectors: Vec<Box<dyn crate::export::Collector>>,
    dispatch_mode: crate::export::DispatchMode,
    pacing: Option<std::time::Duration>,
    retransmit_interval: std::time::Duration,
    flow_version: FlowVersion,
    template: &Template,
    plugins: &PluginRegistry,
    stats: &ProbeStats,
    send_timeout: std::time::Duration,
    min_records_per_packet: usize,
    max_records_per_packet_override: Option<usize>,
) {
    let mut emitter = Emitter::new(collectors, dispatch_mode, pacing);
    let mut tracker = TemplateRetransmitTracker::new(retransmit_interval);
    // v9/IPFIX carry an independent template per IP address family (spec
    // §3/§4.6/§6); NetFlow v5 has no templates at all and is encoded by a
    // fixed record layout instead.
    let (template_v4, template_v6) = template.address_family_variants();
    let wire_v4 = WireTemplate::new(V4_TEMPLATE_ID, &template_v4, plugins);
    let wire_v6 = WireTemplate::new(V6_TEMPLATE_ID, &template_v6, plugins);
    let boot_time = Instant::now();
    let mut flow_sequence = 0u32;

    let max_batch = match flow_version {
        FlowVersion::V5 => crate::export::writer::V5_MAX_RECORDS_PER_PACKET,
        FlowVersion::V9 | FlowVersion::Ipfix => max_records_per_packet_override.unwrap_or_else(|| {
            crate::export::writer::max_records_per_packet(wire_v4.record_byte_len().max(wire_v6.record_byte_len()))
        }),
    };

    let mut batch = Vec::new();
    loop {
        match expired_rx.recv_timeout(send_timeout) {
            Ok((flow, _reason)) => {
                batch.push(flow);
                if batch.len() >= max_batch {
                    flush_batch(
                        &mut batch, &mut emitter, &mut tracker, flow_version, &wire_v4, &wire_v6, boot_time,
                        &mut flow_sequence, stats,
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if batch.len() >= min_records_per_packet {
                    flush_batch(
                        &mut batch, &mut emitter, &mut tracker, flow_version, &wire_v4, &wire_v6, boot_time,
                        &mut flow_sequence, stats,
                    );
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if !batch.is_empty() {
        flush_batch(
            &mut batch, &mut emitter, &mut tracker, flow_version, &wire_v4, &wire_v6, boot_time, &mut flow_sequence,
            stats,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn flush_batch(
    batch: &mut Vec<FlowRecord>,
    emitter: &mut Emitter,
    tracker: &mut TemplateRetransmitTracker,
    flow_version: FlowVersion,
    wire_v4: &WireTemplate,
    wire_v6: &WireTemplate,
    boot_time: Instant,
    flow_sequence: &mut u32,
    stats: &ProbeStats,
) {
    let now = Instant::now();
    let unix_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    *flow_sequence = flow_sequence.wrapping_add(1);
    let seq = *flow_sequence;

    let results = emitter.dispatch(|collector_idx| {
        let mut packet = Vec::new();
        match flow_version {
            FlowVersion::V5 => {
                packet.extend(crate::export::writer::encode_v5_packet(
                    batch, boot_time, now, unix_secs, 0, seq, 0,
                ));
            }
            FlowVersion::V9 => {
                let mut body = Vec::new();
                for wire in [wire_v4, wire_v6] {
                    if tracker.should_send(collector_idx, wire.template_id, now) {
                        body.extend(wire.encode_v9_template_set());
                        stats.template_sets_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    body.extend(wire.encode_data_set_where(batch, |flow| {
                        is_v4(flow) == (wire.template_id == V4_TEMPLATE_ID)
                    }));
                }
                let count = (body.len() / 4) as u16;
                packet.extend(crate::export::writer::encode_v9_header(
                    count,
                    now.saturating_duration_since(boot_time),
                    unix_secs,
                    seq,
                    0,
                ));
                packet.extend(body);
            }
            FlowVersion::Ipfix => {
                let mut body = Vec::new();
                for wire in [wire_v4, wire_v6] {
                    if tracker.should_send(collector_idx, wire.template_id, now) {
                        body.extend(wire.encode_ipfix_template_set());
                        stats.template_sets_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    body.extend(wire.encode_data_set_where(batch, |flow| {
                        is_v4(flow) == (wire.template_id == V4_TEMPLATE_ID)
                    }));
                }
                let total_len = (16 + body.len()) as u16;
                packet.extend(crate::export::writer::encode_ipfix_header(total_len, unix_secs, seq, 0));
                packet.extend(body);
            }
        }
        packet
    });

    for result in results {
        match result {
            Ok(()) => {
                stats.export_packets_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Err(err) => {
                tracing::warn!(error = %err, "export packet send failed");
                stats.export_send_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
    batch.clear();
}

fn is_v4(flow: &FlowRecord) -> bool {
    matches!(flow.fingerprint.src_addr, std::net::IpAddr::V4(_))
}
