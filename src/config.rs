//! Run configuration (spec §3/§6), built the way the teacher's own
//! `NetflowParserBuilder` is: every field independently defaulted, assembled
//! with a builder, validated once at `build()`.

use std::net::SocketAddr;
use std::time::Duration;

use crate::decoder::LinkType;
use crate::error::ConfigError;
use crate::export::{DispatchMode, TransportKind};
use crate::export::template::Template;
use crate::fingerprint::AggregationMask;
use crate::plugin::PluginRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowVersion {
    V5,
    V9,
    Ipfix,
}

impl FlowVersion {
    pub fn from_wire_number(n: u16) -> Result<Self, ConfigError> {
        match n {
            5 => Ok(Self::V5),
            9 => Ok(Self::V9),
            10 => Ok(Self::Ipfix),
            other => Err(ConfigError::UnsupportedFlowVersion(other)),
        }
    }
}

pub struct CollectorConfig {
    pub addr: SocketAddr,
    pub transport: TransportKind,
}

/// Per-protocol-class payload export policy (spec §6 `tcp:udp:icmp:other`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadPolicy {
    /// Never snapshot payload for this class.
    None,
    /// Always snapshot (up to the configured payload length).
    Always,
    /// Only snapshot TCP packets carrying the SYN flag.
    TcpSynOnly,
}

/// One policy per protocol class; resolved against a flow's protocol number
/// in [`crate::engine`]'s worker loop.
#[derive(Debug, Clone, Copy)]
pub struct PayloadPolicyConfig {
    pub tcp: PayloadPolicy,
    pub udp: PayloadPolicy,
    pub icmp: PayloadPolicy,
    pub other: PayloadPolicy,
}

impl Default for PayloadPolicyConfig {
    fn default() -> Self {
        Self {
            tcp: PayloadPolicy::None,
            udp: PayloadPolicy::None,
            icmp: PayloadPolicy::None,
            other: PayloadPolicy::None,
        }
    }
}

/// Fully validated run configuration. Constructed only via
/// [`RunConfigBuilder::build`].
pub struct RunConfig {
    pub num_workers: usize,
    pub hash_buckets_per_shard: usize,
    pub max_active_flows_per_shard: usize,
    pub queue_capacity: usize,
    pub aggregation_mask: AggregationMask,
    pub bidirectional_merge: bool,
    pub idle_timeout: Duration,
    pub lifetime_timeout: Duration,
    pub scan_interval: Duration,
    pub flow_version: FlowVersion,
    pub template: Template,
    pub collectors: Vec<CollectorConfig>,
    pub dispatch_mode: DispatchMode,
    pub template_retransmit_interval: Duration,
    pub pacing: Option<Duration>,
    pub sample_rate: u32,
    pub plugins: PluginRegistry,
    /// How long the emitter lets a batch sit before flushing it even if it
    /// hasn't filled up (spec §4.6 item 3).
    pub send_timeout: Duration,
    /// Don't flush a batch on a `send_timeout` tick unless it holds at
    /// least this many flows.
    pub min_records_per_packet: usize,
    /// Overrides the computed per-template records-per-packet budget.
    pub max_records_per_packet_override: Option<usize>,
    /// Capture snaplen, passed to [`crate::capture::LiveCapture::open`].
    pub snaplen: u32,
    /// Maximum bytes kept in [`crate::flow::FlowRecord::payload_snapshot`].
    pub payload_length: u16,
    pub payload_policy: PayloadPolicyConfig,
    /// Gate for GRE/ESP/GTP-U tunnel unwrapping (spec §4.1 Non-goals
    /// carve-out): off by default since unwrapping costs an extra parse per
    /// miss and most deployments don't tunnel.
    pub tunnel_mode: bool,
    /// Gate for the "smart UDP fragment" accounting shortcut (spec §4.2):
    /// ignore non-first UDP fragments and credit the first fragment with an
    /// estimated full-datagram size instead of tracking per-fragment ports.
    pub smart_udp_fragments: bool,
    /// Datalink type of the capture source for this run (spec §4.1); one
    /// run captures against one interface/file, so one link type suffices.
    pub link_type: LinkType,
}

/// Resolve a protocol number against a [`PayloadPolicyConfig`] and decide
/// whether this packet's payload should be snapshotted (spec §6).
pub fn should_snapshot_payload(protocol: u8, tcp_flags: u8, policy: &PayloadPolicyConfig) -> bool {
    const SYN: u8 = 0x02;
    let class = match protocol {
        6 => policy.tcp,
        17 => policy.udp,
        1 | 58 => policy.icmp,
        _ => policy.other,
    };
    match class {
        PayloadPolicy::None => false,
        PayloadPolicy::Always => true,
        PayloadPolicy::TcpSynOnly => protocol == 6 && tcp_flags & SYN != 0,
    }
}

pub struct RunConfigBuilder {
    num_workers: usize,
    hash_buckets_per_shard: usize,
    max_active_flows_per_shard: usize,
    queue_capacity: usize,
    aggregation_mask: AggregationMask,
    bidirectional_merge: bool,
    idle_timeout: Duration,
    lifetime_timeout: Duration,
    scan_interval: Duration,
    flow_version: FlowVersion,
    template_macro: String,
    collectors: Vec<(String, TransportKind)>,
    dispatch_mode: DispatchMode,
    template_retransmit_interval: Duration,
    pacing: Option<Duration>,
    sample_rate: u32,
    plugins: PluginRegistry,
    send_timeout: Duration,
    min_records_per_packet: usize,
    max_records_per_packet_override: Option<usize>,
    snaplen: u32,
    payload_length: u16,
    payload_policy: PayloadPolicyConfig,
    tunnel_mode: bool,
    smart_udp_fragments: bool,
    link_type: LinkType,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            num_workers: 4,
            hash_buckets_per_shard: 4096,
            max_active_flows_per_shard: 65536,
            queue_capacity: 4096,
            aggregation_mask: AggregationMask::default(),
            bidirectional_merge: true,
            idle_timeout: Duration::from_secs(15),
            lifetime_timeout: Duration::from_secs(30 * 60),
            scan_interval: Duration::from_secs(1),
            flow_version: FlowVersion::V9,
            template_macro: "%IN_BYTES %IN_PKTS %PROTOCOL %L4_SRC_PORT %L4_DST_PORT \
                              %IPV4_SRC_ADDR %IPV4_DST_ADDR %INPUT_SNMP %OUTPUT_SNMP \
                              %SRC_AS %DST_AS %SRC_MASK %DST_MASK %TCP_FLAGS %SRC_TOS"
                .to_string(),
            collectors: Vec::new(),
            dispatch_mode: DispatchMode::RoundRobin,
            template_retransmit_interval: Duration::from_secs(60),
            pacing: None,
            sample_rate: 1,
            plugins: PluginRegistry::new(),
            send_timeout: Duration::from_secs(1),
            min_records_per_packet: 1,
            max_records_per_packet_override: None,
            snaplen: 65535,
            payload_length: 0,
            payload_policy: PayloadPolicyConfig::default(),
            tunnel_mode: false,
            smart_udp_fragments: false,
            link_type: LinkType::Ethernet,
        }
    }
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn hash_buckets_per_shard(mut self, n: usize) -> Self {
        self.hash_buckets_per_shard = n;
        self
    }

    pub fn max_active_flows_per_shard(mut self, n: usize) -> Self {
        self.max_active_flows_per_shard = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    pub fn aggregation_mask(mut self, mask: AggregationMask) -> Self {
        self.aggregation_mask = mask;
        self
    }

    pub fn bidirectional_merge(mut self, enabled: bool) -> Self {
        self.bidirectional_merge = enabled;
        self
    }

    pub fn idle_timeout(mut self, d: Duration) -> Self {
        self.idle_timeout = d;
        self
    }

    pub fn lifetime_timeout(mut self, d: Duration) -> Self {
        self.lifetime_timeout = d;
        self
    }

    pub fn scan_interval(mut self, d: Duration) -> Self {
        self.scan_interval = d;
        self
    }

    pub fn flow_version(mut self, version: FlowVersion) -> Self {
        self.flow_version = version;
        self
    }

    pub fn template_macro(mut self, macro_string: impl Into<String>) -> Self {
        self.template_macro = macro_string.into();
        self
    }

    pub fn add_collector(mut self, addr: impl Into<String>, transport: TransportKind) -> Self {
        self.collectors.push((addr.into(), transport));
        self
    }

    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn template_retransmit_interval(mut self, d: Duration) -> Self {
        self.template_retransmit_interval = d;
        self
    }

    pub fn pacing(mut self, d: Option<Duration>) -> Self {
        self.pacing = d;
        self
    }

    pub fn sample_rate(mut self, n: u32) -> Self {
        self.sample_rate = n;
        self
    }

    pub fn send_timeout(mut self, d: Duration) -> Self {
        self.send_timeout = d;
        self
    }

    pub fn min_records_per_packet(mut self, n: usize) -> Self {
        self.min_records_per_packet = n.max(1);
        self
    }

    /// Override the computed per-template records-per-packet budget instead
    /// of deriving it from the resolved template's byte size.
    pub fn max_records_per_packet(mut self, n: usize) -> Self {
        self.max_records_per_packet_override = Some(n);
        self
    }

    pub fn snaplen(mut self, n: u32) -> Self {
        self.snaplen = n;
        self
    }

    pub fn payload_length(mut self, n: u16) -> Self {
        self.payload_length = n;
        self
    }

    pub fn payload_policy(mut self, policy: PayloadPolicyConfig) -> Self {
        self.payload_policy = policy;
        self
    }

    pub fn tunnel_mode(mut self, enabled: bool) -> Self {
        self.tunnel_mode = enabled;
        self
    }

    pub fn smart_udp_fragments(mut self, enabled: bool) -> Self {
        self.smart_udp_fragments = enabled;
        self
    }

    pub fn link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }

    pub fn register_plugin(
        mut self,
        plugin: Box<dyn crate::plugin::FlowPlugin>,
    ) -> Result<Self, ConfigError> {
        self.plugins.register(plugin)?;
        Ok(self)
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        self.build_inner().inspect_err(|err| {
            tracing::warn!(error = %err, "run configuration rejected");
        })
    }

    fn build_inner(self) -> Result<RunConfig, ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.hash_buckets_per_shard < 1 {
            return Err(ConfigError::HashSizeTooSmall {
                workers: self.num_workers,
            });
        }
        if self.collectors.is_empty() {
            return Err(ConfigError::NoCollectors);
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }

        let template = Template::parse(&self.template_macro, &self.plugins)?;

        let mut collectors = Vec::with_capacity(self.collectors.len());
        for (addr, transport) in self.collectors {
            if transport == TransportKind::Sctp {
                return Err(ConfigError::UnsupportedTransport);
            }
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| ConfigError::InvalidCollectorAddress(addr.clone(), e))?;
            collectors.push(CollectorConfig { addr, transport });
        }

        Ok(RunConfig {
            num_workers: self.num_workers,
            hash_buckets_per_shard: self.hash_buckets_per_shard,
            max_active_flows_per_shard: self.max_active_flows_per_shard,
            queue_capacity: self.queue_capacity,
            aggregation_mask: self.aggregation_mask,
            bidirectional_merge: self.bidirectional_merge,
            idle_timeout: self.idle_timeout,
            lifetime_timeout: self.lifetime_timeout,
            scan_interval: self.scan_interval,
            flow_version: self.flow_version,
            template,
            collectors,
            dispatch_mode: self.dispatch_mode,
            template_retransmit_interval: self.template_retransmit_interval,
            pacing: self.pacing,
            sample_rate: self.sample_rate,
            plugins: self.plugins,
            send_timeout: self.send_timeout,
            min_records_per_packet: self.min_records_per_packet,
            max_records_per_packet_override: self.max_records_per_packet_override,
            snaplen: self.snaplen,
            payload_length: self.payload_length,
            payload_policy: self.payload_policy,
            tunnel_mode: self.tunnel_mode,
            smart_udp_fragments: self.smart_udp_fragments,
            link_type: self.link_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_workers() {
        let err = RunConfigBuilder::new()
            .num_workers(0)
            .add_collector("127.0.0.1:2055", TransportKind::Udp)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWorkers));
    }

    #[test]
    fn rejects_sctp_collector() {
        let err = RunConfigBuilder::new()
            .add_collector("127.0.0.1:2055", TransportKind::Sctp)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedTransport));
    }

    #[test]
    fn builds_with_defaults_and_one_collector() {
        let config = RunConfigBuilder::new()
            .add_collector("127.0.0.1:2055", TransportKind::Udp)
            .build()
            .unwrap();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.collectors.len(), 1);
    }
}
