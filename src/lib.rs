#![doc = include_str!("../README.md")]

pub mod capture;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod flow;
pub mod fragment;
pub mod plugin;
pub mod queue;
pub mod signals;
pub mod stats;
pub mod wire;

pub use config::{CollectorConfig, FlowVersion, RunConfig, RunConfigBuilder};
pub use engine::RunningEngine;
pub use error::{CaptureError, ConfigError, ExportError};
pub use fingerprint::{AggregationMask, Fingerprint};
pub use flow::{ExpiryReason, FlowRecord};
pub use plugin::{FlowPlugin, PluginRegistry};
pub use stats::{ProbeStats, ProbeStatsSnapshot};
