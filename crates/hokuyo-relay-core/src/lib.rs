//! Core library of the Hokuyo scanner relay.
//!
//! Safety laser scanners stream each scan as an ASCII-hex telegram framed by
//! STX (0x02) and ETX (0x03), usually split over several UDP datagrams. The
//! relay reassembles those frames, re-encodes every field as packed
//! little-endian binary and forwards the result to a downstream consumer.
//! A simulated source may take over a channel; once it has been silent for
//! longer than the silence window the real scanner is forwarded again.
//!
//! Layering mirrors the data path:
//! - `protocols::scanner`: field table, frame reader, decoder and encoder.
//! - `assembly`: frame reassembly from datagrams.
//! - `failover`: real/simulated arbitration.
//! - `channel`: the per-scanner event loop built from the above.
//! - `config`, `source`, `analysis`: TOML settings and offline capture replay.
//!
//! Invariants:
//! - Decoded messages have exactly `SCANNER_LAYOUT.decoded_len()` bytes.
//! - Real-source frames are never forwarded while the simulated source is active.
//! - Channels share no mutable state.
//!
//! # Examples
//! ```
//! use hokuyo_relay_core::{SCANNER_LAYOUT, decode_frame, synthetic_scan};
//!
//! let frame = synthetic_scan(&SCANNER_LAYOUT, 0, 42)?;
//! let message = decode_frame(&frame, &SCANNER_LAYOUT)?;
//! assert_eq!(message.len(), SCANNER_LAYOUT.decoded_len());
//! # Ok::<(), hokuyo_relay_core::ScannerError>(())
//! ```

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

mod analysis;
pub mod assembly;
pub mod channel;
pub mod config;
pub mod failover;
pub mod protocols;
mod shutdown;
mod source;

pub use analysis::{
    AnalysisError, ReplayOptions, UdpError, analyze_capture_file, analyze_source, extract_udp,
};
pub use assembly::{Accumulated, Assembly, FrameAssembler, accumulate};
pub use channel::{Channel, ChannelError, ChannelSettings, ChannelStats, RelayPipeline};
pub use config::{ChannelConfig, ConfigError, RelayConfig};
pub use failover::{ActiveSource, Clock, FailoverArbiter, MonotonicClock, Transition};
pub use protocols::scanner::{
    DecodedField, FieldLayout, FieldValue, SCANNER_LAYOUT, ScannerError, decode_fields,
    decode_frame, encode_frame, fragment, synthetic_scan,
};
pub use shutdown::ShutdownToken;
pub use source::{CapturedPacket, PacketSource, PcapFileSource, SourceError};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Default timestamp used when no capture time is available.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

/// Tool metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

impl ToolInfo {
    /// Metadata for this build.
    pub fn current() -> Self {
        Self {
            name: "hokuyo-relay".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Input capture metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the analyzer.
    pub path: String,
    pub bytes: u64,
}

/// Basic capture summary (timestamps may be absent).
///
/// # Examples
/// ```
/// use hokuyo_relay_core::CaptureSummary;
///
/// let summary = CaptureSummary {
///     packets_total: 10,
///     time_start: None,
///     time_end: None,
/// };
/// assert_eq!(summary.packets_total, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub packets_total: u64,
    /// RFC3339 timestamp of the first packet (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    /// RFC3339 timestamp of the last packet (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
}

/// Result of replaying a capture through the frame pipeline.
///
/// # Examples
/// ```
/// use hokuyo_relay_core::make_capture_report;
///
/// let report = make_capture_report("capture.pcapng", 123);
/// assert_eq!(report.report_version, hokuyo_relay_core::REPORT_VERSION);
/// assert!(report.ports.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReport {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    pub tool: ToolInfo,
    /// RFC3339 time of the last captured packet.
    pub generated_at: String,
    pub input: InputInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_summary: Option<CaptureSummary>,
    /// Per destination port, ascending.
    pub ports: Vec<PortSummary>,
}

/// Replay counters for one UDP destination port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSummary {
    pub port: u16,
    pub datagrams: u64,
    /// Payload bytes, UDP header excluded.
    pub bytes: u64,
    /// Complete STX..ETX frames reassembled.
    pub frames: u64,
    pub decoded_frames: u64,
    pub malformed_frames: u64,
    pub torn_frames: u64,
    pub orphan_fragments: u64,
    pub overflow_resets: u64,
    /// Smallest scanner `Time Stamp` value among decoded frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_scan_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan_timestamp: Option<u64>,
}

/// Statistics written when the relay stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub report_version: u32,
    pub tool: ToolInfo,
    /// RFC3339 time the relay stopped.
    pub generated_at: String,
    pub channels: Vec<ChannelSummary>,
}

/// Final state and counters of one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub name: String,
    pub real_bind: String,
    pub sim_bind: String,
    pub target: String,
    /// Source that was active at shutdown.
    pub final_source: ActiveSource,
    pub stats: ChannelStats,
}

/// Build a capture report with base fields filled and no ports.
pub fn make_capture_report(input_path: &str, input_bytes: u64) -> CaptureReport {
    CaptureReport {
        report_version: REPORT_VERSION,
        tool: ToolInfo::current(),
        generated_at: DEFAULT_GENERATED_AT.to_string(),
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        capture_summary: None,
        ports: Vec::new(),
    }
}

/// Wrap channel summaries into a run report stamped `generated_at`.
pub fn make_run_report(generated_at: String, mut channels: Vec<ChannelSummary>) -> RunReport {
    channels.sort_by(|a, b| a.name.cmp(&b.name));
    RunReport {
        report_version: REPORT_VERSION,
        tool: ToolInfo::current(),
        generated_at,
        channels,
    }
}

/// Run report stamped with the current UTC time.
pub fn make_run_report_now(channels: Vec<ChannelSummary>) -> RunReport {
    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| DEFAULT_GENERATED_AT.to_string());
    make_run_report(generated_at, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_report_omits_unknown_fields() {
        let mut report = make_capture_report("capture.pcap", 10);
        report.ports.push(PortSummary {
            port: 5005,
            ..PortSummary::default()
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["report_version"], REPORT_VERSION);
        assert_eq!(json["tool"]["name"], "hokuyo-relay");
        assert!(json.get("capture_summary").is_none());
        assert_eq!(json["ports"][0]["port"], 5005);
        assert!(json["ports"][0].get("first_scan_timestamp").is_none());
    }

    #[test]
    fn run_report_orders_channels_by_name() {
        let summary = |name: &str| ChannelSummary {
            name: name.to_string(),
            real_bind: "127.0.0.1:1".to_string(),
            sim_bind: "127.0.0.1:2".to_string(),
            target: "127.0.0.1:3".to_string(),
            final_source: ActiveSource::Simulated,
            stats: ChannelStats::default(),
        };
        let report = make_run_report(
            DEFAULT_GENERATED_AT.to_string(),
            vec![summary("scanner-2"), summary("scanner-1")],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["channels"][0]["name"], "scanner-1");
        assert_eq!(json["channels"][1]["final_source"], "simulated");
        assert_eq!(json["channels"][0]["stats"]["frames_sent"], 0);
    }
}
