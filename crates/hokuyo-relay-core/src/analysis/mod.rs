//! Offline replay of captured scanner traffic.
//!
//! Every UDP datagram in a capture is fed, per destination port, through the
//! same `FrameAssembler` and field decoder the live relay uses. The result is
//! a `CaptureReport` that says how many frames a port carried, how many of
//! them decoded, and which scan timestamps they covered.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::assembly::{Assembly, FrameAssembler};
use crate::protocols::scanner::layout::TIME_STAMP_FIELD;
use crate::protocols::scanner::{FieldLayout, SCANNER_LAYOUT, decode_fields, find_field};
use crate::source::{CapturedPacket, PacketSource, PcapFileSource, SourceError};
use crate::{CaptureReport, CaptureSummary, DEFAULT_GENERATED_AT, PortSummary, make_capture_report};

mod udp;

pub use udp::{UdpDatagram, UdpError, extract_udp};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// What to replay and how.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Destination ports to keep; `None` keeps every UDP port.
    pub ports: Option<Vec<u16>>,
    pub max_frame_len: usize,
    pub layout: FieldLayout,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            ports: None,
            max_frame_len: 64 * 1024,
            layout: SCANNER_LAYOUT,
        }
    }
}

impl ReplayOptions {
    fn keeps(&self, port: u16) -> bool {
        self.ports
            .as_ref()
            .is_none_or(|ports| ports.contains(&port))
    }
}

/// Replay a capture file.
///
/// # Errors
/// Returns `AnalysisError` when the file cannot be opened or parsed.
pub fn analyze_capture_file(
    path: &Path,
    options: &ReplayOptions,
) -> Result<CaptureReport, AnalysisError> {
    let source = PcapFileSource::open(path)?;
    analyze_source(path, source, options)
}

/// Replay any packet source; `path` only labels the report.
pub fn analyze_source<S: PacketSource>(
    path: &Path,
    mut source: S,
    options: &ReplayOptions,
) -> Result<CaptureReport, AnalysisError> {
    let mut packets_total = 0u64;
    let mut first_ts = None;
    let mut last_ts = None;
    let mut ports: BTreeMap<u16, PortReplay> = BTreeMap::new();

    while let Some(CapturedPacket {
        ts_micros,
        linktype,
        data,
    }) = source.next_packet()?
    {
        packets_total += 1;
        if let Some(ts) = ts_micros {
            widen(&mut first_ts, ts, u64::min);
            widen(&mut last_ts, ts, u64::max);
        }

        let datagram = match extract_udp(linktype, &data) {
            Ok(Some(datagram)) => datagram,
            Ok(None) => continue,
            Err(err) => {
                log::debug!("skipping packet {packets_total}: {err}");
                continue;
            }
        };
        let port = datagram.dst.port();
        if !options.keeps(port) {
            continue;
        }
        ports
            .entry(port)
            .or_insert_with(|| PortReplay::new(port, options.max_frame_len))
            .push(datagram.payload, &options.layout);
    }

    let mut report = make_capture_report(&path.display().to_string(), path.metadata()?.len());
    report.capture_summary = Some(CaptureSummary {
        packets_total,
        time_start: micros_to_rfc3339(first_ts),
        time_end: micros_to_rfc3339(last_ts),
    });
    report.generated_at = report
        .capture_summary
        .as_ref()
        .and_then(|summary| summary.time_end.clone().or(summary.time_start.clone()))
        .unwrap_or_else(|| DEFAULT_GENERATED_AT.to_string());
    report.ports = ports.into_values().map(PortReplay::finish).collect();
    Ok(report)
}

struct PortReplay {
    summary: PortSummary,
    assembler: FrameAssembler,
}

impl PortReplay {
    fn new(port: u16, max_frame_len: usize) -> Self {
        Self {
            summary: PortSummary {
                port,
                ..PortSummary::default()
            },
            assembler: FrameAssembler::new(max_frame_len),
        }
    }

    fn push(&mut self, payload: &[u8], layout: &FieldLayout) {
        let summary = &mut self.summary;
        summary.datagrams += 1;
        summary.bytes += payload.len() as u64;

        match self.assembler.push(payload) {
            Assembly::Pending => {}
            Assembly::Orphan { .. } => summary.orphan_fragments += 1,
            Assembly::Overflow { .. } => summary.overflow_resets += 1,
            Assembly::Frame(frame) => {
                summary.frames += 1;
                match decode_fields(&frame, layout) {
                    Ok(fields) => {
                        summary.decoded_frames += 1;
                        if let Some(ts) =
                            find_field(&fields, TIME_STAMP_FIELD).and_then(|field| field.first())
                        {
                            widen(&mut summary.first_scan_timestamp, ts, u64::min);
                            widen(&mut summary.last_scan_timestamp, ts, u64::max);
                        }
                    }
                    Err(err) => {
                        log::debug!("port {}: {err}", summary.port);
                        summary.malformed_frames += 1;
                    }
                }
            }
        }
    }

    fn finish(self) -> PortSummary {
        PortSummary {
            torn_frames: self.assembler.torn_frames(),
            ..self.summary
        }
    }
}

fn widen(bound: &mut Option<u64>, value: u64, pick: fn(u64, u64) -> u64) {
    *bound = Some(bound.map_or(value, |current| pick(current, value)));
}

fn micros_to_rfc3339(ts: Option<u64>) -> Option<String> {
    let nanos = i128::from(ts?) * 1_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
