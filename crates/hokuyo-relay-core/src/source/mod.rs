//! Offline packet sources.
//!
//! Capture files are read here and nowhere else; the analysis layer only
//! sees `CapturedPacket` values.

mod pcap;

pub use pcap::PcapFileSource;

use pcap_parser::Linktype;
use thiserror::Error;

/// One link-layer packet taken from a capture.
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    /// Capture timestamp in microseconds since the Unix epoch.
    pub ts_micros: Option<u64>,
    pub linktype: Linktype,
    pub data: Vec<u8>,
}

pub trait PacketSource {
    /// Next packet, or `None` once the source is exhausted.
    fn next_packet(&mut self) -> Result<Option<CapturedPacket>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture parse error ({context}): {message}")]
    Capture {
        context: &'static str,
        message: String,
    },
}
