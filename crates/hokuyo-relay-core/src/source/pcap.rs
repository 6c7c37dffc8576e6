//! PCAP and PCAPNG file source.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader};

use super::{CapturedPacket, PacketSource, SourceError};

const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
const READER_BUFFER_SIZE: usize = 64 * 1024;

/// `PacketSource` over a capture file, format picked from the magic bytes.
pub struct PcapFileSource {
    inner: CaptureReader,
}

enum CaptureReader {
    Legacy {
        reader: LegacyPcapReader<File>,
        linktype: Option<Linktype>,
    },
    Ng {
        reader: PcapNGReader<File>,
        interfaces: Vec<Linktype>,
    },
}

impl PcapFileSource {
    /// Open a capture file.
    ///
    /// # Errors
    /// Returns `SourceError::Io` when the file cannot be opened or is shorter
    /// than a magic number, and `SourceError::Capture` when the header is
    /// not a PCAP or PCAPNG header.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let mut file = File::open(path)?;
        let magic = read_magic_and_rewind(&mut file)?;

        let inner = if magic == PCAPNG_MAGIC {
            CaptureReader::Ng {
                reader: PcapNGReader::new(READER_BUFFER_SIZE, file)
                    .map_err(capture_error("pcapng reader init"))?,
                interfaces: Vec::new(),
            }
        } else {
            CaptureReader::Legacy {
                reader: LegacyPcapReader::new(READER_BUFFER_SIZE, file)
                    .map_err(capture_error("pcap reader init"))?,
                linktype: None,
            }
        };
        Ok(Self { inner })
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> Result<Option<CapturedPacket>, SourceError> {
        match &mut self.inner {
            CaptureReader::Legacy { reader, linktype } => {
                read_next(reader, "pcap", |block| match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *linktype = Some(header.network);
                        None
                    }
                    PcapBlockOwned::Legacy(packet) => Some(CapturedPacket {
                        ts_micros: Some(
                            u64::from(packet.ts_sec) * 1_000_000 + u64::from(packet.ts_usec),
                        ),
                        linktype: linktype.unwrap_or(Linktype::ETHERNET),
                        data: packet.data.to_vec(),
                    }),
                    _ => None,
                })
            }
            CaptureReader::Ng { reader, interfaces } => {
                read_next(reader, "pcapng", |block| match block {
                    PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                        interfaces.push(intf.linktype);
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => Some(CapturedPacket {
                        ts_micros: Some(pcapng_ts_micros(packet.ts_high, packet.ts_low)),
                        linktype: linktype_for_interface(interfaces, packet.if_id),
                        data: packet.data.to_vec(),
                    }),
                    _ => None,
                })
            }
        }
    }
}

/// Pull blocks until `on_block` yields a packet or the file ends.
fn read_next<R, F>(
    reader: &mut R,
    format: &'static str,
    mut on_block: F,
) -> Result<Option<CapturedPacket>, SourceError>
where
    R: PcapReaderIterator,
    F: FnMut(PcapBlockOwned<'_>) -> Option<CapturedPacket>,
{
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = on_block(block);
                reader.consume(offset);
                if packet.is_some() {
                    return Ok(packet);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|err| SourceError::Capture {
                    context: format,
                    message: format!("refill: {err}"),
                })?;
            }
            Err(err) => {
                return Err(SourceError::Capture {
                    context: format,
                    message: err.to_string(),
                });
            }
        }
    }
}

fn capture_error<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> SourceError {
    move |err| SourceError::Capture {
        context,
        message: err.to_string(),
    }
}

fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], SourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

/// Default interface resolution is microseconds.
fn pcapng_ts_micros(ts_high: u32, ts_low: u32) -> u64 {
    (u64::from(ts_high) << 32) | u64::from(ts_low)
}

fn linktype_for_interface(interfaces: &[Linktype], if_id: u32) -> Linktype {
    interfaces
        .get(if_id as usize)
        .copied()
        .unwrap_or(Linktype::ETHERNET)
}
