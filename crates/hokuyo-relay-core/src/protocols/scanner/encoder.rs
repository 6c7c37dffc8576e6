//! Frame encoder used by the simulated sensor.
//!
//! Produces STX + ASCII-hex payload + ETX, the inverse of `parser`.

use std::fmt::Write;

use super::error::ScannerError;
use super::layout::{self, FieldLayout, MAX_HEX_NIBBLES};

/// Encode one value per sub-field into a raw frame.
///
/// Values wider than their sub-field are truncated to the low nibbles.
pub fn encode_frame(layout: &FieldLayout, values: &[u64]) -> Result<Vec<u8>, ScannerError> {
    let expected = layout.subfield_count();
    if values.len() != expected {
        return Err(ScannerError::ValueCount {
            expected,
            actual: values.len(),
        });
    }

    let mut payload = String::with_capacity(layout.payload_len());
    let mut values = values.iter();
    for field in layout.fields() {
        for width in field.widths.iter() {
            if width == 0 || width > MAX_HEX_NIBBLES {
                return Err(ScannerError::InvalidWidth {
                    field: field.name,
                    width,
                });
            }
            let value = values.next().copied().unwrap_or_default();
            let _ = write!(payload, "{:0width$X}", mask_nibbles(value, width));
        }
    }

    let mut frame = Vec::with_capacity(payload.len() + layout::MARKERS_LEN);
    frame.push(layout::STX);
    frame.extend_from_slice(payload.as_bytes());
    frame.push(layout::ETX);
    Ok(frame)
}

/// Split a frame into datagram-sized fragments.
pub fn fragment(frame: &[u8], max_len: usize) -> Vec<&[u8]> {
    frame.chunks(max_len.max(1)).collect()
}

/// Build a plausible scan for `sequence`, stamped with `timestamp_ms`.
///
/// Distances sweep slowly with the sequence number so consumers see motion.
pub fn synthetic_scan(
    layout: &FieldLayout,
    sequence: u64,
    timestamp_ms: u32,
) -> Result<Vec<u8>, ScannerError> {
    let mut values = Vec::with_capacity(layout.subfield_count());
    for field in layout.fields() {
        for (step, _) in field.widths.iter().enumerate() {
            let value = match field.name {
                layout::LENGTH_FIELD => layout.frame_len() as u64,
                layout::TIME_STAMP_FIELD => u64::from(timestamp_ms),
                layout::DISTANCE_FIELD => 1000 + (step as u64 + sequence) % 3000,
                _ => 0,
            };
            values.push(value);
        }
    }
    encode_frame(layout, &values)
}

fn mask_nibbles(value: u64, width: usize) -> u64 {
    if width >= MAX_HEX_NIBBLES {
        value
    } else {
        value & ((1u64 << (4 * width)) - 1)
    }
}
