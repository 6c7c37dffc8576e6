use super::error::ScannerError;
use super::layout::{self, FieldLayout, MAX_HEX_NIBBLES};

/// Forward-only cursor over a raw frame.
///
/// The cursor starts past the start marker; every read is bounds-checked so
/// a frame shorter than its layout surfaces as `MalformedFrame`.
pub struct FrameReader<'a> {
    frame: &'a [u8],
    cursor: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Self { frame, cursor: 1 }
    }

    pub fn require_len(&self, needed: usize) -> Result<(), ScannerError> {
        if self.frame.len() < needed {
            return Err(ScannerError::MalformedFrame {
                needed,
                actual: self.frame.len(),
            });
        }
        Ok(())
    }

    /// Check markers and that the frame can hold every field of `layout`.
    pub fn require_frame(&self, layout: &FieldLayout) -> Result<(), ScannerError> {
        let (first, last) = match (self.frame.first(), self.frame.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(ScannerError::Empty),
        };
        if first != layout::STX {
            return Err(ScannerError::MissingStartMarker { found: first });
        }
        if last != layout::ETX {
            return Err(ScannerError::MissingEndMarker { found: last });
        }
        self.require_len(layout.frame_len())
    }

    pub fn take(&mut self, width: usize) -> Result<&'a [u8], ScannerError> {
        let end = self.cursor + width;
        let bytes = self
            .frame
            .get(self.cursor..end)
            .ok_or(ScannerError::MalformedFrame {
                needed: end,
                actual: self.frame.len(),
            })?;
        self.cursor = end;
        Ok(bytes)
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}

/// Parse ASCII-hex digits, falling back to zero on anything that is not hex.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// assert_eq!(parse_hex_or_zero(b"1F"), 0x1f);
/// assert_eq!(parse_hex_or_zero(b"G1"), 0);
/// ```
pub fn parse_hex_or_zero(digits: &[u8]) -> u64 {
    if digits.is_empty() || digits.len() > MAX_HEX_NIBBLES {
        return 0;
    }
    digits
        .iter()
        .try_fold(0u64, |acc, digit| {
            let nibble = (*digit as char).to_digit(16)?;
            Some((acc << 4) | u64::from(nibble))
        })
        .unwrap_or(0)
}

/// Append the low `byte_count` bytes of `value`, least significant first.
pub fn push_le_bytes(out: &mut Vec<u8>, value: u64, byte_count: usize) {
    for i in 0..byte_count {
        let shift = 8 * i;
        let byte = if shift < u64::BITS as usize {
            (value >> shift) & 0xff
        } else {
            0
        };
        out.push(byte as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameReader, parse_hex_or_zero, push_le_bytes};
    use crate::protocols::scanner::error::ScannerError;

    #[test]
    fn take_advances_past_start_marker() {
        let frame = b"\x02ABCD\x03";
        let mut reader = FrameReader::new(frame);
        assert_eq!(reader.take(2).unwrap(), b"AB");
        assert_eq!(reader.take(2).unwrap(), b"CD");
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn take_past_end_is_malformed() {
        let frame = b"\x02AB\x03";
        let mut reader = FrameReader::new(frame);
        let err = reader.take(8).unwrap_err();
        assert_eq!(
            err,
            ScannerError::MalformedFrame {
                needed: 9,
                actual: 4
            }
        );
    }

    #[test]
    fn hex_digits_parse_case_insensitive() {
        assert_eq!(parse_hex_or_zero(b"00FF"), 0xff);
        assert_eq!(parse_hex_or_zero(b"abcd"), 0xabcd);
        assert_eq!(parse_hex_or_zero(b"FFFFFFFF"), 0xffff_ffff);
    }

    #[test]
    fn non_hex_digits_become_zero() {
        assert_eq!(parse_hex_or_zero(b"G1"), 0);
        assert_eq!(parse_hex_or_zero(b"1G"), 0);
        assert_eq!(parse_hex_or_zero(b"+1"), 0);
        assert_eq!(parse_hex_or_zero(b" 1"), 0);
        assert_eq!(parse_hex_or_zero(b""), 0);
    }

    #[test]
    fn le_bytes_round_trip_for_each_width() {
        for byte_count in 1..=8usize {
            let max = if byte_count == 8 {
                u64::MAX
            } else {
                (1u64 << (8 * byte_count)) - 1
            };
            for value in [0, 1, max / 3, max] {
                let mut out = Vec::new();
                push_le_bytes(&mut out, value, byte_count);
                assert_eq!(out.len(), byte_count);
                let mut buf = [0u8; 8];
                buf[..byte_count].copy_from_slice(&out);
                assert_eq!(u64::from_le_bytes(buf), value);
            }
        }
    }
}
