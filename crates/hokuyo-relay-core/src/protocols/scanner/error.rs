use thiserror::Error;

/// Errors returned by scanner frame decoding and encoding.
///
/// # Examples
/// ```
/// use hokuyo_relay_core::ScannerError;
///
/// let err = ScannerError::MalformedFrame { needed: 4399, actual: 12 };
/// assert!(err.to_string().contains("malformed frame"));
/// ```
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScannerError {
    #[error("malformed frame: need {needed} bytes, got {actual}")]
    MalformedFrame { needed: usize, actual: usize },
    #[error("missing start marker: first byte is {found:#04x}")]
    MissingStartMarker { found: u8 },
    #[error("missing end marker: last byte is {found:#04x}")]
    MissingEndMarker { found: u8 },
    #[error("empty frame")]
    Empty,
    #[error("field '{field}' has unsupported width {width}")]
    InvalidWidth { field: &'static str, width: usize },
    #[error("value count mismatch: layout has {expected} sub-fields, got {actual}")]
    ValueCount { expected: usize, actual: usize },
}
