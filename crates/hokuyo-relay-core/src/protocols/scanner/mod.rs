//! Safety laser scanner telegram decoding.
//!
//! A telegram is an ASCII-hex payload framed by STX/ETX. The payload is a
//! fixed sequence of fields, each split into sub-fields of a known nibble
//! width. Decoding re-packs every hex sub-field into `ceil(width / 2)`
//! little-endian bytes; the `AR02` field is the only one carried verbatim.
//!
//! Field order and widths live in `layout`, bounds-checked access and hex
//! conventions in `reader`, the decoder in `parser`. `encoder` is the
//! inverse used by the simulated sensor.

pub mod encoder;
pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use encoder::{encode_frame, fragment, synthetic_scan};
pub use error::ScannerError;
pub use layout::{FieldKind, FieldLayout, FieldSpec, SCANNER_LAYOUT, Widths};
pub use parser::{DecodedField, FieldValue, decode_fields, decode_frame, find_field};
