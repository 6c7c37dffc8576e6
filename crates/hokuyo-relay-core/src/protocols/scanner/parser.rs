use serde::Serialize;

use super::error::ScannerError;
use super::layout::{FieldKind, FieldLayout, FieldSpec, MAX_HEX_NIBBLES, le_byte_count};
use super::reader::{FrameReader, parse_hex_or_zero, push_le_bytes};

/// Decoded content of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", content = "values", tag = "kind")]
pub enum FieldValue {
    /// One value per sub-field.
    Hex(Vec<u64>),
    /// Pass-through bytes, unchanged.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedField {
    pub name: &'static str,
    pub value: FieldValue,
}

impl DecodedField {
    /// First sub-field value of a hex field.
    pub fn first(&self) -> Option<u64> {
        match &self.value {
            FieldValue::Hex(values) => values.first().copied(),
            FieldValue::Raw(_) => None,
        }
    }
}

/// Re-encode a complete frame into the compact binary message.
///
/// Hex sub-fields become `ceil(width / 2)` little-endian bytes; pass-through
/// fields are copied as-is. Output order follows `layout`.
///
/// # Errors
/// Returns `ScannerError::MalformedFrame` when the frame is shorter than the
/// layout requires, or a marker error when STX/ETX are missing.
///
/// # Examples
/// ```
/// use hokuyo_relay_core::{SCANNER_LAYOUT, decode_frame};
///
/// let err = decode_frame(b"\x020001\x03", &SCANNER_LAYOUT).unwrap_err();
/// assert!(err.to_string().contains("malformed frame"));
/// ```
pub fn decode_frame(frame: &[u8], layout: &FieldLayout) -> Result<Vec<u8>, ScannerError> {
    let mut out = Vec::with_capacity(layout.decoded_len());
    walk_subfields(frame, layout, |_, field, digits| match field.kind {
        FieldKind::PassThrough => out.extend_from_slice(digits),
        FieldKind::Hex => push_le_bytes(
            &mut out,
            parse_hex_or_zero(digits),
            le_byte_count(digits.len()),
        ),
    })?;
    Ok(out)
}

/// Decode a frame into named field values instead of packed bytes.
pub fn decode_fields(
    frame: &[u8],
    layout: &FieldLayout,
) -> Result<Vec<DecodedField>, ScannerError> {
    let mut fields: Vec<DecodedField> = layout
        .fields()
        .iter()
        .map(|field| DecodedField {
            name: field.name,
            value: match field.kind {
                FieldKind::Hex => FieldValue::Hex(Vec::with_capacity(field.widths.len())),
                FieldKind::PassThrough => FieldValue::Raw(Vec::with_capacity(field.widths.total())),
            },
        })
        .collect();

    walk_subfields(frame, layout, |index, _, digits| {
        match &mut fields[index].value {
            FieldValue::Hex(values) => values.push(parse_hex_or_zero(digits)),
            FieldValue::Raw(bytes) => bytes.extend_from_slice(digits),
        }
    })?;
    Ok(fields)
}

pub fn find_field<'a>(fields: &'a [DecodedField], name: &str) -> Option<&'a DecodedField> {
    fields.iter().find(|field| field.name == name)
}

fn walk_subfields<'a, F>(
    frame: &'a [u8],
    layout: &FieldLayout,
    mut visit: F,
) -> Result<(), ScannerError>
where
    F: FnMut(usize, &FieldSpec, &'a [u8]),
{
    let mut reader = FrameReader::new(frame);
    reader.require_frame(layout)?;
    for (index, field) in layout.fields().iter().enumerate() {
        for width in field.widths.iter() {
            if width == 0 || (field.kind == FieldKind::Hex && width > MAX_HEX_NIBBLES) {
                return Err(ScannerError::InvalidWidth {
                    field: field.name,
                    width,
                });
            }
            visit(index, field, reader.take(width)?);
        }
    }
    Ok(())
}
