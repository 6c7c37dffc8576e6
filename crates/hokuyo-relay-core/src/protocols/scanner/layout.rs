//! Field table of the scanner status/distance telegram.
//!
//! Widths are expressed in nibbles, i.e. ASCII-hex characters on the wire.
//! The table order is the protocol order; decoders walk it front to back.

/// Start-of-frame marker (STX).
pub const STX: u8 = 0x02;
/// End-of-frame marker (ETX).
pub const ETX: u8 = 0x03;
/// Bytes taken by the two frame markers.
pub const MARKERS_LEN: usize = 2;
/// Widest hex sub-field that still fits a `u64`.
pub const MAX_HEX_NIBBLES: usize = 16;
/// Number of distance steps in one scan.
pub const DISTANCE_STEPS: usize = 1081;

/// How a field's bytes are carried into the decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// ASCII-hex digits, re-encoded as little-endian bytes.
    Hex,
    /// Copied verbatim.
    PassThrough,
}

/// Sub-field widths of one field, in nibbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widths {
    List(&'static [usize]),
    Repeat { width: usize, count: usize },
}

impl Widths {
    pub fn len(&self) -> usize {
        match self {
            Widths::List(widths) => widths.len(),
            Widths::Repeat { count, .. } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total(&self) -> usize {
        match self {
            Widths::List(widths) => widths.iter().sum(),
            Widths::Repeat { width, count } => width * count,
        }
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..self.len()).map(move |index| match self {
            Widths::List(list) => list[index],
            Widths::Repeat { width, .. } => width,
        })
    }
}

/// One named field of the telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub widths: Widths,
}

impl FieldSpec {
    pub const fn hex(name: &'static str, widths: &'static [usize]) -> Self {
        Self {
            name,
            kind: FieldKind::Hex,
            widths: Widths::List(widths),
        }
    }

    pub const fn repeated(name: &'static str, width: usize, count: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Hex,
            widths: Widths::Repeat { width, count },
        }
    }

    pub const fn pass_through(name: &'static str, widths: &'static [usize]) -> Self {
        Self {
            name,
            kind: FieldKind::PassThrough,
            widths: Widths::List(widths),
        }
    }

    /// Bytes this field contributes to the decoded message.
    pub fn decoded_len(&self) -> usize {
        match self.kind {
            FieldKind::PassThrough => self.widths.total(),
            FieldKind::Hex => self.widths.iter().map(le_byte_count).sum(),
        }
    }
}

/// Little-endian byte count for a hex sub-field of `nibbles` digits.
pub fn le_byte_count(nibbles: usize) -> usize {
    nibbles.div_ceil(2)
}

/// Ordered list of fields making up a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    fields: &'static [FieldSpec],
}

impl FieldLayout {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Payload length between the markers, in bytes.
    pub fn payload_len(&self) -> usize {
        self.fields.iter().map(|field| field.widths.total()).sum()
    }

    /// Full frame length including STX and ETX.
    pub fn frame_len(&self) -> usize {
        self.payload_len() + MARKERS_LEN
    }

    pub fn decoded_len(&self) -> usize {
        self.fields.iter().map(FieldSpec::decoded_len).sum()
    }

    pub fn subfield_count(&self) -> usize {
        self.fields.iter().map(|field| field.widths.len()).sum()
    }
}

pub const SCANNER_FIELDS: &[FieldSpec] = &[
    FieldSpec::hex("Length", &[4]),
    FieldSpec::pass_through("AR02", &[1, 1, 1, 1]),
    FieldSpec::hex("Status", &[2]),
    FieldSpec::hex("Operating Mode", &[1]),
    FieldSpec::hex("Area Number", &[2]),
    FieldSpec::hex("Error Status", &[1]),
    FieldSpec::hex("Last Error Number", &[2]),
    FieldSpec::hex("Lockout Status", &[1]),
    FieldSpec::hex("Protection[1-5] Status", &[1, 1, 1, 1, 1]),
    FieldSpec::hex("PS Reserved", &[1, 1, 1]),
    FieldSpec::hex("Warning[1-4] Status", &[1, 1, 1, 1]),
    FieldSpec::hex("WS Reserved", &[1, 1, 1]),
    FieldSpec::hex("Muting/Override State Protection[1-5]", &[1, 1, 1, 1, 1]),
    FieldSpec::hex("MSP Reserved", &[1, 1, 1]),
    FieldSpec::hex("Reset Request Protection[1-5]", &[1, 1, 1, 1, 1]),
    FieldSpec::hex("RRP Reserved", &[1, 1, 1]),
    FieldSpec::hex("Encoder Speed", &[4]),
    FieldSpec::hex("Time Stamp", &[8]),
    FieldSpec::hex("Laser off Status", &[1]),
    FieldSpec::hex("Contamination Warning", &[1]),
    FieldSpec::hex("Encoder Input Pattern Number", &[2]),
    FieldSpec::hex("Reserved", &[1, 1, 1, 1, 1]),
    FieldSpec::repeated("Distance Data", 4, DISTANCE_STEPS),
    FieldSpec::hex("CRC", &[4]),
];

/// The telegram relayed by every channel.
pub const SCANNER_LAYOUT: FieldLayout = FieldLayout::new(SCANNER_FIELDS);

pub const TIME_STAMP_FIELD: &str = "Time Stamp";
pub const LENGTH_FIELD: &str = "Length";
pub const DISTANCE_FIELD: &str = "Distance Data";
