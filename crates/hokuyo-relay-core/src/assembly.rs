//! Frame reassembly from fragmented datagrams.
//!
//! A frame starts with STX and ends with ETX and may span several datagrams
//! from the same source. A datagram that begins with STX always starts a new
//! frame; whatever was buffered before is dropped without a diagnostic.

use crate::protocols::scanner::layout::{ETX, STX};

/// Result of folding one datagram into the partial buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulated {
    pub buffer: Vec<u8>,
    pub frame_ready: bool,
}

/// Fold `datagram` into `previous`.
///
/// # Examples
/// ```
/// use hokuyo_relay_core::accumulate;
///
/// let first = accumulate(Vec::new(), b"\x02AB");
/// assert!(!first.frame_ready);
/// let second = accumulate(first.buffer, b"CD\x03");
/// assert!(second.frame_ready);
/// assert_eq!(second.buffer, b"\x02ABCD\x03");
/// ```
pub fn accumulate(previous: Vec<u8>, datagram: &[u8]) -> Accumulated {
    let buffer = if datagram.first() == Some(&STX) {
        datagram.to_vec()
    } else {
        let mut buffer = previous;
        buffer.extend_from_slice(datagram);
        buffer
    };
    let frame_ready = buffer.last() == Some(&ETX);
    Accumulated {
        buffer,
        frame_ready,
    }
}

/// Outcome of pushing one datagram into a `FrameAssembler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// Frame still open.
    Pending,
    /// Complete STX..ETX frame.
    Frame(Vec<u8>),
    /// Bytes closed by ETX that never saw a start marker.
    Orphan { len: usize },
    /// Buffer grew past the cap and was discarded.
    Overflow { len: usize },
}

/// Per-source reassembly state.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_len: usize,
    torn_frames: u64,
}

impl FrameAssembler {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
            torn_frames: 0,
        }
    }

    pub fn push(&mut self, datagram: &[u8]) -> Assembly {
        if datagram.is_empty() {
            return Assembly::Pending;
        }
        if datagram[0] == STX && !self.buffer.is_empty() {
            self.torn_frames += 1;
        }

        let previous = std::mem::take(&mut self.buffer);
        let Accumulated {
            buffer,
            frame_ready,
        } = accumulate(previous, datagram);

        if buffer.len() > self.max_len {
            return Assembly::Overflow { len: buffer.len() };
        }
        if !frame_ready {
            self.buffer = buffer;
            return Assembly::Pending;
        }
        if buffer.first() != Some(&STX) {
            return Assembly::Orphan { len: buffer.len() };
        }
        Assembly::Frame(buffer)
    }

    /// Bytes of the frame currently being assembled.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Unterminated frames replaced by a new start marker.
    pub fn torn_frames(&self) -> u64 {
        self.torn_frames
    }
}

#[cfg(test)]
mod tests {
    use super::{Assembly, FrameAssembler, accumulate};

    #[test]
    fn continuation_appends_to_previous() {
        let step = accumulate(b"\x02AB".to_vec(), b"CD");
        assert_eq!(step.buffer, b"\x02ABCD");
        assert!(!step.frame_ready);
    }

    #[test]
    fn start_marker_replaces_previous() {
        let step = accumulate(b"\x02AB".to_vec(), b"\x02EF\x03");
        assert_eq!(step.buffer, b"\x02EF\x03");
        assert!(step.frame_ready);
    }

    #[test]
    fn empty_buffer_is_not_ready() {
        let step = accumulate(Vec::new(), b"");
        assert!(step.buffer.is_empty());
        assert!(!step.frame_ready);
    }

    #[test]
    fn two_fragments_make_one_frame() {
        let mut assembler = FrameAssembler::new(64);
        assert_eq!(assembler.push(b"\x02AB"), Assembly::Pending);
        assert_eq!(
            assembler.push(b"CD\x03"),
            Assembly::Frame(b"\x02ABCD\x03".to_vec())
        );
        assert!(assembler.pending().is_empty());
    }

    #[test]
    fn back_to_back_frames_stay_separate() {
        let mut assembler = FrameAssembler::new(64);
        assert_eq!(
            assembler.push(b"\x02AB\x03"),
            Assembly::Frame(b"\x02AB\x03".to_vec())
        );
        assert_eq!(
            assembler.push(b"\x02EF\x03"),
            Assembly::Frame(b"\x02EF\x03".to_vec())
        );
        assert_eq!(assembler.torn_frames(), 0);
    }

    #[test]
    fn torn_frame_is_dropped_and_counted() {
        let mut assembler = FrameAssembler::new(64);
        assert_eq!(assembler.push(b"\x02AB"), Assembly::Pending);
        assert_eq!(assembler.push(b"\x02CD"), Assembly::Pending);
        assert_eq!(
            assembler.push(b"EF\x03"),
            Assembly::Frame(b"\x02CDEF\x03".to_vec())
        );
        assert_eq!(assembler.torn_frames(), 1);
    }

    #[test]
    fn fragment_without_start_marker_is_orphaned() {
        let mut assembler = FrameAssembler::new(64);
        assert_eq!(assembler.push(b"CD\x03"), Assembly::Orphan { len: 3 });
        assert!(assembler.pending().is_empty());
    }

    #[test]
    fn oversized_buffer_is_reset() {
        let mut assembler = FrameAssembler::new(4);
        assert_eq!(assembler.push(b"\x02AB"), Assembly::Pending);
        assert_eq!(assembler.push(b"CD"), Assembly::Overflow { len: 5 });
        assert!(assembler.pending().is_empty());
        assert_eq!(
            assembler.push(b"\x02A\x03"),
            Assembly::Frame(b"\x02A\x03".to_vec())
        );
    }

    #[test]
    fn empty_datagram_is_ignored() {
        let mut assembler = FrameAssembler::new(64);
        assert_eq!(assembler.push(b"\x02AB"), Assembly::Pending);
        assert_eq!(assembler.push(b""), Assembly::Pending);
        assert_eq!(assembler.pending(), b"\x02AB");
    }
}
