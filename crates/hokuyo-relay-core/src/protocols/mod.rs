//! Protocol decoding modules.
//!
//! Each protocol follows a layered structure:
//! - `layout`: field order and widths (source of truth)
//! - `reader`: safe byte access and protocol conventions
//! - `parser`: domain-level decoding (no direct byte indexing)
//! - `error`: explicit, actionable errors
//!
//! Parsers are pure and contain no I/O; the channel and analysis layers
//! handle sockets, capture files and aggregation.

pub mod scanner;
