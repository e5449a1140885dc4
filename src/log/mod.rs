//! Per-session event log.
//!
//! Events live in a bounded ring buffer whose entries carry contiguous
//! sequence numbers, so a cursor maps to a buffer index by subtraction
//! instead of a scan.

mod ring;

pub use ring::{ChannelLog, LogSlice, DEFAULT_CAPACITY};
