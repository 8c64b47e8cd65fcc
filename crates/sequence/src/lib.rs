//! Sequence generator: named counters rendered as padded, prefixed strings.

pub mod counter;
pub mod format;
pub mod sequence;
pub mod store;

pub use counter::Counter;
pub use format::{format_number, interpolate};
pub use sequence::{DateRange, Implementation, Sequence, SequenceUpdate};
pub use store::SequenceStore;
