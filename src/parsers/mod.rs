pub mod cleanup;
mod context;
pub mod techlog;

pub use cleanup::ValueCleaner;
pub use techlog::{parse_flat, split_span, ParsedRecord, RawEvent, SpanSplit, TechlogParser};
