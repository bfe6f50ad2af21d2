#![no_main]

use libfuzzer_sys::fuzz_target;
use regex::Regex;
use techlog_shipper::parsers::{split_span, TechlogParser, ValueCleaner};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the cleanup flags, the rest is a raw span
    let flags = data[0];
    let span = &data[1..];

    let split = split_span(span);
    assert!(split.consumed <= span.len());

    let parser = TechlogParser::new(
        Regex::new("(Context|Sql|Descr)=").unwrap(),
        ValueCleaner::new(flags & 0x1 == 0x1, flags & 0x2 == 0x2),
    );
    for raw in split.events {
        let _ = parser.parse_body(&raw.body);
    }
});
