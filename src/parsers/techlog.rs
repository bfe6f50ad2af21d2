//! Technology-log record parser.
//!
//! A span of a log file is a sequence of records, each introduced by a
//! timestamp marker at the start of a line (`mm:ss.ffffff-`). The body that
//! follows is a comma-separated list of positional values and `key=value`
//! properties, optionally ending in a context block (see [`super::context`]).

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;

use super::cleanup::{protect_quoted_commas, ValueCleaner};
use super::context::ReverseScanner;
use crate::config::ShipperConfig;
use crate::error_handling::ShipError;

const TIMESTAMP_MARKER_PATTERN: &str = r"(?m)^[0-9]{2}:[0-9]{2}\.[0-9]+-";
const BYTE_ORDER_MARK: &[u8] = b"\xEF\xBB\xBF";

static TIMESTAMP_MARKER_REGEX: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(TIMESTAMP_MARKER_PATTERN).expect("failed to compile timestamp marker regex")
});

/// One record cut out of a span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Marker text without the trailing `-`, e.g. `08:23.150000`
    pub time: String,
    pub body: String,
}

/// Result of splitting a span into records
#[derive(Debug, Default)]
pub struct SpanSplit {
    pub events: Vec<RawEvent>,
    /// Bytes of the span that were turned into events. The checkpoint moves
    /// forward by exactly this amount.
    pub consumed: usize,
    /// Non-blank text ahead of the first marker. It belongs to no record but
    /// is part of `consumed`.
    pub skipped: usize,
}

/// Split a span read from a checkpointed offset into records.
///
/// Only the part of the span up to its last line break is eligible; a
/// trailing partial line is still being written and is left for the next
/// pass. The last record is held back too while one of its quoted values is
/// still open, since multi-line values are always quoted. An eligible part
/// without any marker consumes nothing.
pub fn split_span(span: &[u8]) -> SpanSplit {
    let eligible = match span.iter().rposition(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => return SpanSplit::default(),
    };

    let start = if span.starts_with(BYTE_ORDER_MARK) {
        BYTE_ORDER_MARK.len()
    } else {
        0
    };
    let text = &span[start..eligible];

    let mut markers: Vec<_> = TIMESTAMP_MARKER_REGEX.find_iter(text).collect();
    let Some(first) = markers.first() else {
        return SpanSplit::default();
    };

    let leading = &text[..first.start()];
    let skipped = if leading.iter().all(u8::is_ascii_whitespace) {
        0
    } else {
        leading.len()
    };

    let mut end_of_records = text.len();
    if markers
        .last()
        .is_some_and(|last| has_open_quote(&text[last.end()..]))
    {
        if let Some(last) = markers.pop() {
            end_of_records = last.start();
        }
    }

    let events = markers
        .iter()
        .enumerate()
        .map(|(idx, marker)| {
            let end = markers
                .get(idx + 1)
                .map(|next| next.start())
                .unwrap_or(end_of_records);
            RawEvent {
                time: String::from_utf8_lossy(marker.as_bytes())
                    .trim_end_matches('-')
                    .to_string(),
                body: String::from_utf8_lossy(&text[marker.end()..end]).into_owned(),
            }
        })
        .collect();

    SpanSplit {
        events,
        consumed: start + end_of_records,
        skipped,
    }
}

/// Whether a record body ends inside a quoted value. A value is quoted when
/// its first character after `=` is `'` or `"`; a doubled quote inside it is
/// an escaped quote.
fn has_open_quote(body: &[u8]) -> bool {
    let mut open: Option<u8> = None;
    let mut idx = 0;
    while idx < body.len() {
        let byte = body[idx];
        match open {
            Some(quote) if byte == quote => {
                if body.get(idx + 1) == Some(&quote) {
                    idx += 1;
                } else {
                    open = None;
                }
            }
            None if (byte == b'\'' || byte == b'"') && idx > 0 && body[idx - 1] == b'=' => {
                open = Some(byte);
            }
            _ => {}
        }
        idx += 1;
    }
    open.is_some()
}

/// Properties parsed from one record body
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub fields: IndexMap<String, String>,
    /// Context-block properties, merged over `fields` during assembly
    pub context: IndexMap<String, String>,
}

/// Parser for record bodies
#[derive(Debug, Clone)]
pub struct TechlogParser {
    details: Regex,
    cleaner: ValueCleaner,
}

impl TechlogParser {
    /// `details` matches `name=` for every property that opens a context block
    pub fn new(details: Regex, cleaner: ValueCleaner) -> Self {
        Self { details, cleaner }
    }

    pub fn from_config(config: &ShipperConfig) -> Result<Self, ShipError> {
        Ok(Self::new(
            config.details_regex()?,
            ValueCleaner::new(
                config.delete_tabs_in_contexts,
                config.delete_postfix_in_name_virtual_tables,
            ),
        ))
    }

    pub fn parse_body(&self, body: &str) -> ParsedRecord {
        let mut record = ParsedRecord::default();

        let flat = if self.details.is_match(body) {
            let groups: Vec<&str> = self.details.split(body).collect();
            let mut pairs: Vec<(String, String)> = ReverseScanner::new(body, &groups)
                .map(|(key, value)| (key, self.cleaner.clean(value)))
                .collect();
            pairs.reverse();
            record.context.extend(pairs);
            groups[0].trim_end_matches(',')
        } else {
            body
        };

        let flat = self.cleaner.clean(flat);
        let flat = protect_quoted_commas(&flat);
        record.fields = parse_flat(&flat);
        record
    }
}

/// Split flat text on commas into properties. Tokens without `=` are named by
/// position among the unlabeled tokens.
pub fn parse_flat(text: &str) -> IndexMap<String, String> {
    let mut fields = IndexMap::new();
    let mut unlabeled = 0usize;

    for token in text.split(',') {
        match token.find('=') {
            Some(eq) if eq > 0 => {
                let key = token[..eq].to_lowercase().replacen(':', "_", 1);
                fields.insert(key, token[eq + 1..].to_string());
            }
            _ => {
                let key = match unlabeled {
                    0 => "duration",
                    1 => "event_techlog",
                    2 => "level",
                    _ => "unclassified",
                };
                unlabeled += 1;
                fields.insert(key.to_string(), token.to_string());
            }
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(details: &str) -> TechlogParser {
        TechlogParser::new(
            Regex::new(&format!("({})=", details)).unwrap(),
            ValueCleaner::default(),
        )
    }

    #[test]
    fn test_split_span_two_events_and_fragment() {
        let span = b"08:23.150000-0,CALL,1,p=a\r\n08:24.000001-5,EXCP,2,p=b\r\n08:25.0";
        let split = split_span(span);
        assert_eq!(split.events.len(), 2);
        assert_eq!(split.events[0].time, "08:23.150000");
        assert_eq!(split.events[0].body, "0,CALL,1,p=a\r\n");
        assert_eq!(split.events[1].time, "08:24.000001");
        assert_eq!(split.consumed, span.len() - "08:25.0".len());
    }

    #[test]
    fn test_split_span_without_marker_consumes_nothing() {
        let split = split_span(b"no marker here\nstill none\n");
        assert!(split.events.is_empty());
        assert_eq!(split.consumed, 0);
    }

    #[test]
    fn test_split_span_without_line_break_consumes_nothing() {
        let split = split_span(b"08:23.150000-0,CALL,1");
        assert!(split.events.is_empty());
        assert_eq!(split.consumed, 0);
    }

    #[test]
    fn test_split_span_skips_byte_order_mark() {
        let span = "\u{feff}00:01.5-1,CONN,0\n".as_bytes();
        let split = split_span(span);
        assert_eq!(split.events.len(), 1);
        assert_eq!(split.events[0].time, "00:01.5");
        assert_eq!(split.consumed, span.len());
    }

    #[test]
    fn test_marker_must_start_a_line() {
        let split = split_span(b"00:01.5-1,CONN,0,note=at 12:34.5-x\n");
        assert_eq!(split.events.len(), 1);
        assert_eq!(split.events[0].body, "1,CONN,0,note=at 12:34.5-x\n");
    }

    #[test]
    fn test_multiline_body_stays_in_one_event() {
        let span = b"00:01.5-1,EXCP,0,Descr='line one\nline two'\n00:02.1-3,CALL,0\n";
        let split = split_span(span);
        assert_eq!(split.events.len(), 2);
        assert_eq!(split.events[0].body, "1,EXCP,0,Descr='line one\nline two'\n");
    }

    #[test]
    fn test_unfinished_quoted_value_holds_last_record() {
        let first = "00:01.5-1,CALL,0\n";
        let span = format!("{}00:02.5-1,EXCP,0,Descr='line one\n", first);
        let split = split_span(span.as_bytes());
        assert_eq!(split.events.len(), 1);
        assert_eq!(split.events[0].time, "00:01.5");
        assert_eq!(split.consumed, first.len());

        let only = split_span(b"00:02.5-1,EXCP,0,Descr='line one\n");
        assert!(only.events.is_empty());
        assert_eq!(only.consumed, 0);
    }

    #[test]
    fn test_closed_and_escaped_quotes_do_not_hold() {
        let span = b"00:01.5-1,EXCP,0,Descr='it''s done',Usr=O'Brien\n";
        let split = split_span(span);
        assert_eq!(split.events.len(), 1);
        assert_eq!(split.consumed, span.len());

        assert!(has_open_quote(b"1,EXCP,0,Descr='it''"));
        assert!(has_open_quote(b"1,EXCP,0,Sql=\"select 'x'\n"));
        assert!(!has_open_quote(b"1,EXCP,0,Sql=\"select 'x\"\n"));
    }

    #[test]
    fn test_text_before_first_marker_is_reported() {
        let span = b"line two'\n00:02.1-3,CALL,0\n";
        let split = split_span(span);
        assert_eq!(split.events.len(), 1);
        assert_eq!(split.events[0].body, "3,CALL,0\n");
        assert_eq!(split.skipped, "line two'\n".len());
        assert_eq!(split.consumed, span.len());

        assert_eq!(split_span(b"\r\n00:02.1-3,CALL,0\n").skipped, 0);
    }

    #[test]
    fn test_parse_flat_body_with_quoted_commas() {
        let record = parser("Context").parse_body("EXCP,2,proc=web,note='a,b,c'");
        let expected: IndexMap<String, String> = [
            ("duration", "EXCP"),
            ("event_techlog", "2"),
            ("proc", "web"),
            ("note", "a b c"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(record.fields, expected);
        assert!(record.context.is_empty());
    }

    #[test]
    fn test_keys_lowercased_and_first_colon_replaced() {
        let fields = parse_flat("1,CALL,0,t:clientID=5,OSThread=12,a:b:c=x");
        assert_eq!(fields["t_clientid"], "5");
        assert_eq!(fields["osthread"], "12");
        assert_eq!(fields["a_b:c"], "x");
        assert_eq!(fields["level"], "0");
    }

    #[test]
    fn test_extra_unlabeled_tokens_collapse_into_unclassified() {
        let fields = parse_flat("1,CALL,0,x,y,=z");
        assert_eq!(fields["unclassified"], "=z");
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_later_duplicate_overwrites_earlier() {
        let fields = parse_flat("1,CALL,0,p=a,p=b");
        assert_eq!(fields["p"], "b");
    }

    #[test]
    fn test_detail_event_splits_flat_and_context() {
        let body = "12,DBMSSQL,4,process=rphost,Sql='select a,b from t',Rows=1,Context='Form.Module : 7'\r\n";
        let record = parser("Context|Sql").parse_body(body);

        assert_eq!(record.fields["duration"], "12");
        assert_eq!(record.fields["event_techlog"], "DBMSSQL");
        assert_eq!(record.fields["process"], "rphost");
        assert!(!record.fields.contains_key("rows"));

        let keys: Vec<&str> = record.context.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["sql", "context"]);
        assert_eq!(record.context["sql"], "'select a,b from t',Rows=1");
        assert_eq!(record.context["context"], "'Form.Module : 7'");
    }

    #[test]
    fn test_detail_cleanup_applies_to_context_values() {
        let parser = TechlogParser::new(
            Regex::new("(Context)=").unwrap(),
            ValueCleaner::new(true, true),
        );
        let record = parser.parse_body("1,SDBL,0,Context='\tselect from #tt12'\n");
        assert_eq!(record.context["context"], "'select from #tt'");
    }
}
