use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::catalog::FileRecord;
use crate::config::StreamBy;
use crate::parsers::ParsedRecord;

pub const DATE_FIELD: &str = "date";
pub const SOURCE_FILE_FIELD: &str = "SourceFile";
pub const PROCESS_FIELD: &str = "processNameID";
pub const EVENT_NAME_FIELD: &str = "event_techlog";

/// One parsed record as a flat, insertion-ordered property map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Event {
    fields: IndexMap<String, String>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert or overwrite a property; an overwritten key keeps its position
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compact JSON with keys in lexicographic order, independent of the
    /// order properties were assembled in.
    pub fn canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let sorted: BTreeMap<&str, &str> = self.iter().collect();
        serde_json::to_vec(&sorted)
    }

    /// Lowercase hex SHA-256 of the canonical serialization
    pub fn document_id(&self) -> Result<String, serde_json::Error> {
        Ok(digest(&self.canonical_json()?))
    }
}

impl FromIterator<(String, String)> for Event {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Splice a record's marker time onto the date stamp of its file.
///
/// `file_date` is `YYMMDDHH`, `time` is `mm:ss.ffffff`; the result is
/// `20YY-MM-DDTHH:mm:ss.ffffff`. Calendar validity is not checked.
pub fn event_date(file_date: &str, time: &str) -> String {
    let part = |range: std::ops::Range<usize>| file_date.get(range).unwrap_or("00");
    format!(
        "20{}-{}-{}T{}:{}",
        part(0..2),
        part(2..4),
        part(4..6),
        part(6..8),
        time
    )
}

/// An event ready for batching
#[derive(Debug, Clone)]
pub struct AssembledEvent {
    pub stream: String,
    pub document_id: String,
    /// Canonical JSON source document
    pub source: Vec<u8>,
    pub event: Event,
}

/// Enriches parsed records with file-derived fields and computes their ids
#[derive(Debug, Clone)]
pub struct EventAssembler<'a> {
    file: &'a FileRecord,
    source_file: String,
    stream_by: StreamBy,
}

impl<'a> EventAssembler<'a> {
    pub fn new(file: &'a FileRecord, stream_by: StreamBy) -> Self {
        Self {
            file,
            source_file: file.path.to_string_lossy().into_owned(),
            stream_by,
        }
    }

    /// Merge order: flat fields, date, process id, context fields, source file.
    pub fn assemble(
        &self,
        record: ParsedRecord,
        time: &str,
    ) -> Result<AssembledEvent, serde_json::Error> {
        let mut event = Event::with_capacity(record.fields.len() + record.context.len() + 3);
        for (key, value) in record.fields {
            event.set_field(key, value);
        }
        event.set_field(DATE_FIELD, event_date(&self.file.file_date, time));
        event.set_field(PROCESS_FIELD, self.file.process_id.as_str());
        for (key, value) in record.context {
            event.set_field(key, value);
        }
        event.set_field(SOURCE_FILE_FIELD, self.source_file.as_str());

        let source = event.canonical_json()?;
        Ok(AssembledEvent {
            stream: self.stream_for(&event),
            document_id: digest(&source),
            source,
            event,
        })
    }

    fn stream_for(&self, event: &Event) -> String {
        match self.stream_by {
            StreamBy::Process => self.file.process_id.clone(),
            StreamBy::Event => match event.get(EVENT_NAME_FIELD) {
                Some(name) if !name.trim().is_empty() => name.trim().to_lowercase(),
                _ => "unknown".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn file() -> FileRecord {
        let mut file = FileRecord::new(
            PathBuf::from("/logs/rphost_7/23051408.log"),
            500,
            SystemTime::UNIX_EPOCH,
        );
        file.derive("job_").unwrap();
        file
    }

    fn record(fields: &[(&str, &str)], context: &[(&str, &str)]) -> ParsedRecord {
        ParsedRecord {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_event_date_from_file_stamp_and_marker() {
        assert_eq!(
            event_date("23051408", "08:23.150000"),
            "2023-05-14T08:08:23.150000"
        );
    }

    #[test]
    fn test_event_date_tolerates_short_stamp() {
        assert_eq!(event_date("2305", "00:01.1"), "2023-05-00T00:00:01.1");
    }

    #[test]
    fn test_assemble_adds_derived_fields_in_order() {
        let file = file();
        let assembler = EventAssembler::new(&file, StreamBy::Process);
        let assembled = assembler
            .assemble(
                record(&[("duration", "1"), ("event_techlog", "CALL")], &[("context", "x")]),
                "08:23.150000",
            )
            .unwrap();

        let keys: Vec<&str> = assembled.event.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["duration", "event_techlog", "date", "processNameID", "context", "SourceFile"]
        );
        assert_eq!(assembled.stream, "rphost_7");
        assert_eq!(
            assembled.event.get("SourceFile"),
            Some("/logs/rphost_7/23051408.log")
        );
        assert_eq!(assembled.document_id.len(), 64);
    }

    #[test]
    fn test_context_overwrites_flat_and_source_file_wins() {
        let file = file();
        let assembler = EventAssembler::new(&file, StreamBy::Process);
        let assembled = assembler
            .assemble(
                record(&[("p", "flat")], &[("p", "ctx"), ("sourcefile", "kept")]),
                "00:00.1",
            )
            .unwrap();
        assert_eq!(assembled.event.get("p"), Some("ctx"));
        assert_eq!(assembled.event.get("sourcefile"), Some("kept"));
        assert_eq!(
            assembled.event.get("SourceFile"),
            Some("/logs/rphost_7/23051408.log")
        );
    }

    #[test]
    fn test_stream_by_event_name() {
        let file = file();
        let assembler = EventAssembler::new(&file, StreamBy::Event);
        let assembled = assembler
            .assemble(record(&[("event_techlog", "DBMSSQL")], &[]), "00:00.1")
            .unwrap();
        assert_eq!(assembled.stream, "dbmssql");

        let assembled = assembler.assemble(record(&[], &[]), "00:00.1").unwrap();
        assert_eq!(assembled.stream, "unknown");
    }

    #[test]
    fn test_document_id_ignores_insertion_order() {
        let a: Event = [("a", "1"), ("b", "2")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let b: Event = [("b", "2"), ("a", "1")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(a.document_id().unwrap(), b.document_id().unwrap());

        let mut c = a.clone();
        c.set_field("b", "3");
        assert_ne!(a.document_id().unwrap(), c.document_id().unwrap());
    }

    #[test]
    fn test_canonical_json_round_trip_keeps_id() {
        let file = file();
        let assembled = EventAssembler::new(&file, StreamBy::Process)
            .assemble(
                record(&[("duration", "5"), ("note", "a \"b\" c")], &[("sql", "select 1")]),
                "59:59.999999",
            )
            .unwrap();

        let reparsed: IndexMap<String, String> = serde_json::from_slice(&assembled.source).unwrap();
        let event: Event = reparsed.into_iter().collect();
        assert_eq!(event.document_id().unwrap(), assembled.document_id);
    }
}
