use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde_json::json;

use super::index_name::IndexNameTemplate;
use crate::event::AssembledEvent;

/// One bulk request body for one (stream, rollover) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkBuffer {
    pub stream: String,
    pub index: String,
    pub rollover: usize,
    pub body: Vec<u8>,
    pub documents: usize,
}

impl BulkBuffer {
    fn new(stream: &str, index: &str, rollover: usize) -> Self {
        Self {
            stream: stream.to_string(),
            index: index.to_string(),
            rollover,
            body: Vec::new(),
            documents: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    fn append(&mut self, event: &AssembledEvent) {
        let header = json!({ "index": { "_index": self.index, "_id": event.document_id } });
        // Value's Display cannot fail and yields compact JSON
        self.body.extend_from_slice(header.to_string().as_bytes());
        self.body.push(b'\n');
        self.body.extend_from_slice(&event.source);
        self.body.push(b'\n');
        self.documents += 1;
    }
}

#[derive(Debug)]
struct StreamBuffers {
    open: BulkBuffer,
    sealed: Vec<BulkBuffer>,
}

/// Groups events per stream into bulk bodies, starting a new rollover buffer
/// once the open one reaches `threshold` bytes.
///
/// A batcher lives for one file. The index name of a stream is resolved from
/// the template when its first event arrives.
#[derive(Debug)]
pub struct StreamBatcher {
    threshold: usize,
    max_sealed: usize,
    template: IndexNameTemplate,
    now: DateTime<Local>,
    streams: IndexMap<String, StreamBuffers>,
}

impl StreamBatcher {
    pub fn new(
        threshold: usize,
        max_sealed: usize,
        template: IndexNameTemplate,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            threshold: threshold.max(1),
            max_sealed: max_sealed.max(1),
            template,
            now,
            streams: IndexMap::new(),
        }
    }

    /// Append one event. Returns the stream's sealed buffers when their
    /// number reaches the cap; the caller publishes them right away.
    pub fn push(&mut self, event: &AssembledEvent) -> Option<Vec<BulkBuffer>> {
        let threshold = self.threshold;
        let max_sealed = self.max_sealed;

        let template = &self.template;
        let now = &self.now;
        let buffers = self
            .streams
            .entry(event.stream.clone())
            .or_insert_with(|| StreamBuffers {
                open: BulkBuffer::new(&event.stream, &template.render(&event.stream, now), 0),
                sealed: Vec::new(),
            });

        buffers.open.append(event);
        if buffers.open.len() < threshold {
            return None;
        }

        let next = BulkBuffer::new(
            &buffers.open.stream,
            &buffers.open.index,
            buffers.open.rollover + 1,
        );
        let full = std::mem::replace(&mut buffers.open, next);
        buffers.sealed.push(full);

        if buffers.sealed.len() >= max_sealed {
            Some(std::mem::take(&mut buffers.sealed))
        } else {
            None
        }
    }

    /// Drain every non-empty buffer, sealed ones of a stream before its open one
    pub fn finish(self) -> Vec<BulkBuffer> {
        self.streams
            .into_values()
            .flat_map(|buffers| buffers.sealed.into_iter().chain(std::iter::once(buffers.open)))
            .filter(|buffer| !buffer.is_empty())
            .collect()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}
