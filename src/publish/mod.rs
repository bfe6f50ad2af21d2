//! Batching events into bulk bodies and publishing them to the index backend.

mod backend;
mod batcher;
mod elastic;
mod index_name;
mod mapping;
mod memory;

pub use backend::{
    BulkItem, BulkItemError, BulkItemResult, BulkOutcome, BulkResponse, ErrorCause, IndexBackend,
};
pub use batcher::{BulkBuffer, StreamBatcher};
pub use elastic::ElasticClient;
pub use index_name::IndexNameTemplate;
pub use mapping::MappingStore;
pub use memory::MemoryIndex;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error_handling::{ShipError, ShipResult};

/// Outcome of publishing one or more bulk buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Documents submitted
    pub documents: usize,
    /// Documents the backend refused individually
    pub failed: usize,
}

impl PublishReport {
    pub fn merge(&mut self, other: PublishReport) {
        self.documents += other.documents;
        self.failed += other.failed;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Publishes bulk buffers, creating destination indices on first use
pub struct IndexPublisher<B: IndexBackend> {
    backend: B,
    mappings: Arc<MappingStore>,
    known: HashSet<String>,
}

impl<B: IndexBackend> IndexPublisher<B> {
    pub fn new(backend: B, mappings: Arc<MappingStore>) -> Self {
        Self {
            backend,
            mappings,
            known: HashSet::new(),
        }
    }

    /// Create `index` from the stream's schema unless it is known to exist
    pub fn ensure_index(&mut self, stream: &str, index: &str) -> ShipResult<()> {
        if self.known.contains(index) {
            return Ok(());
        }
        if !self.backend.index_exists(index)? {
            let schema = self.mappings.schema(stream);
            if schema.is_none() {
                debug!(stream = %stream, index = %index, "no mapping for stream, creating index without schema");
            }
            self.backend.create_index(index, schema)?;
        }
        self.known.insert(index.to_string());
        Ok(())
    }

    /// Submit one buffer. A rejected request is an error; documents rejected
    /// inside an accepted request are logged and counted.
    pub fn publish(&mut self, buffer: &BulkBuffer) -> ShipResult<PublishReport> {
        if buffer.is_empty() {
            return Ok(PublishReport::default());
        }
        self.ensure_index(&buffer.stream, &buffer.index)?;

        let response = match self.backend.bulk(&buffer.index, &buffer.body)? {
            BulkOutcome::Accepted(response) => response,
            BulkOutcome::Rejected {
                status,
                error_type,
                reason,
            } => {
                error!(
                    object = "Elastic",
                    title = "Request",
                    status,
                    error_type = %error_type,
                    "bulk request to {} rejected: {}",
                    buffer.index,
                    reason
                );
                return Err(ShipError::BatchRejected {
                    status,
                    error_type,
                    reason,
                });
            }
        };

        let mut report = PublishReport {
            documents: buffer.documents,
            failed: 0,
        };
        for item in response.items.iter().map(|item| &item.index) {
            if !item.is_failure() {
                continue;
            }
            report.failed += 1;
            let (error_type, reason, cause) = match &item.error {
                Some(e) => (
                    e.error_type.as_str(),
                    e.reason.as_str(),
                    e.caused_by.as_ref().map(|c| c.reason.as_str()).unwrap_or_default(),
                ),
                None => ("", "", ""),
            };
            error!(
                object = "Elastic",
                title = "Request",
                status = item.status,
                id = %item.id,
                error_type = %error_type,
                cause = %cause,
                "document rejected in {}: {}",
                buffer.index,
                reason
            );
        }

        debug!(
            index = %buffer.index,
            rollover = buffer.rollover,
            documents = report.documents,
            failed = report.failed,
            "bulk buffer published"
        );
        Ok(report)
    }
}
