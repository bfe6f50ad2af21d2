use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::backend::{BulkItem, BulkItemError, BulkItemResult, BulkOutcome, BulkResponse, IndexBackend};
use crate::error_handling::{ShipError, ShipResult};

#[derive(Debug, Default)]
struct IndexState {
    /// index name -> schema it was created with
    indices: BTreeMap<String, Option<String>>,
    /// index name -> (document id, source) in arrival order
    documents: BTreeMap<String, Vec<(String, String)>>,
    failing_ids: HashSet<String>,
    rejection: Option<(u16, String, String)>,
    unreachable: bool,
    bulk_requests: usize,
}

/// In-process index backend. Clones share the same state, so a test keeps
/// one handle while workers publish through others.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    state: Arc<Mutex<IndexState>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reject the document with this id with status 400 in every bulk response
    pub fn fail_document(&self, id: impl Into<String>) {
        self.state().failing_ids.insert(id.into());
    }

    /// Refuse every following bulk request as a whole
    pub fn reject_requests(&self, status: u16, error_type: &str, reason: &str) {
        self.state().rejection = Some((status, error_type.to_string(), reason.to_string()));
    }

    /// Make every call fail as if the connection were refused
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn indices(&self) -> Vec<String> {
        self.state().indices.keys().cloned().collect()
    }

    pub fn schema_of(&self, index: &str) -> Option<String> {
        self.state().indices.get(index).cloned().flatten()
    }

    /// Sources stored in `index`, in arrival order
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.state()
            .documents
            .get(index)
            .map(|docs| {
                docs.iter()
                    .filter_map(|(_, source)| serde_json::from_str(source).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.state()
            .documents
            .values()
            .flat_map(|docs| docs.iter().map(|(id, _)| id.clone()))
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.state().documents.values().map(Vec::len).sum()
    }

    pub fn bulk_requests(&self) -> usize {
        self.state().bulk_requests
    }

    fn check_reachable(state: &IndexState) -> ShipResult<()> {
        if state.unreachable {
            Err(ShipError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl IndexBackend for MemoryIndex {
    fn ping(&self) -> ShipResult<()> {
        Self::check_reachable(&self.state())
    }

    fn index_exists(&self, index: &str) -> ShipResult<bool> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(state.indices.contains_key(index))
    }

    fn create_index(&self, index: &str, schema: Option<&str>) -> ShipResult<()> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state
            .indices
            .entry(index.to_string())
            .or_insert_with(|| schema.map(str::to_string));
        Ok(())
    }

    fn bulk(&self, index: &str, body: &[u8]) -> ShipResult<BulkOutcome> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.bulk_requests += 1;

        if let Some((status, error_type, reason)) = state.rejection.clone() {
            return Ok(BulkOutcome::Rejected {
                status,
                error_type,
                reason,
            });
        }

        let text = String::from_utf8_lossy(body);
        let mut lines = text.lines();
        let mut items = Vec::new();
        while let (Some(header), Some(source)) = (lines.next(), lines.next()) {
            let header: Value = serde_json::from_str(header)?;
            let id = header["index"]["_id"].as_str().unwrap_or_default().to_string();

            if state.failing_ids.contains(&id) {
                items.push(BulkItem {
                    index: BulkItemResult {
                        id,
                        result: String::new(),
                        status: 400,
                        error: Some(BulkItemError {
                            error_type: "mapper_parsing_exception".to_string(),
                            reason: "failed to parse".to_string(),
                            caused_by: None,
                        }),
                    },
                });
                continue;
            }

            state
                .documents
                .entry(index.to_string())
                .or_default()
                .push((id.clone(), source.to_string()));
            items.push(BulkItem {
                index: BulkItemResult {
                    id,
                    result: "created".to_string(),
                    status: 201,
                    error: None,
                },
            });
        }

        Ok(BulkOutcome::Accepted(BulkResponse {
            errors: items.iter().any(|item| item.index.is_failure()),
            items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_stores_documents_and_reports_failures() {
        let index = MemoryIndex::new();
        index.fail_document("bad");
        let body = b"{\"index\":{\"_index\":\"i\",\"_id\":\"ok\"}}\n{\"a\":\"1\"}\n{\"index\":{\"_index\":\"i\",\"_id\":\"bad\"}}\n{\"a\":\"2\"}\n";

        let BulkOutcome::Accepted(response) = index.bulk("i", body).unwrap() else {
            panic!("expected accepted bulk");
        };
        assert!(response.errors);
        assert_eq!(response.items.len(), 2);
        assert_eq!(index.document_ids(), vec!["ok".to_string()]);
        assert_eq!(index.documents("i")[0]["a"], "1");
    }

    #[test]
    fn test_unreachable_is_transport_error() {
        let index = MemoryIndex::new();
        index.set_unreachable(true);
        assert!(matches!(index.ping(), Err(ShipError::Transport(_))));
    }
}
