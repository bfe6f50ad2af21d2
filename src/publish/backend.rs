use serde::Deserialize;

use crate::error_handling::ShipResult;

/// Document-oriented index backend
pub trait IndexBackend: Send {
    /// Verify the backend answers at all
    fn ping(&self) -> ShipResult<()>;
    fn index_exists(&self, index: &str) -> ShipResult<bool>;
    /// Create `index` with an optional schema body, waiting for one active shard
    fn create_index(&self, index: &str, schema: Option<&str>) -> ShipResult<()>;
    /// Submit newline-delimited action/document pairs
    fn bulk(&self, index: &str, body: &[u8]) -> ShipResult<BulkOutcome>;
}

/// Result of a bulk request that reached the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOutcome {
    /// The request was processed; individual documents may still have failed
    Accepted(BulkResponse),
    /// The whole request was refused
    Rejected {
        status: u16,
        error_type: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkItem {
    #[serde(alias = "create")]
    pub index: BulkItemResult,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub result: String,
    pub status: u16,
    #[serde(default)]
    pub error: Option<BulkItemError>,
}

impl BulkItemResult {
    /// Anything above 201 (created) counts as a failed document
    pub fn is_failure(&self) -> bool {
        self.status > 201
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkItemError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub caused_by: Option<ErrorCause>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorCause {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub reason: String,
}

/// Extract `(type, reason)` from a request-level error body. The backend
/// sends either `{"error": {"type", "reason"}}` or `{"error": "text"}`.
pub fn request_error_details(body: &str) -> (String, String) {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return (String::new(), body.trim().to_string()),
    };
    match value.get("error") {
        Some(serde_json::Value::Object(error)) => {
            let field = |name: &str| {
                error
                    .get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            (field("type"), field("reason"))
        }
        Some(serde_json::Value::String(text)) => (String::new(), text.clone()),
        _ => (String::new(), body.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk_response_with_item_failure() {
        let body = r#"{
            "took": 3, "errors": true,
            "items": [
                {"index": {"_id": "a", "result": "created", "status": 201}},
                {"index": {"_id": "b", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "failed to parse",
                              "caused_by": {"type": "illegal_argument_exception", "reason": "bad date"}}}},
                {"create": {"_id": "c", "status": 409}}
            ]
        }"#;
        let response: BulkResponse = serde_json::from_str(body).unwrap();
        assert!(response.errors);
        assert_eq!(response.items.len(), 3);
        assert!(!response.items[0].index.is_failure());
        let failed = &response.items[1].index;
        assert!(failed.is_failure());
        let error = failed.error.as_ref().unwrap();
        assert_eq!(error.error_type, "mapper_parsing_exception");
        assert_eq!(error.caused_by.as_ref().unwrap().reason, "bad date");
        assert!(response.items[2].index.is_failure());
    }

    #[test]
    fn test_request_error_details_variants() {
        assert_eq!(
            request_error_details(r#"{"error":{"type":"parse_exception","reason":"bad"},"status":400}"#),
            ("parse_exception".to_string(), "bad".to_string())
        );
        assert_eq!(
            request_error_details(r#"{"error":"Incorrect HTTP method"}"#),
            (String::new(), "Incorrect HTTP method".to_string())
        );
        assert_eq!(
            request_error_details("Bad Gateway"),
            (String::new(), "Bad Gateway".to_string())
        );
    }
}
