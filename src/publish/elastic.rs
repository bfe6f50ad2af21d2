use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::backend::{request_error_details, BulkOutcome, BulkResponse, IndexBackend};
use crate::config::ShipperConfig;
use crate::error_handling::{ShipError, ShipResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(100);
const CREATE_TIMEOUT: &str = "60s";

/// Blocking client for an Elasticsearch-compatible HTTP API
pub struct ElasticClient {
    client: Client,
    base: Url,
    login: String,
    password: String,
    max_retries: u32,
}

impl ElasticClient {
    pub fn new(config: &ShipperConfig) -> ShipResult<Self> {
        let base = Url::parse(&config.elastic_addr).map_err(|e| {
            ShipError::Setup(format!("invalid elastic_addr '{}': {}", config.elastic_addr, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ShipError::Setup(format!(
                "elastic_addr '{}' is not a base URL",
                config.elastic_addr
            )));
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| ShipError::Setup(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            login: config.elastic_login.clone(),
            password: config.elastic_password.clone(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.login.is_empty() {
            request
        } else {
            request.basic_auth(&self.login, Some(&self.password))
        }
    }

    /// Send with linear backoff on throttling and gateway errors. Connection
    /// failures are retried too; the last one becomes a transport error.
    fn send(&self, method: Method, url: Url, body: Option<(&[u8], &str)>) -> ShipResult<Response> {
        let mut attempt = 0;
        loop {
            let mut request = self.authorize(self.client.request(method.clone(), url.clone()));
            if let Some((bytes, content_type)) = body {
                request = request
                    .header(CONTENT_TYPE, content_type)
                    .body(bytes.to_vec());
            }

            let retry_reason = match request.send() {
                Ok(response) if !is_retryable(response.status()) => return Ok(response),
                Ok(response) if attempt >= self.max_retries => return Ok(response),
                Ok(response) => format!("status {}", response.status()),
                Err(e) if attempt >= self.max_retries => {
                    return Err(ShipError::Transport(format!("{} {}: {}", method, url, e)))
                }
                Err(e) => e.to_string(),
            };

            attempt += 1;
            warn!(
                object = "Elastic",
                title = "Retry",
                "{} {} attempt {} failed: {}",
                method,
                url,
                attempt,
                retry_reason
            );
            thread::sleep(RETRY_BACKOFF_STEP * attempt);
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

fn read_body(response: Response) -> ShipResult<String> {
    response
        .text()
        .map_err(|e| ShipError::Transport(format!("cannot read response body: {}", e)))
}

impl IndexBackend for ElasticClient {
    fn ping(&self) -> ShipResult<()> {
        let response = self.send(Method::GET, self.url(&[]), None)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let (_, reason) = request_error_details(&read_body(response)?);
            Err(ShipError::Setup(format!(
                "index backend answered [{}]: {}",
                status.as_u16(),
                reason
            )))
        }
    }

    fn index_exists(&self, index: &str) -> ShipResult<bool> {
        let response = self.send(Method::HEAD, self.url(&[index]), None)?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ShipError::Transport(format!(
                "unexpected status {} checking index {}",
                status, index
            ))),
        }
    }

    fn create_index(&self, index: &str, schema: Option<&str>) -> ShipResult<()> {
        let mut url = self.url(&[index]);
        url.query_pairs_mut()
            .append_pair("wait_for_active_shards", "1")
            .append_pair("timeout", CREATE_TIMEOUT);

        let body = schema.map(|s| (s.as_bytes(), "application/json"));
        let response = self.send(Method::PUT, url, body)?;
        let status = response.status();
        if status.is_success() {
            debug!(index = %index, "index created");
            return Ok(());
        }

        let (error_type, reason) = request_error_details(&read_body(response)?);
        // Another worker created it between the existence check and now
        if error_type == "resource_already_exists_exception" {
            return Ok(());
        }
        Err(ShipError::IndexCreation {
            index: index.to_string(),
            status: status.as_u16(),
            reason: format!("{}: {}", error_type, reason),
        })
    }

    fn bulk(&self, index: &str, body: &[u8]) -> ShipResult<BulkOutcome> {
        let mut url = self.url(&[index, "_bulk"]);
        url.query_pairs_mut().append_pair("refresh", "false");

        let response = self.send(Method::POST, url, Some((body, "application/x-ndjson")))?;
        let status = response.status();
        let text = read_body(response)?;

        if !status.is_success() {
            let (error_type, reason) = request_error_details(&text);
            return Ok(BulkOutcome::Rejected {
                status: status.as_u16(),
                error_type,
                reason,
            });
        }

        let parsed: BulkResponse = serde_json::from_str(&text)?;
        Ok(BulkOutcome::Accepted(parsed))
    }
}
