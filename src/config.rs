use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

use crate::error_handling::ShipError;

/// Main configuration struct, deserialized from `settings.yaml`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Root directory holding `<process>/<YYMMDDHH>.log` files
    #[serde(rename = "patch")]
    pub source_root: PathBuf,

    pub redis_addr: String,
    pub redis_login: String,
    pub redis_password: String,
    pub redis_database: i64,

    pub elastic_addr: String,
    pub elastic_login: String,
    pub elastic_password: String,
    #[serde(rename = "elastic_indx")]
    pub index_template: String,
    #[serde(rename = "elastic_maxretries")]
    pub max_retries: u32,
    #[serde(rename = "elastic_bulksize")]
    pub bulk_size: usize,

    /// Alternation of event property names carrying a context block, e.g. `Context|Sql`
    #[serde(rename = "tech_log_details_events")]
    pub details_events: String,

    pub maxdop: usize,
    #[serde(deserialize_with = "deserialize_sort_order")]
    pub sorting: SortOrder,

    #[serde(rename = "patch_logfile")]
    pub log_dir: PathBuf,
    pub log_level: u8,
    pub log_life_span: u32,

    pub delete_tabs_in_contexts: bool,
    pub delete_postfix_in_name_virtual_tables: bool,
    #[serde(rename = "skip_verify_certificates")]
    pub insecure_skip_verify: bool,

    pub maps_dir: PathBuf,
    pub min_file_size: u64,
    pub max_buffers_per_stream: usize,
    pub advance_on_partial_failure: bool,
    pub stream_by: StreamBy,
    pub lock_prefix: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::new(),
            redis_addr: "127.0.0.1:6379".to_string(),
            redis_login: String::new(),
            redis_password: String::new(),
            redis_database: 0,
            elastic_addr: "http://127.0.0.1:9200".to_string(),
            elastic_login: String::new(),
            elastic_password: String::new(),
            index_template: "techlog-{stream}-yyyy.MM.dd".to_string(),
            max_retries: 3,
            bulk_size: 5 * 1024 * 1024,
            details_events: "Context".to_string(),
            maxdop: 0,
            sorting: SortOrder::None,
            log_dir: PathBuf::from("./logs"),
            log_level: 2,
            log_life_span: 1,
            delete_tabs_in_contexts: false,
            delete_postfix_in_name_virtual_tables: false,
            insecure_skip_verify: false,
            maps_dir: PathBuf::from("./maps"),
            min_file_size: 100,
            max_buffers_per_stream: 16,
            advance_on_partial_failure: true,
            stream_by: StreamBy::Process,
            lock_prefix: "job_".to_string(),
        }
    }
}

/// File processing order, by size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    None,
    Descending,
    Ascending,
}

/// Which value names the logical stream an event is batched and indexed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamBy {
    /// Parent directory of the source file
    #[default]
    Process,
    /// The parsed event name (`event_techlog`)
    Event,
}

// settings.yaml stores the order as 0/1/2
fn deserialize_sort_order<'de, D>(deserializer: D) -> Result<SortOrder, D::Error>
where
    D: Deserializer<'de>,
{
    match u8::deserialize(deserializer)? {
        0 => Ok(SortOrder::None),
        1 => Ok(SortOrder::Descending),
        2 => Ok(SortOrder::Ascending),
        other => Err(serde::de::Error::custom(format!(
            "sorting must be 0, 1 or 2, got {}",
            other
        ))),
    }
}

impl ShipperConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Effective degree of parallelism
    pub fn workers(&self) -> usize {
        if self.maxdop == 0 {
            num_cpus::get()
        } else {
            self.maxdop
        }
    }

    /// Regex matching `name=` for every configured detail event
    pub fn details_regex(&self) -> Result<Regex, ShipError> {
        Regex::new(&format!("({})=", self.details_events)).map_err(|e| {
            ShipError::Setup(format!(
                "invalid tech_log_details_events pattern '{}': {}",
                self.details_events, e
            ))
        })
    }

    pub fn validate(&self) -> Result<(), ShipError> {
        if self.source_root.as_os_str().is_empty() {
            return Err(ShipError::Setup("patch (source root) is not set".into()));
        }
        if self.index_template.trim().is_empty() {
            return Err(ShipError::Setup("elastic_indx is empty".into()));
        }
        if self.bulk_size == 0 {
            return Err(ShipError::Setup("elastic_bulksize must be positive".into()));
        }
        if self.max_buffers_per_stream == 0 {
            return Err(ShipError::Setup(
                "max_buffers_per_stream must be positive".into(),
            ));
        }
        if self.details_events.trim().is_empty() {
            return Err(ShipError::Setup("tech_log_details_events is empty".into()));
        }
        self.details_regex()?;
        Ok(())
    }
}
