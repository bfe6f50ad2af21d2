//! Own log output: JSON records in a daily rolling file, plus retention.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ShipperConfig;

pub const LOG_FILE_PREFIX: &str = "techlog-shipper";

/// Keeps the background log writer alive; drop it last to flush
pub type LoggerGuard = WorkerGuard;

/// `log_level` from settings.yaml: 0 error, 1 warn, 2 info, 3 and above debug
pub fn level_directive(log_level: u8) -> &'static str {
    match log_level {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
/// With an empty `log_dir` records go to stderr instead of a file.
pub fn init_logging(config: &ShipperConfig) -> Result<LoggerGuard> {
    let (writer, guard) = if config.log_dir.as_os_str().is_empty() {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("cannot create log directory {}", config.log_dir.display())
        })?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        tracing_appender::non_blocking(appender)
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(config.log_level)));

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(false)
        .with_current_span(false)
        .with_span_list(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("cannot install log subscriber")?;
    Ok(guard)
}

/// Delete own log files older than `life_span_days` (0 counts as 1).
/// Files are recognized by the `techlog-shipper.YYYY-MM-DD` name the daily
/// appender gives them. Returns the number of deleted files.
pub fn delete_old_log_files(dir: &Path, life_span_days: u32, today: NaiveDate) -> usize {
    let keep_days = i64::from(life_span_days.max(1));
    let Some(oldest_kept) = today.checked_sub_signed(Duration::days(keep_days)) else {
        return 0;
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(object = "Log files", title = "Failure to scan directory", "{}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut deleted = 0;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(date) = log_file_date(&name) else {
            continue;
        };
        if date >= oldest_kept {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(file = %name, "deleted old log file");
                deleted += 1;
            }
            Err(e) => warn!(object = "Log files", title = "Failure to delete", "{}: {}", name, e),
        }
    }
    deleted
}

pub fn delete_old_log_files_now(dir: &Path, life_span_days: u32) -> usize {
    delete_old_log_files(dir, life_span_days, Local::now().date_naive())
}

fn log_file_date(name: &str) -> Option<NaiveDate> {
    let suffix = name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(suffix, "%Y-%m-%d").ok()
}
