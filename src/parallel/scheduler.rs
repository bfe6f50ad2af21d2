//! Discovery pass, partitioning and the worker pool

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::unbounded;
use tracing::{debug, error, info, warn};

use super::connector::Connector;
use super::worker::{run_worker, PipelineContext, WorkerReport};
use crate::catalog::{self, FileRecord};
use crate::checkpoint::CheckpointStore;
use crate::config::{ShipperConfig, SortOrder};
use crate::error_handling::{ShipError, ShipResult};
use crate::stats::{RunStats, RunSummary};

/// List the files that need shipping and lock them.
///
/// A file is skipped when its lock is held, when it is smaller than the
/// configured minimum or when its checkpoint already equals its size. With
/// `dry_run` nothing is locked. If locking fails midway the locks taken so
/// far are released again.
pub fn discover(
    root: &Path,
    store: &dyn CheckpointStore,
    config: &ShipperConfig,
    dry_run: bool,
) -> ShipResult<Vec<FileRecord>> {
    let mut selected = Vec::new();

    for mut file in catalog::scan(root)? {
        if let Err(reason) = file.derive(&config.lock_prefix) {
            warn!(object = "Data", title = "Skipped file", "{}: {:?}", file.path.display(), reason);
            continue;
        }

        let checked = check_file(store, config, &mut file);
        let wanted = match checked {
            Ok(wanted) => wanted,
            Err(e) => {
                release_locks(store, selected.iter().map(|f: &FileRecord| f.lock_key.as_str()));
                return Err(e);
            }
        };
        if !wanted {
            continue;
        }

        if !dry_run {
            if let Err(e) = store.set_lock(&file.lock_key) {
                release_locks(store, selected.iter().map(|f: &FileRecord| f.lock_key.as_str()));
                return Err(e);
            }
        }
        selected.push(file);
    }

    sort_files(&mut selected, config.sorting);
    Ok(selected)
}

/// Read lock and checkpoint for one file and decide whether it needs work
fn check_file(
    store: &dyn CheckpointStore,
    config: &ShipperConfig,
    file: &mut FileRecord,
) -> ShipResult<bool> {
    if store.get_lock(&file.lock_key)? {
        debug!(file = %file.path.display(), "locked by another worker");
        return Ok(false);
    }
    file.offset = store.get_position(&file.checkpoint_key())?;
    if file.size < config.min_file_size || file.offset == file.size {
        return Ok(false);
    }
    Ok(true)
}

/// Order by file size; the sort is stable so equal sizes keep path order
pub fn sort_files(files: &mut [FileRecord], order: SortOrder) {
    match order {
        SortOrder::None => {}
        SortOrder::Ascending => files.sort_by_key(|f| f.size),
        SortOrder::Descending => files.sort_by(|a, b| b.size.cmp(&a.size)),
    }
}

/// Round-robin assignment: item `i` goes to partition `i % workers`.
/// Only non-empty partitions are returned.
pub fn partition<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let workers = workers.max(1).min(items.len().max(1));
    let mut partitions: Vec<Vec<T>> = (0..workers).map(|_| Vec::new()).collect();
    for (idx, item) in items.into_iter().enumerate() {
        partitions[idx % workers].push(item);
    }
    partitions.retain(|p| !p.is_empty());
    partitions
}

fn release_locks<'k>(store: &dyn CheckpointStore, keys: impl IntoIterator<Item = &'k str>) {
    for key in keys {
        if let Err(e) = store.clear_lock(key) {
            warn!(object = "Redis", title = "Cannot release lock", "{}: {}", key, e);
        }
    }
}

/// Runs one worker thread per partition and collects their reports
pub struct WorkScheduler<C: Connector + 'static> {
    connector: Arc<C>,
    context: Arc<PipelineContext>,
    workers: usize,
}

impl<C: Connector + 'static> WorkScheduler<C> {
    pub fn new(connector: Arc<C>, context: Arc<PipelineContext>, workers: usize) -> Self {
        Self {
            connector,
            context,
            workers: workers.max(1),
        }
    }

    /// Process `files`, which must already be locked. `store` is used to
    /// release locks a worker could not release itself. Returns the first
    /// fatal worker error once every worker has stopped.
    pub fn run(&self, files: Vec<FileRecord>, store: &dyn CheckpointStore) -> ShipResult<RunSummary> {
        let started = Instant::now();
        let files_scheduled = files.len();
        if files.is_empty() {
            info!("nothing to ship");
            return Ok(RunSummary::empty(started));
        }

        let partitions = partition(files, self.workers);
        let workers = partitions.len();
        info!(files = files_scheduled, workers, "starting workers");

        let (report_tx, report_rx) = unbounded::<WorkerReport>();
        let mut partition_locks: Vec<Vec<String>> = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        let mut first_error: Option<ShipError> = None;

        for (idx, files) in partitions.into_iter().enumerate() {
            partition_locks.push(files.iter().map(|f| f.lock_key.clone()).collect());

            let connector = Arc::clone(&self.connector);
            let context = Arc::clone(&self.context);
            let report_tx = report_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("techlog-worker-{}", idx))
                .spawn(move || {
                    let report = run_worker(idx, files, connector.as_ref(), &context);
                    // The receiver outlives every worker
                    let _ = report_tx.send(report);
                });

            match spawned {
                Ok(handle) => handles.push((idx, handle)),
                Err(e) => {
                    self.context.cancel.store(true, Ordering::SeqCst);
                    release_locks(store, partition_locks[idx].iter().map(String::as_str));
                    first_error.get_or_insert(ShipError::Setup(format!(
                        "cannot spawn worker {}: {}",
                        idx, e
                    )));
                }
            }
        }
        drop(report_tx);

        let mut stats = RunStats::new();
        for report in report_rx.iter() {
            stats.merge(&report.stats);
            release_locks(store, report.unreleased.iter().map(String::as_str));
            match report.error {
                Some(e) => {
                    self.context.cancel.store(true, Ordering::SeqCst);
                    error!(object = e.object(), title = "Worker", partition = report.partition, "{}", e);
                    first_error.get_or_insert(e);
                }
                None => debug!(partition = report.partition, "partition complete"),
            }
        }

        for (idx, handle) in handles {
            if handle.join().is_err() {
                self.context.cancel.store(true, Ordering::SeqCst);
                error!(object = "Worker", title = "Panic", partition = idx, "worker thread panicked");
                release_locks(store, partition_locks[idx].iter().map(String::as_str));
                first_error.get_or_insert(ShipError::WorkerPanicked(idx));
            }
        }

        let summary = RunSummary {
            stats,
            files_scheduled,
            workers,
            elapsed: started.elapsed(),
            cancelled: self.context.is_cancelled(),
        };
        info!("{}", summary.stats.format_stats(summary.elapsed));

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
