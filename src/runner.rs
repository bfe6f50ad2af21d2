//! One shipping run: startup checks, stale-key sweep, discovery, workers.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use crate::catalog::FileRecord;
use crate::checkpoint::{prune_stale_keys, CheckpointStore};
use crate::config::ShipperConfig;
use crate::error_handling::{ShipError, ShipResult};
use crate::parallel::{discover, partition, Connector, LiveConnector, PipelineContext, WorkScheduler};
use crate::publish::{IndexBackend, MappingStore};
use crate::stats::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Discover and report the work plan without locking or publishing
    pub dry_run: bool,
    /// Delete checkpoint entries of vanished files before discovery
    pub prune: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            prune: true,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Dry run: the files each worker would get
    Planned(Vec<Vec<FileRecord>>),
    Completed(RunSummary),
}

/// Run against the configured Redis and index backend
pub fn run(
    config: ShipperConfig,
    options: RunOptions,
    cancel: Arc<AtomicBool>,
) -> ShipResult<RunOutcome> {
    let config = Arc::new(config);
    let connector = Arc::new(LiveConnector::new(Arc::clone(&config)));
    run_with(connector, config, options, cancel)
}

/// Run with any pair of backends
pub fn run_with<C: Connector + 'static>(
    connector: Arc<C>,
    config: Arc<ShipperConfig>,
    options: RunOptions,
    cancel: Arc<AtomicBool>,
) -> ShipResult<RunOutcome> {
    config.validate()?;

    // Nothing is processed unless both backends answer
    let store = connector.checkpoint_store().map_err(startup_failure)?;
    store.keys().map_err(startup_failure)?;
    let backend = connector.index_backend().map_err(startup_failure)?;
    backend.ping().map_err(startup_failure)?;

    if options.prune && !options.dry_run {
        let removed = prune_stale_keys(&store, &config.lock_prefix)?;
        if removed > 0 {
            info!(removed, "removed checkpoints of vanished files");
        }
    }

    let files = discover(&config.source_root, &store, &config, options.dry_run)?;
    let workers = config.workers();

    if options.dry_run {
        let plan = partition(files, workers);
        for (idx, files) in plan.iter().enumerate() {
            for file in files {
                info!(
                    partition = idx,
                    file = %file.path.display(),
                    offset = file.offset,
                    size = file.size,
                    "planned"
                );
            }
        }
        return Ok(RunOutcome::Planned(plan));
    }

    let mappings = Arc::new(MappingStore::load(&config.maps_dir));
    let context = Arc::new(PipelineContext::new(Arc::clone(&config), mappings, cancel)?);
    let scheduler = WorkScheduler::new(connector, context, workers);
    scheduler.run(files, &store).map(RunOutcome::Completed)
}

fn startup_failure(err: ShipError) -> ShipError {
    match err {
        ShipError::Setup(_) => err,
        other => ShipError::Setup(format!("{} unavailable: {}", other.object(), other)),
    }
}
