//! Worker pipeline: read span, parse, assemble, batch, publish, commit

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, error, warn};

use super::connector::Connector;
use crate::catalog::FileRecord;
use crate::checkpoint::{CheckpointStore, LockGuard};
use crate::config::ShipperConfig;
use crate::error_handling::{ShipError, ShipResult};
use crate::event::EventAssembler;
use crate::parsers::{split_span, TechlogParser};
use crate::publish::{IndexBackend, IndexNameTemplate, IndexPublisher, MappingStore, PublishReport, StreamBatcher};
use crate::stats::RunStats;

/// Read-only state shared by all workers of a run
pub struct PipelineContext {
    pub config: Arc<ShipperConfig>,
    pub parser: TechlogParser,
    pub mappings: Arc<MappingStore>,
    pub template: IndexNameTemplate,
    /// Set on the first fatal error or on a termination signal
    pub cancel: Arc<AtomicBool>,
}

impl PipelineContext {
    pub fn new(
        config: Arc<ShipperConfig>,
        mappings: Arc<MappingStore>,
        cancel: Arc<AtomicBool>,
    ) -> ShipResult<Self> {
        Ok(Self {
            parser: TechlogParser::from_config(&config)?,
            template: IndexNameTemplate::new(config.index_template.clone()),
            config,
            mappings,
            cancel,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Completion message a worker sends to the scheduler
#[derive(Debug)]
pub struct WorkerReport {
    pub partition: usize,
    pub stats: RunStats,
    pub error: Option<ShipError>,
    /// Locks the worker could not release itself
    pub unreleased: Vec<String>,
}

/// Processes one partition sequentially
pub struct FileWorker<'a, S: CheckpointStore, B: IndexBackend> {
    partition: usize,
    store: &'a S,
    publisher: IndexPublisher<B>,
    ctx: &'a PipelineContext,
    stats: RunStats,
}

impl<'a, S: CheckpointStore, B: IndexBackend> FileWorker<'a, S, B> {
    pub fn new(
        partition: usize,
        store: &'a S,
        publisher: IndexPublisher<B>,
        ctx: &'a PipelineContext,
    ) -> Self {
        Self {
            partition,
            store,
            publisher,
            ctx,
            stats: RunStats::new(),
        }
    }

    /// Process every file in order. Each file's lock is released when the
    /// loop leaves it, including files skipped after cancellation or an error.
    pub fn run(&mut self, files: Vec<FileRecord>) -> ShipResult<()> {
        let store: &'a dyn CheckpointStore = self.store;
        let mut failure = None;

        for file in files {
            let _lock = LockGuard::adopt(store, file.lock_key.clone());
            if failure.is_some() || self.ctx.is_cancelled() {
                continue;
            }

            if let Err(e) = self.process_file(&file) {
                error!(
                    object = e.object(),
                    title = "Worker",
                    partition = self.partition,
                    "{}: {}",
                    file.path.display(),
                    e
                );
                self.ctx.cancel.store(true, Ordering::SeqCst);
                failure = Some(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn into_stats(self) -> RunStats {
        self.stats
    }

    fn process_file(&mut self, file: &FileRecord) -> ShipResult<()> {
        let Some(span) = read_span(file)? else {
            return Ok(());
        };

        let split = split_span(&span);
        self.stats.files_processed += 1;
        if split.skipped > 0 {
            warn!(
                object = "Parse",
                title = "Orphan text",
                "{}: {} bytes at offset {} precede the first record and are skipped",
                file.path.display(),
                split.skipped,
                file.offset
            );
            self.stats.bytes_skipped += split.skipped as u64;
        }
        if split.events.is_empty() {
            self.stats.files_empty += 1;
            debug!(file = %file.path.display(), bytes = span.len(), "no complete records");
            if split.consumed == 0 {
                return Ok(());
            }
        }

        let config = &self.ctx.config;
        let assembler = EventAssembler::new(file, config.stream_by);
        let mut batcher = StreamBatcher::new(
            config.bulk_size,
            config.max_buffers_per_stream,
            self.ctx.template.clone(),
            Local::now(),
        );

        let mut report = PublishReport::default();
        let events = split.events.len();
        for raw in split.events {
            let record = self.ctx.parser.parse_body(&raw.body);
            let event = assembler.assemble(record, &raw.time)?;
            if let Some(full) = batcher.push(&event) {
                for buffer in &full {
                    report.merge(self.publisher.publish(buffer)?);
                }
            }
        }
        for buffer in batcher.finish() {
            report.merge(self.publisher.publish(&buffer)?);
        }

        self.stats.events_parsed += events;
        self.stats.record_publish(report);

        if report.has_failures() && !config.advance_on_partial_failure {
            warn!(
                object = "Elastic",
                title = "Checkpoint held",
                "{}: {} of {} documents rejected, position stays at {}",
                file.path.display(),
                report.failed,
                report.documents,
                file.offset
            );
            return Ok(());
        }

        let position = file.offset + split.consumed as u64;
        if self.store.commit_position(&file.checkpoint_key(), position)? {
            self.stats.bytes_consumed += split.consumed as u64;
        }
        debug!(
            file = %file.path.display(),
            from = file.offset,
            to = position,
            events,
            "checkpoint advanced"
        );
        Ok(())
    }
}

/// Bytes from the checkpointed offset to the current end of file. `None`
/// when the offset lies beyond the end (the file was truncated or replaced).
fn read_span(file: &FileRecord) -> ShipResult<Option<Vec<u8>>> {
    let io_err = |e| ShipError::io(&file.path, e);
    let mut handle = File::open(&file.path).map_err(io_err)?;
    let len = handle.metadata().map_err(io_err)?.len();

    if file.offset > len {
        warn!(
            object = "Data",
            title = "Checkpoint beyond end of file",
            "{}: offset {} > size {}",
            file.path.display(),
            file.offset,
            len
        );
        return Ok(None);
    }

    handle.seek(SeekFrom::Start(file.offset)).map_err(io_err)?;
    let mut span = Vec::with_capacity((len - file.offset) as usize);
    handle.read_to_end(&mut span).map_err(io_err)?;
    Ok(Some(span))
}

/// Thread body: connect, process the partition, report
pub(crate) fn run_worker<C: Connector>(
    partition: usize,
    files: Vec<FileRecord>,
    connector: &C,
    ctx: &PipelineContext,
) -> WorkerReport {
    let connections = connector
        .checkpoint_store()
        .and_then(|store| Ok((store, connector.index_backend()?)));
    let (store, backend) = match connections {
        Ok(connections) => connections,
        Err(e) => {
            return WorkerReport {
                partition,
                stats: RunStats::new(),
                error: Some(e),
                unreleased: files.into_iter().map(|f| f.lock_key).collect(),
            }
        }
    };

    let publisher = IndexPublisher::new(backend, Arc::clone(&ctx.mappings));
    let mut worker = FileWorker::new(partition, &store, publisher, ctx);
    let error = worker.run(files).err();
    WorkerReport {
        partition,
        stats: worker.into_stats(),
        error,
        unreleased: Vec::new(),
    }
}
