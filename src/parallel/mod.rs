//! Parallel shipping
//!
//! # Module Structure
//!
//! - `connector`: per-worker checkpoint store and index backend connections
//! - `worker`: the per-file pipeline run by each worker thread
//! - `scheduler`: discovery pass, round-robin partitioning and the pool

mod connector;
mod scheduler;
mod worker;

pub use connector::{Connector, LiveConnector, MemoryConnector};
pub use scheduler::{discover, partition, sort_files, WorkScheduler};
pub use worker::{FileWorker, PipelineContext, WorkerReport};
