// Core library for the techlog shipper

pub mod catalog;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod config_file;
pub mod error_handling;
pub mod event;
pub mod logging;
pub mod parallel;
pub mod parsers;
pub mod platform;
pub mod publish;
pub mod runner;
pub mod stats;

pub use config::{ShipperConfig, SortOrder, StreamBy};
pub use error_handling::{ShipError, ShipResult};
pub use runner::{run, run_with, RunOptions, RunOutcome};
