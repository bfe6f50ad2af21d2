// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tempfile::TempDir;

use techlog_shipper::checkpoint::MemoryStore;
use techlog_shipper::parallel::MemoryConnector;
use techlog_shipper::publish::MemoryIndex;
use techlog_shipper::{run_with, RunOptions, RunOutcome, ShipResult, ShipperConfig};

/// A source root with `<process>/<YYMMDDHH>.log` files
pub struct TechlogTree {
    pub dir: TempDir,
}

impl TechlogTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write (or overwrite) a log file and return its path
    pub fn write(&self, process: &str, name: &str, content: &str) -> PathBuf {
        let dir = self.root().join(process);
        fs::create_dir_all(&dir).expect("Failed to create process dir");
        let path = dir.join(name);
        fs::write(&path, content).expect("Failed to write log file");
        path
    }

    pub fn append(&self, path: &Path, content: &str) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .expect("Failed to open log file");
        file.write_all(content.as_bytes())
            .expect("Failed to append to log file");
    }
}

/// In-memory checkpoint store and index shared by every worker of a run
pub struct Backends {
    pub store: MemoryStore,
    pub index: MemoryIndex,
}

impl Backends {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            index: MemoryIndex::new(),
        }
    }

    pub fn run(&self, config: &ShipperConfig, options: RunOptions) -> ShipResult<RunOutcome> {
        let connector = Arc::new(MemoryConnector::new(self.store.clone(), self.index.clone()));
        run_with(
            connector,
            Arc::new(config.clone()),
            options,
            Arc::new(AtomicBool::new(false)),
        )
    }

    pub fn ship(&self, config: &ShipperConfig) -> ShipResult<RunOutcome> {
        self.run(config, RunOptions::default())
    }
}

pub fn config_for(root: &Path) -> ShipperConfig {
    ShipperConfig {
        source_root: root.to_path_buf(),
        maxdop: 2,
        maps_dir: root.join("no-maps"),
        ..Default::default()
    }
}

/// Run the built binary with the given arguments
pub fn run_shipper(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_techlog-shipper"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to run techlog-shipper");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}
