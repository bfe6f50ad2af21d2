//! File discovery under the source root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::error_handling::{ShipError, ShipResult};

const FILE_DATE_LEN: usize = 8;

/// A candidate log file found during a discovery pass. Only `offset` and the
/// lock behind `lock_key` outlive the pass, in the checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// Last committed byte offset
    pub offset: u64,
    /// `YYMMDDHH` taken from the file name
    pub file_date: String,
    /// Lowercased parent directory name
    pub process_id: String,
    pub lock_key: String,
}

/// Why a file cannot be shipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoParentDirectory,
    BadFileDate(String),
}

impl FileRecord {
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            offset: 0,
            file_date: String::new(),
            process_id: String::new(),
            lock_key: String::new(),
        }
    }

    /// Key of the checkpoint entry for this file
    pub fn checkpoint_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Fill the fields derived from the path: date stamp, process id, lock key
    pub fn derive(&mut self, lock_prefix: &str) -> Result<(), SkipReason> {
        let process_id = self
            .path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_lowercase())
            .ok_or(SkipReason::NoParentDirectory)?;

        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let date: String = stem.chars().take(FILE_DATE_LEN).collect();
        if date.len() != FILE_DATE_LEN || !date.chars().all(|c| c.is_ascii_digit()) {
            return Err(SkipReason::BadFileDate(stem));
        }

        self.file_date = date;
        self.process_id = process_id;
        self.lock_key = format!("{}{}", lock_prefix, self.checkpoint_key());
        Ok(())
    }
}

/// Walk `root` recursively and list every regular file, sorted by path.
pub fn scan(root: &Path) -> ShipResult<Vec<FileRecord>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(root).map_err(|e| {
        ShipError::Setup(format!("cannot scan source root {}: {}", root.display(), e))
    })?;
    let mut pending: Vec<fs::ReadDir> = vec![entries];

    while let Some(dir) = pending.last_mut() {
        let entry = match dir.next() {
            Some(entry) => entry,
            None => {
                pending.pop();
                continue;
            }
        };

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(object = "Data", title = "Failure to scan directory", "{}", e);
                continue;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(object = "Data", title = "Failure to scan directory", "{}: {}", path.display(), e);
                continue;
            }
        };

        if metadata.is_dir() {
            match fs::read_dir(&path) {
                Ok(sub) => pending.push(sub),
                Err(e) => {
                    warn!(object = "Data", title = "Failure to scan directory", "{}: {}", path.display(), e)
                }
            }
        } else if metadata.is_file() {
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(FileRecord::new(path, metadata.len(), modified));
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &str) -> FileRecord {
        FileRecord::new(PathBuf::from(path), 0, SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn test_derive_fields_from_path() {
        let mut file = record("/logs/rphost_1234/23051408.log");
        file.derive("job_").unwrap();
        assert_eq!(file.file_date, "23051408");
        assert_eq!(file.process_id, "rphost_1234");
        assert_eq!(file.lock_key, "job_/logs/rphost_1234/23051408.log");
    }

    #[test]
    fn test_derive_lowercases_process() {
        let mut file = record("/logs/RAGENT/24010100.log");
        file.derive("job_").unwrap();
        assert_eq!(file.process_id, "ragent");
    }

    #[test]
    fn test_derive_rejects_non_date_names() {
        let mut file = record("/logs/rphost/readme.txt");
        assert_eq!(
            file.derive("job_"),
            Err(SkipReason::BadFileDate("readme".to_string()))
        );
        let mut file = record("/logs/rphost/2305.log");
        assert!(file.derive("job_").is_err());
    }

    #[test]
    fn test_scan_walks_nested_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("rphost").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("rphost").join("23051408.log"), b"abc").unwrap();
        fs::write(nested.join("23051409.log"), b"abcdef").unwrap();

        let files = scan(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, 3);
        assert!(files[1].path.ends_with("rphost/deep/23051409.log"));
    }

    #[test]
    fn test_scan_missing_root_is_setup_error() {
        let err = scan(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ShipError::Setup(_)));
    }
}
