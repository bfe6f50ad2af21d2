use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

/// Index schemas keyed by lowercased stream name, one `<stream>.json` file each
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    schemas: HashMap<String, String>,
}

impl MappingStore {
    /// Load every `*.json` file in `dir`. A missing or unreadable directory
    /// yields an empty store; indices are then created without a schema.
    pub fn load(dir: &Path) -> Self {
        let mut schemas = HashMap::new();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(object = "Maps files", title = "Failure to scan directory", "{}: {}", dir.display(), e);
                return Self { schemas };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(schema) => {
                    debug!(stream = %stem, "loaded index mapping");
                    schemas.insert(stem, schema);
                }
                Err(e) => {
                    warn!(object = "Map file", title = "Failure to read map file", "{}: {}", path.display(), e)
                }
            }
        }

        Self { schemas }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            schemas: pairs
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn schema(&self, stream: &str) -> Option<&str> {
        self.schemas.get(&stream.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
