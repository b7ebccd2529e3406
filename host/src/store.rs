use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use bitaxe_logger_common::error::StoreError;
use bitaxe_logger_common::store::KeyValueStore;

/// Durable store kept as a flat JSON object in one file. Every `set`
/// rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StoreError::new(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::new(format!("{}: {e}", path.display()))),
        };
        Ok(Self { path, entries })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StoreError::new(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| StoreError::new(format!("{}: {e}", self.path.display())))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        self.flush()
    }
}
