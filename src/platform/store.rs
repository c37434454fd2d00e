// FlashBatch - platform/store.rs
//
// Key-value JSON document store backing settings and session logs.
//
// Design principles:
// - The document is opened lazily on first access and then kept in memory
//   for the lifetime of the store; later reads never touch the disk.
// - Saving is atomic (write temp, rename) so a crash mid-save never
//   corrupts the previous good document.
// - A missing or unreadable document opens as empty. Callers treat absent
//   keys as "use defaults".
// - Values are written wrapped as `{"value": ...}`. Reads accept both the
//   wrapped form and a bare value, since older documents hold bare values.

use crate::util::error::StoreError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Key of the wrapper object around every stored value.
const VALUE_WRAPPER_KEY: &str = "value";

/// One JSON object document on disk, addressed by top-level key.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    doc: Option<Map<String, Value>>,
}

impl JsonStore {
    /// Create a handle for the document at `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document has been read from disk yet.
    pub fn is_open(&self) -> bool {
        self.doc.is_some()
    }

    /// Return the in-memory document, reading it on first use.
    fn open(&mut self) -> Result<&mut Map<String, Value>, StoreError> {
        if self.doc.is_none() {
            let loaded = read_document(&self.path)?;
            self.doc = Some(loaded);
        }
        Ok(self.doc.get_or_insert_with(Map::new))
    }

    /// Read the value under `key`, unwrapping `{"value": ...}` when present.
    pub fn get(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
        let doc = self.open()?;
        Ok(doc.get(key).cloned().map(unwrap_value))
    }

    /// Set `key` in memory. Call `save` to persist.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        let doc = self.open()?;
        let mut wrapped = Map::new();
        wrapped.insert(VALUE_WRAPPER_KEY.to_string(), value);
        doc.insert(key.to_string(), Value::Object(wrapped));
        Ok(())
    }

    /// Write the whole document to disk atomically.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let path = self.path.clone();
        let doc = self.open()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(doc).map_err(|e| StoreError::Json {
            path: path.clone(),
            source: e,
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes()).map_err(|e| StoreError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            StoreError::Io {
                path: path.clone(),
                source: e,
            }
        })?;

        tracing::debug!(path = %path.display(), "Store saved");
        Ok(())
    }
}

/// Read a document from disk. A missing file is an empty document; a file
/// that is not a JSON object is discarded with a warning.
fn read_document(path: &Path) -> Result<Map<String, Value>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Store document not found; starting empty");
            return Ok(Map::new());
        }
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Store document is not a JSON object; starting empty");
            Ok(Map::new())
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Store document is malformed; starting empty"
            );
            Ok(Map::new())
        }
    }
}

/// `{"value": x}` becomes `x`; anything else is returned unchanged.
fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(VALUE_WRAPPER_KEY) => map
            .remove(VALUE_WRAPPER_KEY)
            .unwrap_or(Value::Null),
        other => other,
    }
}
