//! Gateway-side values attached to model records.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies one extension value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionKey {
    /// Model name.
    pub model: String,
    /// Record index.
    pub record: u16,
    /// Field name.
    pub field: String,
}

impl ExtensionKey {
    /// Creates a key.
    pub fn new(model: impl Into<String>, record: u16, field: impl Into<String>) -> Self {
        ExtensionKey {
            model: model.into(),
            record,
            field: field.into(),
        }
    }
}

/// Storage for extension values, kept as text.
pub trait ExtensionStore: Send {
    /// Stored value, if any.
    fn get(&self, key: &ExtensionKey) -> Option<String>;

    /// Store a value.
    fn set(&mut self, key: ExtensionKey, value: String) -> io::Result<()>;
}

/// Extension values held in memory only.
#[derive(Debug, Default)]
pub struct MemoryExtensionStore {
    values: HashMap<ExtensionKey, String>,
}

impl MemoryExtensionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExtensionStore for MemoryExtensionStore {
    fn get(&self, key: &ExtensionKey) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: ExtensionKey, value: String) -> io::Result<()> {
        self.values.insert(key, value);
        Ok(())
    }
}

type JsonDocument = BTreeMap<String, BTreeMap<u16, BTreeMap<String, String>>>;

/// Extension values persisted as a JSON document `{model: {record: {field: value}}}`.
///
/// The file is rewritten on every change.
#[derive(Debug)]
pub struct JsonExtensionStore {
    path: PathBuf,
    values: JsonDocument,
}

impl JsonExtensionStore {
    /// Open a store, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => JsonDocument::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => JsonDocument::new(),
            Err(e) => return Err(e),
        };
        debug!(path = %path.display(), models = values.len(), "opened extension store");
        Ok(JsonExtensionStore { path, values })
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &JsonDocument) -> io::Result<()> {
        let text = serde_json::to_string_pretty(values).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)
    }
}

impl ExtensionStore for JsonExtensionStore {
    fn get(&self, key: &ExtensionKey) -> Option<String> {
        self.values.get(&key.model)?.get(&key.record)?.get(&key.field).cloned()
    }

    /// Values change only once the file is written.
    fn set(&mut self, key: ExtensionKey, value: String) -> io::Result<()> {
        let mut values = self.values.clone();
        values
            .entry(key.model)
            .or_default()
            .entry(key.record)
            .or_default()
            .insert(key.field, value);
        self.persist(&values)?;
        self.values = values;
        Ok(())
    }
}
