//! Persistent logical name to native name mappings
//!
//! Both directions are stored so that resolving either side is a single
//! lookup, and `map` keeps them consistent by evicting stale entries first.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Storage for logical name ↔ native name mappings
pub trait NameStore: Send + Sync {
    /// Native name mapped to a logical name
    fn native_name(&self, name: &str) -> Result<Option<String>>;

    /// Logical name mapped to a native name
    fn name(&self, native_name: &str) -> Result<Option<String>>;

    /// Map a logical name to a native name, replacing any older mapping of either
    fn map(&self, name: &str, native_name: &str) -> Result<()>;

    /// Remove the mapping for a logical name, returning its native name
    fn unmap(&self, name: &str) -> Result<Option<String>>;

    /// Whether a native name is mapped to anything
    fn is_mapped(&self, native_name: &str) -> Result<bool> {
        Ok(self.name(native_name)?.is_some())
    }
}

/// Mappings for one platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameTable {
    /// logical → native
    #[serde(default)]
    pub names: BTreeMap<String, String>,
    /// native → logical
    #[serde(default)]
    pub natives: BTreeMap<String, String>,
}

impl NameTable {
    fn map(&mut self, name: &str, native_name: &str) {
        if let Some(old_native) = self.names.remove(name) {
            self.natives.remove(&old_native);
        }
        if let Some(old_name) = self.natives.remove(native_name) {
            self.names.remove(&old_name);
        }
        self.names.insert(name.to_string(), native_name.to_string());
        self.natives.insert(native_name.to_string(), name.to_string());
    }

    fn unmap(&mut self, name: &str) -> Option<String> {
        let native = self.names.remove(name)?;
        self.natives.remove(&native);
        Some(native)
    }
}

/// Name store backed by a TOML file, one table per platform
///
/// ```toml
/// [linux.names]
/// office = "wg0"
///
/// [linux.natives]
/// wg0 = "office"
/// ```
pub struct FileNameStore {
    path: PathBuf,
    platform: String,
    guard: Mutex<()>,
}

impl FileNameStore {
    pub fn new(path: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            platform: platform.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, NameTable>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, tables: &BTreeMap<String, NameTable>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let content = toml::to_string_pretty(tables)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn table(&self) -> Result<NameTable> {
        Ok(self.read_all()?.remove(&self.platform).unwrap_or_default())
    }

    fn update<T>(&self, f: impl FnOnce(&mut NameTable) -> T) -> Result<T> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| Error::Lock("name store mutex poisoned".into()))?;
        let mut tables = self.read_all()?;
        let result = f(tables.entry(self.platform.clone()).or_default());
        self.write_all(&tables)?;
        Ok(result)
    }
}

impl NameStore for FileNameStore {
    fn native_name(&self, name: &str) -> Result<Option<String>> {
        Ok(self.table()?.names.get(name).cloned())
    }

    fn name(&self, native_name: &str) -> Result<Option<String>> {
        Ok(self.table()?.natives.get(native_name).cloned())
    }

    fn map(&self, name: &str, native_name: &str) -> Result<()> {
        log::debug!("Mapping {} to {} in {}", name, native_name, self.path.display());
        self.update(|t| t.map(name, native_name))
    }

    fn unmap(&self, name: &str) -> Result<Option<String>> {
        log::debug!("Unmapping {} in {}", name, self.path.display());
        self.update(|t| t.unmap(name))
    }
}

/// In-memory name store
#[derive(Default)]
pub struct MemoryNameStore {
    table: Mutex<NameTable>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current mappings
    pub fn snapshot(&self) -> NameTable {
        self.table.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut NameTable) -> T) -> Result<T> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Lock("name store mutex poisoned".into()))?;
        Ok(f(&mut table))
    }
}

impl NameStore for MemoryNameStore {
    fn native_name(&self, name: &str) -> Result<Option<String>> {
        self.with(|t| t.names.get(name).cloned())
    }

    fn name(&self, native_name: &str) -> Result<Option<String>> {
        self.with(|t| t.natives.get(native_name).cloned())
    }

    fn map(&self, name: &str, native_name: &str) -> Result<()> {
        self.with(|t| t.map(name, native_name))
    }

    fn unmap(&self, name: &str) -> Result<Option<String>> {
        self.with(|t| t.unmap(name))
    }
}
