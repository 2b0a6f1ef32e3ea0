//! Storage for compiled graphs.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::DiResult;

/// Byte store keyed by string.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> DiResult<Option<Vec<u8>>>;

    fn set(&self, key: &str, bytes: &[u8]) -> DiResult<()>;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> DiResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> DiResult<()> {
        self.entries.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// One file per key under a directory.
///
/// File names are the hex encoded key, so any key is safe on disk. Writes go
/// through a temporary file and a rename.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{CacheStore, FileCache};
///
/// let dir = std::env::temp_dir().join("anvil-di-doc-cache");
/// let cache = FileCache::new(&dir).unwrap();
/// cache.set("app:Module", b"{}").unwrap();
/// assert_eq!(cache.get("app:Module").unwrap().as_deref(), Some(&b"{}"[..]));
/// assert!(cache.get("missing").unwrap().is_none());
/// # std::fs::remove_dir_all(dir).ok();
/// ```
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Opens (creating if needed) the cache directory.
    pub fn new(dir: impl AsRef<Path>) -> DiResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        let name: String = key.bytes().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> DiResult<Option<Vec<u8>>> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, bytes: &[u8]) -> DiResult<()> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_overwrites() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").unwrap().is_none());
        cache.set("k", b"1").unwrap();
        cache.set("k", b"2").unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"2".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_file_names_are_hex() {
        let cache = FileCache { dir: PathBuf::from("/cache") };
        assert_eq!(cache.path("a:b"), PathBuf::from("/cache/613a62.json"));
    }
}
