//! On-disk cache store.
//!
//! Layout: one directory per partition under the root, one JSON file per
//! record named by the SHA-256 of its signature.
//!
//! ```text
//! root/
//!   etags-cache-1.4.0/
//!     3f1a...e9.json
//!     91bc...07.json
//!   etags-cache-1.3.2/
//!     ...
//! ```

use crate::{CacheError, CacheKey, CacheRecord, CacheStore, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const RECORD_EXTENSION: &str = "json";

/// Cache store persisting records as JSON files.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        if partition.is_empty()
            || partition.starts_with('.')
            || partition.contains('/')
            || partition.contains('\\')
        {
            return Err(CacheError::InvalidPartition(partition.to_string()));
        }
        Ok(self.root.join(partition))
    }

    fn record_path(&self, key: &CacheKey) -> Result<PathBuf> {
        let digest = Sha256::digest(key.signature.as_bytes());
        let name = format!("{}.{RECORD_EXTENSION}", hex::encode(digest));
        Ok(self.partition_dir(&key.partition)?.join(name))
    }

    fn read_record(path: &Path) -> Result<Option<CacheRecord>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn partition_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                dirs.push((name.to_string(), entry.path()));
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        let path = self.record_path(key)?;
        let Some(record) = Self::read_record(&path)? else {
            return Ok(None);
        };
        if record.signature != key.signature {
            return Err(CacheError::Corrupt(format!(
                "{} holds {} instead of {}",
                path.display(),
                record.signature,
                key.signature
            )));
        }
        Ok(Some(record))
    }

    fn put(&self, key: CacheKey, record: CacheRecord) -> Result<()> {
        let path = self.record_path(&key)?;
        let dir = self.partition_dir(&key.partition)?;
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&serde_json::to_vec(&record)?)?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut keys = Vec::new();
        for (partition, dir) in self.partition_dirs()? {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                    continue;
                }
                match Self::read_record(&path) {
                    Ok(Some(record)) => keys.push(CacheKey::new(partition.clone(), record.signature)),
                    Ok(None) => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache record"),
                }
            }
        }
        Ok(keys)
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        let path = self.record_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn partitions(&self) -> Result<Vec<String>> {
        Ok(self
            .partition_dirs()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    fn clear_partition(&self, partition: &str) -> Result<usize> {
        let dir = self.partition_dir(partition)?;
        let removed = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    entry.path().extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
                })
                .count(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        fs::remove_dir_all(&dir)?;
        Ok(removed)
    }
}
