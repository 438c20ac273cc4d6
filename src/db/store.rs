//! File-backed record store implementation.
//!
//! Every endpoint owns one YAML file in the data directory and at most one
//! favicon in the icons directory. Both are replaced with a write to a
//! sibling temp file followed by a rename, so readers only ever observe a
//! complete old or a complete new file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::models::EndpointRecord;

/// URL prefix under which saved favicons are served.
pub const ICON_URL_PREFIX: &str = "/icons";

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Not found")]
    NotFound,
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Durable per-endpoint storage shared by the poller and the web layer.
pub trait RecordStore: Send + Sync {
    /// Load the persisted record for `endpoint`, if any.
    fn load(&self, endpoint: &str) -> Result<Option<EndpointRecord>, StoreError>;

    /// Replace the persisted record for `endpoint`.
    fn put(&self, endpoint: &str, record: &EndpointRecord) -> Result<(), StoreError>;

    /// Save favicon bytes for `endpoint` and return the URL path they are served at.
    fn save_icon(&self, endpoint: &str, png: &[u8]) -> Result<String, StoreError>;

    /// Remove the favicon of `endpoint`. Missing files are not an error.
    fn remove_icon(&self, endpoint: &str) -> Result<(), StoreError>;

    /// Read a saved favicon by file name (`{endpoint}.png`).
    fn load_icon(&self, file_name: &str) -> Result<Vec<u8>, StoreError>;

    /// Load the record for `endpoint`, falling back to the default record.
    fn get(&self, endpoint: &str) -> Result<EndpointRecord, StoreError> {
        Ok(self.load(endpoint)?.unwrap_or_default())
    }
}

/// Run a store operation on the blocking thread pool.
///
/// Store methods do synchronous file I/O; async callers go through here so
/// they never stall a runtime worker.
pub async fn run_blocking<T, F>(store: &Arc<dyn RecordStore>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn RecordStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref())).await?
}

/// Record store keeping YAML files on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    icons_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given directories, creating them if needed.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(data_dir: P, icons_dir: Q) -> Result<Self, StoreError> {
        let store = Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            icons_dir: icons_dir.as_ref().to_path_buf(),
        };
        fs::create_dir_all(&store.data_dir)?;
        fs::create_dir_all(&store.icons_dir)?;
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn icons_dir(&self) -> &Path {
        &self.icons_dir
    }

    fn record_path(&self, endpoint: &str) -> Result<PathBuf, StoreError> {
        validate_key(endpoint)?;
        Ok(self.data_dir.join(format!("{}.yml", endpoint)))
    }

    fn icon_path(&self, endpoint: &str) -> Result<PathBuf, StoreError> {
        validate_key(endpoint)?;
        Ok(self.icons_dir.join(icon_file_name(endpoint)))
    }
}

impl RecordStore for FileStore {
    fn load(&self, endpoint: &str) -> Result<Option<EndpointRecord>, StoreError> {
        let path = self.record_path(endpoint)?;
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_yaml::from_str(&content)?))
    }

    fn put(&self, endpoint: &str, record: &EndpointRecord) -> Result<(), StoreError> {
        let path = self.record_path(endpoint)?;
        let content = serde_yaml::to_string(record)?;
        write_atomic(&path, content.as_bytes())?;
        Ok(())
    }

    fn save_icon(&self, endpoint: &str, png: &[u8]) -> Result<String, StoreError> {
        let path = self.icon_path(endpoint)?;
        write_atomic(&path, png)?;
        Ok(format!("{}/{}", ICON_URL_PREFIX, icon_file_name(endpoint)))
    }

    fn remove_icon(&self, endpoint: &str) -> Result<(), StoreError> {
        let path = self.icon_path(endpoint)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load_icon(&self, file_name: &str) -> Result<Vec<u8>, StoreError> {
        validate_key(file_name)?;
        match fs::read(self.icons_dir.join(file_name)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// File name under which the favicon of `endpoint` is stored.
pub fn icon_file_name(endpoint: &str) -> String {
    format!("{}.png", endpoint)
}

/// Reject keys that could escape the store directories or collide with temp files.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
        || key.ends_with(".tmp");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Write `data` to `path` so that concurrent readers never see a partial file.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp_path = dir.join(format!(".{}.{:08x}.tmp", name, rand::random::<u32>()));

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
