use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use boardpilot_core::domain::memory::MemorySnapshot;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io error on `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("could not encode memory snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("could not decode memory snapshot from `{location}`: {source}")]
    Decode { location: String, source: serde_json::Error },
    #[error("snapshot backend rejected the write: {0}")]
    Rejected(String),
}

/// Whole-document storage for the memory snapshot.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<MemorySnapshot>, BackendError>;

    async fn save(&self, snapshot: &MemorySnapshot) -> Result<(), BackendError>;

    fn location(&self) -> String;
}

/// Pretty-printed JSON document on local disk. Writes go to a sibling temp
/// file first and are renamed into place.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> BackendError {
        BackendError::Io { path: path.to_path_buf(), source }
    }
}

#[async_trait]
impl SnapshotBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<MemorySnapshot>, BackendError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(&self.path, error)),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| BackendError::Decode { location: self.location(), source })
    }

    async fn save(&self, snapshot: &MemorySnapshot) -> Result<(), BackendError> {
        let encoded = serde_json::to_vec_pretty(snapshot).map_err(BackendError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| self.io_error(parent, error))?;
        }

        let staging = self.staging_path();
        tokio::fs::write(&staging, encoded).await.map_err(|error| self.io_error(&staging, error))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|error| self.io_error(&self.path, error))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Process-local backend. Can be told to reject writes.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    stored: RwLock<Option<MemorySnapshot>>,
    reject_writes: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(snapshot: MemorySnapshot) -> Self {
        Self { stored: RwLock::new(Some(snapshot)), ..Self::default() }
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Option<MemorySnapshot> {
        self.stored.read().await.clone()
    }
}

#[async_trait]
impl SnapshotBackend for InMemoryBackend {
    async fn load(&self) -> Result<Option<MemorySnapshot>, BackendError> {
        Ok(self.stored.read().await.clone())
    }

    async fn save(&self, snapshot: &MemorySnapshot) -> Result<(), BackendError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("writes are disabled".to_string()));
        }
        *self.stored.write().await = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "in-memory".to_string()
    }
}
