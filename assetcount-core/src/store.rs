//! Blob storage for raw pages and reports
//!
//! The fetch and transform stages run independently and hand data over
//! through a blob store: the fetch stage writes the raw blob, the transform
//! stage reads it back and writes the report next to it.
//!
//! Raw blobs grow with the inventory, so they move through the store as
//! streams ([`BlobStore::put_file`], [`BlobStore::open`]). Reports are small
//! and go through [`BlobStore::put`].
//!
//! Keys are `/`-separated relative paths such as
//! `rawData/cloud-guard-protected-assets-2022-September-08.json`.

use std::collections::HashMap;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncSeekExt;

use crate::error::{Error, Result};

/// Opaque byte storage addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write (or replace) the blob at `key`.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Copy a file into the blob at `key`, from the start of the file.
    ///
    /// Returns the number of bytes written.
    async fn put_file(&self, key: &str, file: std::fs::File) -> Result<u64>;

    /// Read the whole blob. Returns `Error::NotFound` if it doesn't exist.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Open the blob for sequential reading.
    async fn open(&self, key: &str) -> Result<Box<dyn Read + Send>>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

fn store_error(key: &str, e: impl std::fmt::Display) -> Error {
    Error::Store {
        key: key.to_string(),
        message: e.to_string(),
    }
}

/// Blobs as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path inside the root, rejecting keys that would escape it.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(Error::Store {
                key: key.to_string(),
                message: "key must be a relative path without '..'".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Sibling temp path for `path`; readers never see a partial blob.
    async fn staging_path(&self, key: &str, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_error(key, e))?;
        }
        Ok(path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4())))
    }

    /// Move a fully written temp file into place.
    async fn commit(&self, key: &str, tmp: &Path, path: &Path) -> Result<()> {
        if let Err(e) = tokio::fs::rename(tmp, path).await {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(store_error(key, e));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = self.staging_path(key, &path).await?;

        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(store_error(key, e));
        }
        self.commit(key, &tmp, &path).await?;

        tracing::debug!(key, bytes = data.len(), path = %path.display(), "Blob written");
        Ok(())
    }

    async fn put_file(&self, key: &str, file: std::fs::File) -> Result<u64> {
        let path = self.path_for(key)?;
        let tmp = self.staging_path(key, &path).await?;

        let mut source = tokio::fs::File::from_std(file);
        let copied = async {
            source.rewind().await?;
            let mut dest = tokio::fs::File::create(&tmp).await?;
            let written = tokio::io::copy(&mut source, &mut dest).await?;
            dest.sync_all().await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        let written = match copied {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(store_error(key, e));
            }
        };
        self.commit(key, &tmp, &path).await?;

        tracing::debug!(key, bytes = written, path = %path.display(), "Blob streamed");
        Ok(written)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(store_error(key, e)),
        }
    }

    async fn open(&self, key: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.path_for(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file.into_std().await))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(store_error(key, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| store_error(key, e))
    }
}

/// In-memory blob store for tests.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .read()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

fn poisoned(key: &str) -> Error {
    store_error(key, "lock poisoned")
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let mut blobs = self.blobs.write().map_err(|_| poisoned(key))?;
        blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn put_file(&self, key: &str, mut file: std::fs::File) -> Result<u64> {
        let mut data = Vec::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut data))
            .map_err(|e| store_error(key, e))?;
        let written = data.len() as u64;
        self.put(key, Bytes::from(data)).await?;
        Ok(written)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let blobs = self.blobs.read().map_err(|_| poisoned(key))?;
        blobs.get(key).cloned().ok_or_else(|| Error::NotFound {
            key: key.to_string(),
        })
    }

    async fn open(&self, key: &str) -> Result<Box<dyn Read + Send>> {
        let data = self.get(key).await?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let blobs = self.blobs.read().map_err(|_| poisoned(key))?;
        Ok(blobs.contains_key(key))
    }
}
