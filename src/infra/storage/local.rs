//! Uploads stored on the local filesystem and served by the router.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::domain::{AppError, FileStorage, StorageError};

pub struct LocalFileStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalFileStorage {
    /// `public_base` is the URL prefix the root directory is served under.
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        let root = root.into();
        info!(root = %root.display(), public_base, "Using local file storage");
        Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage key below the root, rejecting traversal.
    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AppError::invalid("key", "invalid storage key"));
        }
        Ok(self.root.join(relative))
    }

    fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.public_base.as_str())?
            .strip_prefix('/')
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn save(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, AppError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::from)?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(StorageError::from)?;
        debug!(path = %path.display(), content_type, "Stored upload");
        Ok(format!("{}/{}", self.public_base, key))
    }

    #[instrument(skip(self))]
    async fn delete(&self, url: &str) -> Result<(), AppError> {
        let Some(key) = self.key_from_url(url) else {
            debug!("Ignoring delete of foreign URL");
            return Ok(());
        };
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from(e).into()),
        }
    }
}
