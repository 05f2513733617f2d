//! File-backed session store
//!
//! Persists each session as `<id>.json` under a root directory, with a
//! write-through in-memory cache in front of the files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::session::{Session, SessionStore};

/// File-backed [`SessionStore`] with a write-through cache.
pub struct FileSessionStore {
    directory: PathBuf,
    cache: RwLock<HashMap<String, Session>>,
}

impl FileSessionStore {
    /// Open a store rooted at `directory`, creating it if needed.
    pub async fn new(directory: impl Into<PathBuf>) -> EngineResult<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self {
            directory,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.directory.join(format!("{session_id}.json"))
    }

    /// The root directory of this store.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, id: &str) -> EngineResult<Option<Session>> {
        if let Some(session) = self.cache.read().await.get(id) {
            return Ok(Some(session.clone()));
        }

        let path = self.path_for(id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let session: Session = serde_json::from_slice(&raw).map_err(|err| {
            EngineError::StoreFailure(format!(
                "failed to deserialize session file {}: {err}",
                path.display()
            ))
        })?;

        self.cache
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> EngineResult<()> {
        let raw = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(self.path_for(&session.id), raw).await?;
        self.cache
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> EngineResult<()> {
        self.cache.write().await.remove(id);
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: Option<&str>) -> EngineResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "skipping session file with non-UTF-8 name");
                continue;
            };
            if prefix.is_none_or(|p| stem.starts_with(p)) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
