use super::{validate_session_id, BackendKind, StorageBackend};
use crate::record::SessionRecord;
use apiseal_core::{ApiSealError, ApiSealResult, FileBackendConfig};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// File-based session storage: one JSON file per session.
///
/// Files are named `prefix + session_id + extension`. Each file's mtime is set
/// to the record's `session_time`, which is what garbage collection scans.
pub struct FileBackend {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl FileBackend {
    /// Create the backend, creating `save_path` if needed.
    pub async fn new(config: &FileBackendConfig) -> ApiSealResult<Self> {
        tokio::fs::create_dir_all(&config.save_path)
            .await
            .map_err(|e| fs_error(&config.save_path, e))?;
        Ok(Self {
            dir: config.save_path.clone(),
            prefix: config.prefix.clone(),
            extension: config.extension.clone(),
        })
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> ApiSealResult<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self
            .dir
            .join(format!("{}{}{}", self.prefix, session_id, self.extension)))
    }

    fn session_id_of<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_prefix(&self.prefix)?
            .strip_suffix(&self.extension)
            .filter(|id| !id.is_empty())
    }

    /// Write through a temp file and rename, so readers never see a partial
    /// payload.
    async fn write_record(&self, path: &Path, record: &SessionRecord) -> ApiSealResult<()> {
        let json = record.to_json()?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", record.session_id, std::process::id()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
            let file = file.into_std().await;
            let mtime =
                UNIX_EPOCH + Duration::from_secs(record.session_time.max(0).unsigned_abs());
            file.set_modified(mtime)?;
            drop(file);
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(fs_error(path, e));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    async fn load(&self, session_id: &str) -> ApiSealResult<Option<SessionRecord>> {
        let path = self.session_path(session_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(fs_error(&path, e)),
        };

        let payload = raw.trim();
        if !(payload.starts_with('{') && payload.ends_with('}')) {
            warn!(session_id = %session_id, "Ignoring session file without a JSON object payload");
            return Ok(None);
        }
        SessionRecord::from_json(payload).map(Some)
    }

    async fn insert(&self, record: &SessionRecord) -> ApiSealResult<()> {
        let path = self.session_path(&record.session_id)?;
        self.write_record(&path, record).await?;
        debug!(session_id = %record.session_id, "Session file created");
        Ok(())
    }

    async fn update(&self, record: &SessionRecord) -> ApiSealResult<()> {
        let path = self.session_path(&record.session_id)?;
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| fs_error(&path, e))?;
        if !exists {
            return Err(ApiSealError::runtime(format!(
                "cannot update session {}: file does not exist",
                record.session_id
            )));
        }
        self.write_record(&path, record).await
    }

    async fn remove(&self, session_id: &str) -> ApiSealResult<()> {
        let path = self.session_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fs_error(&path, e)),
        }
    }

    async fn remove_group(&self, session_ids: &[String], cutoff: i64) -> ApiSealResult<usize> {
        let mut removed = 0;
        for session_id in session_ids {
            let path = self.session_path(session_id)?;
            let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(fs_error(&path, e)),
            };
            if unix_secs(modified) >= cutoff {
                debug!(session_id = %session_id, "Session refreshed since listing, kept");
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(fs_error(&path, e)),
            }
        }
        Ok(removed)
    }

    async fn lost_sessions(&self, cutoff: i64) -> ApiSealResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| fs_error(&self.dir, e))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| fs_error(&self.dir, e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(session_id) = self.session_id_of(name) else {
                continue;
            };
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                // Removed between the listing and the stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(fs_error(&entry.path(), e)),
            };
            if unix_secs(modified) < cutoff {
                ids.push(session_id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn fs_error(path: &Path, e: std::io::Error) -> ApiSealError {
    ApiSealError::runtime(format!("session file error at {}: {e}", path.display()))
}

fn unix_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}
