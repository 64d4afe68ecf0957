//! Storage media for session records.
//!
//! Every backend implements the same CRUD contract; the [`SessionStore`]
//! decides between `insert` and `update` and owns expiry.
//!
//! [`SessionStore`]: crate::store::SessionStore

/// One JSON file per session.
pub mod file;
/// Key-value hash behind the [`HashClient`](kv::HashClient) seam.
pub mod kv;
/// Redis client for the key-value backend.
#[cfg(feature = "redis")]
pub mod redis_client;
/// SQLite table.
pub mod relational;

use crate::record::{SessionModel, SessionRecord};
use apiseal_core::{ApiSealError, ApiSealResult, BackendConfig};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub use file::FileBackend;
pub use kv::{HashClient, KvBackend, MemoryHashClient};
pub use relational::RelationalBackend;

/// The storage media a deployment can choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Flat files.
    File,
    /// Relational rows.
    Relational,
    /// Key-value hash fields.
    KeyValue,
}

impl BackendKind {
    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Relational => "relational",
            BackendKind::KeyValue => "key_value",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ApiSealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "relational" | "sqlite" | "mysql" => Ok(BackendKind::Relational),
            "key_value" | "kv" | "redis" => Ok(BackendKind::KeyValue),
            other => Err(ApiSealError::config(format!(
                "unknown session backend '{other}'"
            ))),
        }
    }
}

impl From<&BackendConfig> for BackendKind {
    fn from(config: &BackendConfig) -> Self {
        match config {
            BackendConfig::File(_) => BackendKind::File,
            BackendConfig::Relational(_) => BackendKind::Relational,
            BackendConfig::KeyValue(_) => BackendKind::KeyValue,
        }
    }
}

/// Durable storage for session records.
///
/// `load` returns `None` only when the record is genuinely absent; any
/// connectivity or decoding failure is an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which medium this is.
    fn kind(&self) -> BackendKind;

    /// Prepare the medium. Called when the host opens the session machinery.
    async fn open(&self) -> ApiSealResult<()> {
        Ok(())
    }

    /// Fetch one record.
    async fn load(&self, session_id: &str) -> ApiSealResult<Option<SessionRecord>>;

    /// Persist a record that does not exist yet.
    async fn insert(&self, record: &SessionRecord) -> ApiSealResult<()>;

    /// Overwrite an existing record.
    async fn update(&self, record: &SessionRecord) -> ApiSealResult<()>;

    /// Delete one record. Deleting an absent record is not an error.
    async fn remove(&self, session_id: &str) -> ApiSealResult<()>;

    /// Delete those of `session_ids` whose last write is still before
    /// `cutoff`, returning how many were removed. Records refreshed since
    /// they were listed are kept.
    async fn remove_group(&self, session_ids: &[String], cutoff: i64) -> ApiSealResult<usize>;

    /// Ids whose last write happened before `cutoff` (unix seconds).
    async fn lost_sessions(&self, cutoff: i64) -> ApiSealResult<Vec<String>>;

    /// Release the medium at the end of a request cycle.
    async fn close(&self) -> ApiSealResult<()> {
        Ok(())
    }
}

/// Construct the backend selected by `config`.
///
/// The relational backend derives its column list from `model`.
pub async fn build_backend(
    config: &BackendConfig,
    model: &SessionModel,
) -> ApiSealResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config {
        BackendConfig::File(file) => Arc::new(FileBackend::new(file).await?),
        BackendConfig::Relational(rel) => Arc::new(RelationalBackend::open(rel, model)?),
        BackendConfig::KeyValue(kv) => build_key_value(kv).await?,
    };
    info!(backend = %backend.kind(), model = %model.name(), "Session backend ready");
    Ok(backend)
}

#[cfg(feature = "redis")]
async fn build_key_value(
    config: &apiseal_core::KeyValueBackendConfig,
) -> ApiSealResult<Arc<dyn StorageBackend>> {
    let client = redis_client::RedisHashClient::connect(config).await?;
    Ok(Arc::new(KvBackend::new(Arc::new(client), &config.hash)))
}

#[cfg(not(feature = "redis"))]
async fn build_key_value(
    _config: &apiseal_core::KeyValueBackendConfig,
) -> ApiSealResult<Arc<dyn StorageBackend>> {
    Err(ApiSealError::config(
        "key_value backend requires the `redis` feature",
    ))
}

/// Reject ids that could escape a namespace (path separators, `..`, NUL).
pub(crate) fn validate_session_id(session_id: &str) -> ApiSealResult<()> {
    if session_id.is_empty()
        || session_id.contains(['/', '\\', '\0'])
        || session_id.contains("..")
    {
        return Err(ApiSealError::runtime(format!(
            "invalid session id '{}'",
            session_id.escape_debug()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_aliases() {
        assert_eq!("file".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!("MySQL".parse::<BackendKind>().unwrap(), BackendKind::Relational);
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Relational);
        assert_eq!("redis".parse::<BackendKind>().unwrap(), BackendKind::KeyValue);
        assert_eq!("key_value".parse::<BackendKind>().unwrap(), BackendKind::KeyValue);
    }

    #[test]
    fn test_unknown_backend_kind() {
        assert!(matches!(
            "mongo".parse::<BackendKind>(),
            Err(ApiSealError::Config(_))
        ));
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("380853FABE3930471FA3").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id("a\\b").is_err());
    }

    #[tokio::test]
    async fn test_build_file_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let config = BackendConfig::File(apiseal_core::FileBackendConfig {
            save_path: tmp.path().join("sessions"),
            ..Default::default()
        });
        let backend = build_backend(&config, &SessionModel::default())
            .await
            .unwrap();
        assert_eq!(backend.kind(), BackendKind::File);
        assert_eq!(BackendKind::from(&config), BackendKind::File);
        assert!(tmp.path().join("sessions").is_dir());
    }
}
