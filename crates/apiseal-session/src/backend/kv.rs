use super::{BackendKind, StorageBackend};
use crate::record::SessionRecord;
use apiseal_core::ApiSealResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The hash commands the key-value backend needs from a client.
#[async_trait]
pub trait HashClient: Send + Sync {
    /// Value of `field` in `hash`, if present.
    async fn hget(&self, hash: &str, field: &str) -> ApiSealResult<Option<String>>;

    /// Set `field` in `hash`, overwriting any previous value.
    async fn hset(&self, hash: &str, field: &str, value: &str) -> ApiSealResult<()>;

    /// Delete `field` from `hash`. Returns whether it existed.
    async fn hdel(&self, hash: &str, field: &str) -> ApiSealResult<bool>;

    /// Release the connection.
    async fn close(&self) -> ApiSealResult<()> {
        Ok(())
    }
}

/// In-process hash store.
#[derive(Debug, Default)]
pub struct MemoryHashClient {
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryHashClient {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields in `hash`.
    pub fn len(&self, hash: &str) -> usize {
        self.hashes.read().get(hash).map_or(0, HashMap::len)
    }

    /// Whether `hash` has no fields.
    pub fn is_empty(&self, hash: &str) -> bool {
        self.len(hash) == 0
    }
}

#[async_trait]
impl HashClient for MemoryHashClient {
    async fn hget(&self, hash: &str, field: &str) -> ApiSealResult<Option<String>> {
        Ok(self
            .hashes
            .read()
            .get(hash)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> ApiSealResult<()> {
        self.hashes
            .write()
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, hash: &str, field: &str) -> ApiSealResult<bool> {
        Ok(self
            .hashes
            .write()
            .get_mut(hash)
            .is_some_and(|h| h.remove(field).is_some()))
    }
}

/// Key-value session storage: one hash field per session, holding the JSON
/// record.
///
/// The medium keeps no last-modified index, so [`lost_sessions`] is always
/// empty and [`remove_group`] does nothing. Deployments on this backend rely
/// on read-time expiry, or on a server-side key TTL.
///
/// [`lost_sessions`]: StorageBackend::lost_sessions
/// [`remove_group`]: StorageBackend::remove_group
pub struct KvBackend {
    client: Arc<dyn HashClient>,
    hash: String,
}

impl KvBackend {
    /// Store sessions in `hash` through `client`.
    pub fn new(client: Arc<dyn HashClient>, hash: impl Into<String>) -> Self {
        Self {
            client,
            hash: hash.into(),
        }
    }

    /// Backend over a fresh [`MemoryHashClient`].
    pub fn in_memory(hash: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryHashClient::new()), hash)
    }

    /// Name of the hash holding the sessions.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    async fn put(&self, record: &SessionRecord) -> ApiSealResult<()> {
        let json = record.to_json()?;
        self.client
            .hset(&self.hash, &record.session_id, &json)
            .await
    }
}

#[async_trait]
impl StorageBackend for KvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    async fn load(&self, session_id: &str) -> ApiSealResult<Option<SessionRecord>> {
        match self.client.hget(&self.hash, session_id).await? {
            Some(raw) => SessionRecord::from_json(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn insert(&self, record: &SessionRecord) -> ApiSealResult<()> {
        self.put(record).await?;
        debug!(session_id = %record.session_id, hash = %self.hash, "Session field created");
        Ok(())
    }

    async fn update(&self, record: &SessionRecord) -> ApiSealResult<()> {
        self.put(record).await
    }

    async fn remove(&self, session_id: &str) -> ApiSealResult<()> {
        self.client.hdel(&self.hash, session_id).await?;
        Ok(())
    }

    async fn remove_group(&self, _session_ids: &[String], _cutoff: i64) -> ApiSealResult<usize> {
        Ok(0)
    }

    async fn lost_sessions(&self, _cutoff: i64) -> ApiSealResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> ApiSealResult<()> {
        self.client.close().await
    }
}
