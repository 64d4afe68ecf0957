use crate::backend::{build_backend, BackendKind, StorageBackend};
use crate::hooks::{LifecycleHooks, SessionEvent};
use crate::locks::SessionLocks;
use crate::record::{SessionModel, SessionRecord};
use apiseal_core::{ApiSealError, ApiSealResult, Clock, SessionConfig, MIN_SESSION_TTL_SECS};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ids locked together while gc removes them.
const GC_LOCK_BATCH: usize = 500;

/// The verbs a host runtime drives a session store with.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Start a request cycle.
    async fn open(&self, name: &str) -> ApiSealResult<()>;
    /// Session data for `session_id`; empty for an unknown id.
    async fn read(&self, session_id: &str) -> ApiSealResult<String>;
    /// Persist `data` for `session_id`, creating the record on first write.
    async fn write(&self, session_id: &str, data: &str) -> ApiSealResult<()>;
    /// End the request cycle.
    async fn close(&self) -> ApiSealResult<()>;
    /// Remove one session.
    async fn destroy(&self, session_id: &str) -> ApiSealResult<()>;
    /// Remove sessions last written more than `max_lifetime` seconds ago.
    /// Returns how many were removed.
    async fn gc(&self, max_lifetime: i64) -> ApiSealResult<usize>;
}

/// Session persistence with TTL expiry and lifecycle hooks over any
/// [`StorageBackend`].
///
/// Construct once at startup and share behind an `Arc`.
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
    hooks: LifecycleHooks,
    model: SessionModel,
    clock: Arc<dyn Clock>,
    expires_time: AtomicI64,
    current: Mutex<Option<SessionRecord>>,
    locks: SessionLocks,
}

impl SessionStore {
    /// A store over `backend` with identity hooks and the minimum TTL.
    pub fn new(backend: Arc<dyn StorageBackend>, model: SessionModel, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            hooks: LifecycleHooks::new(),
            model,
            clock,
            expires_time: AtomicI64::new(MIN_SESSION_TTL_SECS),
            current: Mutex::new(None),
            locks: SessionLocks::new(),
        }
    }

    /// Build the model and backend described by `[session]`.
    pub async fn from_config(config: &SessionConfig, clock: Arc<dyn Clock>) -> ApiSealResult<Self> {
        let model = SessionModel::from_name(&config.model)?;
        let backend = build_backend(&config.backend, &model).await?;
        let store = Self::new(backend, model, clock);
        store.set_expires_time(config.min_ttl_secs)?;
        Ok(store)
    }

    /// Replace the lifecycle hooks.
    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// TTL stamped on records created from now on. Must be at least
    /// [`MIN_SESSION_TTL_SECS`].
    pub fn set_expires_time(&self, ttl: i64) -> ApiSealResult<()> {
        if ttl < MIN_SESSION_TTL_SECS {
            return Err(ApiSealError::config(format!(
                "session TTL {ttl}s is below the {MIN_SESSION_TTL_SECS}s minimum"
            )));
        }
        self.expires_time.store(ttl, Ordering::Relaxed);
        Ok(())
    }

    /// TTL stamped on new records.
    pub fn expires_time(&self) -> i64 {
        self.expires_time.load(Ordering::Relaxed)
    }

    /// Whether a record exists. Runs no hooks and ignores expiry.
    pub async fn exists(&self, session_id: &str) -> ApiSealResult<bool> {
        Ok(self.backend.load(session_id).await?.is_some())
    }

    /// The record checked out by the last `read` or `write`.
    pub fn current(&self) -> Option<SessionRecord> {
        self.current.lock().clone()
    }

    /// Active backend medium.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Record model.
    pub fn model(&self) -> &SessionModel {
        &self.model
    }

    /// Time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn load(&self, session_id: &str) -> ApiSealResult<Option<SessionRecord>> {
        Ok(self
            .backend
            .load(session_id)
            .await?
            .map(|record| self.model.fit(record)))
    }
}

#[async_trait]
impl SessionHandler for SessionStore {
    async fn open(&self, name: &str) -> ApiSealResult<()> {
        self.hooks
            .trigger(SessionEvent::Open, self.model.blank(""))
            .await?;
        self.backend.open().await?;
        debug!(name = %name, backend = %self.backend.kind(), "Session store opened");
        Ok(())
    }

    async fn read(&self, session_id: &str) -> ApiSealResult<String> {
        let _guard = self.locks.acquire(session_id).await;

        let Some(record) = self.load(session_id).await? else {
            debug!(session_id = %session_id, "No stored session");
            *self.current.lock() = None;
            return Ok(String::new());
        };

        let record = self.hooks.trigger(SessionEvent::Read, record).await?;
        let now = self.clock.now();
        if record.is_expired(now) {
            self.backend.remove(session_id).await?;
            *self.current.lock() = None;
            warn!(
                session_id = %session_id,
                idle_secs = now - record.session_time,
                "Session expired and was removed"
            );
            return Err(ApiSealError::SessionExpired {
                session_id: session_id.to_string(),
            });
        }

        let data = record.session_data.clone();
        *self.current.lock() = Some(record);
        Ok(data)
    }

    async fn write(&self, session_id: &str, data: &str) -> ApiSealResult<()> {
        let _guard = self.locks.acquire(session_id).await;

        let (mut record, exists) = match self.load(session_id).await? {
            Some(record) => (record, true),
            None => {
                let mut record = self.model.blank(session_id);
                record.expires_time = self.expires_time();
                (record, false)
            }
        };
        record.session_time = self.clock.now();
        record.session_data = data.to_string();

        let record = self.hooks.trigger(SessionEvent::Write, record).await?;
        if exists {
            self.backend.update(&record).await?;
        } else {
            self.backend.insert(&record).await?;
            info!(session_id = %session_id, ttl = record.expires_time, "Session created");
        }

        *self.current.lock() = Some(record);
        Ok(())
    }

    async fn close(&self) -> ApiSealResult<()> {
        let record = self
            .current
            .lock()
            .take()
            .unwrap_or_else(|| self.model.blank(""));
        self.hooks.trigger(SessionEvent::Close, record).await?;
        self.backend.close().await
    }

    async fn destroy(&self, session_id: &str) -> ApiSealResult<()> {
        let _guard = self.locks.acquire(session_id).await;

        let record = self
            .load(session_id)
            .await?
            .unwrap_or_else(|| self.model.blank(session_id));
        self.hooks.trigger(SessionEvent::Remove, record).await?;
        self.backend.remove(session_id).await?;

        let mut current = self.current.lock();
        if current
            .as_ref()
            .is_some_and(|r| r.session_id == session_id)
        {
            *current = None;
        }
        debug!(session_id = %session_id, "Session destroyed");
        Ok(())
    }

    async fn gc(&self, max_lifetime: i64) -> ApiSealResult<usize> {
        let cutoff = self.clock.now() - max_lifetime;
        let lost = self.backend.lost_sessions(cutoff).await?;
        if lost.is_empty() {
            debug!(cutoff, "No sessions to collect");
            return Ok(0);
        }
        let mut removed = 0;
        for batch in lost.chunks(GC_LOCK_BATCH) {
            let mut guards = Vec::with_capacity(batch.len());
            for session_id in batch {
                guards.push(self.locks.acquire(session_id).await);
            }
            removed += self.backend.remove_group(batch, cutoff).await?;
        }
        info!(cutoff, removed, backend = %self.backend.kind(), "Collected stale sessions");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backend::KvBackend;
    use apiseal_core::ManualClock;

    fn store(clock: Arc<ManualClock>) -> SessionStore {
        SessionStore::new(
            Arc::new(KvBackend::in_memory("session")),
            SessionModel::default(),
            clock,
        )
    }

    #[tokio::test]
    async fn test_unknown_id_reads_empty() {
        let s = store(Arc::new(ManualClock::new(0)));
        assert_eq!(s.read("NEW").await.unwrap(), "");
        assert!(s.current().is_none());
    }

    #[tokio::test]
    async fn test_first_write_stamps_ttl_and_time() {
        let clock = Arc::new(ManualClock::new(500));
        let s = store(clock.clone());
        s.write("S", "a=1").await.unwrap();

        let current = s.current().unwrap();
        assert_eq!(current.session_time, 500);
        assert_eq!(current.expires_time, MIN_SESSION_TTL_SECS);
        assert_eq!(current.extra_value("remote_ip"), Some(&serde_json::json!("")));
    }

    #[tokio::test]
    async fn test_ttl_change_applies_to_new_records_only() {
        let clock = Arc::new(ManualClock::new(0));
        let s = store(clock.clone());
        s.write("OLD", "x").await.unwrap();
        s.set_expires_time(7200).unwrap();
        s.write("OLD", "y").await.unwrap();
        s.write("NEW", "z").await.unwrap();

        assert_eq!(s.current().unwrap().expires_time, 7200);
        clock.set(1801);
        assert!(matches!(
            s.read("OLD").await,
            Err(ApiSealError::SessionExpired { .. })
        ));
        assert_eq!(s.read("NEW").await.unwrap(), "z");
    }

    #[tokio::test]
    async fn test_ttl_floor() {
        let s = store(Arc::new(ManualClock::new(0)));
        assert!(matches!(
            s.set_expires_time(1799),
            Err(ApiSealError::Config(_))
        ));
        assert_eq!(s.expires_time(), MIN_SESSION_TTL_SECS);
    }

    #[tokio::test]
    async fn test_close_resets_checked_out_record() {
        let s = store(Arc::new(ManualClock::new(0)));
        s.write("S", "a").await.unwrap();
        assert!(s.current().is_some());
        s.close().await.unwrap();
        assert!(s.current().is_none());
    }
}
