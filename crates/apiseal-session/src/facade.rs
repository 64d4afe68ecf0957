use crate::store::{SessionHandler, SessionStore};
use apiseal_core::{ApiSealError, ApiSealResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Name passed to [`SessionHandler::open`] by the facade.
pub const SESSION_NAME: &str = "APISESSID";

/// How [`SessionFacade::resume`] treats the client's session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Bootstrap call: mint a session when the client has none, and replace
    /// an expired one.
    Initialize,
    /// Regular call: the client must present a live session.
    Normal,
}

/// What [`SessionFacade::resume`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// A new session was minted for a client without one.
    Created {
        /// The new id.
        session_id: String,
    },
    /// The client's session was loaded.
    Resumed {
        /// The client's id.
        session_id: String,
        /// Stored session data.
        data: String,
    },
    /// The client's session had expired and a replacement was minted.
    Reissued {
        /// The replacement id.
        session_id: String,
        /// The expired id.
        expired: String,
    },
}

impl ResumeOutcome {
    /// Id of the session now active.
    pub fn session_id(&self) -> &str {
        match self {
            ResumeOutcome::Created { session_id }
            | ResumeOutcome::Resumed { session_id, .. }
            | ResumeOutcome::Reissued { session_id, .. } => session_id,
        }
    }
}

/// Request-scoped convenience API over a shared [`SessionStore`].
///
/// Emulates the host runtime: `load` opens and reads, `save` writes and
/// closes. Only one session can be active at a time.
pub struct SessionFacade {
    store: Arc<SessionStore>,
    active: Mutex<Option<String>>,
}

impl SessionFacade {
    /// Wrap a shared store.
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            active: Mutex::new(None),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Id of the active session, if any.
    pub fn active_id(&self) -> Option<String> {
        self.active.lock().clone()
    }

    /// A fresh session id: 20 upper-case hex characters.
    pub fn create_id() -> ApiSealResult<String> {
        let mut bytes = [0u8; 10];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| ApiSealError::Internal(format!("random source unavailable: {e}")))?;
        Ok(hex::encode_upper(bytes))
    }

    /// Open and read `session_id`, making it the active session.
    pub async fn load(&self, session_id: &str) -> ApiSealResult<String> {
        let active = self.active_id();
        if let Some(active) = active {
            if active != session_id {
                return Err(ApiSealError::runtime(format!(
                    "session {active} is still active; save or destroy it first"
                )));
            }
        }

        self.store.open(SESSION_NAME).await?;
        let data = self.store.read(session_id).await?;
        *self.active.lock() = Some(session_id.to_string());
        Ok(data)
    }

    /// [`load`](Self::load) decoded as a JSON object. Empty data is an empty
    /// map.
    pub async fn load_map(&self, session_id: &str) -> ApiSealResult<Map<String, Value>> {
        let data = self.load(session_id).await?;
        if data.is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&data) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ApiSealError::runtime(format!(
                "session {session_id} data is not a JSON object"
            ))),
            Err(e) => Err(ApiSealError::runtime(format!(
                "session {session_id} data is not decodable: {e}"
            ))),
        }
    }

    /// Persist `data` for the active session and release it.
    pub async fn save(&self, data: &str) -> ApiSealResult<()> {
        let session_id = self.require_active()?;
        self.store.write(&session_id, data).await?;
        self.store.close().await?;
        *self.active.lock() = None;
        debug!(session_id = %session_id, "Session saved");
        Ok(())
    }

    /// [`save`](Self::save) a JSON object.
    pub async fn save_map(&self, data: &Map<String, Value>) -> ApiSealResult<()> {
        let encoded = serde_json::to_string(data)?;
        self.save(&encoded).await
    }

    /// Whether `session_id` is stored.
    pub async fn exists(&self, session_id: &str) -> ApiSealResult<bool> {
        self.store.exists(session_id).await
    }

    /// Remove the active session and release it.
    pub async fn destroy(&self) -> ApiSealResult<()> {
        let session_id = self.require_active()?;
        self.store.destroy(&session_id).await?;
        self.store.close().await?;
        *self.active.lock() = None;
        Ok(())
    }

    /// Change the TTL stamped on new sessions.
    pub fn set_expires_time(&self, ttl: i64) -> ApiSealResult<()> {
        self.store.set_expires_time(ttl)
    }

    /// Bring the client's session into play.
    ///
    /// `client_session_id` is the id from the verified signature package and
    /// may be empty.
    pub async fn resume(
        &self,
        client_session_id: &str,
        mode: ResumeMode,
    ) -> ApiSealResult<ResumeOutcome> {
        if client_session_id.is_empty() {
            return match mode {
                ResumeMode::Initialize => {
                    let session_id = self.mint().await?;
                    Ok(ResumeOutcome::Created { session_id })
                }
                ResumeMode::Normal => Err(ApiSealError::runtime("session not initialised")),
            };
        }

        if !self.exists(client_session_id).await? {
            return Err(ApiSealError::runtime(format!(
                "session {client_session_id} does not exist"
            )));
        }

        match (self.load(client_session_id).await, mode) {
            (Ok(data), _) => Ok(ResumeOutcome::Resumed {
                session_id: client_session_id.to_string(),
                data,
            }),
            (Err(ApiSealError::SessionExpired { session_id }), ResumeMode::Initialize) => {
                let replacement = self.mint().await?;
                info!(expired = %session_id, session_id = %replacement, "Reissued expired session");
                Ok(ResumeOutcome::Reissued {
                    session_id: replacement,
                    expired: session_id,
                })
            }
            (Err(e), _) => Err(e),
        }
    }

    async fn mint(&self) -> ApiSealResult<String> {
        let session_id = Self::create_id()?;
        self.load(&session_id).await?;
        Ok(session_id)
    }

    fn require_active(&self) -> ApiSealResult<String> {
        self.active
            .lock()
            .clone()
            .ok_or_else(|| ApiSealError::runtime("no active session"))
    }
}
