use thiserror::Error;

/// A convenience `Result` alias using [`ApiSealError`].
pub type ApiSealResult<T> = Result<T, ApiSealError>;

/// Top-level error type shared by the signature and session crates.
#[derive(Error, Debug)]
pub enum ApiSealError {
    /// The signed package is missing, malformed, tampered with, or does not
    /// match the observed request.
    #[error("Signature error: {0}")]
    Signature(String),

    /// The session's TTL elapsed. The expired record has already been removed.
    #[error("Session expired: {session_id}")]
    SessionExpired {
        /// Id of the session that timed out.
        session_id: String,
    },

    /// A storage backend failed, or the session layer was misused.
    #[error("Session runtime error: {0}")]
    SessionRuntime(String),

    /// Invalid or unknown configuration (backend type, lifecycle event,
    /// checker version, TTL floor, model fields).
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything that does not fit the categories above.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiSealError {
    /// Shorthand for a [`ApiSealError::Signature`] error.
    pub fn signature(msg: impl Into<String>) -> Self {
        Self::Signature(msg.into())
    }

    /// Shorthand for a [`ApiSealError::SessionRuntime`] error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::SessionRuntime(msg.into())
    }

    /// Shorthand for a [`ApiSealError::Config`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Configuration and runtime failures abort the request; signature and
    /// expiry failures are ordinary outcomes reported to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Signature(_) | Self::SessionExpired { .. })
    }

    /// Message safe to hand to an untrusted caller.
    ///
    /// Signature and expiry details are part of the protocol and are shown
    /// verbatim. Everything else is collapsed to a generic text so backend
    /// paths, SQL and driver messages never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            Self::Signature(msg) => msg.clone(),
            Self::SessionExpired { .. } => "session expired".to_string(),
            Self::SessionRuntime(_) | Self::Config(_) => "session service unavailable".to_string(),
            Self::Json(_) | Self::Io(_) | Self::Internal(_) => "system error".to_string(),
        }
    }
}
