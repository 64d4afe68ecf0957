//! TOML configuration for the signature protocol and the session layer.
//!
//! Everything has a default, so an empty file is a valid configuration that
//! verifies version `1.0` packages and stores sessions as files under
//! `./data/sessions`.

use crate::error::{ApiSealError, ApiSealResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hard floor for a session TTL, in seconds.
pub const MIN_SESSION_TTL_SECS: i64 = 1800;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSealConfig {
    /// Signature protocol settings.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Session store settings.
    #[serde(default)]
    pub session: SessionConfig,
}

impl ApiSealConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> ApiSealResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ApiSealError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> ApiSealResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ApiSealError::config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), version = %config.protocol.version, "Loaded configuration");
        Ok(config)
    }

    /// Reject values the runtime refuses to start with.
    pub fn validate(&self) -> ApiSealResult<()> {
        if self.protocol.version.trim().is_empty() {
            return Err(ApiSealError::config("protocol.version must not be empty"));
        }
        if self.protocol.signature_header.trim().is_empty() {
            return Err(ApiSealError::config(
                "protocol.signature_header must not be empty",
            ));
        }
        if self.session.min_ttl_secs < MIN_SESSION_TTL_SECS {
            return Err(ApiSealError::config(format!(
                "session.min_ttl_secs must be at least {MIN_SESSION_TTL_SECS}, got {}",
                self.session.min_ttl_secs
            )));
        }
        Ok(())
    }
}

/// Signature protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Active protocol version, e.g. `1.0`.
    #[serde(default = "default_version")]
    pub version: String,
    /// Checker registered for that version.
    #[serde(default = "default_checker")]
    pub checker: String,
    /// Header carrying the signed package. Compared lower-case.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    /// Reject packages whose `client_time` is older than this many seconds.
    /// Unset keeps the baseline behaviour (only future skew is rejected).
    #[serde(default)]
    pub max_signature_age: Option<i64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            checker: default_checker(),
            signature_header: default_signature_header(),
            max_signature_age: None,
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// TTL stamped on newly created records.
    #[serde(default = "default_min_ttl")]
    pub min_ttl_secs: i64,
    /// Record model: `default` (adds `remote_ip`) or `bare`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Storage medium.
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_ttl_secs: default_min_ttl(),
            model: default_model(),
            backend: BackendConfig::default(),
        }
    }
}

/// Backend selection plus its connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// One JSON file per session.
    File(FileBackendConfig),
    /// One row per session in a SQLite table.
    #[serde(alias = "sqlite", alias = "mysql")]
    Relational(RelationalBackendConfig),
    /// One field per session inside a key-value hash.
    #[serde(alias = "redis")]
    KeyValue(KeyValueBackendConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::File(FileBackendConfig::default())
    }
}

/// File backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBackendConfig {
    /// Directory holding the session files. Created if missing.
    #[serde(default = "default_save_path")]
    pub save_path: PathBuf,
    /// File name prefix.
    #[serde(default = "default_file_prefix")]
    pub prefix: String,
    /// File name extension, including the dot.
    #[serde(default = "default_file_extension")]
    pub extension: String,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            prefix: default_file_prefix(),
            extension: default_file_extension(),
        }
    }
}

/// Relational backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalBackendConfig {
    /// Database file. `:memory:` opens a private in-memory database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Session table name.
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for RelationalBackendConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            table: default_table(),
        }
    }
}

/// Key-value backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValueBackendConfig {
    /// Server host.
    #[serde(default = "default_kv_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_kv_port")]
    pub port: u16,
    /// Name of the hash holding all sessions.
    #[serde(default = "default_hash")]
    pub hash: String,
    /// Connect and response timeout in seconds.
    #[serde(default = "default_kv_timeout")]
    pub timeout_secs: u64,
    /// Optional server password.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for KeyValueBackendConfig {
    fn default() -> Self {
        Self {
            host: default_kv_host(),
            port: default_kv_port(),
            hash: default_hash(),
            timeout_secs: default_kv_timeout(),
            password: None,
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}
fn default_checker() -> String {
    "auth".to_string()
}
fn default_signature_header() -> String {
    "authorization".to_string()
}
fn default_min_ttl() -> i64 {
    MIN_SESSION_TTL_SECS
}
fn default_model() -> String {
    "default".to_string()
}
fn default_save_path() -> PathBuf {
    PathBuf::from("./data/sessions")
}
fn default_file_prefix() -> String {
    "session_".to_string()
}
fn default_file_extension() -> String {
    ".sfile".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/sessions.db")
}
fn default_table() -> String {
    "sessions".to_string()
}
fn default_kv_host() -> String {
    "127.0.0.1".to_string()
}
fn default_kv_port() -> u16 {
    6379
}
fn default_hash() -> String {
    "session".to_string()
}
fn default_kv_timeout() -> u64 {
    5
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ApiSealConfig::from_toml_str("").unwrap();
        assert_eq!(config.protocol.version, "1.0");
        assert_eq!(config.protocol.checker, "auth");
        assert_eq!(config.protocol.signature_header, "authorization");
        assert!(config.protocol.max_signature_age.is_none());
        assert_eq!(config.session.min_ttl_secs, 1800);
        match config.session.backend {
            BackendConfig::File(file) => {
                assert_eq!(file.prefix, "session_");
                assert_eq!(file.extension, ".sfile");
            }
            other => panic!("expected file backend, got {other:?}"),
        }
    }

    #[test]
    fn test_relational_alias() {
        let raw = r#"
            [session.backend]
            type = "sqlite"
            path = ":memory:"
            table = "api_sessions"
        "#;
        let config = ApiSealConfig::from_toml_str(raw).unwrap();
        match config.session.backend {
            BackendConfig::Relational(rel) => assert_eq!(rel.table, "api_sessions"),
            other => panic!("expected relational backend, got {other:?}"),
        }
    }

    #[test]
    fn test_key_value_backend() {
        let raw = r#"
            [session.backend]
            type = "key_value"
            host = "cache.internal"
            hash = "api_session"
        "#;
        let config = ApiSealConfig::from_toml_str(raw).unwrap();
        match config.session.backend {
            BackendConfig::KeyValue(kv) => {
                assert_eq!(kv.host, "cache.internal");
                assert_eq!(kv.port, 6379);
                assert_eq!(kv.hash, "api_session");
            }
            other => panic!("expected key-value backend, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_backend_type_is_config_error() {
        let raw = r#"
            [session.backend]
            type = "memcached"
        "#;
        let err = ApiSealConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, ApiSealError::Config(_)));
    }

    #[test]
    fn test_ttl_below_floor_rejected() {
        let raw = r#"
            [session]
            min_ttl_secs = 600
        "#;
        let err = ApiSealConfig::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("1800"));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("apiseal.toml");
        std::fs::write(&path, "[protocol]\nmax_signature_age = 300\n").unwrap();
        let config = ApiSealConfig::load(&path).unwrap();
        assert_eq!(config.protocol.max_signature_age, Some(300));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ApiSealConfig::load(Path::new("/nonexistent/apiseal.toml")).unwrap_err();
        assert!(matches!(err, ApiSealError::Config(_)));
    }
}
