//! Shared foundations for the apiseal crates.
//!
//! # Main types
//!
//! - [`ApiSealError`] — Unified error enum for signature verification and
//!   session persistence.
//! - [`ApiSealResult`] — Convenience alias for `Result<T, ApiSealError>`.
//! - [`Clock`] — Time source used for expiry, gc and signature freshness.
//! - [`ApiSealConfig`] — TOML configuration document.

/// Time sources.
pub mod clock;
/// TOML configuration.
pub mod config;
/// Error taxonomy.
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ApiSealConfig, BackendConfig, FileBackendConfig, KeyValueBackendConfig, ProtocolConfig,
    RelationalBackendConfig, SessionConfig, MIN_SESSION_TTL_SECS,
};
pub use error::{ApiSealError, ApiSealResult};
