//! Session persistence for apiseal.
//!
//! One set of session semantics (mandatory fields, minimum TTL, read-time
//! expiry, create-vs-update) over interchangeable storage media.
//!
//! # Main types
//!
//! - [`SessionStore`] — Implements the [`SessionHandler`] verbs over a backend.
//! - [`SessionFacade`] — Request-scoped load/save API and session bootstrap.
//! - [`StorageBackend`] — File, relational and key-value media.
//! - [`SessionRecord`] / [`SessionModel`] — Stored record and its template.
//! - [`LifecycleHooks`] — Per-event record transforms.

/// Storage media.
pub mod backend;
/// Request-scoped facade.
pub mod facade;
/// Lifecycle hooks.
pub mod hooks;
/// Per-session locks.
pub mod locks;
/// Records and models.
pub mod record;
/// The session store.
pub mod store;

pub use backend::{
    build_backend, BackendKind, FileBackend, HashClient, KvBackend, MemoryHashClient,
    RelationalBackend, StorageBackend,
};
#[cfg(feature = "redis")]
pub use backend::redis_client::RedisHashClient;
pub use facade::{ResumeMode, ResumeOutcome, SessionFacade, SESSION_NAME};
pub use hooks::{LifecycleHooks, RemoteAddrHook, SessionEvent, SessionHook};
pub use locks::SessionLocks;
pub use record::{
    ExtraProperties, RemoteIpProperties, SessionModel, SessionRecord, MANDATORY_FIELDS,
};
pub use store::{SessionHandler, SessionStore};
