use crate::record::SessionRecord;
use apiseal_core::{ApiSealError, ApiSealResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Points in a session's lifecycle where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The host opened the session machinery.
    Open,
    /// A stored record was loaded.
    Read,
    /// A record is about to be persisted.
    Write,
    /// The checked-out record is being released.
    Close,
    /// A record is about to be removed.
    Remove,
}

impl SessionEvent {
    /// Every event, in lifecycle order.
    pub const ALL: [SessionEvent; 5] = [
        SessionEvent::Open,
        SessionEvent::Read,
        SessionEvent::Write,
        SessionEvent::Close,
        SessionEvent::Remove,
    ];

    /// Lower-case event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::Open => "open",
            SessionEvent::Read => "read",
            SessionEvent::Write => "write",
            SessionEvent::Close => "close",
            SessionEvent::Remove => "remove",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionEvent {
    type Err = ApiSealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionEvent::ALL
            .into_iter()
            .find(|event| event.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ApiSealError::config(format!("unknown session event '{s}'")))
    }
}

/// Transforms a record at one lifecycle event.
#[async_trait]
pub trait SessionHook: Send + Sync {
    /// Return the (possibly modified) record.
    async fn run(&self, record: SessionRecord) -> ApiSealResult<SessionRecord>;
}

/// One hook per lifecycle event. Events without a registered hook pass the
/// record through unchanged.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    hooks: HashMap<SessionEvent, Arc<dyn SessionHook>>,
}

impl LifecycleHooks {
    /// Identity hooks for every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the hook for `event`.
    pub fn register(&mut self, event: SessionEvent, hook: Arc<dyn SessionHook>) {
        info!(event = %event, "Registered session hook");
        self.hooks.insert(event, hook);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, event: SessionEvent, hook: Arc<dyn SessionHook>) -> Self {
        self.register(event, hook);
        self
    }

    /// Whether a non-identity hook is registered for `event`.
    pub fn is_registered(&self, event: SessionEvent) -> bool {
        self.hooks.contains_key(&event)
    }

    /// Number of registered hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Run the hook for `event`.
    pub async fn trigger(
        &self,
        event: SessionEvent,
        record: SessionRecord,
    ) -> ApiSealResult<SessionRecord> {
        match self.hooks.get(&event) {
            Some(hook) => {
                debug!(event = %event, session_id = %record.session_id, "Running session hook");
                hook.run(record).await
            }
            None => Ok(record),
        }
    }

    /// Run the hook for an event given by name.
    pub async fn trigger_named(
        &self,
        event: &str,
        record: SessionRecord,
    ) -> ApiSealResult<SessionRecord> {
        self.trigger(event.parse()?, record).await
    }
}

type AddrSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Stamps the caller's address into the `remote_ip` extension field.
///
/// Usually registered for [`SessionEvent::Write`]. When the source yields
/// nothing the record is left as is.
#[derive(Clone)]
pub struct RemoteAddrHook {
    source: AddrSource,
}

impl RemoteAddrHook {
    /// Read the address from `source` each time the hook runs.
    pub fn new(source: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Always stamp `addr`.
    pub fn fixed(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self::new(move || Some(addr.clone()))
    }
}

#[async_trait]
impl SessionHook for RemoteAddrHook {
    async fn run(&self, mut record: SessionRecord) -> ApiSealResult<SessionRecord> {
        if let Some(addr) = (self.source)() {
            record.set_extra("remote_ip", Value::String(addr))?;
        }
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionHook for Recording {
        async fn run(&self, record: SessionRecord) -> ApiSealResult<SessionRecord> {
            self.seen.lock().push(record.session_id.clone());
            Ok(record)
        }
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in SessionEvent::ALL {
            assert_eq!(event.as_str().parse::<SessionEvent>().unwrap(), event);
        }
        assert_eq!("WRITE".parse::<SessionEvent>().unwrap(), SessionEvent::Write);
    }

    #[test]
    fn test_unknown_event_is_config_error() {
        assert!(matches!(
            "flush".parse::<SessionEvent>(),
            Err(ApiSealError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_event_is_identity() {
        let hooks = LifecycleHooks::new();
        let record = SessionRecord::new("S");
        let out = hooks.trigger(SessionEvent::Read, record.clone()).await.unwrap();
        assert_eq!(out, record);
    }

    #[tokio::test]
    async fn test_registered_hook_runs_only_for_its_event() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let hooks = LifecycleHooks::new().with(SessionEvent::Close, recording.clone());

        hooks.trigger(SessionEvent::Open, SessionRecord::new("a")).await.unwrap();
        hooks.trigger_named("close", SessionRecord::new("b")).await.unwrap();

        assert_eq!(*recording.seen.lock(), vec!["b".to_string()]);
        assert!(hooks.is_registered(SessionEvent::Close));
        assert_eq!(hooks.hook_count(), 1);
    }

    #[tokio::test]
    async fn test_trigger_named_unknown_event() {
        let hooks = LifecycleHooks::new();
        let result = hooks.trigger_named("nope", SessionRecord::new("S")).await;
        assert!(matches!(result, Err(ApiSealError::Config(_))));
    }

    #[tokio::test]
    async fn test_remote_addr_hook_stamps_ip() {
        let hook = RemoteAddrHook::fixed("10.1.2.3");
        let out = hook.run(SessionRecord::new("S")).await.unwrap();
        assert_eq!(out.extra_value("remote_ip"), Some(&Value::from("10.1.2.3")));

        let silent = RemoteAddrHook::new(|| None);
        let out = silent.run(SessionRecord::new("S")).await.unwrap();
        assert!(out.extra_value("remote_ip").is_none());
    }
}
