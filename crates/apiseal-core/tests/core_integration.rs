#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for apiseal-core.

use apiseal_core::{
    ApiSealConfig, ApiSealError, BackendConfig, Clock, ManualClock, SystemClock,
    MIN_SESSION_TTL_SECS,
};
use std::sync::Arc;

#[test]
fn test_full_document() {
    let raw = r#"
        [protocol]
        version = "1.0"
        checker = "auth"
        signature_header = "X-Signature"
        max_signature_age = 300

        [session]
        min_ttl_secs = 3600
        model = "bare"

        [session.backend]
        type = "file"
        save_path = "/var/lib/apiseal"
        prefix = "sess_"
        extension = ".json"
    "#;
    let config = ApiSealConfig::from_toml_str(raw).unwrap();
    assert_eq!(config.protocol.signature_header, "X-Signature");
    assert_eq!(config.protocol.max_signature_age, Some(300));
    assert_eq!(config.session.min_ttl_secs, 3600);
    assert_eq!(config.session.model, "bare");
    match config.session.backend {
        BackendConfig::File(file) => {
            assert_eq!(file.prefix, "sess_");
            assert_eq!(file.extension, ".json");
            assert_eq!(file.save_path.to_str(), Some("/var/lib/apiseal"));
        }
        other => panic!("expected file backend, got {other:?}"),
    }
}

#[test]
fn test_redis_alias_selects_key_value() {
    let raw = "[session.backend]\ntype = \"redis\"\nhash = \"api_sessions\"\n";
    let config = ApiSealConfig::from_toml_str(raw).unwrap();
    match config.session.backend {
        BackendConfig::KeyValue(kv) => {
            assert_eq!(kv.hash, "api_sessions");
            assert_eq!(kv.port, 6379);
        }
        other => panic!("expected key-value backend, got {other:?}"),
    }
}

#[test]
fn test_empty_signature_header_rejected() {
    let result = ApiSealConfig::from_toml_str("[protocol]\nsignature_header = \"\"\n");
    assert!(matches!(result, Err(ApiSealError::Config(_))));
}

#[test]
fn test_ttl_floor_constant() {
    assert_eq!(MIN_SESSION_TTL_SECS, 1800);
    let raw = format!("[session]\nmin_ttl_secs = {MIN_SESSION_TTL_SECS}\n");
    assert!(ApiSealConfig::from_toml_str(&raw).is_ok());
}

#[test]
fn test_clocks_behind_trait_object() {
    let manual = Arc::new(ManualClock::new(100));
    let clock: Arc<dyn Clock> = manual.clone();
    manual.advance(5);
    assert_eq!(clock.now(), 105);

    let system: Arc<dyn Clock> = Arc::new(SystemClock);
    assert!(system.now() > 1_600_000_000);
}

#[test]
fn test_public_message_hides_backend_detail() {
    let err = ApiSealError::runtime("sqlite: disk I/O error at /var/lib/x.db");
    assert!(!err.public_message().contains("sqlite"));
    assert!(err.is_fatal());
}
