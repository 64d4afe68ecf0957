//! Per-version signature checkers.
//!
//! A checker turns a request into a trusted [`SignaturePackage`] or a
//! signature error. [`AuthChecker`] implements protocol `1.0`; the helper
//! functions are public so later versions can reuse extraction and the
//! key-set check.

use crate::codec;
use crate::package::{SignaturePackage, PACKAGE_KEYS};
use crate::request::RequestContext;
use crate::version::ApiVersion;
use apiseal_core::{ApiSealError, ApiSealResult};
use serde_json::{Map, Value};
use tracing::debug;

/// How far `client_time` may run ahead of the server clock, in seconds.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 1;

/// Inputs a checker needs besides the request itself.
pub struct CheckContext<'a> {
    /// The request under verification.
    pub request: &'a dyn RequestContext,
    /// Server time for this verification, unix seconds.
    pub server_time: i64,
    /// Header carrying the signed package (lower-case).
    pub signature_header: &'a str,
    /// Optional replay window.
    pub max_signature_age: Option<i64>,
}

/// A signature verification strategy bound to one protocol version.
pub trait SignatureChecker: Send + Sync {
    /// Version this checker verifies.
    fn version(&self) -> &ApiVersion;

    /// Verify the request and return the trusted client package.
    fn check(&self, ctx: &CheckContext<'_>) -> ApiSealResult<SignaturePackage>;
}

/// Read the raw signed package from the request headers.
pub fn extract_authorization(ctx: &CheckContext<'_>) -> ApiSealResult<String> {
    ctx.request
        .headers()
        .remove(&ctx.signature_header.to_ascii_lowercase())
        .ok_or_else(|| ApiSealError::signature("signature data not found in request headers"))
}

/// Compare the decoded key set against [`PACKAGE_KEYS`], ignoring order.
pub fn verify_key_set(raw: &Map<String, Value>) -> ApiSealResult<()> {
    let client = codec::keys_signature(raw.keys().map(String::as_str));
    let expected = codec::keys_signature(PACKAGE_KEYS);
    if client != expected {
        return Err(ApiSealError::signature("signature package key set is invalid"));
    }
    Ok(())
}

/// Protocol `1.0` checker.
#[derive(Debug, Clone)]
pub struct AuthChecker {
    version: ApiVersion,
}

impl AuthChecker {
    /// Registry name of this checker.
    pub const NAME: &'static str = "auth";

    /// Create a checker for `version`.
    pub fn new(version: ApiVersion) -> Self {
        Self { version }
    }

    fn check_request(
        &self,
        package: &SignaturePackage,
        ctx: &CheckContext<'_>,
        origin: &str,
    ) -> ApiSealResult<()> {
        if !package
            .method
            .eq_ignore_ascii_case(&ctx.request.method())
        {
            return Err(ApiSealError::signature("request method does not match"));
        }

        if package.host != codec::urlencode(origin) {
            return Err(ApiSealError::signature("request origin does not match"));
        }

        if !self.version.matches(&package.version) {
            return Err(ApiSealError::signature("signature version is not supported"));
        }

        let client_time = package.client_time_secs()?;
        let age = ctx
            .server_time
            .checked_sub(client_time)
            .ok_or_else(|| ApiSealError::signature("client_time out of range"))?;
        if age < -CLOCK_SKEW_TOLERANCE_SECS {
            return Err(ApiSealError::signature("client_time too far in the future"));
        }
        if let Some(max_age) = ctx.max_signature_age {
            if age > max_age {
                return Err(ApiSealError::signature("signature has expired"));
            }
        }
        Ok(())
    }

    /// Rebuild the package from what the server observed.
    fn server_package(
        &self,
        client: &SignaturePackage,
        ctx: &CheckContext<'_>,
        origin: &str,
    ) -> SignaturePackage {
        let query = ctx.request.query_parameters();
        let host = codec::urlencode(origin);
        let method = ctx.request.method();
        let signature = codec::query_signature(
            &host,
            &method,
            &codec::canonical_query(&query),
            &client.client_time,
        );

        SignaturePackage {
            session_id: client.session_id.clone(),
            host,
            method,
            query: codec::query_json(&query),
            client_time: client.client_time.clone(),
            version: self.version.number(),
            signature,
        }
    }
}

impl SignatureChecker for AuthChecker {
    fn version(&self) -> &ApiVersion {
        &self.version
    }

    fn check(&self, ctx: &CheckContext<'_>) -> ApiSealResult<SignaturePackage> {
        let authorization = extract_authorization(ctx)?;
        let raw = codec::unpack(&authorization)?;
        verify_key_set(&raw)?;
        let package = SignaturePackage::from_json_map(&raw)?;

        let origin = ctx
            .request
            .headers()
            .remove("origin")
            .ok_or_else(|| ApiSealError::signature("request origin is unavailable"))?;

        self.check_request(&package, ctx, &origin)?;

        let server = self.server_package(&package, ctx, &origin);
        if server.pack() != package.pack() {
            debug!(
                session_id = %package.session_id,
                "reconstructed package differs from client package"
            );
            return Err(ApiSealError::signature("tampered package"));
        }

        Ok(package)
    }
}
