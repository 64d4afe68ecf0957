use crate::codec;
use crate::package::SignaturePackage;
use crate::request::RequestContext;
use apiseal_core::{ApiSealError, ApiSealResult};
use std::collections::BTreeMap;

/// Client half of the protocol: produces packages the checker accepts.
#[derive(Debug, Clone)]
pub struct PackageSigner {
    version: String,
}

impl PackageSigner {
    /// Signer declaring `version` (e.g. `1.0`).
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    /// Sign a call to `origin` with the given method and query parameters.
    pub fn sign(
        &self,
        session_id: &str,
        origin: &str,
        method: &str,
        query: &BTreeMap<String, String>,
        client_time: i64,
    ) -> SignaturePackage {
        let host = codec::urlencode(origin);
        let method = method.to_ascii_lowercase();
        let client_time = client_time.to_string();
        let signature =
            codec::query_signature(&host, &method, &codec::canonical_query(query), &client_time);

        SignaturePackage {
            session_id: session_id.to_string(),
            host,
            method,
            query: codec::query_json(query),
            client_time,
            version: self.version.clone(),
            signature,
        }
    }

    /// Sign an already-assembled request, reading origin, method and query
    /// from it.
    pub fn sign_request(
        &self,
        session_id: &str,
        request: &dyn RequestContext,
        client_time: i64,
    ) -> ApiSealResult<SignaturePackage> {
        let origin = request
            .headers()
            .remove("origin")
            .ok_or_else(|| ApiSealError::signature("request origin is unavailable"))?;
        Ok(self.sign(
            session_id,
            &origin,
            &request.method(),
            &request.query_parameters(),
            client_time,
        ))
    }
}

impl Default for PackageSigner {
    fn default() -> Self {
        Self::new("1.0")
    }
}
