use crate::checker::CheckContext;
use crate::package::SignaturePackage;
use crate::registry::CheckerRegistry;
use crate::request::RequestContext;
use crate::version::ApiVersion;
use apiseal_core::{ApiSealResult, Clock, ProtocolConfig};
use std::sync::Arc;
use tracing::{debug, warn};

/// Verifies signed packages against the checker registry.
///
/// Construct once at startup and share it; configuration is fixed after
/// construction.
pub struct SignatureProtocol {
    registry: CheckerRegistry,
    clock: Arc<dyn Clock>,
    signature_header: String,
    max_signature_age: Option<i64>,
    version: ApiVersion,
    checker: String,
}

impl SignatureProtocol {
    /// Protocol with the given registry, verifying `1.0` with the `auth`
    /// checker from the `authorization` header.
    pub fn new(registry: CheckerRegistry, clock: Arc<dyn Clock>) -> ApiSealResult<Self> {
        Self::from_config(&ProtocolConfig::default(), registry, clock)
    }

    /// Protocol configured from the `[protocol]` table.
    ///
    /// The configured version/checker pair must resolve now, so a typo fails
    /// at startup rather than on the first request.
    pub fn from_config(
        config: &ProtocolConfig,
        registry: CheckerRegistry,
        clock: Arc<dyn Clock>,
    ) -> ApiSealResult<Self> {
        let version = ApiVersion::parse(&config.version)?;
        registry.resolve(&version, &config.checker)?;

        Ok(Self {
            registry,
            clock,
            signature_header: config.signature_header.to_ascii_lowercase(),
            max_signature_age: config.max_signature_age,
            version,
            checker: config.checker.clone(),
        })
    }

    /// Active protocol version.
    pub fn version(&self) -> &ApiVersion {
        &self.version
    }

    /// Header the package is read from.
    pub fn signature_header(&self) -> &str {
        &self.signature_header
    }

    /// Verify with the configured version and checker.
    pub fn verify(&self, request: &dyn RequestContext) -> ApiSealResult<SignaturePackage> {
        let version = self.version.clone();
        self.verify_as(request, &version, &self.checker)
    }

    /// Verify with an explicit version string and optional checker name.
    pub fn verify_with(
        &self,
        request: &dyn RequestContext,
        version: &str,
        checker: Option<&str>,
    ) -> ApiSealResult<SignaturePackage> {
        let version = ApiVersion::parse(version)?;
        let checker = checker.unwrap_or(&self.checker).to_string();
        self.verify_as(request, &version, &checker)
    }

    fn verify_as(
        &self,
        request: &dyn RequestContext,
        version: &ApiVersion,
        checker_name: &str,
    ) -> ApiSealResult<SignaturePackage> {
        let checker = self.registry.resolve(version, checker_name)?;
        let ctx = CheckContext {
            request,
            server_time: self.clock.now(),
            signature_header: &self.signature_header,
            max_signature_age: self.max_signature_age,
        };

        match checker.check(&ctx) {
            Ok(package) => {
                debug!(
                    session_id = %package.session_id,
                    version = %version,
                    "Signature verified"
                );
                Ok(package)
            }
            Err(e) => {
                warn!(version = %version, checker = %checker_name, error = %e, "Signature rejected");
                Err(e)
            }
        }
    }
}
