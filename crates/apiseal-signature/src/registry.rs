use crate::checker::{AuthChecker, SignatureChecker};
use crate::version::ApiVersion;
use apiseal_core::{ApiSealError, ApiSealResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a checker for the version it was registered under.
pub type CheckerFactory = Arc<dyn Fn(ApiVersion) -> Arc<dyn SignatureChecker> + Send + Sync>;

/// Maps `(version id, checker name)` to a checker factory.
pub struct CheckerRegistry {
    factories: HashMap<(String, String), CheckerFactory>,
}

impl CheckerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in checkers: `auth` for `1.0`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        if let Ok(v1) = ApiVersion::parse("1.0") {
            registry.register(
                &v1,
                AuthChecker::NAME,
                Arc::new(|version| Arc::new(AuthChecker::new(version)) as Arc<dyn SignatureChecker>),
            );
        }
        registry
    }

    /// Register (or replace) a checker.
    pub fn register(&mut self, version: &ApiVersion, name: &str, factory: CheckerFactory) {
        info!(version = %version, checker = %name, "Registered signature checker");
        self.factories
            .insert((version.id().to_string(), name.to_string()), factory);
    }

    /// Whether a checker is registered.
    pub fn contains(&self, version: &ApiVersion, name: &str) -> bool {
        self.factories
            .contains_key(&(version.id().to_string(), name.to_string()))
    }

    /// Instantiate the checker registered for `version` under `name`.
    pub fn resolve(
        &self,
        version: &ApiVersion,
        name: &str,
    ) -> ApiSealResult<Arc<dyn SignatureChecker>> {
        let factory = self
            .factories
            .get(&(version.id().to_string(), name.to_string()))
            .ok_or_else(|| {
                ApiSealError::config(format!(
                    "no signature checker '{name}' registered for version {version}"
                ))
            })?;
        Ok(factory(version.clone()))
    }

    /// Number of registered checkers.
    pub fn checker_count(&self) -> usize {
        self.factories.len()
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_auth_checker() {
        let registry = CheckerRegistry::with_defaults();
        let v1 = ApiVersion::parse("1.0").unwrap();
        assert!(registry.contains(&v1, "auth"));
        let checker = registry.resolve(&v1, "auth").unwrap();
        assert_eq!(checker.version().id(), "v1_0");
    }

    #[test]
    fn test_unknown_version_is_config_error() {
        let registry = CheckerRegistry::with_defaults();
        let v2 = ApiVersion::parse("2.0").unwrap();
        assert!(matches!(
            registry.resolve(&v2, "auth"),
            Err(ApiSealError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_checker_name_is_config_error() {
        let registry = CheckerRegistry::with_defaults();
        let v1 = ApiVersion::parse("1.0").unwrap();
        assert!(matches!(
            registry.resolve(&v1, "legacy"),
            Err(ApiSealError::Config(_))
        ));
    }

    #[test]
    fn test_register_additional_version() {
        let mut registry = CheckerRegistry::new();
        assert_eq!(registry.checker_count(), 0);
        let v2 = ApiVersion::parse("2.0").unwrap();
        registry.register(
            &v2,
            "auth",
            Arc::new(|version| Arc::new(AuthChecker::new(version)) as Arc<dyn SignatureChecker>),
        );
        let checker = registry.resolve(&v2, "auth").unwrap();
        assert_eq!(checker.version().number(), "2.0");
    }
}
