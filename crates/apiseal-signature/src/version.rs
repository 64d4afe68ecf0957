use apiseal_core::{ApiSealError, ApiSealResult};
use std::fmt;
use std::str::FromStr;

/// A protocol version and its registry identifier (`1.0` ↔ `v1_0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    id: String,
}

impl ApiVersion {
    /// Parse a dotted version such as `1.0`.
    pub fn parse(version: &str) -> ApiSealResult<Self> {
        let version = version.trim();
        let valid = !version.is_empty()
            && version.split('.').all(|part| {
                !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
            });
        if !valid {
            return Err(ApiSealError::config(format!(
                "invalid protocol version '{version}'"
            )));
        }
        Ok(Self {
            id: Self::translate(version),
        })
    }

    /// Identifier form of any version string: `v` + dots replaced by `_`.
    ///
    /// Infallible so that client-declared versions can be compared without
    /// being validated first.
    pub fn translate(version: &str) -> String {
        format!("v{}", version.replace('.', "_"))
    }

    /// Registry identifier, e.g. `v1_0`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dotted form, e.g. `1.0`.
    pub fn number(&self) -> String {
        self.id
            .strip_prefix('v')
            .unwrap_or(&self.id)
            .replace('_', ".")
    }

    /// Whether a client-declared version maps to this one.
    pub fn matches(&self, declared: &str) -> bool {
        Self::translate(declared) == self.id
    }
}

impl FromStr for ApiVersion {
    type Err = ApiSealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_round_trip() {
        let v = ApiVersion::parse("1.0").unwrap();
        assert_eq!(v.id(), "v1_0");
        assert_eq!(v.number(), "1.0");
        assert_eq!(v.to_string(), "1.0");

        let v: ApiVersion = "2.10.1".parse().unwrap();
        assert_eq!(v.id(), "v2_10_1");
        assert_eq!(v.number(), "2.10.1");
    }

    #[test]
    fn test_invalid_versions() {
        for bad in ["", "1.", ".1", "v1_0", "1.0-beta", "one"] {
            assert!(
                matches!(ApiVersion::parse(bad), Err(ApiSealError::Config(_))),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn test_matches_declared_version() {
        let v = ApiVersion::parse("1.0").unwrap();
        assert!(v.matches("1.0"));
        assert!(!v.matches("1.1"));
        assert!(!v.matches("v1_0"));
    }
}
