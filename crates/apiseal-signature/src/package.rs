use crate::codec;
use apiseal_core::{ApiSealError, ApiSealResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The exact key set of a signed package.
pub const PACKAGE_KEYS: [&str; 7] = [
    "session_id",
    "host",
    "method",
    "query",
    "client_time",
    "version",
    "signature",
];

/// A decoded signed package. Every field travels as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePackage {
    /// Session the client claims. Empty when the client has none yet.
    pub session_id: String,
    /// URL-encoded request origin.
    pub host: String,
    /// Request method.
    pub method: String,
    /// JSON object of URL-encoded query pairs.
    pub query: String,
    /// Client clock, unix seconds. Also the HMAC key.
    pub client_time: String,
    /// Protocol version, e.g. `1.0`.
    pub version: String,
    /// Hex HMAC-SHA256 over host, method and query digest.
    pub signature: String,
}

impl SignaturePackage {
    /// Build a package from a decoded JSON object.
    ///
    /// Values must be strings; integers are accepted and rendered in decimal
    /// so clients may send `client_time` as a number.
    pub fn from_json_map(raw: &Map<String, Value>) -> ApiSealResult<Self> {
        let field = |key: &str| -> ApiSealResult<String> {
            match raw.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
                Some(_) => Err(ApiSealError::signature(format!(
                    "signature field '{key}' has an invalid type"
                ))),
                None => Err(ApiSealError::signature(format!(
                    "signature field '{key}' is missing"
                ))),
            }
        };

        Ok(Self {
            session_id: field("session_id")?,
            host: field("host")?,
            method: field("method")?,
            query: field("query")?,
            client_time: field("client_time")?,
            version: field("version")?,
            signature: field("signature")?,
        })
    }

    /// Decode a header value.
    pub fn unpack(authorization: &str) -> ApiSealResult<Self> {
        Self::from_json_map(&codec::unpack(authorization)?)
    }

    /// Key-sorted view used for packing and comparison.
    pub fn to_sorted_map(&self) -> BTreeMap<String, String> {
        PACKAGE_KEYS
            .iter()
            .zip([
                &self.session_id,
                &self.host,
                &self.method,
                &self.query,
                &self.client_time,
                &self.version,
                &self.signature,
            ])
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    /// Encode as a header value.
    pub fn pack(&self) -> String {
        codec::pack(&self.to_sorted_map())
    }

    /// `client_time` as unix seconds.
    pub fn client_time_secs(&self) -> ApiSealResult<i64> {
        self.client_time
            .trim()
            .parse::<i64>()
            .map_err(|_| ApiSealError::signature("client_time is not an integer timestamp"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SignaturePackage {
        SignaturePackage {
            session_id: "380853FABE3930471FA3".into(),
            host: "http%3A%2F%2F127.0.0.1%3A7001".into(),
            method: "get".into(),
            query: r#"{"name":"env107"}"#.into(),
            client_time: "1700000000".into(),
            version: "1.0".into(),
            signature: "00".into(),
        }
    }

    #[test]
    fn test_sorted_map_has_seven_keys() {
        let map = sample().to_sorted_map();
        assert_eq!(map.len(), 7);
        let keys: Vec<&String> = map.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let packed = sample().pack();
        let unpacked = SignaturePackage::unpack(&packed).unwrap();
        assert_eq!(unpacked, sample());
        assert_eq!(unpacked.pack(), packed);
    }

    #[test]
    fn test_integer_client_time_is_normalised() {
        let raw = json!({
            "session_id": "", "host": "h", "method": "get", "query": "{}",
            "client_time": 1700000000, "version": "1.0", "signature": "s"
        });
        let package = SignaturePackage::from_json_map(raw.as_object().unwrap()).unwrap();
        assert_eq!(package.client_time, "1700000000");
        assert_eq!(package.client_time_secs().unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_non_scalar_field_rejected() {
        let raw = json!({
            "session_id": "", "host": "h", "method": "get", "query": {"a": "1"},
            "client_time": "1", "version": "1.0", "signature": "s"
        });
        let err = SignaturePackage::from_json_map(raw.as_object().unwrap()).unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn test_non_numeric_client_time() {
        let mut package = sample();
        package.client_time = "soon".into();
        assert!(matches!(
            package.client_time_secs(),
            Err(ApiSealError::Signature(_))
        ));
    }
}
