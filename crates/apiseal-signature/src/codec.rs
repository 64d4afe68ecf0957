//! Encoding primitives shared by the server checker and the client signer.
//!
//! Both sides must produce byte-identical output, so everything here is
//! deterministic: maps are sorted, JSON is compact and hex digests are
//! lower-case.

use apiseal_core::{ApiSealError, ApiSealResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Form-style encoding: alphanumerics and `-_.` pass through.
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// URL-encode a single component, spaces as `+`.
pub fn urlencode(input: &str) -> String {
    // A literal "%20" in the input is itself encoded as "%2520", so the
    // replacement only touches encoded spaces.
    utf8_percent_encode(input, FORM_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

/// `key=value&key=value` with keys sorted and both sides URL-encoded.
pub fn canonical_query<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = params.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencode(k.as_ref()), urlencode(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}

/// The `query` field of a package: a JSON object of URL-encoded pairs.
pub fn query_json<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let encoded: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (urlencode(k.as_ref()), urlencode(v.as_ref())))
        .collect();
    // A map of strings always serializes.
    serde_json::to_string(&encoded).unwrap_or_else(|_| "{}".to_string())
}

/// Lower-case hex SHA-1.
pub fn sha1_hex(input: &str) -> String {
    hex::encode(Sha1::digest(input.as_bytes()))
}

/// Digest over a package's key set: `sha1(join(sorted(keys), "&"))`.
pub fn keys_signature<'a, I>(keys: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    sha1_hex(&keys.join("&"))
}

/// `hex(HMAC-SHA256(key = client_time, host + "#" + method + "?query=" + sha1(canonical_query)))`.
pub fn query_signature(host: &str, method: &str, canonical_query: &str, client_time: &str) -> String {
    let message = format!("{host}#{method}?query={}", sha1_hex(canonical_query));
    // HMAC accepts keys of any length, including empty.
    let mut mac = match HmacSha256::new_from_slice(client_time.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// `base64(json(package))`. Keys come out sorted because the map is ordered.
pub fn pack(package: &BTreeMap<String, String>) -> String {
    let json = serde_json::to_string(package).unwrap_or_else(|_| "{}".to_string());
    BASE64.encode(json)
}

/// Decode a header value into its raw JSON object.
///
/// The decoded text must be framed as `{...}` before it is handed to the JSON
/// parser.
pub fn unpack(authorization: &str) -> ApiSealResult<Map<String, Value>> {
    let bytes = BASE64
        .decode(authorization.trim())
        .map_err(|_| ApiSealError::signature("signature package is not valid base64"))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| ApiSealError::signature("signature package is not valid UTF-8"))?;

    if !(text.starts_with('{') && text.ends_with('}')) {
        return Err(ApiSealError::signature("signature package is not recognised"));
    }

    serde_json::from_str::<Map<String, Value>>(&text)
        .map_err(|_| ApiSealError::signature("signature package could not be decoded"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode_form_semantics() {
        assert_eq!(urlencode("env107"), "env107");
        assert_eq!(urlencode("a b"), "a+b");
        assert_eq!(urlencode("http://127.0.0.1:7001"), "http%3A%2F%2F127.0.0.1%3A7001");
        assert_eq!(urlencode("a-b_c.d~e*f"), "a-b_c.d%7Ee%2Af");
        assert_eq!(urlencode("%20"), "%2520");
        assert_eq!(urlencode("é"), "%C3%A9");
    }

    #[test]
    fn test_canonical_query_is_order_independent() {
        let forward = canonical_query(vec![("a", "1"), ("b", "2")]);
        let backward = canonical_query(vec![("b", "2"), ("a", "1")]);
        assert_eq!(forward, backward);
        assert_eq!(forward, "a=1&b=2");
    }

    #[test]
    fn test_canonical_query_encodes_both_sides() {
        let q = canonical_query(vec![("full name", "Ada Lovelace"), ("q", "x&y=z")]);
        assert_eq!(q, "full+name=Ada+Lovelace&q=x%26y%3Dz");
    }

    #[test]
    fn test_canonical_query_empty() {
        let empty: Vec<(&str, &str)> = Vec::new();
        assert_eq!(canonical_query(empty), "");
    }

    #[test]
    fn test_query_json() {
        let json = query_json(vec![("title", "wind api"), ("name", "env107")]);
        assert_eq!(json, r#"{"name":"env107","title":"wind+api"}"#);
        let empty: Vec<(&str, &str)> = Vec::new();
        assert_eq!(query_json(empty), "{}");
    }

    #[test]
    fn test_keys_signature_ignores_order() {
        let a = keys_signature(["b", "a", "c"]);
        let b = keys_signature(["c", "b", "a"]);
        assert_eq!(a, b);
        assert_eq!(a, sha1_hex("a&b&c"));
    }

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(sha1_hex("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_query_signature_binds_every_input() {
        let sig = query_signature("host", "get", "", "1700000000");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, query_signature("host", "get", "", "1700000000"));
        assert_ne!(sig, query_signature("host", "post", "", "1700000000"));
        assert_ne!(sig, query_signature("host", "get", "", "1700000001"));
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let mut package = BTreeMap::new();
        package.insert("b".to_string(), "2".to_string());
        package.insert("a".to_string(), "1".to_string());
        let packed = pack(&package);

        let raw = unpack(&packed).unwrap();
        let restored: BTreeMap<String, String> = raw
            .into_iter()
            .map(|(k, v)| (k, v.as_str().unwrap_or_default().to_string()))
            .collect();
        assert_eq!(pack(&restored), packed);
    }

    #[test]
    fn test_unpack_rejects_bad_base64() {
        assert!(matches!(unpack("***"), Err(ApiSealError::Signature(_))));
    }

    #[test]
    fn test_unpack_rejects_unframed_payload() {
        let encoded = BASE64.encode("[1,2,3]");
        let err = unpack(&encoded).unwrap_err();
        assert!(err.to_string().contains("not recognised"));
    }

    #[test]
    fn test_unpack_rejects_invalid_json() {
        let encoded = BASE64.encode("{not json}");
        let err = unpack(&encoded).unwrap_err();
        assert!(err.to_string().contains("could not be decoded"));
    }
}
