use std::collections::BTreeMap;

/// Read access to the request being verified.
///
/// Implemented by the host's HTTP layer. Header keys are lower-case and an
/// `origin` header is synthesised from scheme and host when the client did not
/// send one. The method is lower-case.
pub trait RequestContext: Send + Sync {
    /// Decoded query string parameters.
    fn query_parameters(&self) -> BTreeMap<String, String>;

    /// Decoded form body parameters.
    fn post_parameters(&self) -> BTreeMap<String, String>;

    /// Request headers with lower-cased names.
    fn headers(&self) -> BTreeMap<String, String>;

    /// Request method, lower-case (`get`, `post`, ...).
    fn method(&self) -> String;
}

/// An owned request snapshot, built up field by field.
#[derive(Debug, Clone)]
pub struct StaticRequest {
    method: String,
    scheme: String,
    host: String,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
    post: BTreeMap<String, String>,
}

impl StaticRequest {
    /// A request with the given method against `http://localhost`.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            post: BTreeMap::new(),
        }
    }

    /// Set the scheme and `host[:port]` used to synthesise `origin`.
    pub fn with_host(mut self, scheme: impl Into<String>, host: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self.host = host.into();
        self
    }

    /// Add a header. The name is lower-cased.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a form body parameter.
    pub fn with_post(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.post.insert(key.into(), value.into());
        self
    }
}

impl RequestContext for StaticRequest {
    fn query_parameters(&self) -> BTreeMap<String, String> {
        self.query.clone()
    }

    fn post_parameters(&self) -> BTreeMap<String, String> {
        self.post.clone()
    }

    fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        headers.entry("origin".to_string()).or_insert_with(|| {
            format!("{}://{}", self.scheme.to_ascii_lowercase(), self.host)
        });
        headers
    }

    fn method(&self) -> String {
        self.method.to_ascii_lowercase()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_synthesised_when_absent() {
        let req = StaticRequest::new("GET").with_host("HTTP", "127.0.0.1:7001");
        assert_eq!(
            req.headers().get("origin").map(String::as_str),
            Some("http://127.0.0.1:7001")
        );
    }

    #[test]
    fn test_explicit_origin_wins() {
        let req = StaticRequest::new("get")
            .with_host("http", "internal:8080")
            .with_header("Origin", "https://app.example.com");
        assert_eq!(
            req.headers().get("origin").map(String::as_str),
            Some("https://app.example.com")
        );
    }

    #[test]
    fn test_method_and_header_case() {
        let req = StaticRequest::new("POST").with_header("X-Api-Init", "1");
        assert_eq!(req.method(), "post");
        assert!(req.headers().contains_key("x-api-init"));
    }
}
