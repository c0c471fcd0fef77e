// HTTP request and response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_LOCATION: &str = "Location";
pub const HEADER_ALLOW: &str = "Allow";
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";

pub const MIME_JSON: &str = "application/json; charset=UTF-8";
pub const MIME_HTML: &str = "text/html; charset=UTF-8";
pub const MIME_TEXT: &str = "text/plain; charset=UTF-8";
pub const MIME_FORM: &str = "application/x-www-form-urlencoded";

/// Request as handed to the router by the transport.
///
/// `path` is the raw request target, query string included, exactly as it
/// arrived. Percent-escapes are left alone; the router decodes captured
/// parameter values itself.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a request with no headers and an empty body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// The part of the target the router matches against.
    pub fn route_path(&self) -> &str {
        match memchr::memchr(b'?', self.path.as_bytes()) {
            Some(idx) => &self.path[..idx],
            None => &self.path,
        }
    }

    /// Raw query string without the leading `?`; empty when absent.
    pub fn query_string(&self) -> &str {
        match memchr::memchr(b'?', self.path.as_bytes()) {
            Some(idx) => &self.path[idx + 1..],
            None => "",
        }
    }

    /// Header lookup ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Media type of the body with any parameters stripped.
    pub fn content_type(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TYPE)
            .map(|value| value.split(';').next().unwrap_or(value).trim())
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }
}

/// Finished response returned to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create an empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Empty 200 response.
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert(HEADER_CONTENT_TYPE.to_string(), MIME_JSON.to_string());
        Ok(self)
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Header lookup ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as UTF-8 text, `None` if it is not valid UTF-8.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }
}

pub(crate) fn find_header<'h>(headers: &'h HashMap<String, String>, name: &str) -> Option<&'h str> {
    headers.get(name).map(String::as_str).or_else(|| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_path_strips_query() {
        let req = HttpRequest::new("GET", "/users/1?expand=true&x=%20");
        assert_eq!(req.route_path(), "/users/1");
        assert_eq!(req.query_string(), "expand=true&x=%20");

        let req = HttpRequest::new("GET", "/plain");
        assert_eq!(req.route_path(), "/plain");
        assert_eq!(req.query_string(), "");
    }

    #[test]
    fn test_header_is_case_insensitive() {
        let req = HttpRequest::new("POST", "/").with_header("content-type", "application/json; charset=utf-8");
        assert_eq!(req.header("Content-Type"), Some("application/json; charset=utf-8"));
        assert_eq!(req.content_type(), Some("application/json"));
    }

    #[test]
    fn test_request_json_body() {
        let req = HttpRequest::new("POST", "/").with_body(br#"{"id":7}"#.to_vec());
        let value: serde_json::Value = req.json().unwrap();
        assert_eq!(value["id"], 7);

        let bad = HttpRequest::new("POST", "/").with_body(b"{".to_vec());
        assert!(matches!(
            bad.json::<serde_json::Value>(),
            Err(crate::Error::Deserialization(_))
        ));
    }

    #[test]
    fn test_response_builders() {
        let res = HttpResponse::ok()
            .with_json(&serde_json::json!({"ok": true}))
            .unwrap()
            .with_header("X-Test", "1");
        assert_eq!(res.status, 200);
        assert_eq!(res.header("content-type"), Some(MIME_JSON));
        assert_eq!(res.body_string().unwrap(), r#"{"ok":true}"#);
    }
}
