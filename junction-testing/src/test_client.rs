// Test HTTP client

use junction_core::{Error, HttpRequest, HttpResponse, Method, Mux};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Dispatches requests straight into a mux.
#[derive(Debug, Clone)]
pub struct TestClient {
    mux: Arc<Mux>,
}

impl TestClient {
    pub fn new(mux: Arc<Mux>) -> Self {
        Self { mux }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::Get, path).build())
            .await
    }

    pub async fn head(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::Head, path).build())
            .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::Delete, path).build())
            .await
    }

    /// POST `body` as JSON.
    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.with_json(Method::Post, path, body).await
    }

    /// PUT `body` as JSON.
    pub async fn put<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.with_json(Method::Put, path, body).await
    }

    /// PATCH `body` as JSON.
    pub async fn patch<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.with_json(Method::Patch, path, body).await
    }

    /// Send a prepared request, e.g. from [`TestRequestBuilder`].
    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        TestResponse::new(self.mux.handle(request).await)
    }

    async fn with_json<T: Serialize>(&self, method: Method, path: &str, body: &T) -> TestResponse {
        match TestRequestBuilder::new(method, path).json(body) {
            Ok(builder) => self.send(builder.build()).await,
            Err(err) => panic!("Failed to serialize request body: {err}"),
        }
    }
}

/// Builder for test requests
#[derive(Debug, Clone)]
pub struct TestRequestBuilder {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    query: Vec<(String, String)>,
}

impl TestRequestBuilder {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            query: Vec::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `data` as the body and set a JSON content type.
    pub fn json<T: Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self.header("Content-Type", "application/json"))
    }

    /// Append a query parameter; values are percent-encoded.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> HttpRequest {
        let path = if self.query.is_empty() {
            self.path
        } else {
            let separator = if self.path.contains('?') { '&' } else { '?' };
            let query = serde_urlencoded::to_string(&self.query).unwrap_or_default();
            format!("{}{}{}", self.path, separator, query)
        };

        let mut request = HttpRequest::new(self.method.as_str(), path).with_body(self.body);
        for (key, value) in self.headers {
            request = request.with_header(key, value);
        }
        request
    }
}

/// Response from a test request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResponse {
    response: HttpResponse,
}

impl TestResponse {
    pub fn new(response: HttpResponse) -> Self {
        Self { response }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn body_string(&self) -> Option<String> {
        self.response.body_string()
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.response.body)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Header lookup ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.response.header(key)
    }

    pub fn into_inner(self) -> HttpResponse {
        self.response
    }
}
