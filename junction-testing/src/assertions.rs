// Test assertions for HTTP responses

use crate::TestResponse;
use junction_core::HttpStatus;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status();
    assert_eq!(
        actual, expected,
        "Expected status {}, got {}. Body: {:?}",
        expected,
        actual,
        response.body_string()
    );
}

/// Assert that a response has a specific HTTP status
pub fn assert_http_status(response: &TestResponse, expected: HttpStatus) {
    assert_status(response, expected.code());
}

/// Assert that a response body deserializes to `expected`
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: DeserializeOwned + PartialEq + Debug,
{
    match response.body_json::<T>() {
        Ok(actual) => assert_eq!(actual, *expected, "JSON bodies do not match"),
        Err(err) => panic!(
            "Response body is not the expected JSON ({err}). Body: {:?}",
            response.body_string()
        ),
    }
}

/// Assert that a response has a specific header
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert that a response body contains a string
pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string().unwrap_or_default();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

/// Assert a `{"message": ...}` error body as written by the default error
/// handler
pub fn assert_error_message(response: &TestResponse, expected: &str) {
    let body: serde_json::Value = match response.body_json() {
        Ok(body) => body,
        Err(err) => panic!("Expected a JSON error body ({err})"),
    };
    assert_eq!(
        body["message"].as_str(),
        Some(expected),
        "Unexpected error body: {}",
        body
    );
}

/// Assert that a response is successful (2xx status)
pub fn assert_success(response: &TestResponse) {
    let status = response.status();
    assert!(
        (200..300).contains(&status),
        "Expected successful status (2xx), got {}",
        status
    );
}

/// Assert that a response is a client error (4xx status)
pub fn assert_client_error(response: &TestResponse) {
    let status = response.status();
    assert!(
        (400..500).contains(&status),
        "Expected client error status (4xx), got {}",
        status
    );
}

/// Assert that a response is a server error (5xx status)
pub fn assert_server_error(response: &TestResponse) {
    let status = response.status();
    assert!(
        (500..600).contains(&status),
        "Expected server error status (5xx), got {}",
        status
    );
}

/// Assert that a response has JSON content type
pub fn assert_json_content_type(response: &TestResponse) {
    let content_type = response.header("Content-Type");
    assert!(
        content_type
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false),
        "Expected JSON content type, got {:?}",
        content_type
    );
}
