// Error types for the junction router

use crate::method::{AllowedMethods, Method};
use crate::status::{self, HttpStatus};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed(AllowedMethods),

    #[error("Route conflict for {method} {path}: {reason}")]
    RouteConflict {
        method: Method,
        path: String,
        reason: String,
    },

    #[error("Invalid route {path}: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Renderer not registered")]
    RendererNotRegistered,

    #[error("Invalid redirect status code: {0}")]
    InvalidRedirectCode(u16),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed.code(),
            Error::Http(err) => err.code,
            Error::Deserialization(_) => HttpStatus::BadRequest.code(),
            Error::UnsupportedMediaType(_) => HttpStatus::UnsupportedMediaType.code(),
            Error::PayloadTooLarge(_) => HttpStatus::PayloadTooLarge.code(),
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        status::is_client_error(self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        status::is_server_error(self.status_code())
    }

    /// The structured handler error, when this is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Error::Http(err) => Some(err),
            _ => None,
        }
    }
}

/// Structured failure a handler or middleware can return to pick the status
/// code and message the client sees.
///
/// The message defaults to the reason phrase of `code`. An optional internal
/// cause is kept for logging and exposed through [`std::error::Error::source`],
/// but never sent to the client.
///
/// ```ignore
/// return Err(HttpError::new(422)
///     .with_message(json!({"field": "email"}))
///     .with_internal(parse_err)
///     .into());
/// ```
#[derive(Debug)]
pub struct HttpError {
    pub code: u16,
    pub message: Value,
    pub internal: Option<BoxError>,
}

impl HttpError {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            message: Value::String(status::status_text(code).to_string()),
            internal: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<Value>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_internal(mut self, cause: impl Into<BoxError>) -> Self {
        self.internal = Some(cause.into());
        self
    }

    pub fn bad_request() -> Self {
        Self::new(HttpStatus::BadRequest.code())
    }

    pub fn unauthorized() -> Self {
        Self::new(HttpStatus::Unauthorized.code())
    }

    pub fn forbidden() -> Self {
        Self::new(HttpStatus::Forbidden.code())
    }

    pub fn not_found() -> Self {
        Self::new(HttpStatus::NotFound.code())
    }

    pub fn unsupported_media_type() -> Self {
        Self::new(HttpStatus::UnsupportedMediaType.code())
    }

    pub fn internal_server_error() -> Self {
        Self::new(HttpStatus::InternalServerError.code())
    }

    pub fn service_unavailable() -> Self {
        Self::new(HttpStatus::ServiceUnavailable.code())
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Value::String(text) => write!(f, "code={}, message={}", self.code, text),
            other => write!(f, "code={}, message={}", self.code, other),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.internal
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::error::Error as _;

    #[test]
    fn test_http_error_defaults_to_status_text() {
        let err = HttpError::new(400);
        assert_eq!(err.message, json!("Bad Request"));
        assert_eq!(err.to_string(), "code=400, message=Bad Request");
    }

    #[test]
    fn test_http_error_text_for_less_common_codes() {
        assert_eq!(HttpError::new(418).message, json!("I'm a teapot"));
        assert_eq!(HttpError::new(412).message, json!("Precondition Failed"));
        assert_eq!(HttpError::new(402).message, json!("Payment Required"));
        assert_eq!(HttpError::new(505).message, json!("HTTP Version Not Supported"));
    }

    #[test]
    fn test_http_error_structured_message() {
        let err = HttpError::bad_request().with_message(json!({"code": 12}));
        assert_eq!(err.to_string(), r#"code=400, message={"code":12}"#);
    }

    #[test]
    fn test_http_error_internal_is_source() {
        let io = std::io::Error::other("disk gone");
        let err = HttpError::internal_server_error().with_internal(io);
        assert_eq!(err.source().map(|e| e.to_string()), Some("disk gone".into()));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::NotFound.status_code(), 404);
        assert_eq!(
            Error::MethodNotAllowed(AllowedMethods::new(vec![Method::Get])).status_code(),
            405
        );
        assert_eq!(Error::from(HttpError::new(418)).status_code(), 418);
        assert_eq!(Error::PayloadTooLarge("big".into()).status_code(), 413);
        assert_eq!(Error::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::NotFound.is_client_error());
        assert!(Error::Internal("x".into()).is_server_error());
        assert_eq!(Error::NotFound.http_status(), HttpStatus::NotFound);
    }

    #[test]
    fn test_transparent_display() {
        let err: Error = HttpError::forbidden().into();
        assert_eq!(err.to_string(), "code=403, message=Forbidden");
        assert!(err.as_http().is_some());
    }
}
