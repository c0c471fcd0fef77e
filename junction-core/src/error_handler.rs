//! Error handling
//!
//! Every failure a request produces, including lookup misses, ends up in a
//! single [`ErrorHandler`]. The handler turns it into a response unless the
//! handler chain already committed one.
//!
//! # Examples
//!
//! ```ignore
//! struct PlainText;
//!
//! impl ErrorHandler for PlainText {
//!     fn handle(&self, err: Error, ctx: &mut Context) {
//!         if !ctx.response().committed() {
//!             let _ = ctx.string(err.status_code(), err.to_string());
//!         }
//!     }
//! }
//!
//! let mux = Mux::builder().error_handler(PlainText).build();
//! ```

use crate::context::Context;
use crate::error::Error;
use crate::http::HEADER_ALLOW;
use crate::logging::{debug, error};
use crate::method::Method;
use crate::status;
use serde_json::{Value, json};

/// Turns an error into a response.
///
/// Implementations cannot fail. Anything that goes wrong while writing the
/// error response has to be dealt with inside `handle`.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, err: Error, ctx: &mut Context);
}

/// JSON error responses of the form `{"message": ...}`.
///
/// - [`HttpError`](crate::HttpError)s use their own code and message; an
///   internal cause is logged, never sent.
/// - Other 4xx errors use their display text.
/// - 5xx errors show the status text, or the error text in debug mode.
/// - HEAD requests get the status only.
/// - Nothing is written once the response is committed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler {
    debug: bool,
}

impl DefaultErrorHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn message(&self, err: &Error, code: u16) -> Value {
        match err {
            Error::Http(http) => {
                if let Some(cause) = &http.internal {
                    error!(status = code, cause = %cause, "Handler failed");
                }
                http.message.clone()
            }
            other if status::is_client_error(code) => Value::String(other.to_string()),
            other => {
                error!(status = code, error = %other, "Unhandled error");
                if self.debug {
                    Value::String(other.to_string())
                } else {
                    Value::String(status::status_text(code).to_string())
                }
            }
        }
    }
}

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, err: Error, ctx: &mut Context) {
        if ctx.response().committed() {
            debug!(error = %err, "Response already committed, dropping error");
            return;
        }

        let code = err.status_code();
        let message = self.message(&err, code);

        if let Error::MethodNotAllowed(allowed) = &err {
            ctx.response_mut()
                .set_header(HEADER_ALLOW, allowed.header_value());
        }

        if Method::parse(&ctx.request().method) == Some(Method::Head) {
            ctx.response_mut().write_header(code);
            return;
        }

        if let Err(write_err) = ctx.json(code, &json!({ "message": message })) {
            error!(error = %write_err, "Failed to write error response");
            ctx.response_mut().write_header(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::http::HttpRequest;
    use crate::method::AllowedMethods;

    fn handle(handler: DefaultErrorHandler, method: &str, err: Error) -> Context {
        let mut ctx = Context::standalone(HttpRequest::new(method, "/"));
        handler.handle(err, &mut ctx);
        ctx
    }

    fn body(ctx: &Context) -> Value {
        serde_json::from_slice(ctx.response().body()).unwrap()
    }

    #[test]
    fn test_http_error_code_and_message() {
        let err = HttpError::new(422).with_message("email is taken");
        let ctx = handle(DefaultErrorHandler::default(), "POST", err.into());
        assert_eq!(ctx.response().status(), 422);
        assert_eq!(body(&ctx), json!({"message": "email is taken"}));
    }

    #[test]
    fn test_structured_message() {
        let err = HttpError::bad_request().with_message(json!({"field": "name"}));
        let ctx = handle(DefaultErrorHandler::default(), "GET", err.into());
        assert_eq!(body(&ctx), json!({"message": {"field": "name"}}));
    }

    #[test]
    fn test_internal_cause_is_hidden() {
        let err = HttpError::internal_server_error().with_internal(std::io::Error::other("db down"));
        let ctx = handle(DefaultErrorHandler::default(), "GET", err.into());
        assert_eq!(ctx.response().status(), 500);
        assert_eq!(body(&ctx), json!({"message": "Internal Server Error"}));
    }

    #[test]
    fn test_plain_errors_respect_debug() {
        let ctx = handle(
            DefaultErrorHandler::new(false),
            "GET",
            Error::Internal("pool exhausted".into()),
        );
        assert_eq!(body(&ctx), json!({"message": "Internal Server Error"}));

        let ctx = handle(
            DefaultErrorHandler::new(true),
            "GET",
            Error::Internal("pool exhausted".into()),
        );
        assert_eq!(
            body(&ctx),
            json!({"message": "Internal server error: pool exhausted"})
        );
    }

    #[test]
    fn test_not_found_message() {
        let ctx = handle(DefaultErrorHandler::default(), "GET", Error::NotFound);
        assert_eq!(ctx.response().status(), 404);
        assert_eq!(body(&ctx), json!({"message": "Not Found"}));
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let allowed = AllowedMethods::new(vec![Method::Get, Method::Put]);
        let ctx = handle(
            DefaultErrorHandler::default(),
            "POST",
            Error::MethodNotAllowed(allowed),
        );
        assert_eq!(ctx.response().status(), 405);
        assert_eq!(ctx.response().header("Allow"), Some("GET, PUT"));
    }

    #[test]
    fn test_head_gets_status_only() {
        let ctx = handle(DefaultErrorHandler::default(), "HEAD", Error::NotFound);
        assert_eq!(ctx.response().status(), 404);
        assert!(ctx.response().committed());
        assert!(ctx.response().body().is_empty());
    }

    #[test]
    fn test_committed_response_is_left_alone() {
        let mut ctx = Context::standalone(HttpRequest::new("GET", "/"));
        ctx.string(200, "partial").unwrap();
        DefaultErrorHandler::default().handle(Error::Internal("late".into()), &mut ctx);
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.response().body(), b"partial");
    }
}
