// Request handlers
//
// A handler receives the request context mutably and writes its response
// through it. Handlers are type-erased into `HandlerFn` at registration so
// the tree, the middleware fold and the context can all hold the same shape.

use crate::context::Context;
use crate::error::Error;
use crate::method::AllowedMethods;
use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Outcome of a handler or middleware. The response itself lives in the
/// context; only failures travel through the return value.
pub type HandlerResult = Result<(), Error>;

/// Type-erased, shareable handler.
pub type HandlerFn =
    Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// Erase a closure into a [`HandlerFn`].
///
/// The bound is spelled out so closures get their higher-ranked signature
/// inferred at the call site:
///
/// ```ignore
/// let hello = handler_fn(|ctx| Box::pin(async move { ctx.string(200, "hello") }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

static NOT_FOUND: Lazy<HandlerFn> =
    Lazy::new(|| handler_fn(|_ctx| Box::pin(async { Err(Error::NotFound) })));

/// Handler bound to a context whenever lookup finds nothing.
pub fn not_found_handler() -> HandlerFn {
    Arc::clone(&NOT_FOUND)
}

/// Handler bound when the path exists under other methods only.
pub fn method_not_allowed_handler(allowed: AllowedMethods) -> HandlerFn {
    handler_fn(move |_ctx| {
        let allowed = allowed.clone();
        Box::pin(async move { Err(Error::MethodNotAllowed(allowed)) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::method::Method;

    #[tokio::test]
    async fn test_not_found_handler_errors() {
        let mut ctx = Context::standalone(HttpRequest::new("GET", "/"));
        let err = not_found_handler()(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn test_method_not_allowed_carries_allow_list() {
        let mut ctx = Context::standalone(HttpRequest::new("PUT", "/"));
        let handler = method_not_allowed_handler(AllowedMethods::new(vec![Method::Get]));
        match handler(&mut ctx).await {
            Err(Error::MethodNotAllowed(allowed)) => assert_eq!(allowed.header_value(), "GET"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_fn_writes_through_context() {
        let mut ctx = Context::standalone(HttpRequest::new("GET", "/"));
        let handler = handler_fn(|ctx| Box::pin(async move { ctx.string(201, "made") }));
        handler(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().status(), 201);
        assert_eq!(ctx.response().body(), b"made");
    }
}
