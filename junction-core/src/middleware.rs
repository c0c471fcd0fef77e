// Middleware system for request/response processing
//
// A middleware wraps "the rest of the chain". Chains are built by folding a
// list of middleware around a handler from the right, so the first entry in
// the list runs first.

use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::handler::{HandlerFn, HandlerResult, handler_fn};
use crate::http::HEADER_REQUEST_ID;
use crate::logging::{error, info, trace, warn};
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Middleware trait for wrapping handlers
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to the rest of the chain
    async fn handle(&self, ctx: &mut Context, next: Next) -> HandlerResult;
}

/// Shared middleware as stored by the mux and its groups.
pub type SharedMiddleware = Arc<dyn Middleware>;

/// The remainder of a chain, handed to each middleware.
pub struct Next {
    handler: HandlerFn,
}

impl Next {
    pub fn new(handler: HandlerFn) -> Self {
        Self { handler }
    }

    /// Run the rest of the chain.
    pub fn run<'a>(self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        (self.handler)(ctx)
    }
}

/// Fold `middleware` around `handler` so `middleware[0]` is outermost.
pub fn compose(handler: HandlerFn, middleware: &[SharedMiddleware]) -> HandlerFn {
    middleware.iter().rev().fold(handler, |next, middleware| {
        let middleware = Arc::clone(middleware);
        handler_fn(move |ctx| {
            let middleware = Arc::clone(&middleware);
            let next = Next::new(Arc::clone(&next));
            Box::pin(async move {
                trace!("Executing middleware");
                middleware.handle(ctx, next).await
            })
        })
    })
}

/// Middleware built from a closure.
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap a closure as middleware:
///
/// ```ignore
/// mux.use_middleware(middleware_fn(|ctx, next| Box::pin(async move {
///     ctx.response_mut().set_header("X-Powered-By", "junction");
///     next.run(ctx).await
/// })));
/// ```
pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &mut Context, next: Next) -> HandlerResult {
        (self.f)(ctx, next).await
    }
}

// ========== Built-in Middleware ==========

/// Access log through `tracing`.
///
/// Errors from the rest of the chain are resolved into a response right here
/// (through the context's error handler) so the logged status is the one the
/// client gets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerMiddleware;

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next) -> HandlerResult {
        let start = Instant::now();
        let method = ctx.request().method.clone();
        let uri = ctx.request().path.clone();

        let result = next.run(ctx).await;
        let failed = result.is_err();
        if let Err(err) = result {
            ctx.error(err);
        }

        let status = ctx.response().status();
        let latency_us = start.elapsed().as_micros() as u64;
        if failed && crate::status::is_server_error(status) {
            error!(%method, %uri, route = %ctx.path(), status, latency_us, "Request failed");
        } else {
            info!(%method, %uri, route = %ctx.path(), status, latency_us, bytes = ctx.response().size(), "Request completed");
        }
        Ok(())
    }
}

/// Propagates `X-Request-ID`, generating a UUID v4 when the request has none.
/// The id is echoed on the response and stored under `request_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    /// Store key holding the request id
    pub const STORE_KEY: &'static str = "request_id";
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next) -> HandlerResult {
        let request_id = ctx
            .request()
            .header(HEADER_REQUEST_ID)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        ctx.response_mut()
            .set_header(HEADER_REQUEST_ID, request_id.clone());
        ctx.set(Self::STORE_KEY, request_id);
        next.run(ctx).await
    }
}

/// Converts a panic in the rest of the chain into a 500 error.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoverMiddleware;

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Middleware for RecoverMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next) -> HandlerResult {
        match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Recovered from handler panic");
                Err(HttpError::internal_server_error()
                    .with_internal(Error::Internal(format!("panic: {message}")))
                    .into())
            }
        }
    }
}

/// Rejects requests whose body exceeds a byte limit.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimitMiddleware {
    max_size: usize,
}

impl BodyLimitMiddleware {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }
}

#[async_trait]
impl Middleware for BodyLimitMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next) -> HandlerResult {
        let size = ctx.request().body.len();
        if size > self.max_size {
            warn!(size, limit = self.max_size, "Request body too large");
            return Err(Error::PayloadTooLarge(format!(
                "Request body exceeds maximum size of {} bytes",
                self.max_size
            )));
        }
        next.run(ctx).await
    }
}

/// Rewrites `/path/` to `/path` before routing. Register it with
/// `Mux::pre` so the lookup sees the rewritten path.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveTrailingSlashMiddleware;

#[async_trait]
impl Middleware for RemoveTrailingSlashMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next) -> HandlerResult {
        let request = ctx.request();
        let route_path = request.route_path();
        if route_path.len() > 1 && route_path.ends_with('/') {
            let trimmed = route_path.trim_end_matches('/');
            let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
            let query = request.query_string();
            let rewritten = if query.is_empty() {
                trimmed.to_string()
            } else {
                format!("{trimmed}?{query}")
            };
            trace!(from = %request.path, to = %rewritten, "Removed trailing slash");
            ctx.request_mut().path = rewritten;
        }
        next.run(ctx).await
    }
}
