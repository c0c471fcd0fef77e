//! Route groups
//!
//! A group registers routes under a path prefix and wraps each of them in
//! the group's middleware. Nested groups start from a copy of their parent's
//! list, so middleware added to one branch never shows up in a sibling.
//!
//! ```ignore
//! let mut api = mux.group("/api");
//! api.use_middleware(RequestIdMiddleware);
//!
//! let mut admin = api.group("/admin");
//! admin.use_middleware(require_admin);
//! admin.delete("/users/:id", delete_user)?; // DELETE /api/admin/users/:id
//! ```

use crate::error::Error;
use crate::handler::HandlerFn;
use crate::method::Method;
use crate::middleware::{Middleware, SharedMiddleware};
use crate::mux::{Mux, Routable};
use crate::route_registry::Route;
use std::sync::Arc;

/// Registration scope under a prefix. Borrows the mux for as long as routes
/// are being added through it.
pub struct RouteGroup<'m> {
    mux: &'m mut Mux,
    prefix: String,
    middleware: Vec<SharedMiddleware>,
}

impl<'m> RouteGroup<'m> {
    pub(crate) fn new(mux: &'m mut Mux, prefix: String, middleware: Vec<SharedMiddleware>) -> Self {
        Self {
            mux,
            prefix,
            middleware,
        }
    }

    /// Append middleware for routes registered after this call.
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Nested group. Its prefix extends this one and its middleware starts as
    /// a copy of this group's current list.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        let prefix = format!("{}{}", self.prefix, prefix);
        let middleware = self.middleware.clone();
        RouteGroup::new(self.mux, prefix, middleware)
    }

    /// Nested group with extra middleware of its own.
    pub fn group_with(&mut self, prefix: &str, middleware: Vec<SharedMiddleware>) -> RouteGroup<'_> {
        let prefix = format!("{}{}", self.prefix, prefix);
        let mut inherited = self.middleware.clone();
        inherited.extend(middleware);
        RouteGroup::new(self.mux, prefix, inherited)
    }

    /// Path prefix applied to every route in this group.
    pub fn get_prefix(&self) -> &str {
        &self.prefix
    }

    /// Middleware applied to routes registered from here on.
    pub fn get_middleware(&self) -> &[SharedMiddleware] {
        &self.middleware
    }
}

impl Routable for RouteGroup<'_> {
    fn add_handler(
        &mut self,
        method: Method,
        path: &str,
        name: &str,
        handler: HandlerFn,
        middleware: &[SharedMiddleware],
    ) -> Result<Route, Error> {
        let path = format!("{}{}", self.prefix, path);
        let mut chain = self.middleware.clone();
        chain.extend(middleware.iter().cloned());
        self.mux.add_handler(method, &path, name, handler, &chain)
    }
}

impl std::fmt::Debug for RouteGroup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGroup")
            .field("prefix", &self.prefix)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::http::HttpRequest;
    use crate::middleware::{Next, middleware_fn};
    use parking_lot::Mutex;

    fn mark(log: &Arc<Mutex<String>>, tag: &'static str) -> impl Middleware + 'static {
        let log = Arc::clone(log);
        middleware_fn(move |ctx: &mut Context, next: Next| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push_str(tag);
                next.run(ctx).await
            })
        })
    }

    #[test]
    fn test_prefixes_concatenate() {
        let mut mux = Mux::new();
        let mut api = mux.group("/api");
        let mut v1 = api.group("/v1");
        assert_eq!(v1.get_prefix(), "/api/v1");
        v1.get("/users", |ctx| Box::pin(async move { ctx.no_content(204) }))
            .unwrap();
        v1.get("", |ctx| Box::pin(async move { ctx.no_content(204) }))
            .unwrap();

        let paths: Vec<&str> = mux.routes().iter().map(|r| r.path.as_str()).collect();
        assert!(paths.contains(&"/api/v1/users"));
        assert!(paths.contains(&"/api/v1"));
    }

    #[test]
    fn test_nested_group_copies_middleware() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut mux = Mux::new();
        let mut parent = mux.group("/p");
        parent.use_middleware(mark(&log, "P"));

        {
            let mut left = parent.group("/l");
            left.use_middleware(mark(&log, "L"));
            assert_eq!(left.get_middleware().len(), 2);
        }
        let right = parent.group("/r");
        assert_eq!(right.get_middleware().len(), 1);
    }

    #[tokio::test]
    async fn test_group_middleware_only_applies_inside() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut mux = Mux::new();
        {
            let mut admin = mux.group("/admin");
            admin.use_middleware(mark(&log, "G"));
            admin
                .get("/panel", |ctx| Box::pin(async move { ctx.string(200, "panel") }))
                .unwrap();
        }
        mux.get("/public", |ctx| Box::pin(async move { ctx.string(200, "public") }))
            .unwrap();

        mux.handle(HttpRequest::new("GET", "/public")).await;
        assert_eq!(*log.lock(), "");

        let response = mux.handle(HttpRequest::new("GET", "/admin/panel")).await;
        assert_eq!(response.body, b"panel");
        assert_eq!(*log.lock(), "G");
    }
}
