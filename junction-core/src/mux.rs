//! The request multiplexer
//!
//! [`Mux`] owns the route table, the middleware lists and the context pool.
//! Routes are registered up front through [`Routable`]; once serving starts
//! the mux is shared (typically behind an `Arc`) and [`Mux::handle`] is
//! called once per request by whatever transport sits in front of it.
//!
//! # Examples
//!
//! ```ignore
//! use junction_core::*;
//!
//! let mut mux = Mux::new();
//! mux.use_middleware(LoggerMiddleware::new());
//! mux.get("/users/:id", |ctx| Box::pin(async move {
//!     let id = ctx.param("id").unwrap_or_default().to_string();
//!     ctx.json(200, &serde_json::json!({ "id": id }))
//! }))?;
//!
//! let response = mux.handle(HttpRequest::new("GET", "/users/7")).await;
//! assert_eq!(response.status, 200);
//! ```

use crate::binder::{Binder, DefaultBinder};
use crate::context::Context;
use crate::error::Error;
use crate::error_handler::{DefaultErrorHandler, ErrorHandler};
use crate::handler::{HandlerFn, HandlerResult, handler_fn};
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::{debug, warn};
use crate::method::Method;
use crate::middleware::{Middleware, SharedMiddleware, compose};
use crate::pool::{ContextPool, PoolConfig, PoolStatsSnapshot};
use crate::renderer::Renderer;
use crate::route_group::RouteGroup;
use crate::route_registry::Route;
use crate::routing::Router;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Collaborators every context of a mux reaches through.
pub(crate) struct Settings {
    pub(crate) debug: bool,
    pub(crate) binder: Arc<dyn Binder>,
    pub(crate) renderer: Option<Arc<dyn Renderer>>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            binder: Arc::new(DefaultBinder),
            renderer: None,
            error_handler: Arc::new(DefaultErrorHandler::new(false)),
        }
    }
}

/// Mux configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxConfig {
    /// Expose internal error text in 5xx responses
    pub debug: bool,
    pub pool: PoolConfig,
}

impl MuxConfig {
    /// Read `JUNCTION_DEBUG` and `JUNCTION_POOL_MAX_IDLE`, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("JUNCTION_DEBUG") {
            config.debug = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(value) = lookup("JUNCTION_POOL_MAX_IDLE") {
            match value.trim().parse() {
                Ok(max_idle) => config.pool.max_idle = max_idle,
                Err(_) => warn!(value = %value, "Ignoring invalid JUNCTION_POOL_MAX_IDLE"),
            }
        }

        config
    }
}

/// Builder for a [`Mux`] with custom collaborators.
#[derive(Default)]
pub struct MuxBuilder {
    config: MuxConfig,
    binder: Option<Arc<dyn Binder>>,
    renderer: Option<Arc<dyn Renderer>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl MuxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn binder(mut self, binder: impl Binder + 'static) -> Self {
        self.binder = Some(Arc::new(binder));
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Replace the default JSON error handler.
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Mux {
        let debug = self.config.debug;
        let settings = Settings {
            debug,
            binder: self.binder.unwrap_or_else(|| Arc::new(DefaultBinder)),
            renderer: self.renderer,
            error_handler: self
                .error_handler
                .unwrap_or_else(|| Arc::new(DefaultErrorHandler::new(debug))),
        };
        Mux::with_settings(settings, self.config.pool)
    }
}

/// Everything lookup and routed dispatch need, shared with the pre-routing
/// chain.
#[derive(Clone, Default)]
struct Routing {
    router: Router,
    middleware: Vec<SharedMiddleware>,
}

impl Routing {
    fn route(&self, ctx: &mut Context) {
        let (request, binding) = ctx.routing_parts();
        self.router
            .resolve(&request.method, request.route_path(), binding);
    }

    /// Matched handler wrapped in the global middleware.
    fn chain(&self, ctx: &Context) -> HandlerFn {
        compose(ctx.handler(), &self.middleware)
    }
}

/// Request router and dispatcher.
pub struct Mux {
    routing: Arc<Routing>,
    pre_middleware: Vec<SharedMiddleware>,
    settings: Arc<Settings>,
    pool: ContextPool,
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl Mux {
    /// A mux with the default binder and error handler and no renderer.
    pub fn new() -> Self {
        Self::with_settings(Settings::default(), PoolConfig::default())
    }

    pub fn builder() -> MuxBuilder {
        MuxBuilder::new()
    }

    fn with_settings(settings: Settings, pool: PoolConfig) -> Self {
        let settings = Arc::new(settings);
        Self {
            routing: Arc::new(Routing::default()),
            pre_middleware: Vec::new(),
            pool: ContextPool::new(pool, Arc::clone(&settings)),
            settings,
        }
    }

    /// Middleware that runs before routing. The context it sees has no
    /// route bound yet, so it may still rewrite the request path.
    pub fn pre(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.pre_middleware.push(Arc::new(middleware));
        self
    }

    /// Middleware that runs after routing, around every handler including
    /// the not-found and method-not-allowed ones.
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        Arc::make_mut(&mut self.routing)
            .middleware
            .push(Arc::new(middleware));
        self
    }

    /// Routes under `prefix` sharing middleware added to the group.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup::new(self, prefix.to_string(), Vec::new())
    }

    /// Like [`group`](Self::group), starting with `middleware`.
    pub fn group_with(&mut self, prefix: &str, middleware: Vec<SharedMiddleware>) -> RouteGroup<'_> {
        RouteGroup::new(self, prefix.to_string(), middleware)
    }

    pub fn router(&self) -> &Router {
        &self.routing.router
    }

    /// All registered routes, one per method and template.
    pub fn routes(&self) -> &[Route] {
        self.routing.router.routes()
    }

    pub fn debug(&self) -> bool {
        self.settings.debug
    }

    pub fn pool_stats(&self) -> PoolStatsSnapshot {
        self.pool.stats()
    }

    /// A context wired to this mux's collaborators but outside the pool.
    pub fn new_context(&self, request: HttpRequest) -> Context {
        let mut ctx = Context::new(Arc::clone(&self.settings), self.routing.router.max_params());
        ctx.attach(request);
        ctx
    }

    /// Dispatch one request.
    ///
    /// Always produces a response: failures from the chain go through the
    /// error handler, and a chain that writes nothing yields an empty 200.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let mut ctx = self.pool.acquire(self.routing.router.max_params());
        ctx.attach(request);

        let chain = if self.pre_middleware.is_empty() {
            self.routing.route(&mut ctx);
            self.routing.chain(&ctx)
        } else {
            compose(self.routed(), &self.pre_middleware)
        };

        if let Err(err) = chain(&mut ctx).await {
            debug!(error = %err, "Handler chain failed");
            ctx.error(err);
        }

        let response = ctx.finish();
        self.pool.release(ctx);
        response
    }

    /// Lookup plus the routed chain, as the terminal of the pre-middleware.
    fn routed(&self) -> HandlerFn {
        let routing = Arc::clone(&self.routing);
        handler_fn(move |ctx| {
            let routing = Arc::clone(&routing);
            Box::pin(async move {
                routing.route(ctx);
                let chain = routing.chain(ctx);
                chain(ctx).await
            })
        })
    }
}

impl std::fmt::Debug for Mux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mux")
            .field("router", &self.routing.router)
            .field("middleware", &self.routing.middleware.len())
            .field("pre_middleware", &self.pre_middleware.len())
            .field("debug", &self.settings.debug)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Route registration shared by [`Mux`] and [`RouteGroup`].
///
/// Handlers are closures returning a boxed future; the route name recorded
/// for introspection is the handler's type name.
///
/// ```ignore
/// mux.post("/users", |ctx| Box::pin(async move {
///     let user: NewUser = ctx.bind()?;
///     ctx.json(201, &user)
/// }))?;
/// ```
pub trait Routable {
    /// Register an already type-erased handler. `middleware` wraps this
    /// route only, inside any group middleware.
    fn add_handler(
        &mut self,
        method: Method,
        path: &str,
        name: &str,
        handler: HandlerFn,
        middleware: &[SharedMiddleware],
    ) -> Result<Route, Error>;

    fn add<H>(&mut self, method: Method, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add_with(method, path, handler, &[])
    }

    /// Register with route-level middleware.
    fn add_with<H>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
        middleware: &[SharedMiddleware],
    ) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        let name = std::any::type_name::<H>();
        self.add_handler(method, path, name, Arc::new(handler), middleware)
    }

    fn connect<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Connect, path, handler)
    }

    fn delete<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Delete, path, handler)
    }

    fn get<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Get, path, handler)
    }

    fn head<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Head, path, handler)
    }

    fn options<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Options, path, handler)
    }

    fn patch<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Patch, path, handler)
    }

    fn post<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Post, path, handler)
    }

    fn propfind<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Propfind, path, handler)
    }

    fn put<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Put, path, handler)
    }

    fn trace<H>(&mut self, path: &str, handler: H) -> Result<Route, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(Method::Trace, path, handler)
    }

    /// Register `handler` under every method.
    fn any<H>(&mut self, path: &str, handler: H) -> Result<Vec<Route>, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.match_methods(&Method::ALL, path, handler)
    }

    /// Register `handler` under each of `methods`.
    fn match_methods<H>(
        &mut self,
        methods: &[Method],
        path: &str,
        handler: H,
    ) -> Result<Vec<Route>, Error>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        let name = std::any::type_name::<H>();
        let handler: HandlerFn = Arc::new(handler);
        methods
            .iter()
            .map(|&method| self.add_handler(method, path, name, Arc::clone(&handler), &[]))
            .collect()
    }
}

impl Routable for Mux {
    fn add_handler(
        &mut self,
        method: Method,
        path: &str,
        name: &str,
        handler: HandlerFn,
        middleware: &[SharedMiddleware],
    ) -> Result<Route, Error> {
        let handler = compose(handler, middleware);
        Arc::make_mut(&mut self.routing)
            .router
            .add_route(method, path, name, handler)
    }
}
