// Core library for the Junction router
// Radix-tree route lookup, middleware composition, pooled request contexts
// and the dispatcher tying them together.

pub mod binder;
pub mod context;
pub mod error;
pub mod error_handler;
pub mod handler;
pub mod http;
pub mod logging;
pub mod method;
pub mod middleware;
pub mod mux;
pub mod pool;
pub mod renderer;
pub mod route_group;
pub mod route_registry;
pub mod routing;
pub mod status;
pub mod tree;

// Re-export commonly used types
pub use binder::{Binder, DefaultBinder};
pub use context::{Context, Response};
pub use error::{Error, HttpError};
pub use error_handler::{DefaultErrorHandler, ErrorHandler};
pub use handler::{HandlerFn, HandlerResult, handler_fn};
pub use http::*;
pub use method::{AllowedMethods, Method};
pub use middleware::{
    BodyLimitMiddleware, FnMiddleware, LoggerMiddleware, Middleware, Next, RecoverMiddleware,
    RemoveTrailingSlashMiddleware, RequestIdMiddleware, SharedMiddleware, compose, middleware_fn,
};
pub use mux::{Mux, MuxBuilder, MuxConfig, Routable};
pub use pool::{ContextPool, PoolConfig, PoolStatsSnapshot};
pub use renderer::Renderer;
pub use route_group::RouteGroup;
pub use route_registry::{Route, RouteRegistry};
pub use routing::Router;
pub use status::HttpStatus;
pub use tree::{Endpoint, PathTree};

// Boxed future type handlers return
pub use futures_util::future::BoxFuture;
