// Junction - a radix-tree HTTP router with composable async middleware
//
// This crate is a facade: routing, dispatch and the middleware types live in
// `junction-core`, test helpers in `junction-testing`.

// Re-export core functionality
pub use junction_core::*;

#[cfg(feature = "testing")]
pub use junction_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BoxFuture, Context, Error, HandlerResult, HttpError, HttpRequest, HttpResponse, Method,
        Middleware, Mux, MuxBuilder, MuxConfig, Next, Routable, RouteGroup, SharedMiddleware,
        handler_fn, middleware_fn,
    };
    pub use crate::logging::{LogConfig, LogFormat, LogLevel, debug, error, info, trace, warn};
}
