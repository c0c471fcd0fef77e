// Routing across methods
//
// One `PathTree` per method plus the registry that mirrors them. Lookup
// misses are resolved here into the not-found or method-not-allowed handler
// so the dispatcher always has something to run.

use crate::context::{Context, RouteBinding};
use crate::error::Error;
use crate::handler::{HandlerFn, method_not_allowed_handler, not_found_handler};
use crate::logging::{debug, info, trace};
use crate::method::{AllowedMethods, Method};
use crate::route_registry::{Route, RouteRegistry};
use crate::tree::PathTree;
use std::borrow::Cow;
use std::collections::HashMap;

/// Route table for every method.
#[derive(Clone, Default)]
pub struct Router {
    trees: HashMap<Method, PathTree>,
    registry: RouteRegistry,
    max_params: usize,
}

/// Template as it will be stored: never empty, always rooted.
pub(crate) fn normalize_template(path: &str) -> Cow<'_, str> {
    if path.is_empty() {
        Cow::Borrowed("/")
    } else if !path.starts_with('/') {
        Cow::Owned(format!("/{path}"))
    } else {
        Cow::Borrowed(path)
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route to the router
    ///
    /// Registering an existing method and template again replaces its handler
    /// and registry entry.
    pub fn add_route(
        &mut self,
        method: Method,
        path: &str,
        name: &str,
        handler: HandlerFn,
    ) -> Result<Route, Error> {
        let path = normalize_template(path);
        let tree = self
            .trees
            .entry(method)
            .or_insert_with(|| PathTree::new(method));
        let replaced = tree.insert(&path, handler)?;
        self.max_params = self.max_params.max(tree.max_params());

        let route = Route {
            method,
            path: path.into_owned(),
            name: name.to_string(),
        };
        self.registry.record(route.clone());

        if replaced {
            debug!(method = %method, path = %route.path, "Route replaced");
        } else {
            info!(method = %method, path = %route.path, handler = %route.name, "Route registered");
        }
        Ok(route)
    }

    /// All registered routes.
    pub fn routes(&self) -> &[Route] {
        self.registry.routes()
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Largest parameter count of any route; contexts are sized from this.
    pub fn max_params(&self) -> usize {
        self.max_params
    }

    /// Resolve `method` and `path` into `ctx`: the matched handler, template
    /// and parameters, or a not-found / method-not-allowed handler.
    pub fn find(&self, method: &str, path: &str, ctx: &mut Context) {
        self.resolve(method, path, ctx.binding_mut());
    }

    pub(crate) fn resolve(&self, method: &str, path: &str, binding: &mut RouteBinding) {
        let path = if path.is_empty() { "/" } else { path };
        let method = Method::parse(method);

        if let Some(tree) = method.and_then(|method| self.trees.get(&method)) {
            if let Some((endpoint, captures)) = tree.lookup(path) {
                trace!(path, template = %endpoint.template(), "Route matched");
                binding.bind(endpoint, &captures);
                return;
            }
        }

        let allowed: Vec<Method> = self
            .trees
            .values()
            .filter(|tree| Some(tree.method()) != method && tree.matches(path))
            .map(PathTree::method)
            .collect();

        if allowed.is_empty() {
            debug!(path, "No route matched");
            binding.miss(not_found_handler());
        } else {
            let allowed = AllowedMethods::new(allowed);
            debug!(path, allow = %allowed.header_value(), "Method not allowed");
            binding.miss(method_not_allowed_handler(allowed));
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.registry.len())
            .field("max_params", &self.max_params)
            .finish()
    }
}
