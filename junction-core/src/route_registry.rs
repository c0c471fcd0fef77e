//! Route registry for introspection
//!
//! Mirrors every route the trees hold as a flat `(method, path, name)` list.
//! Entries are keyed by method and path, so registering the same route twice
//! updates the existing entry in place instead of growing the list.

use crate::method::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered route as reported by [`RouteRegistry::routes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// HTTP method
    pub method: Method,
    /// Route template (e.g., "/users/:id")
    pub path: String,
    /// Handler name (for debugging)
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<Route>,
    index: HashMap<(Method, String), usize>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a route; returns `true` if it replaced an earlier entry.
    pub fn record(&mut self, route: Route) -> bool {
        let key = (route.method, route.path.clone());
        match self.index.get(&key) {
            Some(&slot) => {
                self.routes[slot] = route;
                true
            }
            None => {
                self.index.insert(key, self.routes.len());
                self.routes.push(route);
                false
            }
        }
    }

    pub fn get(&self, method: Method, path: &str) -> Option<&Route> {
        self.index
            .get(&(method, path.to_string()))
            .map(|&slot| &self.routes[slot])
    }

    /// All routes in first-registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(method: Method, path: &str, name: &str) -> Route {
        Route {
            method,
            path: path.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_record_is_unique_by_method_and_path() {
        let mut registry = RouteRegistry::new();
        assert!(!registry.record(route(Method::Get, "/users", "list")));
        assert!(!registry.record(route(Method::Post, "/users", "create")));
        assert!(registry.record(route(Method::Get, "/users", "list_v2")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(Method::Get, "/users").unwrap().name, "list_v2");
        assert_eq!(registry.routes()[0].method, Method::Get);
    }

    #[test]
    fn test_route_serializes() {
        let json = serde_json::to_value(route(Method::Get, "/users/:id", "show")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"method": "GET", "path": "/users/:id", "name": "show"})
        );
    }
}
