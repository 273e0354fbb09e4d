//! Name → route registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::route::Route;

/// Lookup table from route name to route. Adding a route under a name that
/// is already taken replaces the previous one; routes are never removed.
/// Carries no execution logic.
pub struct Router<C, V> {
    routes: HashMap<String, Arc<Route<C, V>>>,
}

impl<C, V> Router<C, V> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn add_route(&mut self, route: Arc<Route<C, V>>) -> &mut Self {
        self.routes.insert(route.name().to_string(), route);
        self
    }

    pub fn get_route(&self, name: &str) -> Option<Arc<Route<C, V>>> {
        self.routes.get(name).cloned()
    }

    pub fn routes(&self) -> &HashMap<String, Arc<Route<C, V>>> {
        &self.routes
    }
}

impl<C, V> Default for Router<C, V> {
    fn default() -> Self {
        Self::new()
    }
}
