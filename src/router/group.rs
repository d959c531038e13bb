use tracing::debug;

use super::core::Router;
use super::error::ConfigError;
use super::route::{Constraint, ConstraintScope, Middleware, RouteId};

/// Record of one group scope.
///
/// Kept for the lifetime of the router: routes refer to the scopes they were registered
/// in, and their effective middleware chain is assembled from these records on first
/// dispatch instead of being spliced into each route.
#[derive(Debug, Clone)]
pub(crate) struct GroupScope {
    pub(crate) prefix: String,
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) routes: Vec<RouteId>,
}

impl GroupScope {
    pub(crate) fn new(prefix: String) -> Self {
        Self {
            prefix,
            middleware: Vec::new(),
            routes: Vec::new(),
        }
    }
}

/// Handle to a finished group, configuring every route collected in it.
pub struct GroupRef<'r> {
    router: &'r mut Router,
    id: usize,
}

impl<'r> GroupRef<'r> {
    pub(crate) fn new(router: &'r mut Router, id: usize) -> Self {
        Self { router, id }
    }

    /// Full prefix, including enclosing groups.
    pub fn prefix(&self) -> &str {
        &self.router.groups[self.id].prefix
    }

    /// Routes registered inside the group, nested groups included.
    pub fn routes(&self) -> &[RouteId] {
        &self.router.groups[self.id].routes
    }

    /// Add group middleware.
    ///
    /// It runs before the route's own middleware and after middleware of enclosing
    /// groups, regardless of when this is called.
    pub fn use_middleware(self, middleware: Middleware) -> Self {
        debug!(group_id = self.id, middleware = %middleware.name(), "Group middleware added");
        self.router.groups[self.id].middleware.push(middleware);
        for id in self.router.groups[self.id].routes.clone() {
            if let Some(route) = self.router.route_mut(id) {
                route.invalidate_chain();
            }
        }
        self
    }

    pub fn label(self, label: &str) -> Self {
        for id in self.router.groups[self.id].routes.clone() {
            if let Some(route) = self.router.route_mut(id) {
                route.add_label(label);
            }
        }
        self
    }

    /// Constrain `param` on every route of the group that has no group or route
    /// constraint for it yet. Registry-wide defaults are overridden.
    pub fn regexp(self, param: &str, pattern: &str) -> Result<Self, ConfigError> {
        let constraint = Constraint::compile(param, pattern, ConstraintScope::Group)?;
        debug!(group_id = self.id, param = %param, pattern = %pattern, scope = "group", "Constraint attached");
        for id in self.router.groups[self.id].routes.clone() {
            let Some(route) = self.router.route_mut(id) else {
                continue;
            };
            let overridable = route
                .constraints
                .get(param)
                .map_or(true, |existing| existing.scope == ConstraintScope::Registry);
            if overridable {
                route
                    .constraints
                    .insert(param.to_string(), constraint.clone());
            }
        }
        Ok(self)
    }
}
