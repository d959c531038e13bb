//! Route registry - per-method tries, route table, names, groups and constraints.

use http::Method;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::error::ConfigError;
use super::group::{GroupRef, GroupScope};
use super::params::{find_param, ParamVec};
use super::route::{
    parse_method, Constraint, ConstraintScope, Handler, HandlerResult, Middleware, Route, RouteId,
    METHODS,
};
use super::trie::Tree;
use crate::context::Context;

/// Registry of routes.
///
/// Registration (adding routes, grouping, naming, attaching constraints) is expected to
/// finish on one thread before requests are served. After that the router is only read,
/// typically behind the `Arc<App>` shared by all request handlers. Nothing enforces this
/// ordering; mutating a router that is concurrently serving is the caller's bug.
#[derive(Debug)]
pub struct Router {
    trees: HashMap<Method, Tree<RouteId>>,
    routes: Vec<Route>,
    names: HashMap<String, RouteId>,
    pub(crate) groups: Vec<GroupScope>,
    active: Vec<usize>,
    constraints: BTreeMap<String, Constraint>,
    default_route: Route,
    strict: bool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Router {
    /// Create an empty router. `strict` makes path matching case-sensitive.
    #[must_use]
    pub fn new(strict: bool) -> Self {
        let trees = METHODS
            .iter()
            .map(|m| (m.clone(), Tree::new(strict)))
            .collect();
        Self {
            trees,
            routes: Vec::new(),
            names: HashMap::new(),
            groups: Vec::new(),
            active: Vec::new(),
            constraints: BTreeMap::new(),
            default_route: Route::new(
                RouteId::DEFAULT,
                String::new(),
                Vec::new(),
                Handler::named("default_route", crate::app::default_route),
            ),
            strict,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Number of registered routes (the default route is not counted).
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Register `handler` for `methods` at `path`.
    ///
    /// The path is trimmed of surrounding `/` and prefixed with the active group prefix.
    /// Trie failures for any method abort the whole registration.
    pub fn add(
        &mut self,
        methods: &[Method],
        path: &str,
        handler: Handler,
    ) -> Result<RouteRef<'_>, ConfigError> {
        let full_path = format!("{}/{}", self.current_prefix(), path.trim_matches('/'));
        let full_path = if full_path.len() > 1 && full_path.ends_with('/') {
            full_path.trim_end_matches('/').to_string()
        } else {
            full_path
        };

        if let Some(unknown) = methods.iter().find(|m| !METHODS.contains(m)) {
            return Err(ConfigError::UnknownMethod(unknown.to_string()));
        }
        let allowed: Vec<Method> = METHODS
            .iter()
            .filter(|m| methods.contains(m))
            .cloned()
            .collect();
        if allowed.is_empty() {
            return Err(ConfigError::NoMethods { path: full_path });
        }

        let id = RouteId(self.routes.len());
        self.insert_into_trees(&allowed, &full_path, id)?;

        let mut route = Route::new(id, full_path, allowed, handler);
        route.constraints = self.constraints.clone();
        route.scopes = self.active.clone();
        for &group in &self.active {
            self.groups[group].routes.push(id);
        }

        let name = self.next_auto_name();
        route.name = name.clone();
        self.names.insert(name, id);

        debug!(
            route_id = %id,
            path = %route.path,
            methods = ?route.methods,
            handler = %route.handler.name(),
            route_name = %route.name,
            groups = self.active.len(),
            "Route registered"
        );

        self.routes.push(route);
        Ok(RouteRef { router: self, id })
    }

    // Insert into every method tree or none of them.
    fn insert_into_trees(
        &mut self,
        methods: &[Method],
        path: &str,
        id: RouteId,
    ) -> Result<(), ConfigError> {
        let pattern_error = |method: &Method, source| ConfigError::Pattern {
            method: method.to_string(),
            source,
        };
        for method in methods {
            if let Some(tree) = self.trees.get(method) {
                tree.check(path).map_err(|e| pattern_error(method, e))?;
            }
        }
        for method in methods {
            let strict = self.strict;
            self.trees
                .entry(method.clone())
                .or_insert_with(|| Tree::new(strict))
                .add(path, id)
                .map_err(|e| pattern_error(method, e))?;
        }
        Ok(())
    }

    fn next_auto_name(&self) -> String {
        let mut n = self.routes.len();
        while self.names.contains_key(&n.to_string()) {
            n += 1;
        }
        n.to_string()
    }

    fn current_prefix(&self) -> &str {
        self.active
            .last()
            .map(|&g| self.groups[g].prefix.as_str())
            .unwrap_or("")
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::GET], path, Handler::new(handler))
    }

    pub fn post<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::POST], path, Handler::new(handler))
    }

    pub fn put<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::PUT], path, Handler::new(handler))
    }

    pub fn patch<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::PATCH], path, Handler::new(handler))
    }

    pub fn delete<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::DELETE], path, Handler::new(handler))
    }

    pub fn head<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::HEAD], path, Handler::new(handler))
    }

    pub fn options<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::OPTIONS], path, Handler::new(handler))
    }

    pub fn trace<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::TRACE], path, Handler::new(handler))
    }

    pub fn connect<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&[Method::CONNECT], path, Handler::new(handler))
    }

    /// Register for all nine standard methods.
    pub fn any<F>(&mut self, path: &str, handler: F) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(&METHODS, path, Handler::new(handler))
    }

    /// Register for the named methods. `"ANY"` (or an empty list) means all nine.
    pub fn any_of<F>(
        &mut self,
        path: &str,
        methods: &[&str],
        handler: F,
    ) -> Result<RouteRef<'_>, ConfigError>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        let parsed = if methods.is_empty() || methods.iter().any(|m| m.eq_ignore_ascii_case("any")) {
            METHODS.to_vec()
        } else {
            methods
                .iter()
                .map(|m| parse_method(m))
                .collect::<Result<Vec<_>, _>>()?
        };
        self.add(&parsed, path, Handler::new(handler))
    }

    /// Run `register` with a new group scope active.
    ///
    /// Routes registered inside the callback (including nested groups) join the scope.
    /// The prefix concatenates with any enclosing group. The scope is popped even when the
    /// callback fails.
    pub fn group<F>(&mut self, prefix: &str, register: F) -> Result<GroupRef<'_>, ConfigError>
    where
        F: FnOnce(&mut Router) -> Result<(), ConfigError>,
    {
        let trimmed = prefix.trim_matches('/');
        let full_prefix = match (self.current_prefix(), trimmed.is_empty()) {
            (parent, true) => parent.to_string(),
            (parent, false) => format!("{parent}/{trimmed}"),
        };

        let id = self.groups.len();
        self.groups.push(GroupScope::new(full_prefix));
        self.active.push(id);
        debug!(group_id = id, prefix = %self.groups[id].prefix, depth = self.active.len(), "Group scope pushed");

        let outcome = register(self);

        self.active.pop();
        debug!(
            group_id = id,
            routes = self.groups[id].routes.len(),
            "Group scope popped"
        );
        outcome?;
        Ok(GroupRef::new(self, id))
    }

    /// Registry-wide constraint applied to routes registered after this call.
    pub fn regexp(&mut self, param: &str, pattern: &str) -> Result<&mut Self, ConfigError> {
        let constraint = Constraint::compile(param, pattern, ConstraintScope::Registry)?;
        debug!(param = %param, pattern = %pattern, scope = "registry", "Constraint attached");
        self.constraints.insert(param.to_string(), constraint);
        Ok(self)
    }

    /// Replace the fallback handler used when nothing matches or a constraint rejects.
    ///
    /// The returned handle configures the default route like any other (labels,
    /// middleware, a name).
    pub fn set_default_route(&mut self, handler: Handler) -> RouteRef<'_> {
        self.default_route.handler = handler;
        self.default_route.invalidate_chain();
        RouteRef {
            router: self,
            id: RouteId::DEFAULT,
        }
    }

    pub fn default_route(&self) -> &Route {
        &self.default_route
    }

    pub fn route_by_name(&self, name: &str) -> Option<&Route> {
        self.names.get(name).map(|&id| self.route(id))
    }

    /// Route for `id`; unknown ids (including [`RouteId::DEFAULT`]) yield the default route.
    pub fn route(&self, id: RouteId) -> &Route {
        self.routes.get(id.0).unwrap_or(&self.default_route)
    }

    pub(crate) fn route_mut(&mut self, id: RouteId) -> Option<&mut Route> {
        if id.is_default() {
            return Some(&mut self.default_route);
        }
        self.routes.get_mut(id.0)
    }

    /// Match `method` + `path`, writing captures into `params`.
    ///
    /// Falls back to [`RouteId::DEFAULT`] when the method has no tree, no pattern matches,
    /// or a constraint rejects a captured value. Captures are cleared on a trie miss and
    /// kept on a constraint rejection.
    pub fn resolve(&self, method: &Method, path: &str, params: &mut ParamVec) -> RouteId {
        // RT1: Route match attempt
        debug!(method = %method, path = %path, "Route match attempt");

        let Some(tree) = self.trees.get(method) else {
            debug!(method = %method, path = %path, "No tree for method, using default route");
            return RouteId::DEFAULT;
        };

        let Some(&id) = tree.search(path, params) else {
            params.clear();
            // RT4: No route found
            debug!(method = %method, path = %path, "No route matched, using default route");
            return RouteId::DEFAULT;
        };

        let route = self.route(id);
        for (param, constraint) in &route.constraints {
            if let Some(value) = find_param(params, param) {
                if !constraint.is_match(value) {
                    // RT2: Constraint rejected the match
                    debug!(
                        method = %method,
                        path = %path,
                        route_name = %route.name,
                        param = %param,
                        value = %value,
                        pattern = %constraint.pattern(),
                        "Constraint rejected match, using default route"
                    );
                    return RouteId::DEFAULT;
                }
            }
        }

        // RT3: Route matched
        debug!(
            method = %method,
            path = %path,
            route_name = %route.name,
            handler = %route.handler.name(),
            path_params = ?params,
            "Route matched"
        );
        id
    }

    /// Effective middleware chain of a route: group middleware outer to inner, then the
    /// route's own. Built on first use and cached on the route.
    pub fn chain(&self, id: RouteId) -> Arc<[Middleware]> {
        let route = self.route(id);
        Arc::clone(route.chain.get_or_init(|| self.build_chain(route)))
    }

    pub(crate) fn build_chain(&self, route: &Route) -> Arc<[Middleware]> {
        route
            .scopes
            .iter()
            .filter_map(|&g| self.groups.get(g))
            .flat_map(|g| g.middleware.iter().cloned())
            .chain(route.middleware.iter().cloned())
            .collect::<Vec<_>>()
            .into()
    }

    pub(crate) fn rename(&mut self, id: RouteId, name: &str) -> Result<(), ConfigError> {
        if let Some(&holder) = self.names.get(name) {
            if holder == id {
                return Ok(());
            }
            return Err(ConfigError::DuplicateName {
                name: name.to_string(),
                held_by: self.route(holder).path.clone(),
            });
        }
        let Some(route) = self.route_mut(id) else {
            return Ok(());
        };
        let previous = std::mem::replace(&mut route.name, name.to_string());
        self.names.remove(&previous);
        self.names.insert(name.to_string(), id);
        debug!(route_id = %id, from = %previous, to = %name, "Route renamed");
        Ok(())
    }
}

/// Handle to a freshly registered route, used to configure it further.
pub struct RouteRef<'r> {
    router: &'r mut Router,
    id: RouteId,
}

impl<'r> RouteRef<'r> {
    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn route(&self) -> &Route {
        self.router.route(self.id)
    }

    /// Give the route a unique name, releasing its previous one.
    pub fn name(self, name: &str) -> Result<Self, ConfigError> {
        self.router.rename(self.id, name)?;
        Ok(self)
    }

    pub fn label(self, label: &str) -> Self {
        if let Some(route) = self.router.route_mut(self.id) {
            route.add_label(label);
        }
        self
    }

    /// Append route-level middleware; it runs after any group middleware.
    pub fn use_middleware(self, middleware: Middleware) -> Self {
        if let Some(route) = self.router.route_mut(self.id) {
            route.middleware.push(middleware);
            route.invalidate_chain();
        }
        self
    }

    /// Constrain a captured parameter; overrides group and registry constraints.
    pub fn regexp(self, param: &str, pattern: &str) -> Result<Self, ConfigError> {
        let constraint = Constraint::compile(param, pattern, ConstraintScope::Route)?;
        if let Some(route) = self.router.route_mut(self.id) {
            debug!(route_name = %route.name, param = %param, pattern = %pattern, scope = "route", "Constraint attached");
            route.constraints.insert(param.to_string(), constraint);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(_ctx: &mut Context) -> HandlerResult {
        Ok(())
    }

    fn resolve(router: &Router, method: Method, path: &str) -> (RouteId, ParamVec) {
        let mut params = ParamVec::new();
        let id = router.resolve(&method, path, &mut params);
        (id, params)
    }

    #[test]
    fn test_route_path_is_normalized() {
        let mut router = Router::default();
        let id = router.get("users/", ok).unwrap().id();
        assert_eq!(router.route(id).path(), "/users");
        let root = router.get("/", ok).unwrap().id();
        assert_eq!(router.route(root).path(), "/");
    }

    #[test]
    fn test_failed_insert_touches_no_tree() {
        let mut router = Router::default();
        router.post("/a/b", ok).unwrap();
        let err = router.any("/a/:id", ok).err().unwrap();
        assert!(matches!(err, ConfigError::Pattern { ref method, .. } if method == "POST"));
        assert_eq!(router.len(), 1);
        // GET was validated before POST failed, yet must stay empty
        assert!(resolve(&router, Method::GET, "/a/7").0.is_default());
    }

    #[test]
    fn test_auto_names_skip_taken_values() {
        let mut router = Router::default();
        router.get("/a", ok).unwrap().name("1").unwrap();
        let second = router.get("/b", ok).unwrap().id();
        assert_eq!(router.route(second).name(), "2");
        assert_eq!(router.route_by_name("1").map(Route::path), Some("/a"));
    }

    #[test]
    fn test_unknown_method_in_any_of() {
        let mut router = Router::default();
        let err = router.any_of("/x", &["get", "fetch"], ok).err().unwrap();
        assert_eq!(err, ConfigError::UnknownMethod("fetch".to_string()));
        let id = router.any_of("/y", &["ANY"], ok).unwrap().id();
        assert!(router.route(id).allows_any());
    }

    #[test]
    fn test_resolve_unknown_method_uses_default() {
        let mut router = Router::default();
        router.get("/x", ok).unwrap();
        let custom = Method::from_bytes(b"PURGE").unwrap();
        assert!(resolve(&router, custom, "/x").0.is_default());
    }

    #[test]
    fn test_trie_miss_clears_partial_captures() {
        let mut router = Router::default();
        router.get("/users/:id/posts", ok).unwrap();
        let (id, params) = resolve(&router, Method::GET, "/users/5/comments");
        assert!(id.is_default());
        assert!(params.is_empty());
    }

    #[test]
    fn test_default_route_replaceable() {
        let mut router = Router::default();
        router.set_default_route(Handler::named("custom_404", ok));
        assert_eq!(router.default_route().handler().name(), "custom_404");
        assert_eq!(router.route(RouteId::DEFAULT).handler().name(), "custom_404");
    }
}
