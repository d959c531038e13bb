use crate::context::Context;
use http::Method;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::ConfigError;

/// Result returned by every handler.
pub type HandlerResult = anyhow::Result<()>;

type HandlerFn = dyn Fn(&mut Context) -> HandlerResult + Send + Sync;
type MiddlewareFn = dyn Fn(&mut Context) + Send + Sync;

/// The nine standard HTTP verbs, in the order they are listed in route dumps.
pub const METHODS: [Method; 9] = [
    Method::OPTIONS,
    Method::HEAD,
    Method::GET,
    Method::POST,
    Method::PATCH,
    Method::PUT,
    Method::DELETE,
    Method::TRACE,
    Method::CONNECT,
];

/// Parse a verb name (case-insensitive), rejecting anything outside [`METHODS`].
pub fn parse_method(name: &str) -> Result<Method, ConfigError> {
    let upper = name.trim().to_ascii_uppercase();
    METHODS
        .iter()
        .find(|m| m.as_str() == upper)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownMethod(name.to_string()))
}

// `my_crate::handlers::show_user` stays as is; closures keep their enclosing path.
fn callable_name<F>() -> Arc<str> {
    Arc::from(std::any::type_name::<F>())
}

/// Terminal step of a route.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    func: Arc<HandlerFn>,
}

impl Handler {
    /// Wrap a function, naming it after its type path.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: callable_name::<F>(),
            func: Arc::new(func),
        }
    }

    /// Wrap a function under an explicit diagnostic name.
    pub fn named<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, ctx: &mut Context) -> HandlerResult {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name).finish()
    }
}

/// A pipeline step that must call [`Context::next`] to continue the chain.
///
/// Returning without calling `next` stops the request there; whatever the middleware
/// wrote to the response is flushed at release.
#[derive(Clone)]
pub struct Middleware {
    name: Arc<str>,
    func: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self {
            name: callable_name::<F>(),
            func: Arc::new(func),
        }
    }

    pub fn named<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, ctx: &mut Context) {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Index of a route inside its [`Router`](super::Router).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(pub(crate) usize);

impl RouteId {
    /// The default (fallback) route.
    pub const DEFAULT: RouteId = RouteId(usize::MAX);

    #[must_use]
    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "default")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Where a constraint was attached; narrower scopes win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ConstraintScope {
    Registry,
    Group,
    Route,
}

/// Anchored pattern a captured parameter must match in full.
#[derive(Debug, Clone)]
pub struct Constraint {
    pattern: String,
    regex: Regex,
    pub(crate) scope: ConstraintScope,
}

impl Constraint {
    pub(crate) fn compile(
        param: &str,
        pattern: &str,
        scope: ConstraintScope,
    ) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            ConfigError::InvalidConstraint {
                param: param.to_string(),
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            scope,
        })
    }

    /// The pattern as written at registration.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// A registered route.
///
/// Owned by exactly one router. Groups refer to routes by [`RouteId`].
#[derive(Debug)]
pub struct Route {
    pub(crate) id: RouteId,
    pub(crate) path: String,
    pub(crate) methods: Vec<Method>,
    pub(crate) handler: Handler,
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) scopes: Vec<usize>,
    pub(crate) name: String,
    pub(crate) labels: Vec<String>,
    pub(crate) constraints: BTreeMap<String, Constraint>,
    pub(crate) chain: OnceCell<Arc<[Middleware]>>,
}

impl Route {
    pub(crate) fn new(id: RouteId, path: String, methods: Vec<Method>, handler: Handler) -> Self {
        Self {
            id,
            path,
            methods,
            handler,
            middleware: Vec::new(),
            scopes: Vec::new(),
            name: String::new(),
            labels: Vec::new(),
            constraints: BTreeMap::new(),
            chain: OnceCell::new(),
        }
    }

    pub fn id(&self) -> RouteId {
        self.id
    }

    /// Full pattern including group prefixes.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Whether every standard verb is allowed.
    pub fn allows_any(&self) -> bool {
        METHODS.iter().all(|m| self.allows(m))
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Middleware attached directly to this route, without group middleware.
    pub fn own_middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Constraints in parameter-name order.
    pub fn constraints(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn add_label(&mut self, label: &str) {
        if !label.is_empty() && !self.has_label(label) {
            self.labels.push(label.to_string());
        }
    }

    pub(crate) fn invalidate_chain(&mut self) {
        self.chain = OnceCell::new();
    }
}
