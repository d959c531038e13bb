//! # Request Context and Dispatch Chain
//!
//! A [`Context`] carries one request through two middleware phases and the handler:
//!
//! 1. **Global phase** - middleware registered on the [`App`] for the request's method,
//!    in registration order.
//! 2. **Route phase** - once the global slice is exhausted the route is resolved (once,
//!    then cached) and its effective middleware chain runs: group middleware outer to
//!    inner, then the route's own.
//! 3. **Handler** - runs exactly once when the route cursor reaches the end of the chain.
//!
//! Middleware continue the chain cooperatively by calling [`Context::next`]; returning
//! without calling it stops the request. Each step runs at most once per request.
//!
//! [`Context::abort`] skips the rest of the *current* phase only. Aborting in the global
//! phase still runs the route middleware and handler; aborting in the route phase jumps
//! straight to the handler.
//!
//! Contexts are pooled ([`ContextPool`]). They are reset at checkout and released at the
//! end of the request; release is idempotent.

mod pool;
mod store;

pub use pool::{ContextGuard, ContextPool, PoolStats, DEFAULT_MAX_IDLE};
pub use store::Store;

use crate::app::App;
use crate::error;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::router::{Middleware, Route, RouteId};
use crate::server::{Request, Response, ResponseSink};
use std::sync::Arc;
use tracing::{debug, error};

/// Per-request state.
pub struct Context {
    app: Option<Arc<App>>,
    request: Request,
    response: Response,
    store: Store,
    global: Arc<[Middleware]>,
    global_cursor: usize,
    route: Option<RouteId>,
    route_chain: Arc<[Middleware]>,
    route_cursor: usize,
    completed: bool,
    released: bool,
    request_id: RequestId,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("global_cursor", &self.global_cursor)
            .field("route", &self.route)
            .field("route_cursor", &self.route_cursor)
            .field("completed", &self.completed)
            .field("released", &self.released)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A detached context, as the pool creates it before its first checkout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            app: None,
            request: Request::default(),
            response: Response::default(),
            store: Store::new(),
            global: Arc::from(Vec::new()),
            global_cursor: 0,
            route: None,
            route_chain: Arc::from(Vec::new()),
            route_cursor: 0,
            completed: false,
            released: true,
            request_id: RequestId::new(),
        }
    }

    /// Bind a request.
    ///
    /// The store is deliberately left alone: it was cleared at the last release, and no
    /// other request can hold this instance in between.
    pub(crate) fn reset(
        &mut self,
        app: Arc<App>,
        request: Request,
        sink: Box<dyn ResponseSink>,
    ) {
        self.global = app.global_middleware(request.method());
        self.request_id = RequestId::from_header_or_new(request.header(REQUEST_ID_HEADER));
        self.request = request;
        self.response.rebind(Some(sink));
        self.response
            .set_header(REQUEST_ID_HEADER, self.request_id.to_string());
        self.global_cursor = 0;
        self.route = None;
        self.route_chain = Arc::from(Vec::new());
        self.route_cursor = 0;
        self.completed = false;
        self.released = false;
        self.app = Some(app);
    }

    /// Finish the request: flush output if any was produced, clear the store, zero the
    /// cursors and drop the cached route.
    ///
    /// Returns `false` when the context was already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.response.flush();
        self.response.rebind(None);
        self.store.clear();
        self.global = Arc::from(Vec::new());
        self.global_cursor = 0;
        self.route = None;
        self.route_chain = Arc::from(Vec::new());
        self.route_cursor = 0;
        // the app owns the pool this context returns to
        self.app = None;
        true
    }

    /// Advance the chain by one step.
    ///
    /// Runs the next global middleware, or the next route middleware once the global
    /// phase is done, or the handler when both are exhausted. Calls after the handler
    /// ran are no-ops.
    pub fn next(&mut self) {
        if self.released {
            return;
        }

        if self.global_cursor < self.global.len() {
            let global = Arc::clone(&self.global);
            let middleware = &global[self.global_cursor];
            self.global_cursor += 1;
            debug!(
                request_id = %self.request_id,
                phase = "global",
                middleware = %middleware.name(),
                "Middleware step"
            );
            middleware.call(self);
            return;
        }

        let Some(app) = self.app.as_ref().map(Arc::clone) else {
            return;
        };
        let id = self.resolve_route(&app);

        if self.route_cursor < self.route_chain.len() {
            let chain = Arc::clone(&self.route_chain);
            let middleware = &chain[self.route_cursor];
            self.route_cursor += 1;
            debug!(
                request_id = %self.request_id,
                phase = "route",
                middleware = %middleware.name(),
                "Middleware step"
            );
            middleware.call(self);
            return;
        }

        if self.route_cursor == self.route_chain.len() {
            self.route_cursor += 1;
            self.completed = true;
            let handler = app.router().route(id).handler().clone();
            debug!(
                request_id = %self.request_id,
                handler = %handler.name(),
                "Handler execution start"
            );
            if let Err(err) = handler.call(self) {
                self.throw(err);
            }
        }
    }

    /// Skip the rest of the current phase, then advance once.
    ///
    /// Before the route is resolved this ends the global phase, so the route middleware
    /// and handler still run. Afterwards it jumps to the handler. A no-op once the
    /// handler has run.
    pub fn abort(&mut self) {
        if self.route.is_none() {
            self.global_cursor = self.global.len();
            self.next();
        } else if !self.completed {
            self.route_cursor = self.route_chain.len();
            self.next();
        }
    }

    /// Report a failure to the application's error handler.
    ///
    /// Unclassified failures are classified as server failures first.
    pub fn throw(&mut self, err: anyhow::Error) {
        let err = error::classify_at_boundary(err);
        match self.app.as_ref().map(Arc::clone) {
            Some(app) => app.report(self, &err),
            None => error!(error = %err, "Failure reported on a detached context"),
        }
    }

    fn resolve_route(&mut self, app: &App) -> RouteId {
        if let Some(id) = self.route {
            return id;
        }
        let (method, path, params) = self.request.match_parts();
        let id = app.router().resolve(method, path, params);
        self.route_chain = app.router().chain(id);
        self.route = Some(id);
        id
    }

    /// The matched route; `None` until the global phase is over.
    pub fn route(&self) -> Option<&Route> {
        let id = self.route?;
        self.app.as_ref().map(|app| app.router().route(id))
    }

    pub fn route_id(&self) -> Option<RouteId> {
        self.route
    }

    /// Whether the handler has run.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn app(&self) -> Option<&Arc<App>> {
        self.app.as_ref()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Request-scoped store, cleared at release.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Shortcut for `request().param(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    /// Rewrite the path used for route matching. Effective from global middleware only.
    pub fn set_path(&mut self, path: &str) {
        self.request.set_path(path);
    }
}
