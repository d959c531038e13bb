//! # Application
//!
//! [`App`] ties the pieces together: the [`Router`], global middleware per method, the
//! error handler, an app-wide [`Store`] and the [`ContextPool`].
//!
//! ## Lifecycle
//!
//! 1. Build an `App`, register routes through [`App::router_mut`] and global middleware
//!    through [`App::use_middleware`].
//! 2. Freeze it behind an `Arc` ([`App::into_shared`]).
//! 3. For each request the transport calls [`App::handle`], which checks out a context,
//!    drives the chain, recovers panics and releases the context.
//!
//! ## Failures
//!
//! Handler errors, [`Context::throw`] calls and recovered panics all reach one error
//! handler, already classified (see [`crate::error`]). The default handler answers JSON
//! (`{"code", "message"}`) unless the client accepts text and the route is not labelled
//! `json`. Server failures hide their message unless [`AppConfig::debug`] is set.

use http::Method;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::config::AppConfig;
use crate::context::{Context, ContextPool, Store};
use crate::error::{self, Classified, Severity, CLIENT_CODE, SERVER_CODE};
use crate::router::{parse_method, ConfigError, HandlerResult, Middleware, Router, METHODS};
use crate::server::{Request, ResponseSink};

/// Label forcing JSON error and 404 responses on a route.
pub const JSON_LABEL: &str = "json";

const NOT_FOUND_MESSAGE: &str = "404 route not found";

type ErrorHandlerFn = dyn Fn(&mut Context, &anyhow::Error) + Send + Sync;

pub struct App {
    config: AppConfig,
    router: Router,
    global: HashMap<Method, Arc<[Middleware]>>,
    empty: Arc<[Middleware]>,
    error_handler: Arc<ErrorHandlerFn>,
    store: Store,
    pool: ContextPool,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("routes", &self.router.len())
            .field("pool", &self.pool.stats())
            .finish()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl App {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            router: Router::new(config.strict_paths),
            global: HashMap::new(),
            empty: Arc::from(Vec::new()),
            error_handler: Arc::new(default_error_handler),
            store: Store::new(),
            pool: ContextPool::new(config.pool_max_idle, config.pool_prewarm),
            config,
        }
    }

    /// Finish registration and share the app between request handlers.
    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        debug!(
            routes = self.router.len(),
            global_middleware = self.global.values().map(|m| m.len()).sum::<usize>(),
            "Application ready"
        );
        Arc::new(self)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn debug(&self) -> bool {
        self.config.debug
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// App-wide store, shared by every request.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Append global middleware for all nine methods.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        for method in METHODS {
            self.push_global(method, middleware.clone());
        }
        self
    }

    /// Append global middleware for the named methods (`"ANY"` means all nine).
    pub fn use_middleware_for(
        &mut self,
        middleware: Middleware,
        methods: &[&str],
    ) -> Result<&mut Self, ConfigError> {
        if methods.is_empty() || methods.iter().any(|m| m.eq_ignore_ascii_case("any")) {
            return Ok(self.use_middleware(middleware));
        }
        let parsed = methods
            .iter()
            .map(|m| parse_method(m))
            .collect::<Result<Vec<_>, _>>()?;
        for method in parsed {
            self.push_global(method, middleware.clone());
        }
        Ok(self)
    }

    fn push_global(&mut self, method: Method, middleware: Middleware) {
        debug!(method = %method, middleware = %middleware.name(), "Global middleware added");
        let slot = self
            .global
            .entry(method)
            .or_insert_with(|| Arc::from(Vec::new()));
        let mut chain = slot.to_vec();
        chain.push(middleware);
        *slot = Arc::from(chain);
    }

    /// Global middleware slice for `method`.
    pub fn global_middleware(&self, method: &Method) -> Arc<[Middleware]> {
        Arc::clone(self.global.get(method).unwrap_or(&self.empty))
    }

    /// Replace the error handler.
    ///
    /// It receives every request-time failure exactly once, classified.
    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context, &anyhow::Error) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Dispatch one request.
    ///
    /// A panic anywhere in the chain is recovered here, turned into a classified failure
    /// and handed to the error handler. The context is released (and its output flushed)
    /// on every path.
    pub fn handle(self: &Arc<Self>, request: Request, sink: Box<dyn ResponseSink>) {
        let started = Instant::now();
        let mut guard = self.pool.checkout(self, request, sink);

        if let Some(ctx) = guard.context_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.next()));
            if let Err(payload) = outcome {
                recover(ctx, payload);
            }
            // D1: Dispatch complete
            debug!(
                request_id = %ctx.request_id(),
                method = %ctx.request().method(),
                path = %ctx.request().path(),
                route_name = ctx.route().map(|r| r.name()).unwrap_or(""),
                status = ctx.response().status(),
                completed = ctx.is_completed(),
                duration_us = started.elapsed().as_micros() as u64,
                "Dispatch complete"
            );
        }
        guard.release();
    }

    /// Log a failure and pass it to the error handler.
    pub(crate) fn report(&self, ctx: &mut Context, err: &anyhow::Error) {
        let code = error::code_of(err).unwrap_or(SERVER_CODE);
        match Severity::of(code) {
            Severity::Server => {
                let backtrace = error::classified(err)
                    .and_then(Classified::backtrace)
                    .map(ToString::to_string);
                error!(
                    request_id = %ctx.request_id(),
                    method = %ctx.request().method(),
                    path = %ctx.request().raw_path(),
                    code,
                    error = %format_args!("{err:#}"),
                    backtrace = backtrace.as_deref().unwrap_or("disabled"),
                    "Request failed with server error"
                );
            }
            Severity::Client => {
                warn!(
                    request_id = %ctx.request_id(),
                    method = %ctx.request().method(),
                    path = %ctx.request().raw_path(),
                    code,
                    error = %err,
                    "Request failed with client error"
                );
            }
        }
        let handler = Arc::clone(&self.error_handler);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, err)));
        if let Err(payload) = outcome {
            let panic = error::from_panic(payload);
            error!(
                request_id = %ctx.request_id(),
                panic = %panic,
                "Error handler panicked"
            );
            ctx.response_mut().error_json(500, SERVER_CODE, "Internal Server Error");
        }
    }
}

// The error handler's own panics are contained in `App::report`, so this reports once.
fn recover(ctx: &mut Context, payload: Box<dyn std::any::Any + Send>) {
    ctx.response_mut().clear_body();
    ctx.throw(error::from_panic(payload));
}

fn wants_json(ctx: &Context) -> bool {
    !ctx.request().accepts_text() || ctx.route().is_some_and(|r| r.has_label(JSON_LABEL))
}

fn status_for(code: i32, severity: Severity) -> u16 {
    let range = match severity {
        Severity::Client => 400..=499,
        Severity::Server => 500..=599,
    };
    if range.contains(&code) {
        code as u16
    } else {
        match severity {
            Severity::Client => CLIENT_CODE as u16,
            Severity::Server => SERVER_CODE as u16,
        }
    }
}

/// Error handler installed by [`App::new`].
///
/// Client failures answer with their message and a 4xx status (the classified code when
/// it is one, otherwise 400). Server failures answer 500 (or the classified 5xx code) and
/// only reveal their message in debug mode.
pub fn default_error_handler(ctx: &mut Context, err: &anyhow::Error) {
    let code = error::code_of(err).unwrap_or(SERVER_CODE);
    let severity = Severity::of(code);
    let debug = ctx.app().is_some_and(|app| app.debug());
    let message = match severity {
        Severity::Client => err.to_string(),
        Severity::Server if debug => format!("{err:#}"),
        Severity::Server => "Internal Server Error".to_string(),
    };
    let status = status_for(code, severity);
    let as_json = wants_json(ctx);

    let res = ctx.response_mut();
    res.clear_body();
    if as_json {
        res.error_json(status, code, &message);
    } else {
        res.set_header("x-content-type-options", "nosniff")
            .plain(status, &message);
    }
}

/// Handler of the default route: 404 in the same JSON/text choice as errors.
pub fn default_route(ctx: &mut Context) -> HandlerResult {
    let as_json = wants_json(ctx);
    let res = ctx.response_mut();
    res.clear_body();
    if as_json {
        res.error_json(404, 404, NOT_FOUND_MESSAGE);
    } else {
        res.set_header("x-content-type-options", "nosniff")
            .plain(404, NOT_FOUND_MESSAGE);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_codes() {
        assert_eq!(status_for(404, Severity::Client), 404);
        assert_eq!(status_for(42, Severity::Client), 400);
        assert_eq!(status_for(503, Severity::Server), 503);
        assert_eq!(status_for(700, Severity::Server), 500);
    }

    #[test]
    fn test_use_middleware_for_rejects_unknown_methods() {
        let mut app = App::default();
        let err = app
            .use_middleware_for(Middleware::named("m", |ctx| ctx.next()), &["GET", "BREW"])
            .err();
        assert_eq!(err, Some(ConfigError::UnknownMethod("BREW".to_string())));
        assert!(app.global_middleware(&Method::GET).is_empty());
    }

    #[test]
    fn test_global_middleware_per_method() {
        let mut app = App::default();
        app.use_middleware_for(Middleware::named("posts", |ctx| ctx.next()), &["post"])
            .unwrap();
        app.use_middleware(Middleware::named("all", |ctx| ctx.next()));

        let names = |m: &Method| -> Vec<String> {
            app.global_middleware(m)
                .iter()
                .map(|mw| mw.name().to_string())
                .collect()
        };
        assert_eq!(names(&Method::POST), vec!["posts", "all"]);
        assert_eq!(names(&Method::GET), vec!["all"]);
    }
}
