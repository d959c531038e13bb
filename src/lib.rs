//! # triemux
//!
//! **triemux** is an HTTP request multiplexer built on a character trie, with two-phase
//! cooperative middleware dispatch and pooled request contexts.
//!
//! ## Overview
//!
//! An [`App`] owns a [`Router`] (one trie per HTTP method), global middleware per method,
//! an error handler and a [`ContextPool`]. A transport adapter hands each request to
//! [`App::handle`] together with a [`ResponseSink`] that receives the finished response.
//!
//! ## Architecture
//!
//! - **[`router`]** - trie matching, route registry, groups, resources and constraints
//! - **[`context`]** - per-request [`Context`], the dispatch chain and the context pool
//! - **[`app`]** - the application: global middleware, error handling, panic recovery
//! - **[`error`]** - client/server failure classification
//! - **[`server`]** - transport-neutral [`Request`] and [`Response`] types
//! - **[`config`]** - [`AppConfig`] from defaults, environment or TOML
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`ids`]** - request identifiers
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant T as Transport
//!     participant A as App
//!     participant P as ContextPool
//!     participant C as Context
//!     participant R as Router
//!
//!     T->>A: handle(request, sink)
//!     A->>P: checkout
//!     P-->>A: ContextGuard
//!     A->>C: next()
//!     C->>C: global middleware (cooperative)
//!     C->>R: resolve(method, path)
//!     R-->>C: RouteId + captured params
//!     C->>C: group + route middleware
//!     C->>C: handler (exactly once)
//!     A->>P: release (flush to sink)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use triemux::{App, AppConfig, MemorySink, Middleware, Request};
//! use http::Method;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut app = App::new(AppConfig::default());
//! app.use_middleware(Middleware::named("timing", |ctx| ctx.next()));
//! app.router_mut()
//!     .get("/article/:id", |ctx| {
//!         let id = ctx.param("id").unwrap_or_default().to_string();
//!         ctx.response_mut().plain(200, &format!("article {id}"));
//!         Ok(())
//!     })?
//!     .regexp("id", r"\d+")?;
//! let app = app.into_shared();
//!
//! let sink = MemorySink::new();
//! app.handle(Request::new(Method::GET, "/article/42"), sink.boxed());
//! app.handle(Request::new(Method::GET, "/article/abc"), sink.boxed());
//!
//! let sent = sink.responses();
//! assert_eq!(sent[0].status, 200);
//! assert_eq!(sent[0].body_str(), "article 42");
//! assert_eq!(sent[1].status, 404);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failures
//!
//! Handlers return [`HandlerResult`]. Errors are classified as client (4xx) or server
//! (5xx) failures with [`error::mark_client`] and friends; anything unclassified when it
//! reaches the boundary is a server failure. Panics inside the chain are recovered and
//! reported the same way.

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod logging;
pub mod router;
pub mod server;

pub use app::App;
pub use config::AppConfig;
pub use context::{Context, ContextPool, Store};
pub use error::{Classified, Severity};
pub use ids::RequestId;
pub use router::{
    ConfigError, Handler, HandlerResult, Middleware, Resource, Route, RouteId, Router,
};
pub use server::{MemorySink, Request, Response, ResponseSink, SentResponse};
