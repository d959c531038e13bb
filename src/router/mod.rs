//! # Router Module
//!
//! Path matching and the route registry.
//!
//! ## Overview
//!
//! - [`Tree`] is a character trie per HTTP method. Patterns are literal characters plus
//!   named captures (`/users/:id`); matching walks the request path one character at a
//!   time, so a lookup costs O(path length) no matter how many routes are registered.
//! - [`Router`] owns one tree per method, the route table, the name index, group scopes
//!   and parameter constraints.
//!
//! ## Registration
//!
//! ```rust
//! use triemux::router::{Middleware, Router};
//!
//! # fn main() -> Result<(), triemux::router::ConfigError> {
//! let mut router = Router::default();
//! router.get("/", |ctx| {
//!     ctx.response_mut().plain(200, "home");
//!     Ok(())
//! })?;
//!
//! router
//!     .group("/admin", |r| {
//!         r.get("/users/:id", |_ctx| Ok(()))?.name("admin.user")?.regexp("id", r"\d+")?;
//!         Ok(())
//!     })?
//!     .use_middleware(Middleware::named("auth", |ctx| ctx.next()))
//!     .label("json");
//!
//! assert_eq!(router.route_by_name("admin.user").map(|r| r.path()), Some("/admin/users/:id"));
//! # Ok(())
//! # }
//! ```
//!
//! Every registration call returns a `Result`: malformed patterns, trie conflicts,
//! duplicate names and bad constraint patterns fail at startup, never at request time.
//!
//! ## Resolution
//!
//! [`Router::resolve`] searches the method's tree, then checks the matched route's
//! constraints against the captured values. Any miss yields [`RouteId::DEFAULT`].

mod core;
pub mod error;
mod group;
pub mod params;
mod resource;
pub mod route;
mod snapshot;
pub mod trie;

pub use self::core::{RouteRef, Router};
pub use error::ConfigError;
pub use group::GroupRef;
pub use params::{ParamSink, ParamVec, MAX_INLINE_PARAMS};
pub use resource::{Action, Resource, ResourceRef};
pub use route::{
    parse_method, Constraint, Handler, HandlerResult, Middleware, Route, RouteId, METHODS,
};
pub use snapshot::RouteSnapshot;
pub use trie::{Edge, Tree, TrieError};
