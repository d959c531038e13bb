//! Request and response collaborators.
//!
//! Transport setup (listeners, TLS, HTTP parsing) lives outside this crate. A transport
//! converts each incoming request into a [`Request`], provides a [`ResponseSink`] and calls
//! [`App::handle`](crate::app::App::handle).

pub mod request;
pub mod response;

pub use request::{match_path, normalize_path, HeaderVec, Request};
pub use response::{MemorySink, Response, ResponseSink, SentResponse};
