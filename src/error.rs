//! # Error Classification
//!
//! Request-time failures travel as [`anyhow::Error`]. Before the error handler sees one,
//! it is tagged with an integer severity code by wrapping it in a [`Classified`] layer.
//!
//! ## Buckets
//!
//! Codes below [`SERVER_CODE`] are client failures (bad input, missing resources); codes
//! at or above it are server failures. [`CLIENT_CODE`] and [`SERVER_CODE`] are the
//! canonical values for each bucket.
//!
//! ## Marking is depth-stable
//!
//! [`mark`] looks for an existing [`Classified`] layer anywhere in the chain and updates
//! its code in place. Re-marking never adds a second wrapper, so the original cause stays
//! exactly one step away:
//!
//! ```rust
//! use triemux::error::{self, CLIENT_CODE};
//!
//! let err = error::mark_server(anyhow::anyhow!("disk full"));
//! let err = error::mark_client(err);
//! assert_eq!(error::code_of(&err), Some(CLIENT_CODE));
//! assert_eq!(error::classified(&err).unwrap().cause().to_string(), "disk full");
//! ```
//!
//! [`try_mark`] only classifies values that carry no code yet.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Canonical client-severity code.
pub const CLIENT_CODE: i32 = 400;

/// Canonical server-severity code; also the threshold between the two buckets.
pub const SERVER_CODE: i32 = 500;

/// Which side of the threshold a code falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Client,
    Server,
}

impl Severity {
    /// Bucket for an integer code.
    #[must_use]
    pub fn of(code: i32) -> Self {
        if code >= SERVER_CODE {
            Severity::Server
        } else {
            Severity::Client
        }
    }
}

/// A failure tagged with a severity code.
///
/// Displays as its cause. `source()` skips straight to the cause's own source so the
/// anyhow chain does not print the message twice.
pub struct Classified {
    code: AtomicI32,
    cause: anyhow::Error,
    backtrace: Option<Backtrace>,
}

impl Classified {
    fn new(cause: anyhow::Error, code: i32, backtrace: Option<Backtrace>) -> Self {
        Self {
            code: AtomicI32::new(code),
            cause,
            backtrace,
        }
    }

    /// Current severity code.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code.load(Ordering::Acquire)
    }

    /// Bucket of the current code.
    #[must_use]
    pub fn severity(&self) -> Severity {
        Severity::of(self.code())
    }

    /// The wrapped failure, unchanged by any number of re-markings.
    #[must_use]
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Consume the wrapper and return the original failure.
    #[must_use]
    pub fn into_cause(self) -> anyhow::Error {
        self.cause
    }

    /// Backtrace captured when an unclassified failure reached the request boundary.
    ///
    /// `None` unless capturing was enabled (`RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`).
    #[must_use]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace
            .as_ref()
            .filter(|bt| bt.status() == BacktraceStatus::Captured)
    }

    fn set_code(&self, code: i32) {
        self.code.store(code, Ordering::Release);
    }
}

impl fmt::Debug for Classified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classified")
            .field("code", &self.code())
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for Classified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cause, f)
    }
}

impl std::error::Error for Classified {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.source()
    }
}

/// Find the classification layer of `err`, however deep it sits.
#[must_use]
pub fn classified(err: &anyhow::Error) -> Option<&Classified> {
    err.chain().find_map(|e| e.downcast_ref::<Classified>())
}

/// Tag `err` with `code`, overwriting any existing code in place.
#[must_use]
pub fn mark(err: anyhow::Error, code: i32) -> anyhow::Error {
    if let Some(existing) = classified(&err) {
        existing.set_code(code);
        return err;
    }
    anyhow::Error::new(Classified::new(err, code, None))
}

/// Tag `err` with `code` unless it is already classified.
#[must_use]
pub fn try_mark(err: anyhow::Error, code: i32) -> anyhow::Error {
    if classified(&err).is_some() {
        return err;
    }
    anyhow::Error::new(Classified::new(err, code, None))
}

#[must_use]
pub fn mark_client(err: anyhow::Error) -> anyhow::Error {
    mark(err, CLIENT_CODE)
}

#[must_use]
pub fn mark_server(err: anyhow::Error) -> anyhow::Error {
    mark(err, SERVER_CODE)
}

#[must_use]
pub fn try_mark_client(err: anyhow::Error) -> anyhow::Error {
    try_mark(err, CLIENT_CODE)
}

#[must_use]
pub fn try_mark_server(err: anyhow::Error) -> anyhow::Error {
    try_mark(err, SERVER_CODE)
}

/// Code attached to `err`, if any.
#[must_use]
pub fn code_of(err: &anyhow::Error) -> Option<i32> {
    classified(err).map(Classified::code)
}

/// Whether `err` is classified with exactly `code`.
#[must_use]
pub fn has_code(err: &anyhow::Error, code: i32) -> bool {
    code_of(err) == Some(code)
}

/// Whether `err` is classified in the client bucket.
#[must_use]
pub fn is_client(err: &anyhow::Error) -> bool {
    classified(err).is_some_and(|c| c.severity() == Severity::Client)
}

/// Whether `err` is classified in the server bucket.
#[must_use]
pub fn is_server(err: &anyhow::Error) -> bool {
    classified(err).is_some_and(|c| c.severity() == Severity::Server)
}

/// Return the original cause, dropping the classification layer.
///
/// `anyhow` downcasts through context layers, so context added after marking is
/// discarded along with the wrapper. Unclassified errors are returned unchanged.
#[must_use]
pub fn unwrap_cause(err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<Classified>() {
        Ok(classified) => classified.into_cause(),
        Err(err) => err,
    }
}

/// Guarantee classification at the request boundary.
///
/// Already-classified failures pass through untouched. Anything else becomes a server
/// failure carrying a backtrace of the boundary.
#[must_use]
pub fn classify_at_boundary(err: anyhow::Error) -> anyhow::Error {
    if classified(&err).is_some() {
        return err;
    }
    anyhow::Error::new(Classified::new(
        err,
        SERVER_CODE,
        Some(Backtrace::capture()),
    ))
}

/// Convert a recovered panic payload into a classified failure.
///
/// Payloads that are `anyhow::Error`, `&str` or `String` keep their message; anything
/// else is reported as an opaque panic.
#[must_use]
pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    let err = match payload.downcast::<anyhow::Error>() {
        Ok(err) => *err,
        Err(payload) => match payload.downcast::<String>() {
            Ok(msg) => anyhow::anyhow!("panic: {msg}"),
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(msg) => anyhow::anyhow!("panic: {msg}"),
                Err(_) => anyhow::anyhow!("panic with a non-string payload"),
            },
        },
    };
    classify_at_boundary(err)
}
