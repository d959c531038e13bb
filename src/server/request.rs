use crate::error;
use crate::router::params::{find_param, ParamVec};
use http::Method;
use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::sync::Arc;

/// Maximum number of headers kept inline before spilling to the heap.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage; names are lowercased on insert.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Request handed to the dispatch chain.
///
/// The transport builds one per incoming request. The dispatcher only needs the method,
/// the raw path and somewhere to put captured parameters; the remaining accessors are
/// conveniences for handlers.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    raw_path: String,
    path: String,
    headers: HeaderVec,
    params: ParamVec,
    body: Vec<u8>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl Request {
    /// Build a request for `method` and the raw request target (query string allowed).
    #[must_use]
    pub fn new(method: Method, raw_path: impl Into<String>) -> Self {
        let raw_path = raw_path.into();
        let path = match_path(&raw_path);
        Self {
            method,
            raw_path,
            path,
            headers: HeaderVec::new(),
            params: ParamVec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target exactly as received.
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Path used for route matching.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the path used for route matching.
    ///
    /// Only effective before the route is resolved, i.e. from global middleware.
    pub fn set_path(&mut self, path: &str) {
        self.path = normalize_path(path);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Deserialize the JSON body. Malformed input is a client failure.
    pub fn body_json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| error::mark_client(anyhow::Error::new(e).context("invalid JSON body")))
    }

    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.headers
                .push((Arc::from(name.to_ascii_lowercase()), value));
        }
    }

    /// Whether the client prefers a textual (HTML or plain) representation.
    pub fn accepts_text(&self) -> bool {
        self.header("accept")
            .is_some_and(|a| a.contains("text/html") || a.contains("text/plain"))
    }

    pub fn accepts_json(&self) -> bool {
        self.header("accept")
            .is_some_and(|a| a.contains("application/json"))
    }

    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|c| c.contains("application/json"))
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    /// Captured path parameters in capture order.
    pub fn params(&self) -> &ParamVec {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut ParamVec {
        &mut self.params
    }

    // Disjoint borrows for route resolution.
    pub(crate) fn match_parts(&mut self) -> (&Method, &str, &mut ParamVec) {
        (&self.method, &self.path, &mut self.params)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    pub fn param_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.param(name).unwrap_or(default)
    }

    pub fn param_int(&self, name: &str) -> Option<i64> {
        self.param(name)?.parse().ok()
    }

    /// Parameter parsed as a strictly positive integer.
    pub fn param_positive_int(&self, name: &str) -> Option<u64> {
        self.param(name)?.parse::<u64>().ok().filter(|n| *n > 0)
    }

    pub fn param_bool(&self, name: &str) -> Option<bool> {
        match self.param(name)?.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        }
    }

    pub fn param_f64(&self, name: &str) -> Option<f64> {
        self.param(name)?.parse().ok()
    }
}

/// Derive the match path from a raw request target.
///
/// Strips the query string, percent-decodes (keeping the raw text when the result is not
/// UTF-8) and normalizes slashes with [`normalize_path`].
pub fn match_path(raw_path: &str) -> String {
    let without_query = raw_path.split(['?', '#']).next().unwrap_or_default();
    let decoded =
        urlencoding::decode(without_query).unwrap_or(Cow::Borrowed(without_query));
    normalize_path(&decoded)
}

/// Force a leading `/` and drop a single trailing `/` (except for the root).
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        out.push('/');
    }
    out.push_str(path);
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}
