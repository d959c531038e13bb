use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum number of path parameters before heap allocation.
/// Most routes have ≤4 captures (e.g., `/users/:id/posts/:post_id`).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Param names use `Arc<str>` because they come from the trie (known at startup), so
/// recording a capture is an atomic increment rather than a string copy. Values are
/// per-request data and stay owned `String`s.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Destination for captured path parameters.
///
/// [`Tree::search`](super::Tree::search) writes every capture it records through this
/// trait, so callers choose the storage.
pub trait ParamSink {
    /// Record `value` under `name`.
    fn set(&mut self, name: &Arc<str>, value: &str);
}

impl ParamSink for ParamVec {
    #[inline]
    fn set(&mut self, name: &Arc<str>, value: &str) {
        self.push((Arc::clone(name), value.to_owned()));
    }
}

impl ParamSink for HashMap<String, String> {
    fn set(&mut self, name: &Arc<str>, value: &str) {
        self.insert(name.to_string(), value.to_owned());
    }
}

/// Look up a parameter by name.
///
/// Uses "last write wins" semantics: if the same name was captured twice, the later
/// capture is returned.
#[inline]
#[must_use]
pub fn find_param<'a>(params: &'a ParamVec, name: &str) -> Option<&'a str> {
    params
        .iter()
        .rfind(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| v.as_str())
}
