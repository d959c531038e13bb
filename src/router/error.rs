use std::fmt;

use super::trie::TrieError;

/// Registration-time failure.
///
/// Every registration operation returns these synchronously; none of them is ever deferred
/// to request handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The path could not be inserted into a method tree.
    Pattern {
        /// Method whose tree rejected the path
        method: String,
        /// Underlying trie failure
        source: TrieError,
    },
    /// The name is already held by another route.
    DuplicateName {
        /// Requested name
        name: String,
        /// Path of the route currently holding it
        held_by: String,
    },
    /// Not one of the nine standard HTTP verbs.
    UnknownMethod(String),
    /// A route must allow at least one method.
    NoMethods {
        /// Path that was being registered
        path: String,
    },
    /// A parameter constraint pattern failed to compile.
    InvalidConstraint {
        /// Parameter name the constraint applies to
        param: String,
        /// The rejected pattern
        pattern: String,
        /// Compiler message
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Pattern { method, source } => {
                write!(f, "cannot register {method} route: {source}")
            }
            ConfigError::DuplicateName { name, held_by } => {
                write!(f, "route name '{name}' is already used by '{held_by}'")
            }
            ConfigError::UnknownMethod(method) => write!(f, "unknown HTTP method '{method}'"),
            ConfigError::NoMethods { path } => {
                write!(f, "route '{path}' does not allow any method")
            }
            ConfigError::InvalidConstraint {
                param,
                pattern,
                reason,
            } => write!(
                f,
                "invalid constraint for parameter '{param}' ('{pattern}'): {reason}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Pattern { source, .. } => Some(source),
            _ => None,
        }
    }
}
