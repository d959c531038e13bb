//! # Application Configuration
//!
//! Settings that shape how an [`App`](crate::app::App) routes and dispatches.
//!
//! ## Sources
//!
//! - [`AppConfig::default()`] for defaults
//! - [`AppConfig::from_env()`] for environment variables
//! - [`AppConfig::from_toml_str()`] / [`AppConfig::from_file()`] for TOML
//!
//! ## Environment Variables
//!
//! ### `TRIEMUX_DEBUG`
//!
//! Expose server-failure messages in error responses. Default: `false`.
//!
//! ### `TRIEMUX_STRICT_PATHS`
//!
//! Case-sensitive path matching. When `false`, `/Users` and `/users` match the same route.
//! Default: `false`.
//!
//! ### `TRIEMUX_POOL_MAX_IDLE`
//!
//! Upper bound on released contexts kept for reuse; extra ones are dropped.
//! Default: `1024`.
//!
//! ### `TRIEMUX_POOL_PREWARM`
//!
//! Contexts constructed up front. Capped at `TRIEMUX_POOL_MAX_IDLE`. Default: `0`.
//!
//! Unparsable values fall back to the default for that setting.
//!
//! ## Example Configuration
//!
//! ```toml
//! debug = false
//! strict_paths = true
//! pool_max_idle = 256
//! pool_prewarm = 64
//! ```

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::context::DEFAULT_MAX_IDLE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Show server-failure details to clients (default: false)
    pub debug: bool,
    /// Case-sensitive path matching (default: false)
    pub strict_paths: bool,
    /// Released contexts kept for reuse (default: 1024)
    pub pool_max_idle: usize,
    /// Contexts built at startup (default: 0)
    pub pool_prewarm: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            strict_paths: false,
            pool_max_idle: DEFAULT_MAX_IDLE,
            pool_prewarm: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            debug: lookup("TRIEMUX_DEBUG")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.debug),
            strict_paths: lookup("TRIEMUX_STRICT_PATHS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.strict_paths),
            pool_max_idle: lookup("TRIEMUX_POOL_MAX_IDLE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.pool_max_idle),
            pool_prewarm: lookup("TRIEMUX_POOL_PREWARM")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.pool_prewarm),
        }
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("failed to parse triemux configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in config file {}", path.display()))
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
