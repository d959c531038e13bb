//! Structured logging setup
//!
//! The library only emits `tracing` events; installing a subscriber is the binary's job.
//! [`init_logging_with_config`] installs an `EnvFilter` plus a JSON (production) or pretty
//! (development) `fmt` layer.
//!
//! ## Environment Variables
//!
//! - `TRIEMUX_LOG_LEVEL`: trace/debug/info/warn/error (default `info`)
//! - `TRIEMUX_LOG_FORMAT`: json/pretty (default `json`)
//! - `TRIEMUX_LOG_FILTER`: extra comma-separated directives, e.g. `triemux::router=debug`
//! - `TRIEMUX_LOG_LOCATION`: include file:line (default `false`)
//!
//! `RUST_LOG`, when set, replaces the level-derived base filter.

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::parse_bool;

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Extra filter directives (comma-separated)
    pub target_filter: Option<String>,
    /// Include file:line location
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("TRIEMUX_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: env::var("TRIEMUX_LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.format),
            target_filter: env::var("TRIEMUX_LOG_FILTER").ok(),
            include_location: env::var("TRIEMUX_LOG_LOCATION")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.include_location),
        }
    }

    /// Verbose pretty output for local runs and tests
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
        }
    }

    /// Level parsed from `log_level`; unknown names mean INFO.
    pub fn level(&self) -> Level {
        match self.log_level.trim().to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Build the filter: `RUST_LOG` or the configured level, plus `target_filter`.
    ///
    /// Invalid directives are skipped and returned so the caller can report them once a
    /// subscriber exists.
    pub fn build_filter(&self) -> (EnvFilter, Vec<String>) {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        let mut rejected = Vec::new();
        if let Some(extra) = &self.target_filter {
            for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(parsed) => filter = filter.add_directive(parsed),
                    Err(_) => rejected.push(directive.to_string()),
                }
            }
        }
        (filter, rejected)
    }
}

/// Install the global subscriber.
///
/// Fails (instead of panicking) when a global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<()> {
    let (filter, rejected) = config.build_filter();

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    for directive in rejected {
        tracing::warn!(directive = %directive, "Invalid log filter directive ignored");
    }
    Ok(())
}
