// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the Task API server.
//!
//! [`ServerConfig`] holds the runtime settings. It is read from an optional
//! TOML file, overlaid with `TODO_*` environment variables, and checked by
//! [`validate_config`], which separates hard errors from advisory
//! [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent the server from starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Problem `type` URLs will not be served over TLS.
    InsecureProblemBaseUrl {
        /// The configured base URL.
        url: String,
    },
    /// No CORS origins were listed, so every origin is allowed.
    PermissiveCors,
    /// The default page size equals the maximum.
    DefaultPageSizeAtMax {
        /// Shared value.
        size: u32,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InsecureProblemBaseUrl { url } => {
                write!(f, "problem_base_url '{url}' does not use https")
            }
            ConfigWarning::PermissiveCors => {
                f.write_str("cors_origins is empty; all origins are allowed")
            }
            ConfigWarning::DefaultPageSizeAtMax { size } => {
                write!(f, "default_page_size equals max_page_size ({size})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Runtime configuration for the Task API server.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP gateway listens on.
    pub http_bind: String,

    /// Log level (`error`, `warn`, `info`, `debug` or `trace`).
    pub log_level: String,

    /// Base of problem `type` URLs; the code slug is appended.
    pub problem_base_url: String,

    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,

    /// ListTasks page size used when the request asks for 0.
    pub default_page_size: u32,

    /// Upper bound ListTasks page sizes are clamped to.
    pub max_page_size: u32,

    /// Optional TOML file replacing the built-in validation constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_bind: DEFAULT_HTTP_BIND.into(),
            log_level: "info".into(),
            problem_base_url: DEFAULT_PROBLEM_BASE_URL.into(),
            cors_origins: Vec::new(),
            default_page_size: 50,
            max_page_size: PAGE_SIZE_LIMIT,
            constraints_file: None,
        }
    }
}

impl ServerConfig {
    /// Parsed [`http_bind`](Self::http_bind).
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http_bind
            .parse()
            .map_err(|e| ConfigError::ValidationError {
                reasons: vec![format!("invalid http_bind '{}': {e}", self.http_bind)],
            })
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default gateway listen address.
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";

/// Default base of problem `type` URLs.
pub const DEFAULT_PROBLEM_BASE_URL: &str = "https://api.example.com/errors";

/// Largest accepted `max_page_size`.
pub const PAGE_SIZE_LIMIT: u32 = 1000;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`ServerConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, starts from [`ServerConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env<F>(path: Option<&Path>, lookup: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => ServerConfig::default(),
    };
    apply_env_overrides(&mut config, lookup);
    Ok(config)
}

/// Parse a TOML string into a [`ServerConfig`].
pub fn parse_toml(content: &str) -> Result<ServerConfig, ConfigError> {
    toml::from_str::<ServerConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides read through `lookup`.
///
/// Recognised variables:
/// - `TODO_HTTP_BIND`
/// - `TODO_LOG_LEVEL`
/// - `TODO_PROBLEM_BASE_URL`
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("TODO_HTTP_BIND") {
        config.http_bind = val;
    }
    if let Some(val) = lookup("TODO_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(val) = lookup("TODO_PROBLEM_BASE_URL") {
        config.problem_base_url = val;
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a configuration, returning advisory warnings.
///
/// Hard errors are returned as a [`ConfigError::ValidationError`] listing
/// every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if config.http_bind.parse::<SocketAddr>().is_err() {
        errors.push(format!("invalid http_bind '{}'", config.http_bind));
    }

    if !VALID_LOG_LEVELS.contains(&config.log_level.as_str()) {
        errors.push(format!("invalid log_level '{}'", config.log_level));
    }

    let url = config.problem_base_url.as_str();
    if url.starts_with("http://") {
        warnings.push(ConfigWarning::InsecureProblemBaseUrl { url: url.into() });
    } else if !url.starts_with("https://") {
        errors.push(format!(
            "problem_base_url '{url}' must be an http or https URL"
        ));
    }

    if config.cors_origins.is_empty() {
        warnings.push(ConfigWarning::PermissiveCors);
    }
    for origin in &config.cors_origins {
        if origin.trim().is_empty() {
            errors.push("cors origin must not be empty".into());
        }
    }

    if config.max_page_size == 0 || config.max_page_size > PAGE_SIZE_LIMIT {
        errors.push(format!(
            "max_page_size {} out of range (1..={PAGE_SIZE_LIMIT})",
            config.max_page_size
        ));
    }
    if config.default_page_size == 0 {
        errors.push("default_page_size must be positive".into());
    } else if config.default_page_size > config.max_page_size {
        errors.push(format!(
            "default_page_size {} exceeds max_page_size {}",
            config.default_page_size, config.max_page_size
        ));
    } else if config.default_page_size == config.max_page_size {
        warnings.push(ConfigWarning::DefaultPageSizeAtMax {
            size: config.max_page_size,
        });
    }

    if let Some(path) = &config.constraints_file {
        if !path.is_file() {
            errors.push(format!(
                "constraints_file '{}' does not exist",
                path.display()
            ));
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
