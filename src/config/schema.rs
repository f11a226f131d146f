//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Per-connection and per-request limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rewrite rules applied before routing.
    pub rewrite: RewriteConfig,

    /// Access log settings.
    pub request_log: RequestLogConfig,

    /// Static file serving for unmatched paths.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Port advertised for HTTPS, used by `secure_redirect` rules.
    pub secure_port: Option<u16>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            secure_port: None,
        }
    }
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Requests served on one HTTP/1.x connection before `Connection: close`
    /// is forced. Absent means no limit. Signed so that a bad value reaches
    /// validation instead of failing deserialization opaquely.
    pub max_requests_per_connection: Option<i64>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests_per_connection: None,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Rewrite rules, evaluated in order.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RewriteConfig {
    pub rules: Vec<RuleConfig>,
}

/// A single rewrite rule definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    /// Redirect requests whose full URL matches `regex`.
    Redirect {
        regex: String,
        replacement: String,
        #[serde(default = "default_redirect_status")]
        status: u16,
        terminating: Option<bool>,
    },

    /// Reject requests whose `User-Agent` matches `regex`.
    RejectUserAgent {
        regex: String,
        #[serde(default = "default_reject_status")]
        status: u16,
        terminating: Option<bool>,
    },

    /// Redirect plain-text requests to the HTTPS port.
    SecureRedirect { terminating: Option<bool> },

    /// Rewrite the request path before routing.
    RewritePath {
        regex: String,
        replacement: String,
        terminating: Option<bool>,
    },

    /// Add a response header for requests under a path prefix.
    ResponseHeader {
        path_prefix: String,
        name: String,
        value: String,
        terminating: Option<bool>,
    },
}

fn default_redirect_status() -> u16 {
    301
}

fn default_reject_status() -> u16 {
    403
}

/// Access log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLogConfig {
    /// Enable the request log.
    pub enabled: bool,

    /// Log file path. When absent, lines go to the `request_log` tracing target.
    pub path: Option<PathBuf>,

    /// Append to an existing file instead of truncating it.
    pub append: bool,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            append: true,
        }
    }
}

/// Static file serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory to serve; `index.html` answers directory requests.
    /// Disabled when absent.
    pub root: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.limits.max_requests_per_connection, None);
        assert!(config.rewrite.rules.is_empty());
        assert!(!config.request_log.enabled);
    }

    #[test]
    fn limit_only_set_when_configured() {
        let config: ServerConfig = toml::from_str("[limits]\nmax_body_bytes = 10\n").unwrap();
        assert_eq!(config.limits.max_requests_per_connection, None);
        assert_eq!(config.limits.max_body_bytes, 10);

        let config: ServerConfig =
            toml::from_str("[limits]\nmax_requests_per_connection = 7\n").unwrap();
        assert_eq!(config.limits.max_requests_per_connection, Some(7));
    }

    #[test]
    fn parses_tagged_rules() {
        let config: ServerConfig = toml::from_str(
            r#"
            [limits]
            max_requests_per_connection = 5

            [[rewrite.rules]]
            kind = "reject_user_agent"
            regex = ".*Robot.*"
            status = 401

            [[rewrite.rules]]
            kind = "redirect"
            regex = "http://www.example.org/dump/.*"
            replacement = "https://api.example.org/dump/"
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.max_requests_per_connection, Some(5));
        assert_eq!(config.rewrite.rules.len(), 2);
        assert!(matches!(
            config.rewrite.rules[0],
            RuleConfig::RejectUserAgent { status: 401, .. }
        ));
        assert!(matches!(
            config.rewrite.rules[1],
            RuleConfig::Redirect { status: 301, terminating: None, .. }
        ));
    }
}
