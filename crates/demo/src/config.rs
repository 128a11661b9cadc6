//! Demo configuration loaded from environment variables.

use std::str::FromStr;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Demo configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `CREDIT_LIMIT` — credit available to the demo customer (default: `1000`)
/// - `ORDER_TOTAL` — total of each placed order (default: `400`)
/// - `ORDER_COUNT` — number of orders placed one after another (default: `3`)
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub credit_limit: i64,
    pub order_total: i64,
    pub order_count: usize,
}

impl DemoConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            credit_limit: lookup("CREDIT_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.credit_limit),
            order_total: lookup("ORDER_TOTAL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.order_total),
            order_count: lookup("ORDER_COUNT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.order_count),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            credit_limit: 1000,
            order_total: 400,
            order_count: 3,
        }
    }
}
