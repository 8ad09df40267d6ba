#![warn(missing_docs)]

//! # runlet-config
//!
//! Configuration loading for the Runlet function engine.
//!
//! Supports TOML configuration files with environment variable expansion.
//!
//! ## Example
//!
//! ```toml
//! [sandbox]
//! timeout_secs = 60
//! max_heap_mb = 64
//! max_concurrent = 8
//! max_code_size_kb = 64
//!
//! [http]
//! request_timeout_secs = 30
//! user_agent = "runlet/${RUNLET_VERSION}"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level Runlet configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunletConfig {
    /// Sandbox execution settings.
    #[serde(default)]
    pub sandbox: SandboxOverrides,

    /// Outbound HTTP client settings for the sandboxed `fetch`.
    #[serde(default)]
    pub http: HttpOverrides,
}

/// Sandbox configuration overrides.
///
/// Every field is optional; unset fields fall back to the engine defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SandboxOverrides {
    /// Hard execution deadline in seconds (default 60).
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Maximum V8 heap size in megabytes.
    #[serde(default)]
    pub max_heap_mb: Option<usize>,

    /// Maximum concurrent sandbox executions.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Maximum handler source size in kilobytes.
    #[serde(default)]
    pub max_code_size_kb: Option<usize>,
}

/// Outbound HTTP client overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpOverrides {
    /// Per-request timeout in seconds for sandboxed fetch calls.
    ///
    /// The invocation deadline still applies on top of this; an outbound
    /// call never extends the overall wall-clock budget.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// User-Agent header for outbound requests.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl RunletConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: RunletConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(toml_str);
        Self::from_toml(&expanded)
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "sandbox.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.sandbox.max_heap_mb == Some(0) {
            return Err(ConfigError::Invalid(
                "sandbox.max_heap_mb must be greater than zero".into(),
            ));
        }
        if self.sandbox.max_code_size_kb == Some(0) {
            return Err(ConfigError::Invalid(
                "sandbox.max_code_size_kb must be greater than zero".into(),
            ));
        }
        if self.http.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "http.request_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string using environment variables.
///
/// Unset variables expand to the empty string. A `$` not followed by `{` is
/// passed through untouched.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if closed {
                result.push_str(&std::env::var(&var_name).unwrap_or_default());
            } else {
                // Unterminated reference — emit it literally.
                result.push_str("${");
                result.push_str(&var_name);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_config() {
        let config = RunletConfig::from_toml("").unwrap();
        assert!(config.sandbox.timeout_secs.is_none());
        assert!(config.http.user_agent.is_none());
    }

    #[test]
    fn parses_sandbox_overrides() {
        let toml = r#"
            [sandbox]
            timeout_secs = 3
            max_heap_mb = 32
            max_concurrent = 4
            max_code_size_kb = 16
        "#;
        let config = RunletConfig::from_toml(toml).unwrap();
        assert_eq!(config.sandbox.timeout_secs, Some(3));
        assert_eq!(config.sandbox.max_heap_mb, Some(32));
        assert_eq!(config.sandbox.max_concurrent, Some(4));
        assert_eq!(config.sandbox.max_code_size_kb, Some(16));
    }

    #[test]
    fn parses_http_overrides() {
        let toml = r#"
            [http]
            request_timeout_secs = 10
            user_agent = "runlet-test"
        "#;
        let config = RunletConfig::from_toml(toml).unwrap();
        assert_eq!(config.http.request_timeout_secs, Some(10));
        assert_eq!(config.http.user_agent.as_deref(), Some("runlet-test"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let toml = "[sandbox]\ntimeout_secs = 0\n";
        let err = RunletConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn rejects_zero_heap() {
        let toml = "[sandbox]\nmax_heap_mb = 0\n";
        let err = RunletConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = RunletConfig::from_toml("[sandbox\ntimeout_secs = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn expands_env_vars() {
        std::env::set_var("RUNLET_TEST_UA", "agent-007");
        let toml = r#"
            [http]
            user_agent = "${RUNLET_TEST_UA}"
        "#;
        let config = RunletConfig::from_toml_with_env(toml).unwrap();
        assert_eq!(config.http.user_agent.as_deref(), Some("agent-007"));
        std::env::remove_var("RUNLET_TEST_UA");
    }

    #[test]
    fn unset_env_var_expands_to_empty() {
        let toml = r#"
            [http]
            user_agent = "x${RUNLET_DEFINITELY_UNSET_VAR}y"
        "#;
        let config = RunletConfig::from_toml_with_env(toml).unwrap();
        assert_eq!(config.http.user_agent.as_deref(), Some("xy"));
    }

    #[test]
    fn dollar_without_brace_passes_through() {
        assert_eq!(expand_env_vars("cost is $5"), "cost is $5");
    }

    #[test]
    fn unterminated_reference_is_literal() {
        assert_eq!(expand_env_vars("${UNTERMINATED"), "${UNTERMINATED");
    }
}
