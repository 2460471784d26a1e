//! Configuration management for Lab Co-Pilot.
//!
//! Configuration can be set via environment variables:
//! - `MISTRAL_API_KEY` - Required. Your Mistral API key.
//! - `MISTRAL_MODEL` - Optional. Chat model identifier. Defaults to `mistral-large-latest`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8000`.
//! - `SANDBOX_TIMEOUT_SECS` - Optional. Wall-clock limit for sandboxed code. Defaults to `10`.
//! - `HISTORY_WINDOW` - Optional. Number of past turns fed to the model. Defaults to `20`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Server and agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mistral API key
    pub api_key: String,

    /// Chat model identifier
    pub model: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Wall-clock deadline for one sandboxed code execution, in seconds
    pub sandbox_timeout_secs: u64,

    /// Number of most recent turns included when building the prompt
    pub history_window: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `MISTRAL_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("MISTRAL_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("MISTRAL_API_KEY".to_string()))?;

        let model = std::env::var("MISTRAL_MODEL")
            .unwrap_or_else(|_| "mistral-large-latest".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let sandbox_timeout_secs = std::env::var("SANDBOX_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("SANDBOX_TIMEOUT_SECS".to_string(), format!("{}", e))
            })?;

        let history_window = std::env::var("HISTORY_WINDOW")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("HISTORY_WINDOW".to_string(), format!("{}", e))
            })?;

        Ok(Self {
            api_key,
            model,
            host,
            port,
            sandbox_timeout_secs,
            history_window,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            host: "127.0.0.1".to_string(),
            port: 8000,
            sandbox_timeout_secs: 10,
            history_window: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_documented_defaults() {
        let config = Config::new("key".to_string(), "mistral-large-latest".to_string());
        assert_eq!(config.port, 8000);
        assert_eq!(config.sandbox_timeout_secs, 10);
        assert_eq!(config.history_window, 20);
    }
}
