//! File-based configuration.
//!
//! ```toml
//! middleware = ["recover", "request_id", "logger"]
//!
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! read_timeout_secs = 15
//! write_timeout_secs = 15
//! ```
//!
//! Every key is optional; missing keys take the defaults shown by
//! [`ServerConfig::default`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::handler::Middleware;
use crate::middleware;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,

    /// Names of built-in middleware to install globally, outermost first.
    pub middleware: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Maximum time to receive a request's headers.
    pub read_timeout_secs: u64,

    /// Maximum time to produce a response once the request is read.
    pub write_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8080,
            read_timeout_secs: 15,
            write_timeout_secs: 15,
        }
    }
}

impl ServerConfig {
    /// `host:port`, suitable for [`Server::bind`](crate::Server::bind).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Config {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), address = %config.address(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".to_owned()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be between 1 and 65535".to_owned()));
        }
        match self.middleware.iter().find(|name| !middleware::NAMES.contains(&name.as_str())) {
            Some(unknown) => Err(ConfigError::UnknownMiddleware(unknown.clone())),
            None => Ok(()),
        }
    }

    pub fn address(&self) -> String {
        self.server.address()
    }

    /// Builds the configured middleware, in order.
    pub fn middlewares(&self) -> Result<Vec<Middleware>, ConfigError> {
        middleware::from_names(&self.middleware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.address(), "localhost:8080");
        assert_eq!(config.server.read_timeout(), Duration::from_secs(15));
        assert_eq!(config.server.write_timeout(), Duration::from_secs(15));
        assert!(config.middleware.is_empty());
    }

    #[test]
    fn partial_server_table_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            middleware = ["recover", "logger"]

            [server]
            port = 3000
            "#,
        )
        .unwrap();
        assert_eq!(config.address(), "localhost:3000");
        assert_eq!(config.server.write_timeout_secs, 15);
        assert_eq!(config.middleware, ["recover", "logger"]);
    }

    #[test]
    fn rejects_port_zero() {
        let err = Config::from_toml("[server]\nport = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_middleware() {
        let err = Config::from_toml(r#"middleware = ["gzip"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMiddleware(name) if name == "gzip"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = Config::from_toml("[server\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/definitely/not/here/switchyard.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
