//! Agent configuration.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use ctera_mcp_session::LogoutPolicy;
use serde::{Deserialize, Serialize};

/// Token accepted when none is configured.
pub const DEFAULT_TOKEN: &str = "default-token";

/// Main agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// HTTP listener
    pub server: ServerConfig,

    /// Caller authentication
    pub auth: AuthConfig,

    /// CTERA backend connections
    pub backend: BackendConfig,

    /// Session handling
    pub sessions: SessionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Serve the tool registration document at `/mcp-tools-schema`.
    pub mcp_tools_registration: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            mcp_tools_registration: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token callers must present.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Certificate verification when a login does not say.
    pub tls_verify: bool,

    pub user_agent: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            tls_verify: false,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Forget a session even when the backend refuses to log it out.
    pub evict_on_logout_failure: bool,
}

impl AgentConfig {
    /// Load from a TOML file, or defaults when no path is given.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse TOML content.
    ///
    /// # Errors
    /// Returns error if the content is not valid configuration.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    #[must_use]
    pub const fn logout_policy(&self) -> LogoutPolicy {
        if self.sessions.evict_on_logout_failure {
            LogoutPolicy::EvictOnFailure
        } else {
            LogoutPolicy::KeepOnFailure
        }
    }

    /// Pick the bearer token: explicit value, then config file, then default.
    ///
    /// The flag reports whether the built-in default was used.
    #[must_use]
    pub fn resolve_token(&self, explicit: Option<&str>) -> (String, bool) {
        let present = |token: &&str| !token.trim().is_empty();
        explicit
            .filter(present)
            .or_else(|| self.auth.token.as_deref().filter(present))
            .map_or_else(|| (DEFAULT_TOKEN.to_string(), true), |token| (token.to_string(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(!config.backend.tls_verify);
        assert_eq!(config.logout_policy(), LogoutPolicy::KeepOnFailure);
        assert!(!config.server.mcp_tools_registration);
    }

    #[test]
    fn test_partial_file() {
        let config = AgentConfig::parse(
            r#"
[server]
port = 8080
mcp_tools_registration = true

[backend]
tls_verify = true
timeout_secs = 30

[sessions]
evict_on_logout_failure = true
"#,
        )
        .unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.mcp_tools_registration);
        assert!(config.backend.tls_verify);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.logout_policy(), LogoutPolicy::EvictOnFailure);
    }

    #[test]
    fn test_empty_file() {
        let config = AgentConfig::parse("").unwrap();
        assert_eq!(config.server.port, 5000);
        assert!(config.auth.token.is_none());
    }

    #[test]
    fn test_invalid_file() {
        assert!(AgentConfig::parse("[server]\nport = \"high\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AgentConfig::load(Some(Path::new("/nonexistent/agent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_token_precedence() {
        let mut config = AgentConfig::default();
        assert_eq!(config.resolve_token(None), (DEFAULT_TOKEN.to_string(), true));

        config.auth.token = Some("from-file".to_string());
        assert_eq!(config.resolve_token(None), ("from-file".to_string(), false));
        assert_eq!(
            config.resolve_token(Some("from-flag")),
            ("from-flag".to_string(), false)
        );
    }
}
