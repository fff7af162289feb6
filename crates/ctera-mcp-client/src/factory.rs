//! Client factory for the CTERA HTTP API.

use std::time::Duration;

use ctera_mcp_core::{BackendError, ClientFactory, ConnectionContext, PortalClient};
use reqwest::redirect::Policy;

use crate::portal::HttpPortalClient;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirects followed before a request fails.
const MAX_REDIRECTS: usize = 5;

/// Builds `HttpPortalClient` handles.
///
/// Each handle gets its own `reqwest::Client` so certificate verification is
/// decided per handle from the connection context.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
    user_agent: String,
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpClientFactory {
    /// Create a factory with the given per-request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            user_agent: format!("cterasdk-mcp/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Override the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, ctx: &ConnectionContext) -> Result<Box<dyn PortalClient>, BackendError> {
        let host = ctx.host.trim();
        if host.is_empty() {
            return Err(BackendError::InvalidHost(ctx.host.clone()));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(&self.user_agent)
            .danger_accept_invalid_certs(!ctx.tls_verify)
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {e}")))?;

        tracing::debug!(
            host,
            client_type = %ctx.client_type,
            tls_verify = ctx.tls_verify,
            "Created client handle"
        );

        Ok(Box::new(HttpPortalClient::new(http, host, ctx.client_type)))
    }
}
