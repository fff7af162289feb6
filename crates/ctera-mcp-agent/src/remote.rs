//! Client for a running agent.

use anyhow::{Context, Result};
use ctera_mcp_transport::RunToolRequest;
use reqwest::StatusCode;
use serde_json::Value;

/// Talks to another agent's HTTP surface.
pub struct RemoteAgent {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

/// HTTP status plus the JSON body the agent answered with.
pub struct RemoteReply {
    pub status: StatusCode,
    pub body: Value,
}

impl RemoteAgent {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("cterasdk-mcp/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET /api/v1/tools
    ///
    /// # Errors
    /// Returns error if the agent cannot be reached or answers with non-JSON.
    pub async fn list_tools(&self) -> Result<RemoteReply> {
        let response = self
            .http
            .get(self.url("/api/v1/tools"))
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to reach agent at {}", self.base_url))?;
        reply(response).await
    }

    /// POST /api/v1/run
    ///
    /// # Errors
    /// Returns error if the agent cannot be reached or answers with non-JSON.
    pub async fn run(&self, request: &RunToolRequest) -> Result<RemoteReply> {
        tracing::debug!(tool = %request.name, agent = %self.base_url, "Forwarding tool");
        let response = self
            .http
            .post(self.url("/api/v1/run"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach agent at {}", self.base_url))?;
        reply(response).await
    }
}

async fn reply(response: reqwest::Response) -> Result<RemoteReply> {
    let status = response.status();
    let body = response
        .json()
        .await
        .with_context(|| format!("Agent answered {status} with an unreadable body"))?;
    Ok(RemoteReply { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let agent = RemoteAgent::new("http://127.0.0.1:5000/", "t").unwrap();
        assert_eq!(agent.url("/api/v1/run"), "http://127.0.0.1:5000/api/v1/run");
    }
}
