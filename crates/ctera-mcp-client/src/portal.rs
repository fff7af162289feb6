//! `PortalClient` over the CTERA management HTTP API.

use async_trait::async_trait;
use ctera_mcp_core::{BackendError, BackendSessionId, ClientType, PortalClient, Tenant};
use reqwest::{
    RequestBuilder, Response, StatusCode,
    header::{CONTENT_TYPE, COOKIE, HeaderMap, SET_COOKIE},
};
use serde_json::Value;

use crate::{
    variant::{VariantProfile, profile},
    xml,
};

/// Page size for tenant queries.
const TENANT_PAGE_SIZE: usize = 50;

/// Longest slice of an error body echoed back into a protocol error.
const ERROR_BODY_LIMIT: usize = 200;

/// Client handle bound to one host and one backend variant.
pub struct HttpPortalClient {
    http: reqwest::Client,
    host: String,
    base_url: String,
    client_type: ClientType,
    profile: &'static VariantProfile,
    session_id: Option<BackendSessionId>,
}

impl HttpPortalClient {
    /// Wrap a configured HTTP client. Performs no I/O.
    #[must_use]
    pub fn new(http: reqwest::Client, host: &str, client_type: ClientType) -> Self {
        let profile = profile(client_type);
        Self {
            http,
            host: host.to_string(),
            base_url: format!("{}{}", server_root(host), profile.api_prefix),
            client_type,
            profile,
            session_id: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn cookie_header(&self) -> Result<String, BackendError> {
        self.session_id
            .as_ref()
            .map(|id| format!("{}={}", self.profile.session_cookie, id.expose()))
            .ok_or(BackendError::NotAuthenticated)
    }

    /// Send a request carrying the bound session and check its status.
    async fn send(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Response, BackendError> {
        let response = request
            .header(COOKIE, self.cookie_header()?)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(BackendError::Authentication(format!(
                "{operation}: session rejected by {} ({status})",
                self.host
            )));
        }
        if !status.is_success() {
            return Err(protocol_error(operation, response).await);
        }
        Ok(response)
    }

    fn require_admin_scope(&self, operation: &'static str) -> Result<(), BackendError> {
        if self.profile.admin_scope {
            Ok(())
        } else {
            Err(BackendError::Unsupported {
                client_type: self.client_type,
                operation,
            })
        }
    }
}

#[async_trait]
impl PortalClient for HttpPortalClient {
    fn client_type(&self) -> ClientType {
        self.client_type
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), BackendError> {
        tracing::debug!(host = %self.host, client_type = %self.client_type, username, "Authenticating");

        let response = self
            .http
            .post(self.url("/login"))
            .form(&[
                (self.profile.username_field, username),
                (self.profile.password_field, password),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(BackendError::Authentication(format!(
                "{} rejected credentials for {username} ({status})",
                self.host
            )));
        }
        if !status.is_success() {
            return Err(protocol_error("login", response).await);
        }

        let cookie = self.profile.session_cookie;
        let token = extract_cookie(response.headers(), cookie).ok_or_else(|| {
            BackendError::Authentication(format!("no {cookie} cookie in login response"))
        })?;
        self.session_id = Some(BackendSessionId::new(token));
        Ok(())
    }

    fn session_id(&self) -> Option<BackendSessionId> {
        self.session_id.clone()
    }

    fn bind_session_id(&mut self, session_id: BackendSessionId) {
        self.session_id = Some(session_id);
    }

    async fn logout(&mut self) -> Result<(), BackendError> {
        self.send(self.http.post(self.url("/logout")), "logout")
            .await?;
        self.session_id = None;
        Ok(())
    }

    async fn whoami(&self) -> Result<Value, BackendError> {
        let response = self
            .send(self.http.get(self.url(self.profile.whoami_path)), "whoami")
            .await?;
        let body = response.text().await.map_err(transport_error)?;
        decode_body(&body)
    }

    async fn enter_admin_scope(&mut self) -> Result<(), BackendError> {
        self.require_admin_scope("enter administration scope")?;
        self.send(
            self.http
                .put(self.url("/currentPortal"))
                .header(CONTENT_TYPE, "application/xml")
                .body("<val></val>"),
            "enter administration scope",
        )
        .await?;
        Ok(())
    }

    async fn enumerate_tenants(&self) -> Result<Vec<Tenant>, BackendError> {
        self.require_admin_scope("list tenants")?;

        let mut tenants = Vec::new();
        let mut start_from = 0;
        loop {
            let response = self
                .send(
                    self.http
                        .post(self.url("/portals"))
                        .header(CONTENT_TYPE, "text/plain")
                        .body(tenant_query(start_from, TENANT_PAGE_SIZE)),
                    "list tenants",
                )
                .await?;
            let body = response.text().await.map_err(transport_error)?;
            let page = xml::parse_document(&body).map_err(|e| {
                BackendError::Protocol(format!("Unreadable tenant query result: {e}"))
            })?;

            let objects = page
                .get("objects")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            tenants.extend(objects.iter().filter_map(Tenant::from_object));

            let has_more = page.get("hasMore").and_then(Value::as_str) == Some("true");
            if !has_more || objects.is_empty() {
                break;
            }
            start_from += objects.len();
        }

        tracing::debug!(host = %self.host, count = tenants.len(), "Enumerated tenants");
        Ok(tenants)
    }
}

/// Scheme and authority for a host, defaulting to HTTPS.
fn server_root(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Find a cookie value among `Set-Cookie` headers.
fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let (key, value) = cookie.split(';').next()?.split_once('=')?;
            let value = value.trim();
            (key.trim() == name && !value.is_empty()).then(|| value.to_string())
        })
}

/// Body of a `db`/`query` request for one page of tenants.
fn tenant_query(start_from: usize, count_limit: usize) -> String {
    format!(
        "<obj>\
<att id=\"type\"><val>db</val></att>\
<att id=\"name\"><val>query</val></att>\
<att id=\"param\"><obj>\
<att id=\"startFrom\"><val>{start_from}</val></att>\
<att id=\"countLimit\"><val>{count_limit}</val></att>\
<att id=\"include\"><list><val>name</val><val>displayName</val><val>tenant</val></list></att>\
</obj></att>\
</obj>"
    )
}

fn decode_body(body: &str) -> Result<Value, BackendError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Value::Null);
    }
    if body.starts_with('<') {
        return xml::parse_document(body)
            .map_err(|e| BackendError::Protocol(format!("Unreadable response: {e}")));
    }
    Ok(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

fn transport_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Transport(format!("request timed out: {error}"))
    } else {
        BackendError::Transport(error.to_string())
    }
}

async fn protocol_error(operation: &str, response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = body.trim();
    let detail = if detail.is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        detail.chars().take(ERROR_BODY_LIMIT).collect()
    };
    BackendError::Protocol(format!("{operation} failed with HTTP {}: {detail}", status.as_u16()))
}
