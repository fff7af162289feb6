//! Tool catalogue and dispatcher.

use std::{fmt, str::FromStr, sync::Arc};

use ctera_mcp_core::{ClientFactory, ClientType, ErrorKind, SessionKey, SessionStore};
use ctera_mcp_session::{LoginRequest, SessionError, SessionManager};
use serde_json::{Map, Value, json};

use crate::protocol::{self, ToolDescriptor};

/// Tools exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Login,
    Logout,
    ListSessions,
    ListTenants,
}

impl ToolName {
    pub const ALL: [Self; 4] = [
        Self::Login,
        Self::Logout,
        Self::ListSessions,
        Self::ListTenants,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "cterasdk_login",
            Self::Logout => "cterasdk_logout",
            Self::ListSessions => "cterasdk_list_sessions",
            Self::ListTenants => "cterasdk_list_tenants",
        }
    }

    /// Short name used by older MCP clients.
    #[must_use]
    pub const fn legacy_name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::ListSessions => "listSessions",
            Self::ListTenants => "listTenants",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s || tool.legacy_name() == s)
            .ok_or_else(|| DispatchError::UnknownTool(s.to_string()))
    }
}

/// Request rejected before any session operation runs.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid parameter {name}: expected {expected}")]
    InvalidParameter {
        name: &'static str,
        expected: &'static str,
    },
}

impl DispatchError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::MissingParameter(_) => ErrorKind::MissingParameter,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
        }
    }
}

/// Descriptors for every tool, in listing order.
#[must_use]
pub fn tool_descriptors(default_tls_verify: bool) -> Vec<ToolDescriptor> {
    let client_types: Vec<&str> = ClientType::all().iter().map(|t| t.as_str()).collect();
    let session_key = |description: &str| {
        json!({
            "type": "object",
            "properties": {
                "session_key": { "type": "string", "description": description }
            },
            "required": ["session_key"]
        })
    };

    ToolName::ALL
        .into_iter()
        .map(|tool| match tool {
            ToolName::Login => ToolDescriptor {
                name: tool.as_str(),
                description: "Login to CTERA server",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "host": {
                            "type": "string",
                            "description": "Hostname or IP of CTERA server"
                        },
                        "username": { "type": "string", "description": "Username for login" },
                        "password": { "type": "string", "description": "Password for login" },
                        "client_type": {
                            "type": "string",
                            "enum": client_types,
                            "description": "Type of client to use",
                            "default": ClientType::Admin.as_str()
                        },
                        "tls_verify": {
                            "type": "boolean",
                            "description": "Verify TLS certificates",
                            "default": default_tls_verify
                        }
                    },
                    "required": ["host", "username", "password"]
                }),
            },
            ToolName::Logout => ToolDescriptor {
                name: tool.as_str(),
                description: "Logout from CTERA server",
                parameters: session_key("Session key to logout"),
            },
            ToolName::ListSessions => ToolDescriptor {
                name: tool.as_str(),
                description: "List all active sessions",
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolName::ListTenants => ToolDescriptor {
                name: tool.as_str(),
                description: "List all tenants in the Global Admin portal",
                parameters: session_key("Session key to use (must be a GlobalAdmin session)"),
            },
        })
        .collect()
}

/// Maps tool invocations onto the session manager.
pub struct ToolDispatcher<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    manager: Arc<SessionManager<S, F>>,
    default_tls_verify: bool,
}

impl<S, F> Clone for ToolDispatcher<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            default_tls_verify: self.default_tls_verify,
        }
    }
}

impl<S, F> ToolDispatcher<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    #[must_use]
    pub const fn new(manager: Arc<SessionManager<S, F>>) -> Self {
        Self {
            manager,
            default_tls_verify: false,
        }
    }

    /// TLS verification used when a login does not specify it.
    #[must_use]
    pub const fn with_default_tls_verify(mut self, tls_verify: bool) -> Self {
        self.default_tls_verify = tls_verify;
        self
    }

    #[must_use]
    pub const fn manager(&self) -> &Arc<SessionManager<S, F>> {
        &self.manager
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        tool_descriptors(self.default_tls_verify)
    }

    /// Run a tool and return its result envelope.
    ///
    /// Failures of the operation itself are reported inside the envelope.
    ///
    /// # Errors
    /// Returns error if the tool is unknown or a parameter is missing or
    /// malformed. The session manager is not called in that case.
    pub async fn run(
        &self,
        name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, DispatchError> {
        let tool: ToolName = name.parse()?;
        tracing::debug!(%tool, "Running tool");

        let result = match tool {
            ToolName::Login => {
                let request = self.login_request(parameters)?;
                let (host, username) = (request.host.clone(), request.username.clone());
                self.manager.login(request).await.map(|outcome| {
                    json!({
                        "session_key": outcome.session_key,
                        "session_id": outcome.session_id,
                        "message": format!("Successfully authenticated as {username} to {host}"),
                    })
                })
            }
            ToolName::Logout => {
                let session_key = session_key(parameters)?;
                self.manager
                    .logout(&session_key)
                    .await
                    .map(|()| json!({ "message": "Successfully logged out" }))
            }
            ToolName::ListSessions => self
                .manager
                .list_sessions()
                .await
                .map(|sessions| json!({ "sessions": sessions })),
            ToolName::ListTenants => {
                let session_key = session_key(parameters)?;
                self.manager
                    .list_tenants(&session_key)
                    .await
                    .map(|tenants| json!({ "tenants": tenants }))
            }
        };

        Ok(match result {
            Ok(fields) => protocol::success(fields),
            Err(error) => {
                log_failure(tool, &error);
                protocol::failure(&error, error.kind())
            }
        })
    }

    fn login_request(&self, parameters: &Map<String, Value>) -> Result<LoginRequest, DispatchError> {
        let tls_verify = match optional_bool(parameters, "tls_verify")? {
            Some(tls_verify) => tls_verify,
            None => optional_bool(parameters, "ssl_verify")?.unwrap_or(self.default_tls_verify),
        };

        Ok(LoginRequest {
            host: required_str(parameters, "host")?.to_string(),
            username: required_str(parameters, "username")?.to_string(),
            password: required_str(parameters, "password")?.to_string(),
            client_type: optional_str(parameters, "client_type")?
                .unwrap_or(ClientType::Admin.as_str())
                .to_string(),
            tls_verify,
        })
    }
}

fn log_failure(tool: ToolName, error: &SessionError) {
    match error.kind() {
        ErrorKind::TransportError | ErrorKind::BackendProtocolError | ErrorKind::StorageError => {
            tracing::error!(%tool, kind = error.kind().as_str(), %error, "Tool failed");
        }
        _ => tracing::info!(%tool, kind = error.kind().as_str(), %error, "Tool failed"),
    }
}

/// The session key, also accepted as `sessionKey`.
fn session_key(parameters: &Map<String, Value>) -> Result<SessionKey, DispatchError> {
    let key = match optional_str(parameters, "session_key")? {
        Some(key) => Some(key),
        None => optional_str(parameters, "sessionKey")?,
    };
    key.map(SessionKey::from)
        .ok_or(DispatchError::MissingParameter("session_key"))
}

/// A string parameter that must be present and non-blank.
fn required_str<'a>(
    parameters: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, DispatchError> {
    optional_str(parameters, name)?.ok_or(DispatchError::MissingParameter(name))
}

/// A string parameter; null and blank count as absent.
fn optional_str<'a>(
    parameters: &'a Map<String, Value>,
    name: &'static str,
) -> Result<Option<&'a str>, DispatchError> {
    match parameters.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(DispatchError::InvalidParameter {
            name,
            expected: "string",
        }),
    }
}

fn optional_bool(
    parameters: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<bool>, DispatchError> {
    match parameters.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(DispatchError::InvalidParameter {
            name,
            expected: "boolean",
        }),
    }
}
