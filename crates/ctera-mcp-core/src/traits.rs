//! Core traits for backend clients and session storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{BackendSessionId, ClientType, ConnectionContext, SessionKey, SessionRecord};

/// Machine-readable failure classification carried in result envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidClientType,
    SessionNotFound,
    UnsupportedClientType,
    AuthenticationFailure,
    BackendProtocolError,
    TransportError,
    MissingParameter,
    InvalidParameter,
    UnknownTool,
    StorageError,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidClientType => "invalid_client_type",
            Self::SessionNotFound => "session_not_found",
            Self::UnsupportedClientType => "unsupported_client_type",
            Self::AuthenticationFailure => "authentication_failure",
            Self::BackendProtocolError => "backend_protocol_error",
            Self::TransportError => "transport_error",
            Self::MissingParameter => "missing_parameter",
            Self::InvalidParameter => "invalid_parameter",
            Self::UnknownTool => "unknown_tool",
            Self::StorageError => "storage_error",
        }
    }
}

/// A tenant as listed by the global administration portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub name: String,
    pub display_name: Option<String>,
    pub tenant_id: Option<String>,
    pub class_name: Option<String>,
}

impl Tenant {
    /// Project a decoded backend object onto a tenant.
    ///
    /// Only `name` is required; every other attribute becomes `None` when
    /// the object lacks it or carries a non-string value.
    #[must_use]
    pub fn from_object(object: &Value) -> Option<Self> {
        let field = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(ToString::to_string)
        };

        Some(Self {
            name: field("name")?,
            display_name: field("displayName"),
            tenant_id: field("tenant"),
            class_name: field("_classname"),
        })
    }
}

/// Backend error.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("CTERA error: {0}")]
    Protocol(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{operation} is not supported by {client_type} clients")]
    Unsupported {
        client_type: ClientType,
        operation: &'static str,
    },
    #[error("Client has no bound session")]
    NotAuthenticated,
    #[error("Invalid host: {0:?}")]
    InvalidHost(String),
}

impl BackendError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) | Self::NotAuthenticated => ErrorKind::AuthenticationFailure,
            Self::Protocol(_) => ErrorKind::BackendProtocolError,
            Self::Transport(_) | Self::InvalidHost(_) => ErrorKind::TransportError,
            Self::Unsupported { .. } => ErrorKind::UnsupportedClientType,
        }
    }
}

/// A live handle bound to one backend variant on one host.
///
/// Handles are exclusively owned: every operation that needs one builds a
/// fresh handle through a [`ClientFactory`] and drops it afterwards.
#[async_trait]
pub trait PortalClient: Send + Sync {
    /// Variant this handle talks to.
    fn client_type(&self) -> ClientType;

    /// Server this handle talks to.
    fn host(&self) -> &str;

    /// Authenticate with credentials, capturing the issued session id.
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), BackendError>;

    /// Session id issued by the last successful authentication or bind.
    fn session_id(&self) -> Option<BackendSessionId>;

    /// Attach an existing session id to this handle.
    fn bind_session_id(&mut self, session_id: BackendSessionId);

    /// Invalidate the bound session on the server.
    async fn logout(&mut self) -> Result<(), BackendError>;

    /// Identity of the bound session. Doubles as a liveness check.
    async fn whoami(&self) -> Result<Value, BackendError>;

    /// Switch the handle into global administration scope.
    async fn enter_admin_scope(&mut self) -> Result<(), BackendError>;

    /// Enumerate every tenant visible in administration scope.
    async fn enumerate_tenants(&self) -> Result<Vec<Tenant>, BackendError>;
}

/// Builds unauthenticated client handles. Performs no network I/O.
pub trait ClientFactory: Send + Sync {
    /// Create a handle for the given context.
    ///
    /// # Errors
    /// Returns error if the context cannot produce a usable handle.
    fn create(&self, ctx: &ConnectionContext) -> Result<Box<dyn PortalClient>, BackendError>;
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for session storage backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the record stored under `key`.
    async fn upsert(&self, key: SessionKey, record: SessionRecord) -> Result<(), StorageError>;

    /// Get a record by key.
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StorageError>;

    /// Remove a record, returning it if it was present.
    async fn remove(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StorageError>;

    /// Remove the record under `key` only if it still holds `session_id`.
    ///
    /// Returns whether a record was removed. A newer login stored under the
    /// same key is left in place.
    async fn remove_if(
        &self,
        key: &SessionKey,
        session_id: &BackendSessionId,
    ) -> Result<bool, StorageError>;

    /// Consistent copy of every stored entry.
    async fn snapshot(&self) -> Result<Vec<(SessionKey, SessionRecord)>, StorageError>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize, StorageError>;
}
