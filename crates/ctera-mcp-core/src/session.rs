//! Stored login metadata.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

use crate::ClientType;

/// Caller-facing handle for one stored login.
///
/// Derived from `host:client_type:username`, so a second login with the same
/// triple replaces the first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Derive the key for a login.
    #[must_use]
    pub fn derive(host: &str, client_type: ClientType, username: &str) -> Self {
        Self(format!("{host}:{client_type}:{username}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for SessionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token issued by the backend after authentication.
///
/// Re-binding it onto a fresh handle resumes the session without resending
/// credentials. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendSessionId(String);

impl BackendSessionId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw token value, for putting on the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BackendSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackendSessionId(***)")
    }
}

/// Persisted session data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Server the session lives on.
    pub host: String,
    /// Authenticated user.
    pub username: String,
    /// Backend variant.
    pub client_type: ClientType,
    /// Certificate verification used at login, replayed on every rebuild.
    pub tls_verify: bool,
    /// Token bound onto reconstructed handles.
    pub backend_session_id: BackendSessionId,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
}

impl SessionRecord {
    /// Project to the caller-visible summary.
    #[must_use]
    pub fn summary(&self, session_key: &SessionKey) -> SessionSummary {
        SessionSummary {
            session_key: session_key.clone(),
            host: self.host.clone(),
            username: self.username.clone(),
            client_type: self.client_type,
            created_at: self.created_at,
        }
    }
}

/// What `list_sessions` exposes. Omits the backend session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_key: SessionKey,
    pub host: String,
    pub username: String,
    pub client_type: ClientType,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation() {
        let key = SessionKey::derive("h1", ClientType::Admin, "alice");
        assert_eq!(key.as_str(), "h1:admin:alice");

        let key = SessionKey::derive("10.0.0.5", ClientType::TenantPortal, "bob");
        assert_eq!(key.to_string(), "10.0.0.5:tenant_portal:bob");
    }

    #[test]
    fn test_backend_session_id_is_redacted() {
        let id = BackendSessionId::new("secret-cookie");
        assert_eq!(format!("{id:?}"), "BackendSessionId(***)");
        assert_eq!(id.expose(), "secret-cookie");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"secret-cookie\"");
    }

    #[test]
    fn test_summary_omits_session_id() {
        let record = SessionRecord {
            host: "h1".to_string(),
            username: "alice".to_string(),
            client_type: ClientType::Admin,
            tls_verify: false,
            backend_session_id: BackendSessionId::new("abc"),
            created_at: 42,
        };
        let key = SessionKey::derive("h1", ClientType::Admin, "alice");
        let json = serde_json::to_value(record.summary(&key)).unwrap();

        assert_eq!(json["session_key"], "h1:admin:alice");
        assert_eq!(json["client_type"], "admin");
        assert!(json.get("backend_session_id").is_none());
    }
}
