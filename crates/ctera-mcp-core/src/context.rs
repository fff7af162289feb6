//! Connection context for backend client handles.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend variant a client handle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Global administration portal.
    Admin,
    /// Tenant (services) portal.
    TenantPortal,
    /// Edge filer.
    Edge,
}

impl ClientType {
    /// Canonical tag, as used inside session keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::TenantPortal => "tenant_portal",
            Self::Edge => "edge",
        }
    }

    /// All variants, in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Admin, Self::TenantPortal, Self::Edge]
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a client-type tag matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid client type: {0}")]
pub struct InvalidClientType(pub String);

impl FromStr for ClientType {
    type Err = InvalidClientType;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "admin" | "global_admin" | "globaladmin" => Ok(Self::Admin),
            "tenant_portal" | "services_portal" | "servicesportal" | "portal" => {
                Ok(Self::TenantPortal)
            }
            "edge" => Ok(Self::Edge),
            _ => Err(InvalidClientType(input.to_string())),
        }
    }
}

/// Everything a factory needs to build an unauthenticated client handle.
///
/// TLS verification travels with the context instead of living in a
/// process-wide setting, so concurrent logins with different flags never
/// observe each other's choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionContext {
    /// Hostname or IP of the server.
    pub host: String,
    /// Backend variant.
    pub client_type: ClientType,
    /// Verify the server's TLS certificate.
    #[serde(default)]
    pub tls_verify: bool,
}

impl ConnectionContext {
    /// Create a context with certificate verification disabled.
    #[must_use]
    pub fn new(host: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            host: host.into(),
            client_type,
            tls_verify: false,
        }
    }

    /// Set whether certificates are verified.
    #[must_use]
    pub const fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }
}
