//! Per-variant API layout.

use ctera_mcp_core::ClientType;

/// Where a backend variant keeps its endpoints and how it authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantProfile {
    /// Path prefix of the management API.
    pub api_prefix: &'static str,
    /// Form field carrying the username on login.
    pub username_field: &'static str,
    /// Form field carrying the password on login.
    pub password_field: &'static str,
    /// Cookie holding the session id.
    pub session_cookie: &'static str,
    /// Endpoint returning the identity of the current session.
    pub whoami_path: &'static str,
    /// Whether the variant can enter global administration scope.
    pub admin_scope: bool,
}

const GLOBAL_ADMIN: VariantProfile = VariantProfile {
    api_prefix: "/admin/api",
    username_field: "j_username",
    password_field: "j_password",
    session_cookie: "JSESSIONID",
    whoami_path: "/currentSession",
    admin_scope: true,
};

const SERVICES_PORTAL: VariantProfile = VariantProfile {
    api_prefix: "/ServicesPortal/api",
    username_field: "j_username",
    password_field: "j_password",
    session_cookie: "JSESSIONID",
    whoami_path: "/currentSession",
    admin_scope: false,
};

const EDGE: VariantProfile = VariantProfile {
    api_prefix: "/admingui/api",
    username_field: "username",
    password_field: "password",
    session_cookie: "session_id",
    whoami_path: "/currentuser",
    admin_scope: false,
};

/// The one place a client type is mapped onto its backend variant.
#[must_use]
pub const fn profile(client_type: ClientType) -> &'static VariantProfile {
    match client_type {
        ClientType::Admin => &GLOBAL_ADMIN,
        ClientType::TenantPortal => &SERVICES_PORTAL,
        ClientType::Edge => &EDGE,
    }
}
