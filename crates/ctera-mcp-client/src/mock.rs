//! In-memory backend (feature-gated).
//!
//! Behaves like a tiny CTERA deployment: accounts, issued session tokens and
//! a tenant list, with switches for the failure modes session handling has to
//! cope with.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use ctera_mcp_core::{
    BackendError, BackendSessionId, ClientFactory, ClientType, ConnectionContext, PortalClient,
    Tenant,
};
use serde_json::{Value, json};

#[derive(Default)]
struct State {
    accounts: HashMap<String, String>,
    tenants: Vec<Tenant>,
    live: HashMap<String, String>,
    issued: u64,
    logouts: u64,
    fail_logout: bool,
    unreachable: bool,
    contexts: Vec<ConnectionContext>,
}

/// Shared in-memory backend. Clones observe the same state.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<State>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an account valid on every host and variant.
    #[must_use]
    pub fn with_account(self, username: &str, password: &str) -> Self {
        self.state()
            .accounts
            .insert(username.to_string(), password.to_string());
        self
    }

    /// Add a tenant with only a name.
    #[must_use]
    pub fn with_tenant(self, name: &str) -> Self {
        self.state().tenants.push(Tenant {
            name: name.to_string(),
            display_name: None,
            tenant_id: None,
            class_name: Some("PortalInfo".to_string()),
        });
        self
    }

    /// Make every backend logout fail.
    pub fn set_logout_failure(&self, fail: bool) {
        self.state().fail_logout = fail;
    }

    /// Make every network call fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Invalidate every issued session, as a server-side timeout would.
    pub fn expire_all(&self) {
        self.state().live.clear();
    }

    /// Number of sessions currently valid on the backend.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.state().live.len()
    }

    /// Number of successful backend logouts.
    #[must_use]
    pub fn logouts(&self) -> u64 {
        self.state().logouts
    }

    /// Every context a handle was built from, in order.
    #[must_use]
    pub fn contexts(&self) -> Vec<ConnectionContext> {
        self.state().contexts.clone()
    }

    /// Factory producing handles onto this backend.
    #[must_use]
    pub fn factory(&self) -> MockFactory {
        MockFactory {
            backend: self.clone(),
        }
    }

    fn reachable(&self) -> Result<(), BackendError> {
        if self.state().unreachable {
            Err(BackendError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// `ClientFactory` over a [`MockBackend`].
#[derive(Clone)]
pub struct MockFactory {
    backend: MockBackend,
}

impl ClientFactory for MockFactory {
    fn create(&self, ctx: &ConnectionContext) -> Result<Box<dyn PortalClient>, BackendError> {
        if ctx.host.trim().is_empty() {
            return Err(BackendError::InvalidHost(ctx.host.clone()));
        }
        self.backend.state().contexts.push(ctx.clone());
        Ok(Box::new(MockClient {
            backend: self.backend.clone(),
            ctx: ctx.clone(),
            session_id: None,
            admin_scope: false,
        }))
    }
}

struct MockClient {
    backend: MockBackend,
    ctx: ConnectionContext,
    session_id: Option<BackendSessionId>,
    admin_scope: bool,
}

impl MockClient {
    fn live_user(&self) -> Result<String, BackendError> {
        self.backend.reachable()?;
        let token = self
            .session_id
            .as_ref()
            .ok_or(BackendError::NotAuthenticated)?;
        self.backend
            .state()
            .live
            .get(token.expose())
            .cloned()
            .ok_or_else(|| BackendError::Authentication("session expired".to_string()))
    }

    fn require_admin(&self, operation: &'static str) -> Result<(), BackendError> {
        if self.ctx.client_type == ClientType::Admin {
            Ok(())
        } else {
            Err(BackendError::Unsupported {
                client_type: self.ctx.client_type,
                operation,
            })
        }
    }
}

#[async_trait]
impl PortalClient for MockClient {
    fn client_type(&self) -> ClientType {
        self.ctx.client_type
    }

    fn host(&self) -> &str {
        &self.ctx.host
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), BackendError> {
        self.backend.reachable()?;
        let mut state = self.backend.state();
        if state.accounts.get(username).map(String::as_str) != Some(password) {
            return Err(BackendError::Authentication(format!(
                "{} rejected credentials for {username}",
                self.ctx.host
            )));
        }
        state.issued += 1;
        let token = format!("mock-session-{}", state.issued);
        state.live.insert(token.clone(), username.to_string());
        drop(state);

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
        self.live_user()?;
        let mut state = self.backend.state();
        if state.fail_logout {
            return Err(BackendError::Protocol("logout refused".to_string()));
        }
        if let Some(token) = self.session_id.take() {
            state.live.remove(token.expose());
        }
        state.logouts += 1;
        Ok(())
    }

    async fn whoami(&self) -> Result<Value, BackendError> {
        let username = self.live_user()?;
        Ok(json!({
            "username": username,
            "host": self.ctx.host,
            "client_type": self.ctx.client_type,
        }))
    }

    async fn enter_admin_scope(&mut self) -> Result<(), BackendError> {
        self.require_admin("enter administration scope")?;
        self.live_user()?;
        self.admin_scope = true;
        Ok(())
    }

    async fn enumerate_tenants(&self) -> Result<Vec<Tenant>, BackendError> {
        self.require_admin("list tenants")?;
        self.live_user()?;
        if !self.admin_scope {
            return Err(BackendError::Protocol(
                "not in administration scope".to_string(),
            ));
        }
        Ok(self.backend.state().tenants.clone())
    }
}
