//! Session manager for CTERA logins.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use ctera_mcp_core::{
    BackendError, BackendSessionId, ClientFactory, ClientType, ConnectionContext, ErrorKind,
    InvalidClientType, PortalClient, SessionKey, SessionRecord, SessionStore, SessionSummary,
    StorageError, Tenant,
};
use serde::Serialize;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidClientType(#[from] InvalidClientType),
    #[error("Session not found: {0}")]
    SessionNotFound(SessionKey),
    #[error(
        "Tenant listing is only supported with GlobalAdmin sessions (session {session_key} is {client_type})"
    )]
    UnsupportedClientType {
        session_key: SessionKey,
        client_type: ClientType,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Machine-readable classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidClientType(_) => ErrorKind::InvalidClientType,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::UnsupportedClientType { .. } => ErrorKind::UnsupportedClientType,
            Self::Backend(e) => e.kind(),
            Self::Storage(_) => ErrorKind::StorageError,
        }
    }
}

/// What happens to a stored session when the backend refuses to log it out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogoutPolicy {
    /// Keep the record so the caller can retry the logout.
    #[default]
    KeepOnFailure,
    /// Drop the record regardless of the backend outcome.
    EvictOnFailure,
}

/// Credentials and target for a login.
#[derive(Clone)]
pub struct LoginRequest {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Client-type tag, parsed during login.
    pub client_type: String,
    pub tls_verify: bool,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("client_type", &self.client_type)
            .field("tls_verify", &self.tls_verify)
            .finish()
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub session_key: SessionKey,
    pub session_id: BackendSessionId,
}

/// Session manager for CTERA logins.
///
/// Owns the session store and the client factory. Every operation builds its
/// own client handle; handles are never cached or shared between calls.
/// Credentials are used once during login and never stored.
pub struct SessionManager<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    store: S,
    factory: F,
    logout_policy: LogoutPolicy,
}

impl<S, F> SessionManager<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(store: S, factory: F) -> Self {
        Self {
            store,
            factory,
            logout_policy: LogoutPolicy::default(),
        }
    }

    /// Set the policy applied when a backend logout fails.
    #[must_use]
    pub const fn with_logout_policy(mut self, policy: LogoutPolicy) -> Self {
        self.logout_policy = policy;
        self
    }

    /// Authenticate against the backend and store the resulting session.
    ///
    /// The backend session is left open for reuse by later calls.
    ///
    /// # Errors
    /// Returns error if the client type is unknown or authentication fails.
    /// Nothing is stored on failure.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, SessionError> {
        let client_type: ClientType = request.client_type.parse()?;
        let host = request.host.trim();
        let username = request.username.trim();

        let ctx = ConnectionContext::new(host, client_type).with_tls_verify(request.tls_verify);
        let mut client = self.factory.create(&ctx)?;

        if let Err(error) = client.authenticate(username, &request.password).await {
            tracing::warn!(host, username, %client_type, %error, "Login failed");
            return Err(error.into());
        }

        let session_id = client.session_id().ok_or_else(|| {
            BackendError::Authentication("backend issued no session identifier".to_string())
        })?;

        let session_key = SessionKey::derive(host, client_type, username);
        let record = SessionRecord {
            host: host.to_string(),
            username: username.to_string(),
            client_type,
            tls_verify: request.tls_verify,
            backend_session_id: session_id.clone(),
            created_at: now(),
        };
        self.store.upsert(session_key.clone(), record).await?;

        tracing::info!(%session_key, "Logged in");
        Ok(LoginOutcome {
            session_key,
            session_id,
        })
    }

    /// Log a stored session out of the backend and forget it.
    ///
    /// When the backend logout fails the record is kept or dropped according
    /// to the manager's [`LogoutPolicy`].
    ///
    /// # Errors
    /// Returns error if the key is unknown or the backend logout fails.
    pub async fn logout(&self, session_key: &SessionKey) -> Result<(), SessionError> {
        let record = self.record(session_key).await?;

        let result = match self.rehydrate(&record) {
            Ok(mut client) => client.logout().await,
            Err(error) => Err(error),
        };

        // A login under the same key may have replaced the record meanwhile.
        let session_id = &record.backend_session_id;
        match result {
            Ok(()) => {
                let removed = self.store.remove_if(session_key, session_id).await?;
                tracing::info!(%session_key, removed, "Logged out");
                Ok(())
            }
            Err(error) => {
                let evicted = self.logout_policy == LogoutPolicy::EvictOnFailure
                    && self.store.remove_if(session_key, session_id).await?;
                tracing::warn!(%session_key, evicted, %error, "Backend logout failed");
                Err(error.into())
            }
        }
    }

    /// Rebuild a live handle for a stored session.
    ///
    /// Returns `None` if the key is unknown, the handle cannot be built, or
    /// the session fails its liveness check. Never modifies the store, so a
    /// dead session stays listed until it is logged out.
    pub async fn restore(&self, session_key: &SessionKey) -> Option<Box<dyn PortalClient>> {
        let record = match self.store.get(session_key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(%session_key, %error, "Could not read session");
                return None;
            }
        };

        let client = match self.rehydrate(&record) {
            Ok(client) => client,
            Err(error) => {
                tracing::warn!(%session_key, %error, "Could not rebuild client");
                return None;
            }
        };

        match client.whoami().await {
            Ok(_) => Some(client),
            Err(error) => {
                tracing::debug!(%session_key, %error, "Session failed liveness check");
                None
            }
        }
    }

    /// List every tenant visible to a stored global administration session.
    ///
    /// # Errors
    /// Returns error if the key is unknown, the session is not a global
    /// administration session, or the backend call fails.
    pub async fn list_tenants(&self, session_key: &SessionKey) -> Result<Vec<Tenant>, SessionError> {
        let record = self.record(session_key).await?;
        if record.client_type != ClientType::Admin {
            return Err(SessionError::UnsupportedClientType {
                session_key: session_key.clone(),
                client_type: record.client_type,
            });
        }

        let mut client = self.rehydrate(&record)?;
        client.enter_admin_scope().await?;
        let tenants = client.enumerate_tenants().await?;

        tracing::info!(%session_key, count = tenants.len(), "Listed tenants");
        Ok(tenants)
    }

    /// Snapshot of stored sessions, newest first.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let mut sessions: Vec<SessionSummary> = self
            .store
            .snapshot()
            .await?
            .iter()
            .map(|(key, record)| record.summary(key))
            .collect();

        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.session_key.cmp(&b.session_key))
        });
        Ok(sessions)
    }

    /// Summary of one stored session.
    ///
    /// # Errors
    /// Returns error if the key is unknown or the store cannot be read.
    pub async fn session_summary(
        &self,
        session_key: &SessionKey,
    ) -> Result<SessionSummary, SessionError> {
        Ok(self.record(session_key).await?.summary(session_key))
    }

    /// Number of stored sessions.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn session_count(&self) -> Result<usize, SessionError> {
        Ok(self.store.len().await?)
    }

    async fn record(&self, session_key: &SessionKey) -> Result<SessionRecord, SessionError> {
        self.store
            .get(session_key)
            .await?
            .ok_or_else(|| SessionError::SessionNotFound(session_key.clone()))
    }

    fn rehydrate(&self, record: &SessionRecord) -> Result<Box<dyn PortalClient>, BackendError> {
        let ctx = ConnectionContext::new(record.host.clone(), record.client_type)
            .with_tls_verify(record.tls_verify);
        let mut client = self.factory.create(&ctx)?;
        client.bind_session_id(record.backend_session_id.clone());
        Ok(client)
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use ctera_mcp_client::{MockBackend, MockFactory};
    use serde_json::Value;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    fn backend() -> MockBackend {
        MockBackend::new()
            .with_account("alice", "pw")
            .with_account("bob", "secret")
            .with_tenant("acme")
            .with_tenant("globex")
    }

    fn manager(backend: &MockBackend) -> SessionManager<MemoryStore, MockFactory> {
        SessionManager::new(MemoryStore::new(), backend.factory())
    }

    fn request(host: &str, username: &str, password: &str, client_type: &str) -> LoginRequest {
        LoginRequest {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client_type: client_type.to_string(),
            tls_verify: false,
        }
    }

    #[tokio::test]
    async fn test_login_stores_one_record() {
        let backend = backend();
        let manager = manager(&backend);

        let outcome = manager
            .login(request("h1", "alice", "pw", "admin"))
            .await
            .unwrap();
        assert_eq!(outcome.session_key.as_str(), "h1:admin:alice");

        let sessions = manager.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_key, outcome.session_key);
        assert_eq!(sessions[0].username, "alice");
        assert_eq!(sessions[0].client_type, ClientType::Admin);
        assert_eq!(backend.live_sessions(), 1);
    }

    #[tokio::test]
    async fn test_login_accepts_legacy_tag() {
        let backend = backend();
        let manager = manager(&backend);

        let outcome = manager
            .login(request("h1", "bob", "secret", "services_portal"))
            .await
            .unwrap();
        assert_eq!(outcome.session_key.as_str(), "h1:tenant_portal:bob");
    }

    #[tokio::test]
    async fn test_login_invalid_client_type_leaves_store_untouched() {
        let backend = backend();
        let manager = manager(&backend);

        let err = assert_err!(manager.login(request("h1", "alice", "pw", "root")).await);
        assert_eq!(err.kind(), ErrorKind::InvalidClientType);
        assert!(manager.list_sessions().await.unwrap().is_empty());
        assert!(backend.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_login_bad_credentials_stores_nothing() {
        let backend = backend();
        let manager = manager(&backend);

        let err = assert_err!(manager.login(request("h1", "alice", "wrong", "admin")).await);
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
        assert_eq!(manager.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_login_unreachable_backend() {
        let backend = backend();
        backend.set_unreachable(true);
        let manager = manager(&backend);

        let err = assert_err!(manager.login(request("h1", "alice", "pw", "edge")).await);
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert_eq!(manager.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_relogin_overwrites_same_key() {
        let backend = backend();
        let manager = manager(&backend);

        let first = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();
        let second = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        assert_eq!(first.session_key, second.session_key);
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(manager.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_logout_unknown_key() {
        let backend = backend();
        let manager = manager(&backend);
        manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        let err = assert_err!(manager.logout(&SessionKey::from("h9:admin:nobody")).await);
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
        assert_eq!(manager.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_logout_evicts_on_success() {
        let backend = backend();
        let manager = manager(&backend);
        let alice = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();
        manager.login(request("h1", "bob", "secret", "edge")).await.unwrap();

        assert_ok!(manager.logout(&alice.session_key).await);

        let sessions = manager.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions.iter().all(|s| s.session_key != alice.session_key));
        assert_eq!(backend.logouts(), 1);
    }

    #[tokio::test]
    async fn test_logout_failure_keeps_record_by_default() {
        let backend = backend();
        let manager = manager(&backend);
        let alice = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        backend.set_logout_failure(true);
        let err = assert_err!(manager.logout(&alice.session_key).await);
        assert_eq!(err.kind(), ErrorKind::BackendProtocolError);
        assert_eq!(manager.session_count().await.unwrap(), 1);

        backend.set_logout_failure(false);
        assert_ok!(manager.logout(&alice.session_key).await);
        assert_eq!(manager.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logout_failure_evicts_when_configured() {
        let backend = backend();
        let manager = manager(&backend).with_logout_policy(LogoutPolicy::EvictOnFailure);
        let alice = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        backend.expire_all();
        assert_err!(manager.logout(&alice.session_key).await);
        assert_eq!(manager.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_live_session() {
        let backend = backend();
        let manager = manager(&backend);
        let alice = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        let client = manager.restore(&alice.session_key).await.unwrap();
        assert_eq!(client.client_type(), ClientType::Admin);
        assert_eq!(client.whoami().await.unwrap()["username"], "alice");

        // idempotent
        assert!(manager.restore(&alice.session_key).await.is_some());
    }

    #[tokio::test]
    async fn test_restore_dead_session_does_not_evict() {
        let backend = backend();
        let manager = manager(&backend);
        let alice = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        backend.expire_all();
        assert!(manager.restore(&alice.session_key).await.is_none());
        assert!(manager.restore(&SessionKey::from("missing")).await.is_none());
        assert_eq!(manager.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_tenants_admin_session() {
        let backend = backend();
        let manager = manager(&backend);
        let alice = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        let tenants = manager.list_tenants(&alice.session_key).await.unwrap();
        let names: Vec<&str> = tenants.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["acme", "globex"]);
    }

    #[tokio::test]
    async fn test_list_tenants_rejects_non_admin_sessions() {
        let backend = backend();
        let manager = manager(&backend);

        for client_type in [ClientType::TenantPortal, ClientType::Edge] {
            let outcome = manager
                .login(request("h1", "bob", "secret", client_type.as_str()))
                .await
                .unwrap();

            let err = assert_err!(manager.list_tenants(&outcome.session_key).await);
            assert_eq!(err.kind(), ErrorKind::UnsupportedClientType);
            assert!(err.to_string().contains("only supported with GlobalAdmin"));
        }
        assert_eq!(manager.session_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_tenants_unknown_key() {
        let backend = backend();
        let manager = manager(&backend);

        let err = assert_err!(manager.list_tenants(&SessionKey::from("h1:admin:ghost")).await);
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    }

    #[tokio::test]
    async fn test_list_tenants_expired_session() {
        let backend = backend();
        let manager = manager(&backend);
        let alice = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();

        backend.expire_all();
        let err = assert_err!(manager.list_tenants(&alice.session_key).await);
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
        assert_eq!(manager.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_sessions_is_stable() {
        let backend = backend();
        let manager = manager(&backend);
        manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();
        manager.login(request("h2", "bob", "secret", "edge")).await.unwrap();
        manager.login(request("h1", "bob", "secret", "tenant_portal")).await.unwrap();

        let first = manager.list_sessions().await.unwrap();
        let second = manager.list_sessions().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn test_tls_flag_follows_the_session() {
        let backend = backend();
        let manager = manager(&backend);

        let mut secure = request("h1", "alice", "pw", "admin");
        secure.tls_verify = true;
        let alice = manager.login(secure).await.unwrap();
        manager.login(request("h2", "bob", "secret", "edge")).await.unwrap();
        manager.logout(&alice.session_key).await.unwrap();

        let contexts = backend.contexts();
        assert_eq!(contexts.len(), 3);
        assert!(contexts[0].tls_verify);
        assert!(!contexts[1].tls_verify);
        assert!(contexts[2].tls_verify);
        assert_eq!(contexts[2].host, "h1");
    }

    /// Wraps mock handles so that `logout` parks until released.
    struct GatedFactory {
        inner: MockFactory,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    struct GatedClient {
        inner: Box<dyn PortalClient>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl ClientFactory for GatedFactory {
        fn create(&self, ctx: &ConnectionContext) -> Result<Box<dyn PortalClient>, BackendError> {
            Ok(Box::new(GatedClient {
                inner: self.inner.create(ctx)?,
                entered: Arc::clone(&self.entered),
                release: Arc::clone(&self.release),
            }))
        }
    }

    #[async_trait]
    impl PortalClient for GatedClient {
        fn client_type(&self) -> ClientType {
            self.inner.client_type()
        }

        fn host(&self) -> &str {
            self.inner.host()
        }

        async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), BackendError> {
            self.inner.authenticate(username, password).await
        }

        fn session_id(&self) -> Option<BackendSessionId> {
            self.inner.session_id()
        }

        fn bind_session_id(&mut self, session_id: BackendSessionId) {
            self.inner.bind_session_id(session_id);
        }

        async fn logout(&mut self) -> Result<(), BackendError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.logout().await
        }

        async fn whoami(&self) -> Result<Value, BackendError> {
            self.inner.whoami().await
        }

        async fn enter_admin_scope(&mut self) -> Result<(), BackendError> {
            self.inner.enter_admin_scope().await
        }

        async fn enumerate_tenants(&self) -> Result<Vec<Tenant>, BackendError> {
            self.inner.enumerate_tenants().await
        }
    }

    #[tokio::test]
    async fn test_logout_keeps_newer_login_under_same_key() {
        let backend = backend();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let factory = GatedFactory {
            inner: backend.factory(),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        };
        let manager = Arc::new(SessionManager::new(MemoryStore::new(), factory));

        let first = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();
        let logout = tokio::spawn({
            let manager = Arc::clone(&manager);
            let key = first.session_key.clone();
            async move { manager.logout(&key).await }
        });

        entered.notified().await;
        let second = manager.login(request("h1", "alice", "pw", "admin")).await.unwrap();
        assert_eq!(first.session_key, second.session_key);
        release.notify_one();
        assert_ok!(logout.await.unwrap());

        let sessions = manager.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        let restored = manager.restore(&second.session_key).await.unwrap();
        assert_eq!(restored.session_id(), Some(second.session_id));
    }

    #[tokio::test]
    async fn test_session_summary() {
        let backend = backend();
        let manager = manager(&backend);
        let alice = manager.login(request("h1", "alice", "pw", "edge")).await.unwrap();

        let summary = manager.session_summary(&alice.session_key).await.unwrap();
        assert_eq!(summary.session_key, alice.session_key);
        assert_eq!(summary.client_type, ClientType::Edge);

        let err = assert_err!(manager.session_summary(&SessionKey::from("h1:edge:bob")).await);
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logins() {
        let mut backend = MockBackend::new();
        for i in 0..16 {
            backend = backend.with_account(&format!("user{i}"), "pw");
        }
        let manager = Arc::new(manager(&backend));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    manager
                        .login(request("h1", &format!("user{i}"), "pw", "admin"))
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }
        assert_eq!(manager.session_count().await.unwrap(), 16);
    }

    #[test]
    fn test_login_request_debug_hides_password() {
        let debug = format!("{:?}", request("h1", "alice", "hunter2", "admin"));
        assert!(!debug.contains("hunter2"));
    }
}
