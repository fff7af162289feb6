//! Core abstractions for CTERA session management.
//!
//! This crate provides the fundamental building blocks:
//! - `ClientType` and `ConnectionContext` - What a client handle is built from
//! - `SessionRecord` / `SessionSummary` - Stored login metadata
//! - `PortalClient`, `ClientFactory` and `SessionStore` traits
//! - `ErrorKind` - Machine-readable failure classification

pub mod context;
pub mod session;
pub mod traits;

pub use context::{ClientType, ConnectionContext, InvalidClientType};
pub use session::{BackendSessionId, SessionKey, SessionRecord, SessionSummary};
pub use traits::{
    BackendError, ClientFactory, ErrorKind, PortalClient, SessionStore, StorageError, Tenant,
};
