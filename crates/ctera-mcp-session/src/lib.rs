//! Session lifecycle management and storage for CTERA logins.
//!
//! Provides:
//! - `SessionManager` - Login, logout, restore and tenant listing
//! - Storage implementations (memory)

pub mod manager;
pub mod storage;

pub use manager::{LoginOutcome, LoginRequest, LogoutPolicy, SessionError, SessionManager};
