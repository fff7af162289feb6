//! CTERA management API clients.
//!
//! Provides:
//! - `HttpClientFactory` - Builds handles for every backend variant
//! - `HttpPortalClient` - `PortalClient` over the CTERA HTTP API
//! - CTERA object XML decoding
//! - `MockBackend` - In-memory backend (feature: mock)

pub mod factory;
pub mod portal;
pub mod variant;
pub mod xml;

#[cfg(feature = "mock")]
pub mod mock;

pub use factory::HttpClientFactory;
pub use portal::HttpPortalClient;
pub use variant::{VariantProfile, profile};

#[cfg(feature = "mock")]
pub use mock::{MockBackend, MockFactory};
