//! Tool dispatch and HTTP surface for the CTERA MCP agent.
//!
//! Provides:
//! - Wire protocol (run requests, result envelopes, tool descriptors)
//! - `ToolDispatcher` mapping tool names onto session operations
//! - HTTP router with bearer authentication (feature: http)

pub mod protocol;
pub mod tools;

#[cfg(feature = "http")]
pub mod http;

pub use protocol::{RunToolRequest, ToolDescriptor};
pub use tools::{DispatchError, ToolDispatcher, ToolName, tool_descriptors};
