//! Banking tools: descriptors, backend clients, and the executor.
//!
//! The executor owns a static name → handler mapping; handlers call the internal finance,
//! user, and retrieval services with fixed timeouts and map failures into the structured
//! [`ToolError`] taxonomy the orchestrator feeds back to the model.

pub mod backends;
pub mod descriptors;
pub mod executor;

pub use backends::BackendClients;
pub use descriptors::descriptor_for;
pub use executor::{ExecutedToolCall, ToolDispatch, ToolExecutor};

use thiserror::Error;

/// Structured tool-execution failures.
///
/// Every variant is fed back into the model as a tool-result error; none of them aborts
/// the request.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The backend call exceeded its deadline.
    #[error("timeout")]
    Timeout,
    /// The backend answered with an error status.
    #[error("backend error ({status}): {detail}")]
    Backend { status: u16, detail: String },
    /// The backend could not be reached at all.
    #[error("backend unreachable: {0}")]
    Connection(String),
    /// No handler is registered under this name (distinct from denial).
    #[error("unknown tool")]
    UnknownTool,
    /// The model supplied unusable arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The principal is not permitted to invoke this tool.  Produced by the
    /// orchestrator's per-call check, never by the executor.
    #[error("permission denied")]
    Denied,
}
