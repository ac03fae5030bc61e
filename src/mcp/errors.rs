use thiserror::Error;

/// Failures raised while registering tools. These abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a tool named '{0}' is already registered")]
    DuplicateToolName(String),
}

/// Per-request failures of a tool invocation.
///
/// The dispatcher turns every variant into a `CallToolResponse` with
/// `isError` set, so none of these ever reach the remote caller as a
/// protocol error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unsupported tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool '{tool}' failed: {reason}")]
    HandlerFault { tool: String, reason: String },
}

/// The outbound channel of a session is gone.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("session {0} is closed")]
pub struct SessionClosed(pub String);
