pub mod dispatcher;
pub mod errors;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sse;
pub mod stdio;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use errors::{RegistryError, SessionClosed, ToolError};
pub use protocol::*;
pub use registry::{ToolHandler, ToolRegistry};
pub use session::{Session, SessionId, SessionManager};
pub use sse::{EventChannel, SseEvent, MESSAGES_PATH, SSE_PATH};
