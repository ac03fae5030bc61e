mod greeting;

pub use greeting::{SayHelloArgs, SayHelloTool};

use crate::mcp::errors::RegistryError;
use crate::mcp::registry::ToolRegistry;

/// Registry with every tool this server ships.
pub fn default_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(SayHelloTool)?;
    Ok(registry)
}
