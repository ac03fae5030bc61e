use async_trait::async_trait;
use futures::FutureExt;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_valid::Validate;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use super::errors::{RegistryError, ToolError};
use super::protocol::{CallToolResponse, Tool};

/// Trait for tool handlers
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    /// Arguments the tool runs with. Raw input is deserialized and
    /// validated into this type before `execute` is called.
    type Args: DeserializeOwned + Validate + Send + 'static;

    /// Return the tool schema definition
    fn schema(&self) -> Tool;

    /// Execute the tool with validated arguments
    async fn execute(&self, args: Self::Args) -> Result<CallToolResponse, String>;
}

/// Object-safe face of a `ToolHandler`, fed with raw JSON.
#[async_trait]
trait RawToolHandler: Send + Sync {
    async fn call(&self, name: &str, args: Value) -> Result<CallToolResponse, ToolError>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: ToolHandler> RawToolHandler for Typed<H> {
    async fn call(&self, name: &str, args: Value) -> Result<CallToolResponse, ToolError> {
        let args = validate_arguments::<H::Args>(args).map_err(|reason| {
            ToolError::InvalidArguments {
                tool: name.to_string(),
                reason,
            }
        })?;

        self.0
            .execute(args)
            .await
            .map_err(|reason| ToolError::HandlerFault {
                tool: name.to_string(),
                reason,
            })
    }
}

/// Deserialize and validate raw tool arguments.
///
/// `null` stands for "no arguments" and is read as an empty object. The
/// error is a human-readable reason suitable for the caller.
pub fn validate_arguments<A>(raw: Value) -> Result<A, String>
where
    A: DeserializeOwned + Validate,
{
    let raw = match raw {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };

    let args: A = serde_json::from_value(raw).map_err(|e| e.to_string())?;
    args.validate().map_err(|errors| errors.to_string())?;

    Ok(args)
}

struct RegisteredTool {
    schema: Tool,
    handler: Box<dyn RawToolHandler>,
}

/// Tool registry managing all available MCP tools.
///
/// Tools are kept in registration order, which is also the order
/// `tools/list` reports them in.
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
        }
    }

    /// Register a tool handler under the name its schema declares
    pub fn register<H: ToolHandler>(&mut self, handler: H) -> Result<(), RegistryError> {
        let schema = handler.schema();
        if self.tools.contains_key(&schema.name) {
            return Err(RegistryError::DuplicateToolName(schema.name));
        }

        tracing::debug!(tool = %schema.name, "Registered tool");
        self.tools.insert(
            schema.name.clone(),
            RegisteredTool {
                schema,
                handler: Box::new(Typed(handler)),
            },
        );
        Ok(())
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }

    /// Run the named tool.
    ///
    /// Fails with `UnknownTool` or `InvalidArguments`. Whatever goes wrong
    /// inside the handler itself, an error return or a panic, comes back
    /// as an `isError` result instead.
    pub async fn invoke(
        &self,
        name: &str,
        args: Option<Value>,
    ) -> Result<CallToolResponse, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let outcome = AssertUnwindSafe(tool.handler.call(name, args.unwrap_or(Value::Null)))
            .catch_unwind()
            .await;

        let fault = match outcome {
            Ok(Err(fault @ ToolError::HandlerFault { .. })) => fault,
            Ok(result) => return result,
            Err(panic) => ToolError::HandlerFault {
                tool: name.to_string(),
                reason: panic_message(&*panic),
            },
        };

        tracing::error!("Tool execution failed: {}", fault);
        Ok(CallToolResponse::error(fault.to_string()))
    }

    /// Get count of registered tools
    pub fn count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}
