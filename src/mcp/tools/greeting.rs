//! Greeting tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use serde_valid::Validate;

use crate::mcp::protocol::{CallToolResponse, Tool};
use crate::mcp::registry::ToolHandler;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SayHelloArgs {
    #[validate(min_length = 1)]
    pub name: String,
}

/// Greet the user by name
pub struct SayHelloTool;

#[async_trait]
impl ToolHandler for SayHelloTool {
    type Args = SayHelloArgs;

    fn schema(&self) -> Tool {
        Tool {
            name: "say_hello".to_string(),
            description: "Greet the user by name".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Name of the user to greet"
                    }
                },
                "required": ["name"],
                "additionalProperties": false,
                "$schema": "http://json-schema.org/draft-07/schema#"
            }),
        }
    }

    async fn execute(&self, args: SayHelloArgs) -> Result<CallToolResponse, String> {
        tracing::debug!(name = %args.name, "Greeting user");
        Ok(CallToolResponse::text(format!(
            "Hi, hello {}, this is a greeting from the MCP hello service.",
            args.name
        )))
    }
}
