//! Remote-callable avatar tools.
//!
//! Each tool takes JSON arguments and answers with a short line of text.
//! Failures are text too: [`ToolRegistry::call`] never returns an error to
//! the transport.

pub mod avatar_tools;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::AvatarError;
use crate::state::AvatarStateStore;

pub use avatar_tools::{ListExpressionsTool, SetBatchTool, SetExpressionTool};

/// A named operation exposed over the tool-call boundary.
pub trait AvatarTool: Send + Sync + fmt::Debug {
    /// The unique name callers use to invoke the tool.
    fn name(&self) -> &str;

    /// Description shown to the caller when listing tools.
    fn description(&self) -> &str;

    /// JSON schema for the arguments that the tool accepts.
    fn args_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Run the tool and return its confirmation text.
    fn run(&self, args: &Value) -> Result<String, AvatarError>;
}

/// Listing entry for `tools/list`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tools by name, in registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn AvatarTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three avatar tools bound to `store`.
    pub fn with_avatar_tools(store: Arc<AvatarStateStore>) -> Self {
        let mut registry = Self::new();
        registry.register(SetExpressionTool::new(Arc::clone(&store)));
        registry.register(ListExpressionsTool::new(Arc::clone(&store)));
        registry.register(SetBatchTool::new(store));
        registry
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: impl AvatarTool + 'static) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Box::new(tool));
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.args_schema(),
            })
            .collect()
    }

    /// Invoke `name` with `args`, folding every failure into the reply text.
    pub fn call(&self, name: &str, args: &Value) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            return format!(
                "Error: unknown tool '{}'. Available tools: {}",
                name,
                self.names().join(", ")
            );
        };
        match tool.run(args) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool call failed");
                error_text(&e)
            }
        }
    }
}

/// Render an error as tool reply text.
pub fn error_text(err: &AvatarError) -> String {
    match err.available_expressions() {
        Some(available) => format!(
            "Error: {}. Available expressions: {}",
            err,
            available.join(", ")
        ),
        None => format!("Error: {}", err),
    }
}
