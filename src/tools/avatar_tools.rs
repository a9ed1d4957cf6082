//! The three avatar tools: set expression, list expressions, set batch.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::AvatarTool;
use crate::errors::AvatarError;
use crate::state::{validate_batch, AvatarStateStore, BatchOutcome, BatchRequest, VisualUpdate};

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: &Value) -> Result<T, AvatarError> {
    // Callers without arguments send null or nothing at all.
    let args = if args.is_null() {
        serde_json::json!({})
    } else {
        args.clone()
    };
    serde_json::from_value(args)
        .map_err(|e| AvatarError::InvalidArgument(format!("{} arguments: {}", tool, e)))
}

fn visual_schema() -> serde_json::Map<String, Value> {
    let schema = serde_json::json!({
        "direction": {
            "type": "string",
            "enum": ["left", "right"],
            "description": "Facing direction; left mirrors the image"
        },
        "posX": {"type": "number", "description": "Horizontal offset"},
        "posY": {"type": "number", "description": "Vertical offset"},
        "rotation": {"type": "number", "description": "Degrees, clamped to [-30, 30]"},
        "scale": {"type": "number", "description": "Scale factor, clamped to [0.1, 3.0]"}
    });
    match schema {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

// ---------------------------------------------------------------------------
// setAvatarExpression
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SetExpressionArgs {
    name: String,
    #[serde(flatten)]
    visual: VisualUpdate,
}

/// Show one expression and stop any running batch.
#[derive(Debug, Clone)]
pub struct SetExpressionTool {
    store: Arc<AvatarStateStore>,
}

impl SetExpressionTool {
    pub fn new(store: Arc<AvatarStateStore>) -> Self {
        Self { store }
    }
}

impl AvatarTool for SetExpressionTool {
    fn name(&self) -> &str {
        "setAvatarExpression"
    }

    fn description(&self) -> &str {
        "Set the avatar's expression, optionally changing direction, position, rotation and scale. Stops any running batch."
    }

    fn args_schema(&self) -> Value {
        let mut properties = visual_schema();
        properties.insert(
            "name".to_string(),
            serde_json::json!({"type": "string", "description": "Expression name from listAvatarExpressions"}),
        );
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": ["name"]
        })
    }

    fn run(&self, args: &Value) -> Result<String, AvatarError> {
        let args: SetExpressionArgs = parse_args(self.name(), args)?;
        let visual = self.store.set_expression(&args.name, &args.visual)?;
        Ok(format!(
            "Avatar expression set to '{}' (direction: {}, position: {}, {}, rotation: {}, scale: {})",
            args.name, visual.direction, visual.pos_x, visual.pos_y, visual.rotation, visual.scale
        ))
    }
}

// ---------------------------------------------------------------------------
// listAvatarExpressions
// ---------------------------------------------------------------------------

/// Describe every catalog entry, one per line.
#[derive(Debug, Clone)]
pub struct ListExpressionsTool {
    store: Arc<AvatarStateStore>,
}

impl ListExpressionsTool {
    pub fn new(store: Arc<AvatarStateStore>) -> Self {
        Self { store }
    }
}

impl AvatarTool for ListExpressionsTool {
    fn name(&self) -> &str {
        "listAvatarExpressions"
    }

    fn description(&self) -> &str {
        "List the available avatar expressions with their descriptions and use cases."
    }

    fn run(&self, _args: &Value) -> Result<String, AvatarError> {
        let lines: Vec<String> = self
            .store
            .catalog()
            .expressions()
            .iter()
            .map(|e| {
                let mut line = format!("- {}", e.name);
                if !e.description.is_empty() {
                    line.push_str(&format!(": {}", e.description));
                }
                if !e.use_cases.is_empty() {
                    line.push_str(&format!(" (use for: {})", e.use_cases));
                }
                line
            })
            .collect();
        Ok(format!("Available expressions:\n{}", lines.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// setBatchExpressions
// ---------------------------------------------------------------------------

/// Install a timed sequence of expressions.
///
/// Unlike the HTTP endpoint, the whole request is rejected if any action
/// is invalid.
#[derive(Debug, Clone)]
pub struct SetBatchTool {
    store: Arc<AvatarStateStore>,
}

impl SetBatchTool {
    pub fn new(store: Arc<AvatarStateStore>) -> Self {
        Self { store }
    }
}

impl AvatarTool for SetBatchTool {
    fn name(&self) -> &str {
        "setBatchExpressions"
    }

    fn description(&self) -> &str {
        "Play a sequence of expressions, each for a duration in milliseconds. Set loop to repeat and random to shuffle on every repeat."
    }

    fn args_schema(&self) -> Value {
        let mut action = visual_schema();
        action.insert(
            "expression".to_string(),
            serde_json::json!({"type": "string", "description": "Expression name"}),
        );
        action.insert(
            "duration".to_string(),
            serde_json::json!({"type": "integer", "minimum": 1, "description": "Milliseconds"}),
        );
        serde_json::json!({
            "type": "object",
            "properties": {
                "loop": {"type": "boolean", "description": "Repeat after the last action"},
                "random": {"type": "boolean", "description": "Shuffle the order on every repeat"},
                "actions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": action,
                        "required": ["expression", "duration"]
                    }
                }
            },
            "required": ["loop", "actions"]
        })
    }

    fn run(&self, args: &Value) -> Result<String, AvatarError> {
        let request: BatchRequest = parse_args(self.name(), args)?;
        validate_batch(self.store.catalog(), &request)?;
        let looping = request.looping;
        let random = request.random;
        let outcome = self.store.set_batch(request)?;
        Ok(match &outcome {
            BatchOutcome::Collapsed {
                expression_name, ..
            } => format!("Single expression '{}' set", expression_name),
            BatchOutcome::Installed { batch, .. } => format!(
                "Batch {} started with {} action(s) (loop: {}, random: {})",
                batch.batch_id,
                outcome.action_count(),
                looping,
                random
            ),
        })
    }
}
