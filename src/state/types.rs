//! Value types shared by the store, the player and the wire surfaces.
//!
//! Wire field names are camelCase. `VisualState` is always held clamped;
//! every constructor and merge goes through [`VisualState::clamped`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::Expression;
use crate::errors::AvatarError;

pub const ROTATION_MIN: f64 = -30.0;
pub const ROTATION_MAX: f64 = 30.0;
pub const SCALE_MIN: f64 = 0.1;
pub const SCALE_MAX: f64 = 3.0;

/// Clamp a rotation in degrees to the supported range. NaN becomes 0.
pub fn clamp_rotation(degrees: f64) -> f64 {
    if degrees.is_nan() {
        return 0.0;
    }
    degrees.clamp(ROTATION_MIN, ROTATION_MAX)
}

/// Clamp a scale factor to the supported range. NaN becomes 1.
pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(SCALE_MIN, SCALE_MAX)
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way the avatar faces. `Left` mirrors the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Right,
    Left,
}

impl Direction {
    pub fn value(&self) -> &'static str {
        match self {
            Direction::Right => "right",
            Direction::Left => "left",
        }
    }

    pub fn is_mirrored(&self) -> bool {
        matches!(self, Direction::Left)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for Direction {
    type Err = AvatarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "right" => Ok(Direction::Right),
            "left" => Ok(Direction::Left),
            other => Err(AvatarError::InvalidArgument(format!(
                "direction must be 'right' or 'left', got '{}'",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// VisualState / VisualUpdate
// ---------------------------------------------------------------------------

/// Positioning and orientation layered over the displayed expression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualState {
    pub direction: Direction,
    pub pos_x: f64,
    pub pos_y: f64,
    pub rotation: f64,
    pub scale: f64,
}

impl Default for VisualState {
    fn default() -> Self {
        Self {
            direction: Direction::Right,
            pos_x: 0.0,
            pos_y: 0.0,
            rotation: 0.0,
            scale: 1.0,
        }
    }
}

impl VisualState {
    /// Re-apply the rotation and scale ranges.
    pub fn clamped(self) -> Self {
        Self {
            rotation: clamp_rotation(self.rotation),
            scale: clamp_scale(self.scale),
            ..self
        }
    }
}

/// A partial `VisualState`: every field optional.
///
/// Used both for `setExpression` (merge over the current state) and for the
/// optional fields of a batch action (merge over the defaults).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl VisualUpdate {
    /// Overlay the supplied fields on `base`; unsupplied fields keep `base`'s values.
    pub fn merge_into(&self, base: &VisualState) -> VisualState {
        VisualState {
            direction: self.direction.unwrap_or(base.direction),
            pos_x: self.pos_x.unwrap_or(base.pos_x),
            pos_y: self.pos_y.unwrap_or(base.pos_y),
            rotation: self.rotation.unwrap_or(base.rotation),
            scale: self.scale.unwrap_or(base.scale),
        }
        .clamped()
    }

    /// Unsupplied fields take the `VisualState` defaults.
    pub fn normalized(&self) -> VisualState {
        self.merge_into(&VisualState::default())
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// One requested frame of a batch, as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAction {
    #[serde(alias = "expression")]
    pub expression_name: String,
    #[serde(alias = "duration", deserialize_with = "lenient_duration")]
    pub duration_ms: i64,
    #[serde(flatten)]
    pub visual: VisualUpdate,
}

/// Accepts integers, floats (truncated) and numeric strings. Anything else
/// maps to 0 so the action fails the duration rule instead of the whole
/// request failing to parse.
fn lenient_duration<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &raw {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    };
    Ok(parsed.unwrap_or(0))
}

impl BatchAction {
    pub fn new(expression_name: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            expression_name: expression_name.into(),
            duration_ms,
            visual: VisualUpdate::default(),
        }
    }

    /// Normalize into a stored frame. Callers validate the duration first.
    pub fn to_frame(&self) -> BatchFrame {
        BatchFrame {
            expression_name: self.expression_name.clone(),
            duration_ms: self.duration_ms.max(0) as u64,
            visual: self.visual.normalized(),
        }
    }
}

/// "Set batch" command payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(rename = "loop", default)]
    pub looping: bool,
    #[serde(default)]
    pub random: bool,
    pub actions: Vec<BatchAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl BatchRequest {
    pub fn new(actions: Vec<BatchAction>, looping: bool) -> Self {
        Self {
            looping,
            random: false,
            actions,
            batch_id: None,
        }
    }

    pub fn with_random(mut self, random: bool) -> Self {
        self.random = random;
        self
    }
}

/// A normalized, validated frame of an installed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFrame {
    pub expression_name: String,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub visual: VisualState,
}

/// An installed batch. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDescriptor {
    #[serde(rename = "loop")]
    pub looping: bool,
    #[serde(default)]
    pub random: bool,
    pub actions: Vec<BatchFrame>,
    pub batch_id: String,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read-only snapshot of the store.
///
/// When a batch is active, `expression_name`/`visual` hold the batch's first
/// frame as installed; advancing through frames is the player's job.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarView {
    pub expression_name: String,
    pub visual: VisualState,
    pub catalog_entry: Option<Expression>,
    pub batch: Option<Arc<BatchDescriptor>>,
}

impl AvatarView {
    /// Wire shape for `GET /currentExpression`; `None` when the expression
    /// does not resolve in the catalog.
    pub fn to_payload(&self) -> Option<ExpressionPayload> {
        let expression = self.catalog_entry.clone()?;
        Some(ExpressionPayload {
            expression,
            visual: self.visual,
            batch: self.batch.as_deref().cloned(),
        })
    }
}

/// Flat JSON body of `GET /currentExpression`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionPayload {
    #[serde(flatten)]
    pub expression: Expression,
    #[serde(flatten)]
    pub visual: VisualState,
    #[serde(
        rename = "batchExpressions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub batch: Option<BatchDescriptor>,
}

impl ExpressionPayload {
    pub fn into_view(self) -> AvatarView {
        AvatarView {
            expression_name: self.expression.name.clone(),
            visual: self.visual.clamped(),
            catalog_entry: Some(self.expression),
            batch: self.batch.map(Arc::new),
        }
    }
}
