//! Avatar state: value types, the state store and batch validation.

pub mod store;
pub mod types;
pub mod validation;

pub use store::{AvatarStateStore, BatchOutcome};
pub use types::{
    AvatarView, BatchAction, BatchDescriptor, BatchFrame, BatchRequest, Direction,
    ExpressionPayload, VisualState, VisualUpdate,
};
pub use validation::{check_action, validate_batch};
