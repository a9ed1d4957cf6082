//! # avatar-overlay
//!
//! State server and display client for a 2D avatar overlay.
//!
//! The server holds one current expression plus its visual placement, or a
//! timed batch of expressions, and accepts commands over HTTP and MCP tool
//! calls. Display clients poll the server and play batches locally.
//!
//! - [`state::AvatarStateStore`]: the single source of truth
//! - [`player::BatchPlayer`]: display-side batch state machine
//! - [`sync`]: polling loop and frame timer driver
//! - [`server`]: HTTP surface
//! - [`mcp`] / [`tools`]: RPC tool surface

pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod mcp;
pub mod player;
pub mod server;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod tools;

pub use catalog::{Catalog, Expression};
pub use config::Config;
pub use errors::{AvatarError, CatalogError};
pub use player::{BatchPlayer, FrameRenderer};
pub use state::{AvatarStateStore, AvatarView, BatchOutcome, BatchRequest, VisualState};

/// Crate version, reported by `/health` and MCP `initialize`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
