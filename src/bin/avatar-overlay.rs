//! avatar-overlay binary.
//!
//! Starts the HTTP state server, the MCP stdio server, or the headless
//! display client. See `avatar-overlay --help`.
//!
//! # Environment Variables
//!
//! - `AVATAR_PORT` / `PORT`: HTTP port (default: 3001)
//! - `AVATAR_CATALOG`: Expression catalog file (default: expressions.json)
//! - `AVATAR_STATIC_DIR`: Static files for the overlay page
//! - `RUST_LOG`: Tracing filter (default: "info,avatar_overlay=debug")

use avatar_overlay::cli::{self, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run(Cli::parse()).await
}
