//! Model Context Protocol server.
//!
//! Exposes the avatar tools to MCP clients over two transports: stdio lines
//! (the `mcp` subcommand) and `POST /mcp` on the HTTP server.

pub mod protocol;
pub mod server;
pub mod stdio;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
pub use server::McpServer;
pub use stdio::{serve_lines, serve_stdio};
