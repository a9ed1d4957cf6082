//! Line-delimited JSON-RPC over stdin/stdout.
//!
//! Stdout carries protocol messages only; logs go to stderr in this mode.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::McpServer;

/// Serve requests from process stdio until stdin closes.
pub async fn serve_stdio(server: &McpServer) -> std::io::Result<()> {
    tracing::info!("MCP server reading from stdin");
    serve_lines(
        server,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Read one message per line from `reader`, write each reply as one line.
pub async fn serve_lines<R, W>(server: &McpServer, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(reply) = server.handle_message(line) {
            let mut encoded = reply.to_string();
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    tracing::info!("MCP stdin closed");
    Ok(())
}
