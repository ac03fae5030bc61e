//! Single-stream transport: newline-delimited JSON-RPC over a byte stream.
//!
//! There is exactly one implicit session, alive until the reader hits EOF.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::dispatcher::Dispatcher;
use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Serve requests read from `reader`, writing responses to `writer`, until
/// the reader is exhausted.
pub async fn serve<R, W>(dispatcher: &Dispatcher, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => dispatcher.handle(request).await,
            Err(e) => {
                tracing::error!("[MCP] Failed to parse JSON-RPC request: {}", e);
                Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()))
            }
        };

        if let Some(response) = response {
            let mut frame = serde_json::to_vec(&response)?;
            frame.push(b'\n');
            writer.write_all(&frame).await?;
            writer.flush().await?;
        }
    }

    tracing::info!("Input stream closed, stdio session ended");
    Ok(())
}

/// Serve the process's own stdin/stdout.
pub async fn serve_stdio(dispatcher: &Dispatcher) -> std::io::Result<()> {
    serve(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
}
