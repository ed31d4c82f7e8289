//! Unix socket client for talking to noshd.

use anyhow::{Context, Result};
use nosh_common::ipc::{Request, Response};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub struct NoshClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl NoshClient {
    /// Socket discovery: explicit flag, then $NOSHD_SOCKET, then default.
    pub fn discover_socket_path(explicit_path: Option<&str>) -> String {
        if let Some(path) = explicit_path {
            return path.to_string();
        }
        if let Ok(path) = std::env::var("NOSHD_SOCKET") {
            return path;
        }
        "/run/nosh/nosh.sock".to_string()
    }

    pub async fn connect(socket_path: Option<&str>) -> Result<Self> {
        let path = Self::discover_socket_path(socket_path);

        match tokio::time::timeout(Duration::from_millis(500), UnixStream::connect(&path)).await {
            Ok(Ok(stream)) => {
                let (reader, writer) = stream.into_split();
                Ok(Self {
                    reader: BufReader::new(reader),
                    writer,
                })
            }
            Ok(Err(e)) => Err(anyhow::anyhow!(
                "Daemon unavailable at {}: {}. Is noshd running?",
                path,
                e
            )),
            Err(_) => Err(anyhow::anyhow!("Connection timeout at {}", path)),
        }
    }

    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        let mut payload = serde_json::to_string(request)?;
        payload.push('\n');
        self.writer
            .write_all(payload.as_bytes())
            .await
            .context("Failed to send request")?;

        let mut line = String::new();
        let bytes = self
            .reader
            .read_line(&mut line)
            .await
            .context("Failed to read response")?;
        if bytes == 0 {
            anyhow::bail!("Daemon closed the connection");
        }

        serde_json::from_str(&line).context("Invalid response from daemon")
    }
}
