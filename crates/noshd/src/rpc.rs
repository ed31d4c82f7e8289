//! Unix-socket RPC server: line-delimited JSON requests and responses.
//!
//! The chat transport adapter and noshctl both connect here. One task per
//! connection; requests on a connection are handled in order.

use crate::handlers::Handlers;
use anyhow::Result;
use nosh_common::ipc::{Request, Response};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error};

pub async fn serve(listener: UnixListener, handlers: Arc<Handlers>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handlers = handlers.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, handlers).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => error!("Accept error: {}", e),
        }
    }
}

async fn handle_connection(stream: UnixStream, handlers: Arc<Handlers>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(request, &handlers).await,
            Err(e) => Response::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }
}

async fn dispatch(request: Request, handlers: &Handlers) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Message { user_id, message } => {
            debug!("Message from user {} ({:?})", user_id, message.kind);
            let text = handlers.handle_incoming(user_id, &message).await;
            Response::Reply { text }
        }
        Request::Status { user_id } => Response::Status {
            report: handlers.handle_status(user_id).await,
        },
        Request::Cancel { user_id } => match handlers.handle_cancel(user_id).await {
            Ok(report) => Response::Cancel { report },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
    }
}
