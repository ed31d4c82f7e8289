//! IPC schema between noshd and its clients.
//!
//! Line-delimited JSON over the daemon's Unix socket. The chat transport
//! adapter and noshctl both speak this.

use crate::clarification::{CancelReport, StatusReport};
use serde::{Deserialize, Serialize};

/// What kind of input the transport received from the user. Photo and voice
/// inputs arrive already reduced to a description by the transport layer;
/// the daemon never sees raw media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Photo,
    Voice,
    Text,
}

/// One inbound user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub kind: PayloadKind,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Message {
        user_id: i64,
        message: IncomingMessage,
    },
    Status {
        user_id: i64,
    },
    Cancel {
        user_id: i64,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Pong,
    /// Outbound text for the user, produced by the message handlers.
    Reply {
        text: String,
    },
    Status {
        report: StatusReport,
    },
    Cancel {
        report: CancelReport,
    },
    Error {
        message: String,
    },
}
