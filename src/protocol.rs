//! Wire format of the persistent command channel.
//!
//! Inbound frames are `{"command": string, "payload": string}` JSON objects.
//! Every outbound frame uses one self-describing envelope:
//!
//! ```json
//! {"kind": "result",  "body": {"id": "..", "url": "..", "title": "..", "crawlDate": ".."}}
//! {"kind": "content", "body": {"id": "..", "encoding": "base64", "data": ".."}}
//! {"kind": "done",    "body": {"command": "search", "count": 3}}
//! {"kind": "error",   "body": {"code": "not_found", "message": "..", "command": "get-content"}}
//! ```

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::QueryError;
use crate::models::{ResourceRecord, SearchResultItem};

pub const SEARCH: &str = "search";
pub const GET_CONTENT: &str = "get-content";

/// Raw inbound frame as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default)]
    pub payload: String,
}

/// A parsed inbound command. Dispatch is exhaustive over this set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Free-text search. The channel has no URL filter.
    Search { pattern: String },
    GetContent { id: String },
    Unknown { name: String },
}

impl Command {
    /// Command name as sent by the client.
    pub fn name(&self) -> &str {
        match self {
            Self::Search { .. } => SEARCH,
            Self::GetContent { .. } => GET_CONTENT,
            Self::Unknown { name } => name,
        }
    }
}

impl From<CommandEnvelope> for Command {
    fn from(envelope: CommandEnvelope) -> Self {
        match envelope.command.as_str() {
            SEARCH => Self::Search {
                pattern: envelope.payload,
            },
            GET_CONTENT => Self::GetContent {
                id: envelope.payload,
            },
            _ => Self::Unknown {
                name: envelope.command,
            },
        }
    }
}

/// A frame received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
}

/// Inbound frame that cannot be understood. Fatal to the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed command frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Parses one inbound frame into a [`Command`].
pub fn parse_command(frame: &Inbound) -> Result<Command, ProtocolError> {
    let text = match frame {
        Inbound::Text(text) => text.as_str(),
        Inbound::Binary(bytes) => std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?,
    };
    let envelope: CommandEnvelope = serde_json::from_str(text)?;
    Ok(envelope.into())
}

/// Outbound envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ServerFrame {
    Result(SearchResultItem),
    Content(ContentBody),
    Done(DoneBody),
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBody {
    pub id: String,
    pub encoding: String,
    pub data: String,
}

impl ContentBody {
    /// Decodes `data` back into the original content bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneBody {
    pub command: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl ServerFrame {
    pub fn content(record: &ResourceRecord) -> Self {
        Self::Content(ContentBody {
            id: record.id.to_string(),
            encoding: "base64".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(record.content.as_bytes()),
        })
    }

    pub fn done(command: &str, count: u64) -> Self {
        Self::Done(DoneBody {
            command: command.to_string(),
            count,
        })
    }

    /// A failed dispatch. The session stays open.
    pub fn error(command: &str, err: &QueryError) -> Self {
        Self::Error(ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
            command: Some(command.to_string()),
        })
    }

    pub fn unknown_command(name: &str) -> Self {
        Self::Error(ErrorBody {
            code: "unknown_command".to_string(),
            message: format!("unknown command '{name}'"),
            command: Some(name.to_string()),
        })
    }

    pub fn protocol_error(err: &ProtocolError) -> Self {
        Self::Error(ErrorBody {
            code: "protocol_error".to_string(),
            message: err.to_string(),
            command: None,
        })
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
