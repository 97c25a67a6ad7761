//! Text request/response messages carried inside the secure channel.
//!
//! ```text
//! READ <nodeId>              -> <value text>     | ERROR <reason>
//! WRITE <nodeId> <newValue>  -> SUCCESS          | ERROR <reason>
//! BROWSE <nodeId>            -> reference lines  | ERROR <reason>
//! DETAILS <nodeId>           -> node record      | ERROR <reason>
//! ```
//!
//! `READ` and `WRITE` address a variable (`<node>/<variable>`); `BROWSE` and
//! `DETAILS` address a node.
//!
//! The node id of a `WRITE` ends at the first space; everything after it is
//! the new value, spaces included.

use std::fmt;

use crate::error::{constants, ProtocolError, Result};

/// Response token for a successful write
pub const SUCCESS: &str = "SUCCESS";

/// Prefix of every failure response
pub const ERROR_PREFIX: &str = "ERROR ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read { node_id: String },
    Write { node_id: String, value: String },
    Browse { node_id: String },
    Details { node_id: String },
}

impl Request {
    pub fn read(node_id: impl Into<String>) -> Self {
        Request::Read {
            node_id: node_id.into(),
        }
    }

    pub fn write(node_id: impl Into<String>, value: impl Into<String>) -> Self {
        Request::Write {
            node_id: node_id.into(),
            value: value.into(),
        }
    }

    pub fn browse(node_id: impl Into<String>) -> Self {
        Request::Browse {
            node_id: node_id.into(),
        }
    }

    pub fn details(node_id: impl Into<String>) -> Self {
        Request::Details {
            node_id: node_id.into(),
        }
    }

    /// Command word, for routing and logs
    pub fn command(&self) -> &'static str {
        match self {
            Request::Read { .. } => "READ",
            Request::Write { .. } => "WRITE",
            Request::Browse { .. } => "BROWSE",
            Request::Details { .. } => "DETAILS",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            return Err(ProtocolError::MalformedRequest(constants::ERR_EMPTY_REQUEST));
        }

        let (command, rest) = text.split_once(' ').unwrap_or((text, ""));
        match command {
            "READ" => Ok(Request::read(required_node_id(rest)?)),
            "BROWSE" => Ok(Request::browse(required_node_id(rest)?)),
            "DETAILS" => Ok(Request::details(required_node_id(rest)?)),
            "WRITE" => {
                let (node_id, value) = rest
                    .split_once(' ')
                    .ok_or(ProtocolError::MalformedRequest(constants::ERR_MISSING_VALUE))?;
                if node_id.is_empty() {
                    return Err(ProtocolError::MalformedRequest(constants::ERR_MISSING_NODE_ID));
                }
                Ok(Request::write(node_id, value))
            }
            _ => Err(ProtocolError::MalformedRequest(constants::ERR_UNKNOWN_COMMAND)),
        }
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::MalformedRequest(constants::ERR_NOT_UTF8))?;
        Self::parse(text)
    }
}

fn required_node_id(rest: &str) -> Result<&str> {
    if rest.is_empty() {
        return Err(ProtocolError::MalformedRequest(constants::ERR_MISSING_NODE_ID));
    }
    Ok(rest)
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Write { node_id, value } => write!(f, "WRITE {node_id} {value}"),
            Request::Read { node_id }
            | Request::Browse { node_id }
            | Request::Details { node_id } => write!(f, "{} {node_id}", self.command()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Value(String),
    Success,
    Error(String),
}

impl Response {
    pub fn error(err: &ProtocolError) -> Self {
        Response::Error(err.to_string())
    }

    /// Interpret the reply to a `READ`
    pub fn into_read_value(text: String) -> Result<String> {
        match text.strip_prefix(ERROR_PREFIX) {
            Some(reason) => Err(ProtocolError::Remote(reason.to_string())),
            None => Ok(text),
        }
    }

    /// Interpret the reply to a `WRITE`: only the exact success token counts
    pub fn is_write_success(text: &str) -> bool {
        text == SUCCESS
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Value(value) => f.write_str(value),
            Response::Success => f.write_str(SUCCESS),
            Response::Error(reason) => write!(f, "{ERROR_PREFIX}{reason}"),
        }
    }
}
