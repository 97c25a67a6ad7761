//! Failures surfaced by the address space, the binary codec, the secure
//! channel and the service layer, all carried by one [`ProtocolError`].
//!
//! - **Model Errors**: missing or duplicate nodes, variables, methods
//! - **Decoding Errors**: binary reads running past the end of the buffer
//! - **Transport Errors**: tampered or malformed channel payloads, timeouts
//! - **Session Errors**: token mismatch or expiry
//!
//! Session and channel failures are routine outcomes; callers at those
//! boundaries see them as `false` or as `TransportIntegrity` rather than as
//! process-level faults.
//!
//! Duplicate registration, for instance:
//! ```rust
//! use ua_protocol::address_space::{AddressSpace, NodeAttributes};
//! use ua_protocol::error::ProtocolError;
//!
//! let space = AddressSpace::new();
//! space.add_node("N1", NodeAttributes::default()).unwrap();
//! match space.add_node("N1", NodeAttributes::default()) {
//!     Err(ProtocolError::AlreadyExists(id)) => assert_eq!(id, "node N1"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Static messages for errors raised on hot paths
pub mod constants {
    /// Lock errors
    pub const ERR_ADDRESS_SPACE_LOCK: &str = "Failed to acquire address space lock";
    pub const ERR_SUBSCRIPTION_LOCK: &str = "Failed to acquire subscription table lock";
    pub const ERR_CERTIFICATE_LOCK: &str = "Failed to acquire certificate store lock";

    /// Channel errors
    pub const ERR_INVALID_BASE64: &str = "Payload is not valid base64";
    pub const ERR_SHORT_PAYLOAD: &str = "Payload shorter than the channel nonce";
    pub const ERR_TAG_MISMATCH: &str = "Authentication tag mismatch";
    pub const ERR_INVALID_KEY: &str = "Channel key must be 32 bytes";
    pub const ERR_RANDOM_SOURCE: &str = "Operating system random source unavailable";

    /// Request errors
    pub const ERR_EMPTY_REQUEST: &str = "Empty request";
    pub const ERR_UNKNOWN_COMMAND: &str = "Unknown request command";
    pub const ERR_MISSING_NODE_ID: &str = "Request is missing a node id";
    pub const ERR_MISSING_VALUE: &str = "Write request is missing a value";
    pub const ERR_NOT_UTF8: &str = "Request is not valid UTF-8";

    /// Reply errors
    pub const ERR_REPLY_FIELDS: &str = "Reply line has the wrong number of fields";
    pub const ERR_REPLY_ESCAPE: &str = "Reply contains an invalid escape";
    pub const ERR_REPLY_NODE_CLASS: &str = "Reply names an unknown node class";
    pub const ERR_REPLY_DATA_TYPE: &str = "Reply names an unknown data type";
    pub const ERR_REPLY_MISSING_NODE: &str = "Details reply has no node line";
}

/// Primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    #[error("Decode out of range: requested {requested} bytes, {remaining} remaining")]
    DecodeRange { requested: usize, remaining: usize },

    #[error("Transport integrity failure: {0}")]
    TransportIntegrity(&'static str),

    #[error("Session invalid for client {0}")]
    AuthInvalid(String),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Malformed request: {0}")]
    MalformedRequest(&'static str),

    #[error("Server error: {0}")]
    Remote(String),

    #[error("Malformed reply: {0}")]
    MalformedReply(&'static str),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Custom error: {0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
