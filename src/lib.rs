//! # ua-protocol
//!
//! Minimal industrial-automation protocol core: an in-memory address space,
//! a bounds-checked binary codec, an encrypted text channel, session tokens
//! and a service client with subscriptions.
//!
//! ## Layers
//! - [`address_space`]: nodes, variables, methods and references
//! - [`core`]: binary reader/writer and the frame codec
//! - [`transport`]: secure channel, session manager, TCP server
//! - [`protocol`]: `READ`/`WRITE` messages and the server dispatcher
//! - [`service`]: client round trips and the subscription table
//!
//! ## Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use ua_protocol::address_space::{AddressSpace, NodeAttributes, VariableAttributes, Variant};
//! use ua_protocol::config::NetworkConfig;
//! use ua_protocol::service::ServiceClient;
//! use ua_protocol::transport::{Server, SecureChannel};
//!
//! # async fn run() -> ua_protocol::error::Result<()> {
//! let space = AddressSpace::shared();
//! space.add_node("N1", NodeAttributes::default().with_display_name("Temperature Node"))?;
//! space.add_variable("N1", "temp", Variant::Double(25.3), VariableAttributes::default())?;
//!
//! let config = NetworkConfig::default_with_overrides(|c| {
//!     c.server.address = "127.0.0.1:4840".to_string();
//! });
//! let server = Server::bind(config.clone(), space).await?;
//! let channel = Arc::new(server.channel().peer());
//! let sessions = server.sessions().clone();
//! tokio::spawn(server.run());
//!
//! let client = ServiceClient::new(config.client, channel, sessions);
//! assert!(client.write_variable("N1/temp", "30.5").await?);
//! assert_eq!(client.read_variable("N1/temp").await?, "30.5");
//! # Ok(())
//! # }
//! ```

pub mod address_space;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use address_space::{AddressSpace, DataType, Variant};
pub use config::NetworkConfig;
pub use error::{ProtocolError, Result};
pub use service::ServiceClient;
pub use transport::{SecureChannel, Server, SessionManager};
