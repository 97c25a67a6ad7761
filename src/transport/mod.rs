//! Transport layer: the encrypted channel, session tokens and the TCP server.

pub mod secure_channel;
pub mod session;
pub mod tcp;

pub use secure_channel::SecureChannel;
pub use session::{SessionManager, SessionStats};
pub use tcp::{connect, Server};
