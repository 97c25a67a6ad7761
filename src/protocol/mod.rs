//! # Request Protocol
//!
//! Text request/response layer carried inside the secure channel, and the
//! server-side dispatcher that executes requests against the address space.
//!
//! ## Messages
//! - `READ <nodeId>` answered by the value text
//! - `WRITE <nodeId> <newValue>` answered by `SUCCESS`
//! - `BROWSE <nodeId>` and `DETAILS <nodeId>` answered by the records in [`browse`]
//! - any failure answered by `ERROR <reason>`

pub mod browse;
pub mod dispatcher;
pub mod message;


pub use browse::{NodeDetails, VariableSummary};
pub use dispatcher::Dispatcher;
pub use message::{Request, Response};
