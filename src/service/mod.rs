//! # Service Client
//!
//! Read/write round trips against a server plus a local subscription table
//! for variable changes and events.

pub mod client;
pub mod subscription;

pub use client::ServiceClient;
pub use subscription::{Handler, SubscriptionTable};
