//! Subscription table shared by variable and event keys.
//!
//! A key is either a variable node id or an event type string; both live in
//! one namespace, so subscribing an event named like a node id replaces that
//! variable subscription.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::address_space::Variant;
use crate::error::{constants, ProtocolError, Result};

/// Notification handler, invoked with the new value or event payload
pub type Handler = Arc<dyn Fn(&Variant) + Send + Sync + 'static>;

#[derive(Default)]
pub struct SubscriptionTable {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `key`; returns true when it replaced another
    pub fn subscribe<F>(&self, key: &str, handler: F) -> Result<bool>
    where
        F: Fn(&Variant) + Send + Sync + 'static,
    {
        let replaced = self
            .lock()?
            .insert(key.to_string(), Arc::new(handler))
            .is_some();
        debug!(key, replaced, "Subscription registered");
        Ok(replaced)
    }

    pub fn unsubscribe(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Invoke the handler for `key` with `payload`.
    ///
    /// The handler runs after the table lock is released, so it may subscribe
    /// or unsubscribe. Returns false when no handler is registered.
    pub fn notify(&self, key: &str, payload: &Variant) -> Result<bool> {
        let handler = self.lock()?.get(key).cloned();
        match handler {
            Some(handler) => {
                trace!(key, "Delivering notification");
                handler(payload);
                Ok(true)
            }
            None => {
                debug!(key, "No subscription for key, notification dropped");
                Ok(false)
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Handler>>> {
        self.handlers
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_SUBSCRIPTION_LOCK))
    }
}
