//! Runtime counters shared by the server, its connections and service clients.
//!
//! All counters are relaxed atomics; a [`MetricsSnapshot`] is a plain copy
//! taken at one moment and is what tests and logs look at.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),+ $(,)?) => {
        #[derive(Debug)]
        pub struct Metrics {
            $($(#[$doc])* $name: AtomicU64,)+
            started: Instant,
        }

        /// Counter values copied out of [`Metrics`]
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct MetricsSnapshot {
            $($(#[$doc])* pub $name: u64,)+
            pub uptime_seconds: u64,
        }

        impl Metrics {
            pub fn new() -> Self {
                Self {
                    $($name: AtomicU64::new(0),)+
                    started: Instant::now(),
                }
            }

            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)+
                    uptime_seconds: self.started.elapsed().as_secs(),
                }
            }

            /// Emit every counter as one `info` event
            pub fn log_metrics(&self) {
                let s = self.snapshot();
                info!($($name = s.$name,)+ uptime_seconds = s.uptime_seconds, "Server metrics");
            }
        }
    };
}

counters! {
    /// Connections accepted
    connections_total,
    connections_active,
    /// Connections dropped on accept because the limit was reached
    connections_rejected,
    /// Requests handled by the dispatcher
    requests_total,
    reads,
    writes,
    /// Browse and details requests
    browses,
    /// Requests answered with `ERROR`, or round trips that failed client-side
    request_failures,
    /// Frames that failed to authenticate or decode
    integrity_failures,
    sessions_created,
    sessions_expired,
    /// Notifications that reached a handler
    notifications_delivered,
    /// Notifications for keys nobody subscribed to
    notifications_dropped,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Metrics {
    pub fn connection_established(&self) {
        bump(&self.connections_total);
        bump(&self.connections_active);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        bump(&self.connections_rejected);
    }

    pub fn read_request(&self) {
        bump(&self.requests_total);
        bump(&self.reads);
    }

    pub fn write_request(&self) {
        bump(&self.requests_total);
        bump(&self.writes);
    }

    pub fn browse_request(&self) {
        bump(&self.requests_total);
        bump(&self.browses);
    }

    pub fn request_failed(&self) {
        bump(&self.request_failures);
    }

    pub fn integrity_failure(&self) {
        bump(&self.integrity_failures);
    }

    pub fn session_created(&self) {
        bump(&self.sessions_created);
    }

    pub fn sessions_expired(&self, count: u64) {
        self.sessions_expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn notification(&self, delivered: bool) {
        if delivered {
            bump(&self.notifications_delivered);
        } else {
            bump(&self.notifications_dropped);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs how long a request took when dropped
pub struct Timer {
    label: &'static str,
    since: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            since: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.since.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let micros = u64::try_from(self.elapsed().as_micros()).unwrap_or(u64::MAX);
        debug!(request = self.label, micros, "Request handled");
    }
}
