//! # Configuration
//!
//! One [`NetworkConfig`] drives the server, the service client, session
//! lifetimes, channel framing and logging. Every section has defaults, so a
//! TOML file only lists the keys it changes:
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:4840"
//! connection_timeout = 5000      # milliseconds
//!
//! [session]
//! timeout = 3600000
//! sweep_interval = 60000         # omit to disable the sweeper
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! `UA_PROTOCOL_*` environment variables are applied by [`NetworkConfig::from_env`].
//! Durations are always written in milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{ProtocolError, Result};
use crate::transport::secure_channel::SecureChannel;
use crate::utils::timeout::{DEFAULT_TIMEOUT, SHUTDOWN_TIMEOUT};

/// Default OPC-style TCP port
pub const DEFAULT_PORT: u16 = 4840;

/// Default listen address: all interfaces on the default port
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:4840";

/// Default session lifetime in seconds
pub const SESSION_TIMEOUT_SECS: u64 = 3600;

/// Max allowed frame size on the wire (1 MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const ENV_PREFIX: &str = "UA_PROTOCOL_";

const MIN_NETWORK_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_NETWORK_TIMEOUT: Duration = Duration::from_secs(300);
const MIN_FRAME_SIZE: usize = 1024;
const MAX_FRAME_SIZE_LIMIT: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub session: SessionConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| config_error(format!("invalid TOML: {e}")))
    }

    /// Defaults with `UA_PROTOCOL_*` overrides; values that do not parse are ignored
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(address) = var("SERVER_ADDRESS") {
            self.server.address = address;
        }
        if let Some(address) = var("CLIENT_ADDRESS") {
            self.client.address = address;
        }
        if let Some(ms) = var("CONNECTION_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            let timeout = Duration::from_millis(ms);
            self.server.connection_timeout = timeout;
            self.client.connection_timeout = timeout;
        }
        if let Some(secs) = var("SESSION_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.session.timeout = Duration::from_secs(secs);
        }
        if let Some(key) = var("CHANNEL_KEY") {
            self.transport.channel_key = Some(key);
        }
    }

    pub fn default_with_overrides(mutator: impl FnOnce(&mut Self)) -> Self {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| config_error(format!("cannot render TOML: {e}")))
    }

    /// The default configuration rendered as TOML, as a starting point for a file
    pub fn example_config() -> Result<String> {
        Self::default().to_toml()
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?)
            .map_err(|e| config_error(format!("cannot write {}: {e}", path.display())))
    }

    /// Every problem found, one message each; empty when the config is usable
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        problems.extend(self.server.validate());
        problems.extend(self.client.validate());
        problems.extend(self.session.validate());
        problems.extend(self.transport.validate());
        problems.extend(self.logging.validate());
        problems
    }

    /// [`validate`](Self::validate) folded into one `ConfigError`
    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        Err(config_error(format!(
            "{} configuration problem(s): {}",
            problems.len(),
            problems.join("; ")
        )))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:4840"
    pub address: String,

    /// Idle time allowed while waiting for the next request on a connection
    #[serde(with = "millis")]
    pub connection_timeout: Duration,

    /// Time given to open connections to finish on shutdown
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,

    /// Connections served at once; further connections are dropped on accept
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            connection_timeout: DEFAULT_TIMEOUT,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.address.is_empty() {
            problems.push("server.address is empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!(
                "server.address is not a valid socket address: '{}'",
                self.address
            ));
        }

        check_duration(
            &mut problems,
            "server.connection_timeout",
            self.connection_timeout,
            MIN_NETWORK_TIMEOUT,
            Some(MAX_NETWORK_TIMEOUT),
        );
        check_duration(
            &mut problems,
            "server.shutdown_timeout",
            self.shutdown_timeout,
            Duration::from_secs(1),
            Some(Duration::from_secs(60)),
        );

        match self.max_connections {
            0 => problems.push("server.max_connections must be at least 1".to_string()),
            n if n > 100_000 => {
                problems.push(format!("server.max_connections unusually high: {n}"))
            }
            _ => {}
        }

        problems
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server endpoint the client connects to
    pub address: String,

    #[serde(with = "millis")]
    pub connection_timeout: Duration,

    /// Bound on one request/response round trip
    #[serde(with = "millis")]
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{DEFAULT_PORT}"),
            connection_timeout: DEFAULT_TIMEOUT,
            response_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        // Endpoints may be host names, so only emptiness is checked
        if self.address.is_empty() {
            problems.push("client.address is empty".to_string());
        }
        check_duration(
            &mut problems,
            "client.connection_timeout",
            self.connection_timeout,
            MIN_NETWORK_TIMEOUT,
            Some(MAX_NETWORK_TIMEOUT),
        );
        check_duration(
            &mut problems,
            "client.response_timeout",
            self.response_timeout,
            MIN_NETWORK_TIMEOUT,
            Some(MAX_NETWORK_TIMEOUT),
        );

        problems
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a session measured from creation
    #[serde(with = "millis")]
    pub timeout: Duration,

    /// Period of the background purge of expired sessions; disabled when absent
    #[serde(with = "millis::option")]
    pub sweep_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(SESSION_TIMEOUT_SECS),
            sweep_interval: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        check_duration(
            &mut problems,
            "session.timeout",
            self.timeout,
            Duration::from_millis(1),
            None,
        );
        if let Some(interval) = self.sweep_interval {
            check_duration(
                &mut problems,
                "session.sweep_interval",
                interval,
                MIN_NETWORK_TIMEOUT,
                None,
            );
        }
        problems
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Longest accepted frame in bytes, delimiter excluded
    pub max_frame_size: usize,

    /// Pre-shared channel key (base64 of 32 bytes); generated at startup when absent
    pub channel_key: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            channel_key: None,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.max_frame_size < MIN_FRAME_SIZE {
            problems.push(format!(
                "transport.max_frame_size too small: {} bytes (minimum: {MIN_FRAME_SIZE})",
                self.max_frame_size
            ));
        } else if self.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            problems.push(format!(
                "transport.max_frame_size too large: {} bytes (maximum: {MAX_FRAME_SIZE_LIMIT})",
                self.max_frame_size
            ));
        }

        if let Some(key) = &self.channel_key {
            if let Err(e) = SecureChannel::from_base64_key(key) {
                problems.push(format!("transport.channel_key rejected: {e}"));
            }
        }

        problems
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: String,

    /// Default level; `RUST_LOG` directives take precedence
    #[serde(with = "level_name")]
    pub level: Level,

    pub format: LogFormat,

    /// Write to stdout
    pub console: bool,

    /// Append to this file as well (no colours)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: "ua-protocol".to_string(),
            level: Level::INFO,
            format: LogFormat::Plain,
            console: true,
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.app_name.is_empty() {
            problems.push("logging.app_name is empty".to_string());
        } else if self.app_name.chars().count() > 64 {
            problems.push("logging.app_name longer than 64 characters".to_string());
        }

        if let Some(dir) = self.file.as_deref().and_then(Path::parent) {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                problems.push(format!(
                    "logging.file directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        if !self.console && self.file.is_none() {
            problems.push("logging has no output enabled (console or file)".to_string());
        }

        problems
    }
}

fn config_error(message: String) -> ProtocolError {
    ProtocolError::ConfigError(message)
}

fn check_duration(
    problems: &mut Vec<String>,
    name: &str,
    value: Duration,
    min: Duration,
    max: Option<Duration>,
) {
    if value < min {
        problems.push(format!(
            "{name} too short: {}ms (minimum: {}ms)",
            value.as_millis(),
            min.as_millis()
        ));
    } else if let Some(max) = max.filter(|max| value > *max) {
        problems.push(format!(
            "{name} too long: {}ms (maximum: {}ms)",
            value.as_millis(),
            max.as_millis()
        ));
    }
}

/// `Duration` as integer milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(value.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

/// `tracing::Level` as a lowercase name
mod level_name {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        level.to_string().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse()
            .map_err(|_| D::Error::custom(format!("unknown log level '{name}'")))
    }
}
