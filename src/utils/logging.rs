//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber from [`LoggingConfig`]: plain or
//! JSON output, to the console, a file, or both. `RUST_LOG` directives take
//! precedence over the configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ProtocolError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();

    let json = config.format == LogFormat::Json;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console {
        layers.push(fmt_layer(json, true, std::io::stdout));
    }

    if let Some(path) = &config.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                ProtocolError::ConfigError(format!("cannot open log file {}: {e}", path.display()))
            })?;
        layers.push(fmt_layer(json, false, Mutex::new(file)));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install logger: {e}")))?;

    info!(app = %config.app_name, level = %config.level, "Logging initialized");
    Ok(())
}

fn fmt_layer<W>(json: bool, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}
