//! TCP server and client connector.
//!
//! The server accepts connections concurrently, one task per connection,
//! up to `server.max_connections`. Each connection carries a sequence of
//! request frames; every frame is decrypted, dispatched against the shared
//! address space and answered with one encrypted response frame. Waiting for
//! a request is bounded by `server.connection_timeout`, after which the
//! connection is closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::address_space::AddressSpace;
use crate::config::NetworkConfig;
use crate::core::codec::FrameCodec;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::transport::secure_channel::SecureChannel;
use crate::transport::session::SessionManager;
use crate::utils::timeout::with_timeout_error;
use crate::utils::Metrics;

/// Open a framed connection to `address`, bounded by `connect_timeout`
#[instrument(skip(connect_timeout, max_frame_size))]
pub async fn connect(
    address: &str,
    connect_timeout: Duration,
    max_frame_size: usize,
) -> Result<Framed<TcpStream, FrameCodec>> {
    let stream = with_timeout_error(
        async { TcpStream::connect(address).await.map_err(ProtocolError::from) },
        connect_timeout,
    )
    .await?;
    stream.set_nodelay(true)?;
    Ok(Framed::new(stream, FrameCodec::new(max_frame_size)))
}

/// Secure request server bound to a TCP listener
pub struct Server {
    listener: TcpListener,
    config: NetworkConfig,
    channel: Arc<SecureChannel>,
    dispatcher: Dispatcher,
    sessions: SessionManager,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Bind the listener and prepare shared state.
    ///
    /// The channel key comes from `transport.channel_key` when set, otherwise
    /// a fresh key is generated; export it with `channel().export_key()`.
    #[instrument(skip(config, space), fields(address = %config.server.address))]
    pub async fn bind(config: NetworkConfig, space: Arc<AddressSpace>) -> Result<Self> {
        config.validate_strict()?;

        let channel = match config.transport.channel_key.as_deref() {
            Some(key) => SecureChannel::from_base64_key(key)?,
            None => SecureChannel::generate()?,
        };

        let metrics = Arc::new(Metrics::new());
        let sessions = SessionManager::new(config.session.timeout).with_metrics(metrics.clone());
        let listener = TcpListener::bind(&config.server.address).await?;
        info!(address = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            dispatcher: Dispatcher::new(space, metrics.clone()),
            channel: Arc::new(channel),
            sessions,
            metrics,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn channel(&self) -> &Arc<SecureChannel> {
        &self.channel
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Serve until CTRL+C
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until a message arrives on `shutdown_rx` (or its sender is dropped)
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let max_connections = self.config.server.max_connections;
        let permits = Arc::new(Semaphore::new(max_connections));
        let sweeper = self
            .config
            .session
            .sweep_interval
            .map(|interval| self.sessions.spawn_sweeper(interval));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, draining connections");
                    if let Some(handle) = &sweeper {
                        handle.abort();
                    }
                    self.drain(&permits, max_connections).await;
                    self.metrics.log_metrics();
                    return Ok(());
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let Ok(permit) = permits.clone().try_acquire_owned() else {
                                warn!(peer = %peer, "Connection limit reached, rejecting");
                                self.metrics.connection_rejected();
                                continue;
                            };

                            self.metrics.connection_established();
                            debug!(peer = %peer, "New connection established");

                            let connection = Connection {
                                channel: self.channel.clone(),
                                dispatcher: self.dispatcher.clone(),
                                metrics: self.metrics.clone(),
                                idle_timeout: self.config.server.connection_timeout,
                                max_frame_size: self.config.transport.max_frame_size,
                            };

                            tokio::spawn(async move {
                                if let Err(e) = connection.serve(stream, peer).await {
                                    debug!(peer = %peer, error = %e, "Connection ended with error");
                                }
                                connection.metrics.connection_closed();
                                drop(permit);
                                debug!(peer = %peer, "Connection closed");
                            });
                        }
                        Err(e) => error!(error = %e, "Accept failed"),
                    }
                }
            }
        }
    }

    /// Wait until every connection has returned its permit, or the shutdown timeout passes
    async fn drain(&self, permits: &Semaphore, max_connections: usize) {
        let all = u32::try_from(max_connections).unwrap_or(u32::MAX);
        let open = max_connections - permits.available_permits();
        if open > 0 {
            debug!(open, "Waiting for connections to close");
        }
        let deadline = self.config.server.shutdown_timeout;
        match tokio::time::timeout(deadline, permits.acquire_many(all)).await {
            Ok(_) => info!("All connections closed"),
            Err(_) => {
                let open = max_connections - permits.available_permits();
                warn!(open, "Shutdown timeout reached, abandoning open connections");
            }
        }
    }
}

/// Per-connection handle on the shared server state
struct Connection {
    channel: Arc<SecureChannel>,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
    idle_timeout: Duration,
    max_frame_size: usize,
}

impl Connection {
    #[instrument(skip(self, stream, peer), fields(peer = %peer))]
    async fn serve(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut framed = Framed::new(stream, FrameCodec::new(self.max_frame_size));

        loop {
            let next = with_timeout_error(
                async { framed.next().await.transpose() },
                self.idle_timeout,
            )
            .await;

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(ProtocolError::Timeout) => {
                    debug!("Idle timeout, closing connection");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let plaintext = match self.channel.decode(&frame) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    // The peer does not hold the channel key; nothing it could read
                    self.metrics.integrity_failure();
                    warn!(error = %e, "Dropping connection after undecodable frame");
                    return Err(e);
                }
            };

            let response = self.dispatcher.dispatch_bytes(&plaintext);
            let wire = self.channel.encode(response.to_string().as_bytes())?;

            with_timeout_error(async { framed.send(wire).await }, self.idle_timeout).await?;
        }
    }
}
