//! TCP proxy running obfs3 over real connections.
//!
//! ```text
//!            client mode                           server mode
//! app ──plain──> [listen | Initiator] ──obfs3──> [listen | Responder] ──plain──> target
//! ```
//!
//! Each accepted connection gets its own engine and its own task; nothing
//! is shared between connections.

pub mod config;
mod relay;

pub use config::{Mode, ProxyConfig, ProxyConfigFile};
pub use relay::relay;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::Obfs3;

/// A bound obfs3 proxy.
pub struct Proxy {
    config: Arc<ProxyConfig>,
    listener: TcpListener,
}

impl Proxy {
    /// Validate the configuration and bind the listening socket.
    pub async fn bind(config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.listen_addr).await?;

        Ok(Self {
            config: Arc::new(config),
            listener,
        })
    }

    /// Address the proxy is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            "obfs3 {:?} proxy listening on {}, relaying to {}",
            self.config.mode,
            self.local_addr()?,
            self.config.remote_addr
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let config = Arc::clone(&self.config);

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(config, stream, peer_addr).await {
                            if e.is_protocol_violation() {
                                tracing::warn!("Protocol violation from {}: {}", peer_addr, e);
                            } else {
                                tracing::debug!("Connection error from {}: {}", peer_addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        config: Arc<ProxyConfig>,
        inbound: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        tracing::debug!("Accepted connection from {}", peer_addr);
        inbound.set_nodelay(true)?;

        let outbound = timeout(config.handshake_timeout, TcpStream::connect(&config.remote_addr))
            .await
            .map_err(|_| Error::Timeout(config.handshake_timeout.as_millis() as u64))??;
        outbound.set_nodelay(true)?;

        let engine = Obfs3::with_config(config.mode.role(), config.engine)?;
        let handshake_timeout = Some(config.handshake_timeout);

        match config.mode {
            Mode::Client => relay(engine, inbound, outbound, handshake_timeout).await,
            Mode::Server => relay(engine, outbound, inbound, handshake_timeout).await,
        }
    }
}

/// Bind and run a proxy with the given configuration.
pub async fn run(config: ProxyConfig) -> Result<()> {
    Proxy::bind(config).await?.run().await
}
