//! Bidirectional relay between a plaintext stream and an obfs3 stream.
//!
//! One task owns the engine and both streams. Reads from either side are
//! fed to the engine, and whatever it produced is written out before the
//! next read.
//!
//! EOF on one side is propagated as a write shutdown on the other, and the
//! opposite direction keeps running until it sees EOF as well. Upstream EOF
//! during the handshake is held back until the queued data has gone out
//! behind the magic.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep_until, Instant};

use crate::error::{Error, Result};
use crate::protocol::{BufferedCircuit, Obfs3, ReceiveBuffer, State};

/// Read size for both directions.
const READ_CHUNK: usize = 16 * 1024;

/// Run an obfs3 connection until both sides have closed.
///
/// `upstream` carries plaintext application data, `downstream` carries the
/// obfuscated stream. If `handshake_timeout` is set and the engine has not
/// reached the open state in time, the relay fails with [`Error::Timeout`].
pub async fn relay<U, D>(
    mut engine: Obfs3,
    upstream: U,
    downstream: D,
    handshake_timeout: Option<Duration>,
) -> Result<()>
where
    U: AsyncRead + AsyncWrite + Unpin,
    D: AsyncRead + AsyncWrite + Unpin,
{
    let (mut up_reader, mut up_writer) = tokio::io::split(upstream);
    let (mut down_reader, mut down_writer) = tokio::io::split(downstream);

    let mut circuit = BufferedCircuit::new();
    let mut inbox = ReceiveBuffer::with_capacity(READ_CHUNK);
    let mut up_buf = vec![0u8; READ_CHUNK];
    let mut down_buf = vec![0u8; READ_CHUNK];

    let deadline = handshake_timeout.map(|t| Instant::now() + t);

    let mut upstream_eof = false;
    let mut downstream_eof = false;
    let mut downstream_shut = false;

    engine.circuit_connected(&mut circuit)?;
    flush(&mut circuit, &mut up_writer, &mut down_writer).await?;

    let result = loop {
        // Queued data leaves with the magic, so the write side may only
        // close once keys exist.
        if upstream_eof && !downstream_shut && engine.state() != State::AwaitingPeerKey {
            tracing::debug!(role = %engine.role(), "upstream closed, shutting down downstream");
            if let Err(e) = down_writer.shutdown().await {
                break Err(Error::Network(e));
            }
            downstream_shut = true;
        }

        if upstream_eof && downstream_eof {
            break Ok(());
        }

        tokio::select! {
            read = up_reader.read(&mut up_buf), if !upstream_eof => {
                match read {
                    Ok(0) => {
                        tracing::debug!(pending = engine.pending_len(), "upstream EOF");
                        upstream_eof = true;
                    }
                    Ok(n) => engine.received_upstream(&up_buf[..n], &mut circuit),
                    Err(e) => break Err(Error::Network(e)),
                }
            }
            read = down_reader.read(&mut down_buf), if !downstream_eof => {
                match read {
                    Ok(0) if !engine.is_open() => {
                        tracing::debug!(state = ?engine.state(), "downstream closed during handshake");
                        break Ok(());
                    }
                    Ok(0) => {
                        tracing::debug!(role = %engine.role(), "downstream closed, shutting down upstream");
                        downstream_eof = true;
                        if let Err(e) = up_writer.shutdown().await {
                            break Err(Error::Network(e));
                        }
                    }
                    Ok(n) => {
                        inbox.extend(&down_buf[..n]);
                        if let Err(e) = engine.received_downstream(&mut inbox, &mut circuit) {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(Error::Network(e)),
                }
            }
            _ = handshake_deadline(deadline), if !engine.is_open() => {
                let waited = handshake_timeout.unwrap_or_default();
                tracing::debug!(state = ?engine.state(), "handshake timed out");
                break Err(Error::Timeout(waited.as_millis() as u64));
            }
        }

        if let Err(e) = flush(&mut circuit, &mut up_writer, &mut down_writer).await {
            break Err(e);
        }
    };

    let _ = up_writer.shutdown().await;
    let _ = down_writer.shutdown().await;

    tracing::debug!(role = %engine.role(), state = ?engine.state(), "relay finished");
    result
}

async fn handshake_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn flush<U, D>(circuit: &mut BufferedCircuit, upstream: &mut U, downstream: &mut D) -> Result<()>
where
    U: AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
{
    let down = circuit.take_downstream();
    if !down.is_empty() {
        downstream.write_all(&down).await?;
        downstream.flush().await?;
    }

    let up = circuit.take_upstream();
    if !up.is_empty() {
        upstream.write_all(&up).await?;
        upstream.flush().await?;
    }

    Ok(())
}
