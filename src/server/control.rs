//! Control server
//!
//! Accepts reliable-stream connections and runs the per-peer command loop.
//! A playing peer additionally gets a heartbeat supervisor task that
//! probes the client and tears the session down when inbound heartbeats
//! go stale.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::protocol::{encode_heartbeat, encode_play_reply, Command};
use crate::registry::PeerHandle;

use super::ServerState;

type ControlWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Accept control connections until the server shuts down
pub(crate) async fn accept_loop(state: Arc<ServerState>, listener: TcpListener) {
    loop {
        let accepted = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer_addr)) => handle_connection(&state, socket, peer_addr),
            Err(e) => tracing::error!(error = %e, "failed to accept control connection"),
        }
    }
    tracing::trace!("control accept loop stopped");
}

fn handle_connection(state: &Arc<ServerState>, socket: TcpStream, peer_addr: SocketAddr) {
    let permit = match &state.admission {
        Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "connection rejected: client limit reached");
                return;
            }
        },
        None => None,
    };

    let handle = PeerHandle(state.next_handle.fetch_add(1, Ordering::Relaxed));
    tracing::info!(%handle, peer = %peer_addr, "accept");

    if state.config.tcp_nodelay {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::info!(peer = %peer_addr, error = %e, "failed to set no-delay");
        }
    }

    let state = Arc::clone(state);
    tokio::spawn(run_session(state, socket, handle, peer_addr, permit));
}

/// Per-peer command loop
///
/// Commands and their replies are strictly sequential; the write half is
/// shared with the heartbeat supervisor behind a mutex so a keep-alive
/// probe can never interleave with a partially written reply.
async fn run_session(
    state: Arc<ServerState>,
    socket: TcpStream,
    handle: PeerHandle,
    peer_addr: SocketAddr,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let (mut reader, write_half) = socket.into_split();
    let writer: ControlWriter = Arc::new(Mutex::new(write_half));
    let cancel = state.shutdown.child_token();
    let mut playing = false;

    loop {
        let raw = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read_u32_le() => match read {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::trace!(%handle, error = %e, "control read ended");
                    break;
                }
            },
        };

        match Command::from_wire(raw) {
            Some(Command::GetFormat) => {
                let result = writer.lock().await.write_all(&state.format_reply).await;
                if let Err(e) = result {
                    tracing::trace!(%handle, error = %e, "format reply failed");
                    break;
                }
            }
            Some(Command::StartPlay) => {
                let id = match state.registry.add(handle, peer_addr) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::info!(%handle, peer = %peer_addr, error = %e, "play rejected");
                        break;
                    }
                };
                playing = true;

                let reply = encode_play_reply(id);
                let result = writer.lock().await.write_all(&reply).await;
                if let Err(e) = result {
                    tracing::trace!(%handle, error = %e, "play reply failed");
                    break;
                }

                tokio::spawn(heartbeat_loop(
                    Arc::clone(&state),
                    handle,
                    Arc::clone(&writer),
                    cancel.clone(),
                    peer_addr,
                ));
            }
            Some(Command::Heartbeat) => {
                state.registry.touch(handle);
            }
            None => {
                tracing::info!(%handle, peer = %peer_addr, opcode = raw, "unknown opcode, closing session");
                break;
            }
        }
    }

    cancel.cancel();
    if playing {
        state.registry.remove(handle);
    }
    let _ = writer.lock().await.shutdown().await;
    tracing::info!(%handle, peer = %peer_addr, "session closed");
}

/// Per-peer heartbeat supervisor
///
/// Runs while the peer is playing: every interval it samples the peer's
/// liveness timestamp, tears the session down past the timeout, and
/// otherwise probes the client with a bare heartbeat frame.
async fn heartbeat_loop(
    state: Arc<ServerState>,
    handle: PeerHandle,
    writer: ControlWriter,
    cancel: CancellationToken,
    peer_addr: SocketAddr,
) {
    let interval = state.config.heartbeat_interval;
    let timeout = state.config.heartbeat_timeout;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(age) = state.registry.last_tick_age(handle) else {
            tracing::trace!(%handle, "peer gone, supervisor exiting");
            break;
        };

        if age > timeout {
            tracing::info!(%handle, peer = %peer_addr, age_ms = age.as_millis() as u64, "heartbeat timeout");
            cancel.cancel();
            break;
        }

        let probe = encode_heartbeat();
        if let Err(e) = writer.lock().await.write_all(&probe).await {
            tracing::trace!(%handle, error = %e, "heartbeat probe failed");
            cancel.cancel();
            break;
        }
    }
    tracing::trace!(%handle, "heartbeat supervisor stopped");
}
