//! Server lifecycle
//!
//! [`AudioServer`] owns the three client-facing surfaces: the TCP control
//! server, the UDP datagram server on the same address, and the WebSocket
//! server on an adjacent port. All network tasks run on one
//! current-thread runtime driven by a dedicated OS thread; the capture
//! collaborator feeds the [`Broadcaster`] from its own thread.

pub mod config;
mod control;
mod datagram;

pub use config::ServerConfig;

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::Bytes;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{AudioSink, Broadcaster};
use crate::buffer::BufferPool;
use crate::capture::AudioSource;
use crate::error::{Error, Result};
use crate::protocol::{encode_format_reply, MAX_AUDIO_FORMAT_SIZE, MAX_UDP_PAYLOAD};
use crate::registry::PeerRegistry;
use crate::ws::WsServer;

/// State shared by the network tasks
///
/// Tasks hold a cheap `Arc` clone; the registry and sockets live behind it
/// for the runtime's lifetime.
pub(crate) struct ServerState {
    pub config: ServerConfig,
    pub registry: Arc<PeerRegistry>,

    /// Prebuilt `GET_FORMAT` reply; the descriptor never changes while the
    /// server runs
    pub format_reply: Bytes,

    pub udp: Arc<UdpSocket>,
    pub shutdown: CancellationToken,
    pub admission: Option<Arc<Semaphore>>,
    pub next_handle: AtomicU64,
}

struct Running {
    shutdown: CancellationToken,
    thread: Option<thread::JoinHandle<()>>,
    broadcaster: Arc<Broadcaster>,
    control_addr: SocketAddr,
    websocket_addr: SocketAddr,
}

/// Multi-protocol audio broadcast server
pub struct AudioServer {
    config: ServerConfig,
    source: Arc<dyn AudioSource>,
    inner: Mutex<Option<Running>>,
}

impl AudioServer {
    /// Create a server that streams `source`
    pub fn new(config: ServerConfig, source: Arc<dyn AudioSource>) -> Self {
        Self {
            config,
            source,
            inner: Mutex::new(None),
        }
    }

    /// Bind all listeners, start the network thread, and start capture
    ///
    /// Bind failures and oversized format descriptors are the only
    /// recoverable startup errors; everything after this point is handled
    /// at the task boundary where it arises.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let descriptor = self.source.format_descriptor();
        if descriptor.len() > MAX_AUDIO_FORMAT_SIZE {
            return Err(Error::FormatTooLarge {
                size: descriptor.len(),
                limit: MAX_AUDIO_FORMAT_SIZE,
            });
        }
        let format = self.source.format();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let shutdown = CancellationToken::new();

        let bind_addr = self.config.bind_addr;
        let (control_listener, udp, ws_listener, control_addr, websocket_addr) =
            runtime.block_on(async {
                let control_listener = TcpListener::bind(bind_addr).await?;
                let control_addr = control_listener.local_addr()?;
                let udp = UdpSocket::bind(control_addr).await?;
                let websocket_addr = self.config.ws_addr(control_addr);
                let ws_listener = TcpListener::bind(websocket_addr).await?;
                Ok::<_, std::io::Error>((
                    control_listener,
                    udp,
                    ws_listener,
                    control_addr,
                    websocket_addr,
                ))
            })?;

        let udp = Arc::new(udp);
        let registry = Arc::new(PeerRegistry::new());

        let state = Arc::new(ServerState {
            config: self.config.clone(),
            registry: Arc::clone(&registry),
            format_reply: encode_format_reply(&descriptor),
            udp: Arc::clone(&udp),
            shutdown: shutdown.clone(),
            admission: (self.config.max_clients > 0)
                .then(|| Arc::new(Semaphore::new(self.config.max_clients))),
            next_handle: AtomicU64::new(1),
        });

        let pool = BufferPool::new(
            MAX_UDP_PAYLOAD,
            self.config.pool_initial_buffers,
            self.config.pool_max_retained,
        );
        let broadcaster = Arc::new(Broadcaster::new(
            pool,
            registry,
            udp,
            runtime.handle().clone(),
            shutdown.clone(),
        ));

        let ws = Arc::new(WsServer::new(
            &format,
            self.config.ws_heartbeat_interval,
            self.config.ws_heartbeat_timeout,
            shutdown.child_token(),
        ));
        broadcaster.add_sink(Arc::clone(&ws) as Arc<dyn AudioSink>);

        runtime.spawn(control::accept_loop(Arc::clone(&state), control_listener));
        runtime.spawn(datagram::registration_loop(Arc::clone(&state)));
        runtime.spawn(Arc::clone(&ws).run(ws_listener));

        tracing::info!(addr = %control_addr, "control and datagram servers listening");
        tracing::info!(addr = %websocket_addr, "websocket server listening");

        if let Err(e) = self.source.start(Arc::clone(&broadcaster)) {
            shutdown.cancel();
            drop(runtime);
            return Err(e);
        }

        let thread_shutdown = shutdown.clone();
        let thread = match thread::Builder::new()
            .name("audioshare-net".into())
            .spawn(move || {
                runtime.block_on(thread_shutdown.cancelled());
                // Dropping the runtime aborts in-flight awaits; every task
                // treats the abort as normal termination.
                drop(runtime);
                tracing::trace!("network runtime stopped");
            }) {
            Ok(thread) => thread,
            Err(e) => {
                self.source.stop();
                shutdown.cancel();
                return Err(e.into());
            }
        };

        *inner = Some(Running {
            shutdown,
            thread: Some(thread),
            broadcaster,
            control_addr,
            websocket_addr,
        });

        tracing::info!("server started");
        Ok(())
    }

    /// Stop capture, cancel all network tasks, and join the network thread
    pub fn stop(&self) {
        let running = self.inner.lock().unwrap().take();
        let Some(mut running) = running else {
            tracing::warn!("stop called while not running");
            return;
        };

        self.source.stop();
        running.shutdown.cancel();
        if let Some(thread) = running.thread.take() {
            let _ = thread.join();
        }
        tracing::info!("server stopped");
    }

    /// Block until the server is stopped
    pub fn wait(&self) {
        let thread = {
            let mut inner = self.inner.lock().unwrap();
            inner.as_mut().and_then(|running| running.thread.take())
        };
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }

    /// Whether the server is running
    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }

    /// Fan-out entry point for the capture collaborator
    ///
    /// Present while the server runs.
    pub fn broadcaster(&self) -> Option<Arc<Broadcaster>> {
        let inner = self.inner.lock().unwrap();
        inner.as_ref().map(|running| Arc::clone(&running.broadcaster))
    }

    /// Bound control/datagram address, present while the server runs
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().unwrap().as_ref().map(|r| r.control_addr)
    }

    /// Bound WebSocket address, present while the server runs
    pub fn websocket_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().unwrap().as_ref().map(|r| r.websocket_addr)
    }
}

impl Drop for AudioServer {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AudioFormat, SampleEncoding};

    struct StubSource {
        format: AudioFormat,
        descriptor: Bytes,
    }

    impl StubSource {
        fn new() -> Self {
            let format = AudioFormat {
                encoding: SampleEncoding::S16,
                channels: 2,
                sample_rate: 48000,
            };
            Self {
                descriptor: format.encode(),
                format,
            }
        }
    }

    impl AudioSource for StubSource {
        fn format(&self) -> AudioFormat {
            self.format
        }

        fn format_descriptor(&self) -> Bytes {
            self.descriptor.clone()
        }

        fn start(&self, _broadcaster: Arc<Broadcaster>) -> Result<()> {
            Ok(())
        }

        fn stop(&self) {}
    }

    fn localhost_config() -> ServerConfig {
        ServerConfig::with_addr("127.0.0.1:0".parse().unwrap())
    }

    /// Binding an ephemeral control port also claims the same UDP port and
    /// the adjacent WebSocket port, so a neighbor collision is possible;
    /// retry with a fresh ephemeral port.
    fn start_server(server: &AudioServer) {
        for _ in 0..4 {
            match server.start() {
                Ok(()) => return,
                Err(Error::Io(_)) => continue,
                Err(e) => panic!("unexpected start error: {e}"),
            }
        }
        server.start().unwrap();
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let server = AudioServer::new(localhost_config(), Arc::new(StubSource::new()));

        assert!(!server.is_running());
        start_server(&server);
        assert!(server.is_running());
        assert!(server.control_addr().is_some());
        assert!(server.broadcaster().is_some());

        server.stop();
        assert!(!server.is_running());
        assert!(server.broadcaster().is_none());
    }

    #[test]
    fn test_double_start_rejected() {
        let server = AudioServer::new(localhost_config(), Arc::new(StubSource::new()));

        start_server(&server);
        assert!(matches!(server.start(), Err(Error::AlreadyRunning)));
        server.stop();
    }

    #[test]
    fn test_restart_after_stop() {
        let server = AudioServer::new(localhost_config(), Arc::new(StubSource::new()));

        start_server(&server);
        server.stop();
        start_server(&server);
        assert!(server.is_running());
        server.stop();
    }

    #[test]
    fn test_oversized_descriptor_rejected() {
        struct HugeSource(StubSource);

        impl AudioSource for HugeSource {
            fn format(&self) -> AudioFormat {
                self.0.format
            }

            fn format_descriptor(&self) -> Bytes {
                Bytes::from(vec![0u8; MAX_AUDIO_FORMAT_SIZE + 1])
            }

            fn start(&self, _broadcaster: Arc<Broadcaster>) -> Result<()> {
                Ok(())
            }

            fn stop(&self) {}
        }

        let server = AudioServer::new(
            localhost_config(),
            Arc::new(HugeSource(StubSource::new())),
        );
        assert!(matches!(
            server.start(),
            Err(Error::FormatTooLarge { .. })
        ));
    }

    #[test]
    fn test_websocket_port_adjacent_by_default() {
        let server = AudioServer::new(localhost_config(), Arc::new(StubSource::new()));
        start_server(&server);

        let control = server.control_addr().unwrap();
        let ws = server.websocket_addr().unwrap();
        assert_eq!(ws.port(), control.port().wrapping_add(1));

        server.stop();
    }
}
