//! TCP listener for the phonebook service.
//!
//! One accept loop, one thread per accepted connection. The accept loop
//! never waits for a session. Shutdown is cooperative: a stop flag plus a
//! loopback connection that wakes the blocked `accept`. Sessions already
//! running are not cancelled; they end on their own disconnect or I/O error.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::dispatch::ConflictPolicy;
use crate::error::{PhonebookError, Result};
use crate::metrics::Metrics;
use crate::protocol::DEFAULT_PORT;
use crate::session::{ClientId, ClientSession, SessionContext};
use crate::store::ContactStore;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for the phonebook server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host or IP to bind
    pub host: String,
    pub port: u16,
    /// Close new connections while this many sessions are active
    pub max_connections: Option<usize>,
    pub conflict_policy: ConflictPolicy,
    /// Collect request metrics
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: None,
            conflict_policy: ConflictPolicy::default(),
            metrics: false,
        }
    }
}

impl ServerConfig {
    /// Resolve `host:port` to the first matching socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                PhonebookError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("no address for host '{}'", self.host),
                ))
            })
    }
}

/// Stops a running [`Server`] from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Ask the accept loop to return. Idempotent.
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(addr = %self.wake_addr, "Waking accept loop for shutdown");
        // The connection only unblocks accept(); failure means the loop is already gone
        let _ = TcpStream::connect(self.wake_addr);
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Holds a connection slot; released when the session thread finishes.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    ctx: SessionContext,
    stop: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    next_client_id: AtomicUsize,
}

impl Server {
    /// Bind the listening socket. The store must be ready before this call.
    pub fn bind(config: ServerConfig, store: Arc<dyn ContactStore>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()?)?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Listening");

        let metrics = config.metrics.then(|| Arc::new(Metrics::new()));
        let ctx = SessionContext {
            store,
            conflict_policy: config.conflict_policy,
            metrics,
        };

        Ok(Self {
            listener,
            local_addr,
            config,
            ctx,
            stop: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            next_client_id: AtomicUsize::new(1),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> Option<Arc<Metrics>> {
        self.ctx.metrics.clone()
    }

    /// Number of sessions currently running
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            wake_addr: wake_addr(self.local_addr),
        }
    }

    /// Accept connections until shut down.
    pub fn run(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => self.spawn_session(stream),
                Err(e) => accept_failed(&e),
            }
        }
        info!(active = self.active_connections(), "Accept loop stopped");
        Ok(())
    }

    fn spawn_session(&self, mut stream: TcpStream) {
        let peer = stream.peer_addr().ok();

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = ConnectionSlot(Arc::clone(&self.active));

        if let Some(max) = self.config.max_connections {
            if active > max {
                warn!(peer = ?peer, max, "Connection limit reached, closing new connection");
                if let Some(ref m) = self.ctx.metrics {
                    m.record_connection_rejected();
                }
                // Dropping the stream and slot closes the socket and frees the count
                return;
            }
        }
        if let Some(ref m) = self.ctx.metrics {
            m.record_connection_accepted();
        }

        let client_id: ClientId = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let ctx = self.ctx.clone();
        let spawned = thread::Builder::new()
            .name(format!("phonebook-client-{}", client_id))
            .spawn(move || {
                let _slot = slot;
                let mut session = ClientSession::new(client_id, peer);
                session.run(&mut stream, &ctx);
            });
        if let Err(e) = spawned {
            error!(client_id, error = %e, "Failed to spawn session thread");
        }
    }
}

/// Log a failed accept and back off before the next one.
fn accept_failed(err: &std::io::Error) {
    error!(error = %err, "Accept error");
    thread::sleep(ACCEPT_ERROR_BACKOFF);
}

/// Address the shutdown handle connects to. An unspecified bind address is
/// reached through loopback.
fn wake_addr(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local.port()),
        _ => local,
    }
}
