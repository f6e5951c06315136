//! ClientSession - per-connection request loop
//!
//! Each accepted connection gets its own session running on its own thread:
//! receive one frame, decode, dispatch, send the framed response, repeat.
//! Any transport or protocol failure closes the session. The protocol is
//! stateless at the application layer, so nothing but counters survives
//! between requests.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dispatch::{handle_request, ConflictPolicy};
use crate::error::{ErrorClass, PhonebookError};
use crate::metrics::Metrics;
use crate::protocol::{read_request, write_response};
use crate::store::ContactStore;

/// Unique identifier for a client connection
pub type ClientId = usize;

/// Why a session stopped. Every variant is terminal.
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer closed the connection between messages
    PeerClosed,
    /// Read or write failed
    Transport(PhonebookError),
    /// Peer sent bytes that are not a valid request
    Protocol(PhonebookError),
}

impl SessionEnd {
    fn from_error(err: PhonebookError) -> Self {
        debug_assert!(err.is_fatal_for_connection(), "read/write errors always end the session");
        match err.class() {
            ErrorClass::Protocol => SessionEnd::Protocol(err),
            _ => SessionEnd::Transport(err),
        }
    }
}

/// Everything a session needs from the server, shared by all sessions.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn ContactStore>,
    pub conflict_policy: ConflictPolicy,
    pub metrics: Option<Arc<Metrics>>,
}

/// State for one client connection
pub struct ClientSession {
    pub id: ClientId,
    /// Remote address, for logs
    pub peer: Option<SocketAddr>,
    /// Requests answered so far
    pub requests_handled: u64,
}

impl ClientSession {
    pub fn new(id: ClientId, peer: Option<SocketAddr>) -> Self {
        Self { id, peer, requests_handled: 0 }
    }

    fn peer_display(&self) -> String {
        self.peer.map_or_else(|| "unknown".to_string(), |p| p.to_string())
    }

    /// Run the receive, dispatch, respond loop until the connection ends.
    ///
    /// Request N's response is fully written before request N+1 is read.
    pub fn run<S: Read + Write>(&mut self, stream: &mut S, ctx: &SessionContext) -> SessionEnd {
        let peer = self.peer_display();
        info!(client_id = self.id, %peer, "Client connected");

        let end = loop {
            let request = match read_request(stream) {
                Ok(Some(request)) => request,
                Ok(None) => break SessionEnd::PeerClosed,
                Err(e) => break SessionEnd::from_error(e),
            };

            let command = request.command();
            debug!(client_id = self.id, %command, "Request received");

            let start = Instant::now();
            let response = handle_request(ctx.store.as_ref(), request, ctx.conflict_policy);

            if let Some(ref m) = ctx.metrics {
                let duration_ms = start.elapsed().as_millis() as u64;
                if m.record_request(command, duration_ms) {
                    warn!(client_id = self.id, %command, duration_ms, "Slow request");
                }
            }

            if let Err(e) = write_response(stream, &response) {
                break SessionEnd::from_error(e);
            }
            self.requests_handled += 1;
        };

        match &end {
            SessionEnd::PeerClosed => {
                info!(client_id = self.id, %peer, requests = self.requests_handled, "Client disconnected");
            }
            SessionEnd::Transport(e) => {
                warn!(client_id = self.id, %peer, error = %e, "Client transport error, closing session");
            }
            SessionEnd::Protocol(e) => {
                warn!(client_id = self.id, %peer, error = %e, "Client protocol violation, closing session");
            }
        }
        end
    }
}
