//! Client side of the phonebook protocol.
//!
//! [`ContactClient`] owns one TCP connection and performs strictly one
//! write-then-read round trip per call. Calls take `&mut self`, so a second
//! request can never be in flight on the same connection.
//!
//! Any transport or protocol failure marks the connection dead: the stream
//! is dropped and later calls return [`PhonebookError::NotConnected`] until
//! [`ContactClient::reconnect`] succeeds. Nothing is retried automatically.
//! A request the server refuses ([`PhonebookError::Rejected`]) leaves the
//! connection open.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{PhonebookError, Result};
use crate::model::{Contact, FailureReason, Filter, Request, Response};
use crate::protocol::{read_response, write_request, DEFAULT_PORT};

/// Connection settings for [`ContactClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// `None` uses the OS connect timeout
    pub connect_timeout: Option<Duration>,
    /// Read/write timeout per call; `None` blocks indefinitely
    pub io_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: None,
            io_timeout: None,
        }
    }
}

/// Which step of a round trip failed. Only used to label logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureStage {
    Write,
    Read,
    Decode,
    Mismatch,
    Rejected,
}

impl FailureStage {
    fn of_read_error(err: &PhonebookError) -> Self {
        match err {
            PhonebookError::Io(_) | PhonebookError::ConnectionClosed => FailureStage::Read,
            _ => FailureStage::Decode,
        }
    }
}

pub struct ContactClient {
    config: ClientConfig,
    stream: Option<TcpStream>,
}

impl ContactClient {
    /// Connect with the given settings. Connect failures surface here, not
    /// on the first call.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let stream = open_stream(&config)?;
        Ok(Self { config, stream: Some(stream) })
    }

    /// Connect to `host:port` with default timeouts
    pub fn connect_to(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::connect(ClientConfig { host: host.into(), port, ..ClientConfig::default() })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// False once a call has failed or after [`close`](Self::close)
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drop any current connection and open a new one
    pub fn reconnect(&mut self) -> Result<()> {
        self.close();
        self.stream = Some(open_stream(&self.config)?);
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!(host = %self.config.host, port = self.config.port, "Connection closed");
        }
    }

    /// Send one request and wait for its response.
    ///
    /// A response whose command differs from the request's is a protocol
    /// failure even though the bytes arrived fine.
    pub fn send(&mut self, request: &Request) -> Result<Response> {
        let stream = self.stream.as_mut().ok_or(PhonebookError::NotConnected)?;
        let expected = request.command();

        if let Err(e) = write_request(stream, request) {
            return Err(self.fail(FailureStage::Write, e));
        }

        let response = match read_response(stream) {
            Ok(response) => response,
            Err(e) => {
                let stage = FailureStage::of_read_error(&e);
                return Err(self.fail(stage, e));
            }
        };

        if response.command != expected {
            let err = PhonebookError::CommandMismatch { expected, received: response.command };
            return Err(self.fail(FailureStage::Mismatch, err));
        }

        Ok(response)
    }

    /// Fetch the contact list, optionally filtered.
    ///
    /// A response with `success: false` (an unknown filter field, a store
    /// failure) is `Err(Rejected)`, never an empty list. The connection
    /// stays usable.
    pub fn update_data(&mut self, filter: Option<Filter>) -> Result<Vec<Contact>> {
        let response = self.send(&Request::Update { filter })?;
        if !response.success {
            let err = PhonebookError::Rejected {
                command: response.command,
                reason: response.reason.unwrap_or(FailureReason::StoreError),
            };
            return Err(self.fail(FailureStage::Rejected, err));
        }
        Ok(response.contacts.unwrap_or_default())
    }

    /// `Ok(false)` when the server refused the insert
    pub fn add_contact(&mut self, contact: Contact) -> Result<bool> {
        Ok(self.send(&Request::Add { contact })?.success)
    }

    /// `Ok(false)` when no record matched exactly
    pub fn delete_contact(&mut self, contact: Contact) -> Result<bool> {
        Ok(self.send(&Request::Delete { contact })?.success)
    }

    fn fail(&mut self, stage: FailureStage, err: PhonebookError) -> PhonebookError {
        if err.is_fatal_for_connection() {
            warn!(?stage, code = err.code(), error = %err, "Request failed, dropping connection");
            self.stream = None;
        } else {
            debug!(?stage, code = err.code(), error = %err, "Request refused by server");
        }
        err
    }
}

impl Drop for ContactClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_stream(config: &ClientConfig) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port).to_socket_addrs()?.collect();

    let mut last_err = None;
    for addr in addrs {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(config.io_timeout)?;
                stream.set_write_timeout(config.io_timeout)?;
                info!(%addr, "Connected");
                return Ok(stream);
            }
            Err(e) => {
                warn!(%addr, error = %e, "Connect failed");
                last_err = Some(e);
            }
        }
    }

    Err(PhonebookError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("no address for host '{}'", config.host),
        )
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Command;
    use crate::protocol::{read_request, write_frame, write_response};
    use std::net::TcpListener;
    use std::thread;

    /// One-connection fake server answering each request with `reply`
    fn fake_server<F>(reply: F) -> (u16, thread::JoinHandle<()>)
    where
        F: Fn(Request, &mut TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            while let Ok(Some(request)) = read_request(&mut stream) {
                reply(request, &mut stream);
            }
        });
        (port, handle)
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 12333);
        assert!(config.connect_timeout.is_none());
        assert!(config.io_timeout.is_none());
    }

    #[test]
    fn test_connect_refused_surfaces_at_connect() {
        // Bind then drop to get a port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let result = ContactClient::connect_to("127.0.0.1", port);
        assert!(matches!(result, Err(PhonebookError::Io(_))));
    }

    #[test]
    fn test_command_mismatch_marks_connection_dead() {
        let (port, server) = fake_server(|_, stream| {
            write_response(stream, &Response::ok(Command::Delete)).unwrap();
        });

        let mut client = ContactClient::connect_to("127.0.0.1", port).unwrap();
        let result = client.add_contact(Contact::new("A", "B", "C", "1"));

        match result {
            Err(PhonebookError::CommandMismatch { expected, received }) => {
                assert_eq!(expected, Command::Add);
                assert_eq!(received, Command::Delete);
            }
            other => panic!("Expected CommandMismatch, got {:?}", other),
        }
        assert!(!client.is_connected());
        assert!(matches!(client.update_data(None), Err(PhonebookError::NotConnected)));

        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_garbage_response_is_decode_failure() {
        let (port, server) = fake_server(|_, stream| {
            write_frame(stream, &[0xc1]).unwrap();
        });

        let mut client = ContactClient::connect_to("127.0.0.1", port).unwrap();
        assert!(matches!(client.update_data(None), Err(PhonebookError::Decode(_))));
        assert!(!client.is_connected());

        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_peer_close_is_read_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Consume the request, then hang up without answering
            let _ = read_request(&mut stream);
        });

        let mut client = ContactClient::connect_to("127.0.0.1", port).unwrap();
        let result = client.update_data(None);
        assert!(matches!(result, Err(PhonebookError::ConnectionClosed) | Err(PhonebookError::Io(_))));
        assert!(!client.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn test_reconnect_after_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            // First connection: hang up immediately
            let (first, _) = listener.accept().unwrap();
            drop(first);
            // Second connection: answer one update
            let (mut second, _) = listener.accept().unwrap();
            if let Ok(Some(_)) = read_request(&mut second) {
                write_response(&mut second, &Response::contacts(Vec::new())).unwrap();
            }
        });

        let mut client = ContactClient::connect_to("127.0.0.1", port).unwrap();
        assert!(client.update_data(None).is_err());
        assert!(!client.is_connected());

        client.reconnect().unwrap();
        assert!(client.is_connected());
        assert_eq!(client.update_data(None).unwrap(), Vec::new());

        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_rejected_update_is_visible_and_keeps_connection() {
        let (port, server) = fake_server(|request, stream| {
            let response = match request {
                Request::Update { filter: Some(_) } => {
                    Response::failed(Command::Update, FailureReason::InvalidField)
                }
                Request::Update { filter: None } => {
                    Response::failed(Command::Update, FailureReason::StoreError)
                }
                _ => Response::ok(request.command()),
            };
            write_response(stream, &response).unwrap();
        });

        let mut client = ContactClient::connect_to("127.0.0.1", port).unwrap();

        let filter = Filter { field: Some("email".into()), text: Some("x".into()) };
        match client.update_data(Some(filter)) {
            Err(PhonebookError::Rejected { command, reason }) => {
                assert_eq!(command, Command::Update);
                assert_eq!(reason, FailureReason::InvalidField);
            }
            other => panic!("Expected Rejected(INVALID_FIELD), got {:?}", other),
        }
        assert!(client.is_connected());

        assert!(matches!(
            client.update_data(None),
            Err(PhonebookError::Rejected { reason: FailureReason::StoreError, .. })
        ));
        assert!(client.is_connected(), "a refused request is not a connection failure");

        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_io_timeout_marks_connection_dead() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Read the request, never answer, wait for the client to leave
            let _ = read_request(&mut stream);
            let _ = read_request(&mut stream);
        });

        let config = ClientConfig {
            port,
            connect_timeout: Some(Duration::from_secs(2)),
            io_timeout: Some(Duration::from_millis(200)),
            ..ClientConfig::default()
        };
        let mut client = ContactClient::connect(config).unwrap();
        assert_eq!(client.config().io_timeout, Some(Duration::from_millis(200)));

        match client.send(&Request::Update { filter: None }) {
            Err(PhonebookError::Io(e)) => assert!(
                matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock),
                "unexpected error kind {:?}",
                e.kind()
            ),
            other => panic!("Expected a timeout, got {:?}", other),
        }
        assert!(!client.is_connected());
        assert!(matches!(client.update_data(None), Err(PhonebookError::NotConnected)));

        drop(client);
        server.join().unwrap();
    }
}
