//! WebSocket transport to the prediction service
//!
//! Owns exactly one connection and exposes the primitive operations on it:
//! connect, send one text frame, receive one text frame, close. Every
//! blocking call is bounded by a timeout. The transport never retries or
//! reconnects on its own; callers decide that from [`ConnectionState`].
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected ──close──▶ Closing ──▶ Closed
//!                               │                  │
//!                               └──err──▶ Faulted ◀┘ (I/O failure)
//! ```
//!
//! Only one send/receive pair may be outstanding at a time; the transport
//! does not multiplex.

use crate::error::TransportError;
use crate::predictor::types::ConnectionState;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};
use url::{Host, Url};

/// How long a graceful close waits for the peer's close frame
const CLOSE_GRACE: Duration = Duration::from_millis(250);

pub struct PredictionTransport {
    endpoint: String,
    connect_timeout: Duration,
    send_timeout: Duration,
    receive_timeout: Duration,
    socket: Option<WebSocket<TcpStream>>,
    state: ConnectionState,
}

impl PredictionTransport {
    /// Create a transport for `endpoint` (not connected yet)
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(2),
            socket: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open the connection
    ///
    /// Already connected is a no-op. From any other state a fresh connection
    /// is attempted; on failure the state becomes `Faulted` and the error is
    /// returned for the caller to log.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        self.socket = None;
        self.state = ConnectionState::Connecting;

        match self.open() {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = ConnectionState::Connected;
                debug!(endpoint = %self.endpoint, "connected to prediction service");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Faulted;
                Err(e)
            }
        }
    }

    fn open(&self) -> Result<WebSocket<TcpStream>, TransportError> {
        let deadline = Instant::now() + self.connect_timeout;
        let stream = self.connect_tcp(deadline)?;

        // Handshake runs on the blocking stream with whatever time is left
        let remaining = remaining(deadline).ok_or(TransportError::Timeout)?;
        stream.set_read_timeout(Some(remaining)).map_err(TransportError::Io)?;
        stream.set_write_timeout(Some(remaining)).map_err(TransportError::Io)?;

        let (socket, _response) =
            tungstenite::client(self.endpoint.as_str(), stream).map_err(|e| match e {
                HandshakeError::Interrupted(_) => TransportError::Timeout,
                HandshakeError::Failure(tungstenite::Error::Io(io_err)) => {
                    TransportError::from_io(io_err)
                }
                HandshakeError::Failure(source) => TransportError::Handshake {
                    endpoint: self.endpoint.clone(),
                    source,
                },
            })?;

        socket
            .get_ref()
            .set_write_timeout(Some(self.send_timeout))
            .map_err(TransportError::Io)?;
        Ok(socket)
    }

    fn connect_tcp(&self, deadline: Instant) -> Result<TcpStream, TransportError> {
        let addrs = resolve(&self.endpoint, deadline)?;
        let mut last_err = None;

        for addr in addrs {
            let Some(timeout) = remaining(deadline) else {
                break;
            };
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(TransportError::Io)?;
                    return Ok(stream);
                }
                Err(e) => {
                    trace!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => TransportError::from_io(e),
            None => TransportError::Timeout,
        })
    }

    /// Write one text frame
    ///
    /// A failed write leaves the stream in an unknown framing state, so the
    /// connection is dropped and marked `Faulted`.
    pub fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let socket = match (&mut self.socket, self.state) {
            (Some(socket), ConnectionState::Connected) => socket,
            _ => return Err(TransportError::NotConnected),
        };

        match socket.send(Message::Text(text.to_owned())) {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = TransportError::from_ws(e);
                self.drop_socket(&err);
                Err(err)
            }
        }
    }

    /// Read one text frame, waiting at most the configured receive timeout
    pub fn receive(&mut self) -> Result<String, TransportError> {
        let deadline = Instant::now() + self.receive_timeout;
        self.receive_before(deadline)
    }

    /// Read one text frame, waiting until `deadline` at the latest
    ///
    /// Control frames are handled internally and skipped. Binary frames are
    /// accepted if they hold UTF-8. A timeout or an undecodable frame keeps
    /// the connection open; whether it is still usable is the caller's call.
    pub fn receive_before(&mut self, deadline: Instant) -> Result<String, TransportError> {
        loop {
            let socket = match (&mut self.socket, self.state) {
                (Some(socket), ConnectionState::Connected) => socket,
                _ => return Err(TransportError::NotConnected),
            };

            let timeout = remaining(deadline).ok_or(TransportError::Timeout)?;
            socket
                .get_ref()
                .set_read_timeout(Some(timeout))
                .map_err(TransportError::Io)?;

            match socket.read() {
                Ok(Message::Text(text)) => return Ok(text),
                Ok(Message::Binary(bytes)) => {
                    return String::from_utf8(bytes)
                        .map_err(|e| TransportError::InvalidFrame(e.to_string()));
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "prediction service sent close frame");
                    self.socket = None;
                    self.state = ConnectionState::Closed;
                    return Err(TransportError::ConnectionClosed);
                }
                Ok(_) => continue,
                Err(e) => {
                    let err = TransportError::from_ws(e);
                    if !matches!(err, TransportError::Timeout) {
                        self.drop_socket(&err);
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Close the connection
    ///
    /// Idempotent. Sends a close frame if connected and waits briefly for the
    /// peer's reply. Always ends in `Closed` and never fails.
    pub fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if self.state == ConnectionState::Connected {
                self.state = ConnectionState::Closing;
                let deadline = Instant::now() + CLOSE_GRACE;
                let _ = socket.close(None);
                while let Some(timeout) = remaining(deadline) {
                    if socket.get_ref().set_read_timeout(Some(timeout)).is_err() {
                        break;
                    }
                    // Read until the close handshake completes or errors
                    if socket.read().is_err() {
                        break;
                    }
                }
            }
        }
        self.state = ConnectionState::Closed;
    }

    fn drop_socket(&mut self, err: &TransportError) {
        self.socket = None;
        self.state = match err {
            TransportError::ConnectionClosed => ConnectionState::Closed,
            _ => ConnectionState::Faulted,
        };
    }
}

impl Drop for PredictionTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Time left before `deadline`, `None` once it has passed
fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        None
    } else {
        Some(left)
    }
}

/// Validate a `ws://` endpoint and resolve its socket addresses
///
/// IP literals resolve in place. Host names are looked up on a helper
/// thread so a slow resolver cannot hold the caller past `deadline`; a
/// lookup that finishes late is discarded.
fn resolve(endpoint: &str, deadline: Instant) -> Result<Vec<SocketAddr>, TransportError> {
    let url = Url::parse(endpoint)
        .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    if url.scheme() != "ws" {
        return Err(TransportError::InvalidEndpoint(format!(
            "{}: only ws:// endpoints are supported",
            endpoint
        )));
    }

    let is_ip_literal = match url.host() {
        None => {
            return Err(TransportError::InvalidEndpoint(format!("{}: missing host", endpoint)));
        }
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        Some(Host::Domain(_)) => false,
    };

    let addrs = if is_ip_literal {
        url.socket_addrs(|| Some(80)).map_err(TransportError::Io)?
    } else {
        let timeout = remaining(deadline).ok_or(TransportError::Timeout)?;
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("rush-predict-dns".to_string())
            .spawn(move || {
                let _ = tx.send(url.socket_addrs(|| Some(80)));
            })
            .map_err(TransportError::Io)?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(TransportError::Io)?,
            Err(_) => {
                debug!(endpoint, "name resolution did not finish before the deadline");
                return Err(TransportError::Timeout);
            }
        }
    };

    if addrs.is_empty() {
        return Err(TransportError::InvalidEndpoint(format!(
            "{}: host did not resolve",
            endpoint
        )));
    }
    Ok(addrs)
}
