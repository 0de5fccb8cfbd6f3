//! TCP-level cloud session.
//!
//! Reaching the server is the handshake: the session is `Active` once a TCP
//! connection to `host:port` is open and `Dropped` when the peer closes it.
//! The cloud wire protocol is left to the project's SDK.
//!
//! # Platform Notes
//!
//! - **Host**: Works directly with std::net
//! - **ESP32**: Requires WiFi to be connected first (the supervisor only
//!   starts a session after association)

use super::{CloudSession, NetworkError, SessionStatus};
use crate::credentials::CloudCredentials;
use crate::settings::CLOUD_CONNECT_TIMEOUT;
use log::{debug, info, warn};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

enum State {
    Idle,
    Connecting(Receiver<io::Result<TcpStream>>),
    Active(TcpStream),
    Closed(SessionStatus),
}

/// [`CloudSession`] that checks TCP reachability of the cloud server.
///
/// The connect runs on a short-lived background thread so that
/// [`begin_session`](CloudSession::begin_session) returns immediately.
pub struct TcpCloudSession {
    state: State,
    connect_timeout: Duration,
}

impl TcpCloudSession {
    pub fn new() -> Self {
        Self::with_timeout(CLOUD_CONNECT_TIMEOUT)
    }

    /// Use a custom connect timeout for the background attempt.
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self {
            state: State::Idle,
            connect_timeout,
        }
    }

    fn connect(endpoint: &str, timeout: Duration) -> io::Result<TcpStream> {
        let addr = endpoint.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {}", endpoint))
        })?;
        debug!("Resolved {} to {}", endpoint, addr);

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to disable Nagle's algorithm: {}", e);
        }
        stream.set_nonblocking(true)?;
        Ok(stream)
    }

    /// Check an open stream without consuming data.
    fn probe(stream: &TcpStream) -> SessionStatus {
        let mut buf = [0u8; 1];
        match stream.peek(&mut buf) {
            Ok(0) => SessionStatus::Dropped,
            Ok(_) => SessionStatus::Active,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => SessionStatus::Active,
            Err(e) => {
                debug!("Cloud session probe failed: {}", e);
                SessionStatus::Dropped
            }
        }
    }
}

impl Default for TcpCloudSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudSession for TcpCloudSession {
    fn begin_session(&mut self, credentials: &CloudCredentials) -> Result<(), NetworkError> {
        let endpoint = credentials.endpoint();
        let timeout = self.connect_timeout;
        let (tx, rx) = mpsc::channel();

        info!("Connecting to cloud at {}", endpoint);
        thread::Builder::new()
            .name("cloud-connect".into())
            .spawn(move || {
                // Receiver is gone if the attempt was aborted; the stream is dropped
                let _ = tx.send(Self::connect(&endpoint, timeout));
            })?;

        self.state = State::Connecting(rx);
        Ok(())
    }

    fn session_status(&mut self) -> SessionStatus {
        let next = match &self.state {
            State::Idle => return SessionStatus::Dropped,
            State::Closed(status) => return *status,
            State::Active(stream) => match Self::probe(stream) {
                SessionStatus::Active => return SessionStatus::Active,
                status => {
                    info!("Cloud session closed by peer");
                    State::Closed(status)
                }
            },
            State::Connecting(rx) => match rx.try_recv() {
                Err(TryRecvError::Empty) => return SessionStatus::Pending,
                Err(TryRecvError::Disconnected) => State::Closed(SessionStatus::Dropped),
                Ok(Ok(stream)) => {
                    info!(
                        "Cloud session open to {}",
                        stream
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_default()
                    );
                    State::Active(stream)
                }
                Ok(Err(e)) => {
                    warn!("Cloud connection failed: {}", e);
                    State::Closed(SessionStatus::Rejected)
                }
            },
        };
        self.state = next;
        self.session_status()
    }

    fn abort(&mut self) {
        if !matches!(self.state, State::Idle) {
            debug!("Cloud session aborted");
        }
        self.state = State::Idle;
    }
}
