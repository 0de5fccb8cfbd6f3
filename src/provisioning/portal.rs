//! HTTP config portal served on the board's access point.
//!
//! Uses `tiny_http`, which works on both host and ESP32 (via std::net).
//! Requests are handled on a background thread; credential submissions are
//! forwarded to the main loop as [`Event::ApCredentials`] and the thread waits
//! for the outcome.
//!
//! # Endpoints
//!
//! - `GET /` returns board information as JSON:
//!
//! ```json
//! { "board": "BlynkMeRGBY", "firmware": "0.5.0", "hardware": "1.0.0" }
//! ```
//!
//! - `GET /config?ssid=..&pass=..&blynk=..&host=..&port=..` or `POST /config`
//!   with the same fields form-encoded in the body. Answers `200` when the
//!   credentials were accepted and saved, `400` when a field is invalid and
//!   `503` when saving failed or the board is not in config mode.

use super::ap::{AccessPoint, ApError, CredentialSubmission, SubmissionOutcome};
use super::identity::DeviceIdentity;
use crate::event::Event;
use crate::settings::{FIRMWARE_VERSION, HARDWARE_VERSION, PORTAL_REPLY_TIMEOUT};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};
use tokio::sync::mpsc::UnboundedSender;

/// Largest accepted request body.
const MAX_BODY_LEN: u64 = 1024;

/// Board information served on `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct BoardInfo {
    pub board: String,
    pub firmware: &'static str,
    pub hardware: &'static str,
}

impl BoardInfo {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            board: identity.ssid(),
            firmware: FIRMWARE_VERSION,
            hardware: HARDWARE_VERSION,
        }
    }
}

/// Running config portal.
///
/// Runs in a background thread. Drop it to stop the server.
pub struct ConfigPortal {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl ConfigPortal {
    /// Start the portal.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - IP address to bind to (use `None` for 0.0.0.0)
    /// * `port` - Port to listen on (0 picks a free port)
    /// * `info` - Board information for `GET /`
    /// * `events` - Main loop event queue
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        info: BoardInfo,
        events: UnboundedSender<Event>,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let local_addr = server.server_addr().to_ip();

        info!(
            "Config portal for {} listening on http://{}/",
            info.board,
            local_addr.map_or(addr, |a| a.to_string())
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            Self::run_server(server, info, events, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            local_addr,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn run_server(
        server: Server,
        info: BoardInfo,
        events: UnboundedSender<Event>,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut device_seen = false;

        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Config portal shutting down");
                break;
            }

            match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => {
                    if !device_seen {
                        device_seen = true;
                        if let Some(addr) = request.remote_addr() {
                            debug!("First portal request from {}", addr);
                        }
                        let _ = events.send(Event::ApClientConnected);
                    }
                    Self::handle_request(request, &info, &events);
                }
                Ok(None) => {
                    // Timeout, check shutdown flag and continue
                }
                Err(e) => {
                    error!("Config portal error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_request(mut request: Request, info: &BoardInfo, events: &UnboundedSender<Event>) {
        let url = request.url().to_string();
        let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
        let method = request.method().clone();

        let (status, body, json) = match (&method, path) {
            (Method::Get, "/") => match serde_json::to_string(info) {
                Ok(body) => (200, body, true),
                Err(e) => (500, format!("Failed to encode board info: {}", e), false),
            },
            (Method::Get, "/config") => {
                Self::submit(CredentialSubmission::from_query(query), events)
            }
            (Method::Post, "/config") => {
                let mut form = String::new();
                match request
                    .as_reader()
                    .take(MAX_BODY_LEN)
                    .read_to_string(&mut form)
                {
                    Ok(_) => Self::submit(CredentialSubmission::from_query(&form), events),
                    Err(e) => (400, format!("Unreadable body: {}", e), false),
                }
            }
            (_, "/" | "/config") => (405, "Method Not Allowed".to_string(), false),
            _ => (404, "Not Found".to_string(), false),
        };

        let mut response = Response::from_string(body).with_status_code(status);
        if json {
            if let Ok(header) =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            {
                response = response.with_header(header);
            }
        }
        if let Err(e) = request.respond(response) {
            warn!("Failed to send portal response: {}", e);
        }
    }

    /// Forward a submission and wait for the outcome.
    fn submit(
        submission: CredentialSubmission,
        events: &UnboundedSender<Event>,
    ) -> (u16, String, bool) {
        let (reply_tx, reply_rx) = mpsc::channel();
        let event = Event::ApCredentials {
            submission,
            reply: Some(reply_tx),
        };
        if events.send(event).is_err() {
            return (503, "Board is shutting down".to_string(), false);
        }

        match reply_rx.recv_timeout(PORTAL_REPLY_TIMEOUT) {
            Ok(SubmissionOutcome::Accepted) => {
                (200, "Configuration saved, connecting".to_string(), false)
            }
            Ok(SubmissionOutcome::Invalid(reason)) => (400, reason, false),
            Ok(SubmissionOutcome::SaveFailed(reason)) => {
                (503, format!("Failed to save configuration: {}", reason), false)
            }
            Ok(SubmissionOutcome::NotInConfigMode) => {
                (503, "Board is not in config mode".to_string(), false)
            }
            Err(_) => (503, "Board did not answer".to_string(), false),
        }
    }

    /// Ask the server to stop and return without waiting for it.
    ///
    /// The thread finishes the request it is serving, then exits within one
    /// polling interval (100ms).
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Stop the server and wait for its thread to exit.
    pub fn join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the server thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

// Dropping detaches the thread: the main loop drops the portal while the
// thread may still be waiting on it for an answer.
impl Drop for ConfigPortal {
    fn drop(&mut self) {
        self.stop();
    }
}

/// [`AccessPoint`] that serves the config portal, on top of an optional
/// radio access point.
pub struct PortalAccessPoint {
    radio: Option<Box<dyn AccessPoint>>,
    bind_addr: Option<IpAddr>,
    port: u16,
    events: UnboundedSender<Event>,
    portal: Option<ConfigPortal>,
}

impl PortalAccessPoint {
    pub fn new(
        radio: Option<Box<dyn AccessPoint>>,
        bind_addr: Option<IpAddr>,
        port: u16,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            radio,
            bind_addr,
            port,
            events,
            portal: None,
        }
    }

    pub fn portal(&self) -> Option<&ConfigPortal> {
        self.portal.as_ref()
    }
}

impl AccessPoint for PortalAccessPoint {
    fn start(&mut self, identity: &DeviceIdentity) -> Result<(), ApError> {
        if let Some(radio) = self.radio.as_mut() {
            radio.start(identity)?;
        }
        let portal = ConfigPortal::start(
            self.bind_addr,
            self.port,
            BoardInfo::new(identity),
            self.events.clone(),
        )
        .map_err(|e| ApError::Portal(e.to_string()))?;
        self.portal = Some(portal);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(portal) = self.portal.take() {
            portal.stop();
        }
        if let Some(radio) = self.radio.as_mut() {
            radio.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{Ipv4Addr, TcpStream};

    fn start_portal() -> (ConfigPortal, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let identity = DeviceIdentity::from_indices([0, 1, 2, 3]).unwrap();
        let portal = ConfigPortal::start(
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            0,
            BoardInfo::new(&identity),
            tx,
        )
        .expect("portal should bind");
        (portal, rx)
    }

    fn http(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_board_info() {
        let (portal, mut rx) = start_portal();
        let addr = portal.local_addr().unwrap();

        let response = http(addr, "GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"board\":\"BlynkMeRGBY\""));
        assert!(response.contains("\"firmware\":\"0.5.0\""));

        assert!(matches!(rx.blocking_recv(), Some(Event::ApClientConnected)));
    }

    #[test]
    fn test_submission_roundtrip() {
        let (portal, mut rx) = start_portal();
        let addr = portal.local_addr().unwrap();

        // Plays the main loop: accept whatever arrives
        let main_loop = thread::spawn(move || {
            let mut ssid = None;
            while let Some(event) = rx.blocking_recv() {
                if let Event::ApCredentials { submission, reply } = event {
                    ssid = Some(submission.ssid.clone());
                    if let Some(reply) = reply {
                        let _ = reply.send(SubmissionOutcome::Accepted);
                    }
                    break;
                }
            }
            ssid
        });

        let response = http(
            addr,
            "GET /config?ssid=Home+Net&pass=&blynk=0123456789abcdef0123456789abcdef HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert_eq!(main_loop.join().unwrap().as_deref(), Some("Home Net"));
    }

    #[test]
    fn test_post_invalid_is_400() {
        let (portal, mut rx) = start_portal();
        let addr = portal.local_addr().unwrap();

        let main_loop = thread::spawn(move || {
            while let Some(event) = rx.blocking_recv() {
                if let Event::ApCredentials {
                    reply: Some(reply), ..
                } = event
                {
                    let _ = reply.send(SubmissionOutcome::Invalid("SSID cannot be empty".into()));
                    break;
                }
            }
        });

        let body = "ssid=&pass=";
        let request = format!(
            "POST /config HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let response = http(addr, &request);
        assert!(response.starts_with("HTTP/1.1 400"), "{}", response);
        assert!(response.contains("SSID cannot be empty"));
        main_loop.join().unwrap();
    }

    #[test]
    fn test_stop_does_not_wait_for_pending_reply() {
        let (mut portal, mut rx) = start_portal();
        let addr = portal.local_addr().unwrap();

        let client = thread::spawn(move || {
            http(
                addr,
                "GET /config?ssid=Home HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
            )
        });

        // Stop while the portal thread waits for the outcome
        let reply = loop {
            match rx.blocking_recv() {
                Some(Event::ApCredentials {
                    reply: Some(reply), ..
                }) => break reply,
                Some(_) => continue,
                None => panic!("portal closed the event queue"),
            }
        };
        let started = std::time::Instant::now();
        portal.stop();
        assert!(started.elapsed() < Duration::from_millis(50));

        reply.send(SubmissionOutcome::Accepted).unwrap();
        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

        portal.join();
        assert!(portal.is_finished());
    }

    #[test]
    fn test_unknown_path_is_404() {
        let (portal, _rx) = start_portal();
        let addr = portal.local_addr().unwrap();
        let response = http(addr, "GET /nope HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404"));
    }
}
