//! Datagram link to the eye display service.

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info};

use s13_hal::EyeSink;

pub const DEFAULT_EYE_SOCKET: &str = "/tmp/s13_eye.sock";

const RECONNECT_BACKOFF_MS: u128 = 5_000;

/// Fire-and-forget event sender. Connection attempts back off for 5 s;
/// while the service is away, events are dropped silently.
pub struct UnixEyeSink {
    path: PathBuf,
    socket: Option<UnixDatagram>,
    started: Instant,
    last_attempt_ms: Option<u128>,
}

impl UnixEyeSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            socket: None,
            started: Instant::now(),
            last_attempt_ms: None,
        }
    }

    fn socket(&mut self) -> Option<&UnixDatagram> {
        if self.socket.is_none() {
            let now = self.started.elapsed().as_millis();
            if let Some(last) = self.last_attempt_ms {
                if now - last < RECONNECT_BACKOFF_MS {
                    return None;
                }
            }
            self.last_attempt_ms = Some(now);

            let socket = UnixDatagram::unbound().ok()?;
            socket.set_nonblocking(true).ok()?;
            match socket.connect(&self.path) {
                Ok(()) => {
                    info!("eye service connected at {}", self.path.display());
                    self.socket = Some(socket);
                }
                Err(err) => {
                    debug!("eye service unavailable: {}", err);
                    return None;
                }
            }
        }
        self.socket.as_ref()
    }
}

impl EyeSink for UnixEyeSink {
    fn send_event(&mut self, json_line: &str) {
        let mut frame = String::with_capacity(json_line.len() + 1);
        frame.push_str(json_line);
        frame.push('\n');

        let Some(socket) = self.socket() else { return };
        if let Err(err) = socket.send(frame.as_bytes()) {
            debug!("eye event dropped: {}", err);
            // Service likely restarted; reconnect after backoff.
            self.socket = None;
        }
    }
}
