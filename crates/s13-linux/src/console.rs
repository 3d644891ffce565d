//! TCP console: the line protocol over a tethered socket.
//!
//! Non-blocking accept and reads; disconnected clients are swept out on
//! the next poll.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};

use anyhow::{Context, Result};
use log::{debug, info};

const RX_BUFFER_LIMIT: usize = 1024;

struct Client {
    stream: TcpStream,
    rx: Vec<u8>,
}

pub struct TcpConsole {
    listener: TcpListener,
    clients: Vec<Client>,
}

impl TcpConsole {
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .with_context(|| format!("bind console port {}", port))?;
        listener
            .set_nonblocking(true)
            .context("console non-blocking")?;
        info!("console listening on port {}", port);
        Ok(Self {
            listener,
            clients: Vec::new(),
        })
    }

    /// Accept newcomers, read lines, answer through `handler`. Exactly
    /// one response line per command line.
    pub fn poll(&mut self, mut handler: impl FnMut(&str) -> String) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if stream.set_nonblocking(true).is_ok() {
                        debug!("console client connected: {}", peer);
                        self.clients.push(Client {
                            stream,
                            rx: Vec::new(),
                        });
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }

        let mut dead = Vec::new();
        for (idx, client) in self.clients.iter_mut().enumerate() {
            let mut chunk = [0u8; 256];
            loop {
                match client.stream.read(&mut chunk) {
                    Ok(0) => {
                        dead.push(idx);
                        break;
                    }
                    Ok(n) => client.rx.extend_from_slice(&chunk[..n]),
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                    Err(_) => {
                        dead.push(idx);
                        break;
                    }
                }
            }

            while let Some(pos) = client.rx.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = client.rx.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
                let line = text.trim_end_matches('\r').trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let response = handler(&line);
                let framed = format!("{}\r\n", response);
                if client.stream.write_all(framed.as_bytes()).is_err() {
                    dead.push(idx);
                    break;
                }
            }

            if client.rx.len() >= RX_BUFFER_LIMIT {
                client.rx.clear();
            }
        }

        dead.sort_unstable();
        dead.dedup();
        for idx in dead.into_iter().rev() {
            debug!("console client dropped");
            self.clients.remove(idx);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
