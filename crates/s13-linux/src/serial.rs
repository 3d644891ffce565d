//! Tethered serial console, newline-framed, non-blocking.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{info, warn};

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyS0";
pub const DEFAULT_SERIAL_BAUD: u32 = 115_200;

const RX_BUFFER_LIMIT: usize = 1024;

pub struct SerialPort {
    file: File,
    rx: Vec<u8>,
}

fn baud_code(baud: u32) -> libc::speed_t {
    match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        other => {
            warn!("unknown baud rate {}, using 115200", other);
            libc::B115200
        }
    }
}

impl SerialPort {
    pub fn open<P: AsRef<Path>>(port: P, baud: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&port)
            .with_context(|| format!("open {}", port.as_ref().display()))?;

        // Raw 8N1, no flow control, fully non-blocking reads.
        // SAFETY: termios calls on our own fd with a zeroed struct.
        unsafe {
            let fd = file.as_raw_fd();
            let mut tty: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut tty) != 0 {
                bail!("tcgetattr failed: {}", std::io::Error::last_os_error());
            }

            let code = baud_code(baud);
            libc::cfsetospeed(&mut tty, code);
            libc::cfsetispeed(&mut tty, code);

            tty.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE | libc::CRTSCTS);
            tty.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
            tty.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ISIG);
            tty.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
            tty.c_iflag &=
                !(libc::IGNBRK | libc::BRKINT | libc::PARMRK | libc::ISTRIP | libc::INLCR
                    | libc::IGNCR | libc::ICRNL);
            tty.c_oflag &= !libc::OPOST;
            tty.c_cc[libc::VMIN] = 0;
            tty.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSANOW, &tty) != 0 {
                bail!("tcsetattr failed: {}", std::io::Error::last_os_error());
            }
            libc::tcflush(fd, libc::TCIOFLUSH);
        }

        info!("serial console on {} at {} baud", port.as_ref().display(), baud);
        Ok(Self {
            file,
            rx: Vec::new(),
        })
    }

    /// Pull whatever arrived and return the complete lines, CR stripped.
    pub fn poll_lines(&mut self) -> Vec<String> {
        let mut chunk = [0u8; 256];
        loop {
            match self.file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!("serial read failed: {}", err);
                    break;
                }
            }
        }

        let mut lines = Vec::new();
        while let Some(pos) = self.rx.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.rx.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = text.trim_end_matches('\r').trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        // Unterminated garbage: reset rather than grow without bound.
        if self.rx.len() >= RX_BUFFER_LIMIT {
            warn!("serial RX overflow, clearing {} bytes", self.rx.len());
            self.rx.clear();
        }

        lines
    }

    pub fn send_line(&mut self, line: &str) {
        let framed = format!("{}\r\n", line);
        if let Err(err) = self.file.write_all(framed.as_bytes()) {
            warn!("serial write failed: {}", err);
        }
    }
}
