//! Doorbell transports.
//!
//! `CmdquDoorbell` drives the vendor mailbox character device on the
//! real board (brain → muscle IRQ). `FifoDoorbell`/`FifoDoorbellWaiter`
//! carry the same 5-byte event over a named pipe for
//! software-in-the-loop rigs where both daemons are Linux processes.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use s13_core::{S13Error, S13Result};
use s13_hal::{Doorbell, DoorbellCmd, DoorbellWaiter};

const RTOS_CMDQU_DEV: &str = "/dev/cvi-rtos-cmdqu";
// _IOW('r', 1, unsigned long)
const RTOS_CMDQU_SEND: libc::c_ulong = 0x4008_7201;

/// Mailbox command block, as the kernel driver expects it.
#[repr(C, packed)]
struct Cmdqu {
    ip_id: u8,
    /// cmd_id in bits 0..6, blocking flag in bit 7.
    cmd_block: u8,
    resv: u16,
    param_ptr: u32,
}

pub struct CmdquDoorbell {
    file: File,
    tx_count: u32,
}

impl CmdquDoorbell {
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(RTOS_CMDQU_DEV)
            .with_context(|| format!("open {}", RTOS_CMDQU_DEV))?;
        info!("mailbox open on {}", RTOS_CMDQU_DEV);
        Ok(Self { file, tx_count: 0 })
    }

    pub fn tx_count(&self) -> u32 {
        self.tx_count
    }
}

impl Doorbell for CmdquDoorbell {
    fn notify(&mut self, cmd: DoorbellCmd, param: u32) -> S13Result<()> {
        let block = Cmdqu {
            ip_id: 0,
            cmd_block: cmd.raw() & 0x7F,
            resv: 0,
            param_ptr: param,
        };
        // SAFETY: RTOS_CMDQU_SEND takes a pointer to a Cmdqu-shaped
        // block; the driver copies it synchronously.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                RTOS_CMDQU_SEND,
                &block as *const Cmdqu,
            )
        };
        if ret < 0 {
            debug!(
                "mailbox ioctl failed (cmd {:#04x}): {}",
                cmd.raw(),
                std::io::Error::last_os_error()
            );
            return Err(S13Error::DoorbellSend);
        }
        self.tx_count += 1;
        Ok(())
    }
}

/// One doorbell event on the pipe: cmd byte + u32 param, little-endian.
const FIFO_EVENT_LEN: usize = 5;

fn ensure_fifo(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let cpath = CString::new(path.as_os_str().as_encoded_bytes()).context("fifo path")?;
    // SAFETY: plain mkfifo(3) on a NUL-terminated path.
    let ret = unsafe { libc::mkfifo(cpath.as_ptr(), 0o644) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            bail!("mkfifo {} failed: {}", path.display(), err);
        }
    }
    Ok(())
}

/// Sender half. The pipe is opened lazily because O_WRONLY|O_NONBLOCK
/// fails until a reader exists; until then events are dropped (the
/// heartbeat makes that safe).
pub struct FifoDoorbell {
    path: PathBuf,
    file: Option<File>,
    tx_count: u32,
}

impl FifoDoorbell {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        ensure_fifo(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            tx_count: 0,
        })
    }

    fn writer(&mut self) -> Option<&mut File> {
        if self.file.is_none() {
            match OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.path)
            {
                Ok(file) => {
                    info!("doorbell pipe connected: {}", self.path.display());
                    self.file = Some(file);
                }
                // ENXIO: no reader yet.
                Err(err) if err.raw_os_error() == Some(libc::ENXIO) => return None,
                Err(err) => {
                    warn!("doorbell pipe open failed: {}", err);
                    return None;
                }
            }
        }
        self.file.as_mut()
    }

    pub fn tx_count(&self) -> u32 {
        self.tx_count
    }
}

impl Doorbell for FifoDoorbell {
    fn notify(&mut self, cmd: DoorbellCmd, param: u32) -> S13Result<()> {
        let mut frame = [0u8; FIFO_EVENT_LEN];
        frame[0] = cmd.raw();
        frame[1..].copy_from_slice(&param.to_le_bytes());

        let Some(file) = self.writer() else {
            return Err(S13Error::DoorbellSend);
        };
        match file.write_all(&frame) {
            Ok(()) => {
                self.tx_count += 1;
                Ok(())
            }
            Err(err) => {
                debug!("doorbell pipe write failed: {}", err);
                // Reader vanished; reconnect on the next notify.
                if err.kind() == ErrorKind::BrokenPipe {
                    self.file = None;
                }
                Err(S13Error::DoorbellSend)
            }
        }
    }
}

/// Receiver half.
pub struct FifoDoorbellWaiter {
    file: File,
}

impl FifoDoorbellWaiter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        ensure_fifo(path.as_ref())?;
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .with_context(|| format!("open doorbell pipe {}", path.as_ref().display()))?;
        Ok(Self { file })
    }
}

impl DoorbellWaiter for FifoDoorbellWaiter {
    fn poll(&mut self) -> nb::Result<(DoorbellCmd, u32), S13Error> {
        let mut frame = [0u8; FIFO_EVENT_LEN];
        match self.file.read(&mut frame) {
            Ok(FIFO_EVENT_LEN) => {
                let param = u32::from_le_bytes(frame[1..].try_into().unwrap());
                match DoorbellCmd::from_raw(frame[0]) {
                    Some(cmd) => Ok((cmd, param)),
                    None => {
                        debug!("unknown doorbell cmd {:#04x} ignored", frame[0]);
                        Err(nb::Error::WouldBlock)
                    }
                }
            }
            // 0 = no writer connected; short frames cannot happen below
            // PIPE_BUF.
            Ok(_) => Err(nb::Error::WouldBlock),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(nb::Error::WouldBlock),
            Err(err) => {
                debug!("doorbell pipe read failed: {}", err);
                Err(nb::Error::Other(S13Error::DoorbellSend))
            }
        }
    }
}
