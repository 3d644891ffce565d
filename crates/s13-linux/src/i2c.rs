//! Minimal i2c-dev register access shared by the PWM and range drivers.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use anyhow::{bail, Context, Result};

const I2C_SLAVE: libc::c_ulong = 0x0703;

pub(crate) struct I2cDev {
    file: File,
}

impl I2cDev {
    pub fn open<P: AsRef<Path>>(bus: P, addr: u16) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&bus)
            .with_context(|| format!("open {}", bus.as_ref().display()))?;
        // SAFETY: I2C_SLAVE just stores the 7-bit address on the fd.
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, addr as libc::c_ulong) };
        if ret < 0 {
            bail!(
                "I2C_SLAVE {:#04x} on {} failed: {}",
                addr,
                bus.as_ref().display(),
                std::io::Error::last_os_error()
            );
        }
        Ok(Self { file })
    }

    pub fn write_reg8(&mut self, reg: u8, value: u8) -> std::io::Result<()> {
        self.file.write_all(&[reg, value])
    }

    pub fn write_block(&mut self, reg: u8, values: &[u8]) -> std::io::Result<()> {
        let mut buf = [0u8; 8];
        buf[0] = reg;
        buf[1..=values.len()].copy_from_slice(values);
        self.file.write_all(&buf[..=values.len()])
    }

    pub fn read_reg8(&mut self, reg: u8) -> std::io::Result<u8> {
        self.file.write_all(&[reg])?;
        let mut value = [0u8];
        self.file.read_exact(&mut value)?;
        Ok(value[0])
    }

    pub fn read_reg16(&mut self, reg: u8) -> std::io::Result<u16> {
        self.file.write_all(&[reg])?;
        let mut buf = [0u8; 2];
        self.file.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }
}
