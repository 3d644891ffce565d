//! VL53L0X time-of-flight ranger, single-shot mode.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;

use s13_core::{S13Error, S13Result};
use s13_hal::RangeSensor;

use crate::i2c::I2cDev;

pub const VL53L0X_ADDR: u16 = 0x29;

const REG_IDENTIFICATION_MODEL_ID: u8 = 0xC0;
const REG_SYSRANGE_START: u8 = 0x00;
const REG_RESULT_RANGE_STATUS: u8 = 0x14;
const REG_SYSTEM_INTERRUPT_CLEAR: u8 = 0x0B;

const MODEL_ID: u8 = 0xEE;
/// Per-read budget: measurement start + result-ready polling.
const TIMEOUT_MS: u32 = 100;
/// Plausible reading window; outside it the optics are suspect.
const MIN_MM: u16 = 30;
const MAX_MM: u16 = 2000;

pub struct Vl53l0x {
    dev: I2cDev,
}

impl Vl53l0x {
    pub fn open<P: AsRef<Path>>(bus: P) -> Result<Self> {
        let mut dev = I2cDev::open(bus, VL53L0X_ADDR).context("VL53L0X bus")?;

        let model = dev
            .read_reg8(REG_IDENTIFICATION_MODEL_ID)
            .context("VL53L0X model id read")?;
        if model != MODEL_ID {
            bail!("VL53L0X model id {:#04x}, expected {:#04x}", model, MODEL_ID);
        }

        // Minimal single-shot bring-up.
        let init = (|| -> std::io::Result<()> {
            dev.write_reg8(0x88, 0x00)?;
            dev.write_reg8(0x80, 0x01)?;
            dev.write_reg8(0xFF, 0x01)?;
            dev.write_reg8(0x00, 0x00)?;
            thread::sleep(Duration::from_millis(10));
            dev.write_reg8(0x00, 0x01)?;
            dev.write_reg8(0xFF, 0x00)?;
            dev.write_reg8(0x80, 0x00)
        })();
        init.context("VL53L0X init sequence")?;

        info!("VL53L0X ready (model id {:#04x})", model);
        Ok(Self { dev })
    }

    fn poll_bit(&mut self, reg: u8, want_set: bool) -> S13Result<()> {
        for _ in 0..TIMEOUT_MS {
            let value = self
                .dev
                .read_reg8(reg)
                .map_err(|_| S13Error::BusWrite)?;
            if (value & 0x01 != 0) == want_set {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(1));
        }
        Err(S13Error::RangeTimeout)
    }
}

impl RangeSensor for Vl53l0x {
    fn read_range_mm(&mut self) -> S13Result<u16> {
        // Kick off a single-shot measurement.
        self.dev
            .write_reg8(REG_SYSRANGE_START, 0x01)
            .map_err(|_| S13Error::BusWrite)?;

        // Start bit clears when the measurement begins, then the result
        // flag rises.
        self.poll_bit(REG_SYSRANGE_START, false)?;
        self.poll_bit(REG_RESULT_RANGE_STATUS, true)?;

        let mm = self
            .dev
            .read_reg16(REG_RESULT_RANGE_STATUS + 10)
            .map_err(|_| S13Error::BusWrite)?;

        let _ = self.dev.write_reg8(REG_SYSTEM_INTERRUPT_CLEAR, 0x01);

        if !(MIN_MM..=MAX_MM).contains(&mm) {
            return Err(S13Error::RangeOutOfBounds);
        }
        Ok(mm)
    }
}
