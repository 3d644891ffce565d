//! PCA9685 16-channel PWM controller.
//!
//! Best-effort by contract: a transient bus failure records I2C_ERROR
//! and the loop carries on. The next 20 ms refresh retries anyway.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use s13_core::limits::clamp_us;
use s13_core::{Fault, FaultFlags};
use s13_hal::PwmSink;

use crate::i2c::I2cDev;

pub const PCA9685_ADDR: u16 = 0x40;

const REG_MODE1: u8 = 0x00;
const REG_LED0_ON_L: u8 = 0x06;
const REG_ALL_LED_ON_L: u8 = 0xFA;
const REG_PRESCALE: u8 = 0xFE;

const MODE1_SLEEP: u8 = 0x10;
const MODE1_AI: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;

/// 25 MHz oscillator / (4096 steps × 50 Hz) - 1.
const PRESCALE_50HZ: u8 = 121;
/// One PWM frame at 50 Hz.
const FRAME_US: u32 = 20_000;

pub struct Pca9685 {
    dev: I2cDev,
    faults: Arc<FaultFlags>,
}

impl Pca9685 {
    pub fn open<P: AsRef<Path>>(bus: P, faults: Arc<FaultFlags>) -> Result<Self> {
        let mut dev = I2cDev::open(bus, PCA9685_ADDR).context("PCA9685 bus")?;

        // 50 Hz setup: sleep, program the prescaler, wake with
        // auto-increment, then restart the outputs.
        let init = (|| -> std::io::Result<()> {
            dev.write_reg8(REG_MODE1, MODE1_SLEEP)?;
            dev.write_reg8(REG_PRESCALE, PRESCALE_50HZ)?;
            dev.write_reg8(REG_MODE1, MODE1_AI)?;
            thread::sleep(Duration::from_micros(500));
            dev.write_reg8(REG_MODE1, MODE1_AI | MODE1_RESTART)
        })();

        if let Err(err) = init {
            faults.set(Fault::PcaInit);
            return Err(err).context("PCA9685 init sequence");
        }

        info!("PCA9685 ready at {:#04x}, 50 Hz frame", PCA9685_ADDR);
        Ok(Self { dev, faults })
    }

    fn counts_for(us: u16) -> u16 {
        // 12-bit duty within the 20 ms frame.
        (clamp_us(us) as u32 * 4096 / FRAME_US) as u16
    }

    fn write_counts(&mut self, base_reg: u8, counts: u16) {
        let block = [0x00, 0x00, (counts & 0xFF) as u8, (counts >> 8) as u8];
        if let Err(err) = self.dev.write_block(base_reg, &block) {
            self.faults.set(Fault::I2cError);
            warn!("PWM write failed: {}", err);
        }
    }
}

impl PwmSink for Pca9685 {
    fn set_channel_us(&mut self, channel: u8, us: u16) {
        if channel >= 16 {
            return;
        }
        let counts = Self::counts_for(us);
        self.write_counts(REG_LED0_ON_L + channel * 4, counts);
    }

    fn set_all_us(&mut self, us: u16) {
        let counts = Self::counts_for(us);
        self.write_counts(REG_ALL_LED_ON_L, counts);
    }

    fn sleep(&mut self) {
        if let Err(err) = self.dev.write_reg8(REG_MODE1, MODE1_AI | MODE1_SLEEP) {
            self.faults.set(Fault::I2cError);
            warn!("PWM sleep failed: {}", err);
        }
    }

    fn wake(&mut self) {
        if let Err(err) = self.dev.write_reg8(REG_MODE1, MODE1_AI) {
            self.faults.set(Fault::I2cError);
            warn!("PWM wake failed: {}", err);
        }
    }
}
