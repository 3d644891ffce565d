#![no_std]
#![forbid(unsafe_code)]

//! Capability traits.
//!
//! Every external dependency of the control plane (PWM chip, range sensor,
//! cross-domain doorbell, wall clock, eye display link) is one small trait
//! here. Components take capability handles at construction and stay
//! ignorant of the device behind them; `s13-linux` provides the real
//! devices, tests provide mocks.

use s13_core::{S13Error, S13Result};

/// The 16-channel PWM peripheral (muscle side).
///
/// The bus is best-effort: implementations MUST clamp pulse widths, MUST
/// NOT panic on transient bus failures, and record trouble in the fault
/// flags instead of surfacing it per call.
pub trait PwmSink: Send {
    fn set_channel_us(&mut self, channel: u8, us: u16);
    fn set_all_us(&mut self, us: u16);
    /// Put the oscillator to sleep (outputs off).
    fn sleep(&mut self);
    fn wake(&mut self);
}

/// Time-of-flight range sensor (scan head).
pub trait RangeSensor: Send {
    /// Single-shot measurement. Bounded by an implementation timeout
    /// (100 ms in the reference device).
    ///
    /// # Returns
    /// * `Ok(mm)` - distance in millimetres
    /// * `Err(RangeTimeout | RangeOutOfBounds | BusWrite | NotInitialized)`
    fn read_range_mm(&mut self) -> S13Result<u16>;
}

/// Doorbell command ids on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DoorbellCmd {
    Heartbeat = 0x10,
    MotionPacket = 0x20,
    MotionAck = 0x21,
    Estop = 0x23,
}

impl DoorbellCmd {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x10 => Some(Self::Heartbeat),
            0x20 => Some(Self::MotionPacket),
            0x21 => Some(Self::MotionAck),
            0x23 => Some(Self::Estop),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// ESTOP doorbell params: engage vs. clear (the out-of-band clear command).
pub const ESTOP_ENGAGE: u32 = 0;
pub const ESTOP_CLEAR: u32 = 1;

/// Cross-domain notification, producer side.
///
/// Every `notify` delivers at most one wake-up to the peer. Lost wake-ups
/// are tolerated by design: ring drains are idempotent and the 100 ms
/// heartbeat bounds the resynchronization delay.
pub trait Doorbell: Send {
    fn notify(&mut self, cmd: DoorbellCmd, param: u32) -> S13Result<()>;
}

/// Cross-domain notification, consumer side.
pub trait DoorbellWaiter: Send {
    /// Non-blocking poll for the next pending event.
    fn poll(&mut self) -> nb::Result<(DoorbellCmd, u32), S13Error>;
}

/// Monotonic time source. Implementations must never go backwards.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Link to the eye display service. Fire-and-forget: implementations drop
/// events while the service is unreachable.
pub trait EyeSink: Send {
    fn send_event(&mut self, json_line: &str);
}
