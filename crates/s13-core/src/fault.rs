//! Sticky fault bits for diagnostics and safety monitoring.
//!
//! Subsystems set bits as they hit trouble; telemetry and the safety layer
//! query them. Word-sized atomic, fetch-or / fetch-and updates only.

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Fault {
    PcaInit = 1 << 0,
    QueueCreate = 1 << 1,
    IpcSize = 1 << 2,
    PktMagic = 1 << 3,
    PktVersion = 1 << 4,
    PktCrc = 1 << 5,
    HeartbeatTimeout = 1 << 6,
    /// A value was clamped on the way out. Informational, not an error.
    ServoClamped = 1 << 7,
    I2cError = 1 << 8,
    EstopActive = 1 << 9,
}

#[derive(Debug, Default)]
pub struct FaultFlags(AtomicU32);

impl FaultFlags {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn set(&self, fault: Fault) {
        self.0.fetch_or(fault as u32, Ordering::SeqCst);
    }

    pub fn clear(&self, fault: Fault) {
        self.0.fetch_and(!(fault as u32), Ordering::SeqCst);
    }

    pub fn is_set(&self, fault: Fault) -> bool {
        self.0.load(Ordering::SeqCst) & fault as u32 != 0
    }

    pub fn all(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear_all(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}
