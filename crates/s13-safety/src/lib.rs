#![no_std]
#![forbid(unsafe_code)]

//! Heartbeat watchdog.
//!
//! Runs as an independent high-priority task on the muscle side and
//! watches the time since the last feed. The motion runtime never calls
//! into it beyond `feed`/`state`; escalation happens by the runtime
//! *observing* the atomic state on its own tick, which keeps the
//! watchdog free of references to the components it protects.
//!
//! - no feed for 250 ms  → TIMEOUT, then HOLD (freeze at current pose)
//! - `signal_estop`      → ESTOP, latched
//! - `clear_estop`       → back to NORMAL only while heartbeats are fresh

extern crate alloc;

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use log::warn;
use s13_core::limits::HEARTBEAT_TIMEOUT_MS;
use s13_core::{Fault, FaultFlags, S13Error, S13Result};

/// Check 4x per timeout window.
pub const WATCHDOG_PERIOD_MS: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchdogState {
    /// Heartbeats arriving normally.
    Normal = 0,
    /// Timeout detected this window.
    Timeout = 1,
    /// Holding position because heartbeats stopped.
    Hold = 2,
    /// Emergency stop, latched.
    Estop = 3,
}

impl WatchdogState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Normal,
            1 => Self::Timeout,
            2 => Self::Hold,
            _ => Self::Estop,
        }
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

pub struct Watchdog {
    state: AtomicU8,
    last_feed_ms: AtomicU64,
    timeout_ms: u64,
    on_timeout: Option<Hook>,
    on_estop: Option<Hook>,
}

impl Watchdog {
    pub fn new(now_ms: u64) -> Self {
        Self {
            state: AtomicU8::new(WatchdogState::Normal as u8),
            last_feed_ms: AtomicU64::new(now_ms),
            timeout_ms: HEARTBEAT_TIMEOUT_MS,
            on_timeout: None,
            on_estop: None,
        }
    }

    /// Install notification hooks. Hooks observe, they do not own: the
    /// safe-pose reaction itself belongs to whoever owns the PWM bus.
    pub fn with_hooks(mut self, on_timeout: Option<Hook>, on_estop: Option<Hook>) -> Self {
        self.on_timeout = on_timeout;
        self.on_estop = on_estop;
        self
    }

    /// Record a heartbeat. Recovers TIMEOUT/HOLD back to NORMAL; an ESTOP
    /// latch is never released by feeding alone.
    pub fn feed(&self, faults: &FaultFlags, now_ms: u64) {
        self.last_feed_ms.store(now_ms, Ordering::SeqCst);

        match self.state() {
            WatchdogState::Timeout | WatchdogState::Hold => {
                self.set_state(WatchdogState::Normal);
                faults.clear(Fault::HeartbeatTimeout);
            }
            _ => {}
        }
    }

    /// One check pass; call every [`WATCHDOG_PERIOD_MS`].
    pub fn tick(&self, faults: &FaultFlags, now_ms: u64) {
        let state = self.state();
        if state == WatchdogState::Estop {
            return;
        }

        let elapsed = now_ms.saturating_sub(self.last_feed_ms.load(Ordering::SeqCst));
        if elapsed <= self.timeout_ms {
            return;
        }

        if state == WatchdogState::Normal {
            self.set_state(WatchdogState::Timeout);
            faults.set(Fault::HeartbeatTimeout);
            warn!("heartbeat lost for {} ms, entering TIMEOUT", elapsed);
            if let Some(hook) = &self.on_timeout {
                hook();
            }
        }

        // TIMEOUT escalates to HOLD on the same pass; the motion runtime
        // picks the state up within one of its own ticks.
        if self.state() == WatchdogState::Timeout {
            self.set_state(WatchdogState::Hold);
        }
    }

    /// Latch the emergency stop.
    pub fn signal_estop(&self, faults: &FaultFlags) {
        self.set_state(WatchdogState::Estop);
        faults.set(Fault::EstopActive);
        warn!("ESTOP latched");
        if let Some(hook) = &self.on_estop {
            hook();
        }
    }

    /// Release the latch. Allowed only from ESTOP and only while a feed
    /// within the timeout window proves the brain is alive; otherwise the
    /// latch degrades to HOLD and the call fails.
    pub fn clear_estop(&self, faults: &FaultFlags, now_ms: u64) -> S13Result<()> {
        if self.state() != WatchdogState::Estop {
            return Err(S13Error::InvalidState);
        }

        let elapsed = now_ms.saturating_sub(self.last_feed_ms.load(Ordering::SeqCst));
        if elapsed < self.timeout_ms {
            self.set_state(WatchdogState::Normal);
            faults.clear(Fault::EstopActive);
            Ok(())
        } else {
            self.set_state(WatchdogState::Hold);
            Err(S13Error::HeartbeatStale)
        }
    }

    pub fn state(&self) -> WatchdogState {
        WatchdogState::from_raw(self.state.load(Ordering::SeqCst))
    }

    pub fn is_motion_allowed(&self) -> bool {
        self.state() == WatchdogState::Normal
    }

    pub fn ms_since_feed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_feed_ms.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WatchdogState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}
