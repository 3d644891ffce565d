//! The 50 Hz motion loop body.
//!
//! Per tick, in order: drain the ring (bounded by the slot count),
//! apply each validated packet, observe the watchdog, advance the
//! interpolator, refresh every PWM channel. The caller owns the absolute
//! 20 ms deadline; nothing in here blocks or unwinds.

use alloc::boxed::Box;

use log::{debug, warn};
use s13_core::limits::{clamp_us, CHANNELS, PWM_NEUTRAL_US};
use s13_core::packet::flag;
use s13_core::{Fault, FaultFlags, PosePacket, S13Error};
use s13_hal::PwmSink;
use s13_ring::{RingConsumer, RING_SLOTS, SLOT_SIZE};
use s13_safety::{Watchdog, WatchdogState};

use crate::interpolator::{InterpMode, Interpolator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Moving,
    Hold,
    Estop,
}

impl MotionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Moving => "MOVING",
            Self::Hold => "HOLD",
            Self::Estop => "ESTOP",
        }
    }
}

/// What one tick did, for the dispatcher (ack + stats).
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub accepted: u32,
    pub dropped: u32,
    pub read_idx: u32,
    pub state: MotionState,
}

pub struct MotionRuntime<'a> {
    consumer: RingConsumer<'a>,
    pwm: Box<dyn PwmSink>,
    interp: Interpolator,
    current_us: [u16; CHANNELS],
    state: MotionState,
    last_seq: u32,
    rx_count: u32,
    drop_count: u32,
}

impl<'a> MotionRuntime<'a> {
    pub fn new(consumer: RingConsumer<'a>, mut pwm: Box<dyn PwmSink>) -> Self {
        pwm.wake();
        Self {
            consumer,
            pwm,
            interp: Interpolator::new(),
            current_us: [PWM_NEUTRAL_US; CHANNELS],
            state: MotionState::Idle,
            last_seq: 0,
            rx_count: 0,
            drop_count: 0,
        }
    }

    /// One 20 ms tick.
    pub fn tick(&mut self, watchdog: &Watchdog, faults: &FaultFlags, now_ms: u64) -> TickReport {
        // 1. DRAIN (at most RING_SLOTS packets per tick)
        let mut batch = [[0u8; SLOT_SIZE]; RING_SLOTS];
        let mut pending = 0usize;
        self.consumer.drain(|bytes| {
            batch[pending].copy_from_slice(bytes);
            pending += 1;
        });

        let mut accepted = 0;
        for slot in batch.iter().take(pending) {
            if self.apply_packet(slot, watchdog, faults, now_ms) {
                accepted += 1;
            }
        }

        // 2. WATCHDOG OBSERVATION
        match watchdog.state() {
            WatchdogState::Estop => {
                if self.state != MotionState::Estop {
                    warn!("watchdog ESTOP observed, forcing safe pose");
                    self.enter_estop();
                }
            }
            WatchdogState::Timeout | WatchdogState::Hold => {
                if self.state != MotionState::Estop && self.state != MotionState::Hold {
                    debug!("watchdog {:?}, freezing pose", watchdog.state());
                    self.state = MotionState::Hold;
                }
            }
            WatchdogState::Normal => {
                if self.state == MotionState::Estop {
                    // The latch was released by the out-of-band clear.
                    self.state = MotionState::Idle;
                    self.consumer.set_estop(false);
                }
            }
        }

        // 3. INTERPOLATE
        if self.state == MotionState::Moving && self.interp.tick(&mut self.current_us) {
            self.state = MotionState::Idle;
        }

        // 4. OUTPUT (every channel, every tick: refresh + position hold)
        for (ch, us) in self.current_us.iter().enumerate() {
            self.pwm.set_channel_us(ch as u8, *us);
        }

        TickReport {
            accepted,
            dropped: pending as u32 - accepted,
            read_idx: self.consumer.ring().read_idx(),
            state: self.state,
        }
    }

    /// Validate one slot and feed it through the state machine. Returns
    /// whether the packet was accepted.
    fn apply_packet(
        &mut self,
        bytes: &[u8],
        watchdog: &Watchdog,
        faults: &FaultFlags,
        now_ms: u64,
    ) -> bool {
        let pkt = match PosePacket::decode(bytes) {
            Ok(pkt) => pkt,
            Err(err) => {
                match err {
                    S13Error::BadMagic => faults.set(Fault::PktMagic),
                    S13Error::BadVersion => faults.set(Fault::PktVersion),
                    S13Error::BadCrc => faults.set(Fault::PktCrc),
                    S13Error::Truncated => faults.set(Fault::IpcSize),
                    _ => {}
                }
                self.drop_count += 1;
                return false;
            }
        };

        // Stale or replayed sequence: drop without feeding the watchdog.
        // last_seq == 0 means "no history" (fresh boot on this side).
        if self.last_seq != 0 && pkt.seq <= self.last_seq {
            self.drop_count += 1;
            return false;
        }
        self.last_seq = pkt.seq;
        self.rx_count += 1;

        // ESTOP has absolute priority and never counts as a heartbeat.
        if pkt.flags & flag::ESTOP != 0 {
            self.enter_estop();
            watchdog.signal_estop(faults);
            return true;
        }

        watchdog.feed(faults, now_ms);

        // Latched: packets keep parsing (and feeding), the state machine
        // ignores them until the latch is cleared.
        if self.state == MotionState::Estop {
            return true;
        }

        if pkt.flags & flag::HOLD != 0 {
            self.state = MotionState::Hold;
            return true;
        }

        let mut target = [0u16; CHANNELS];
        let mut clamped = false;
        for (out, us) in target.iter_mut().zip(pkt.servo_us) {
            *out = clamp_us(us);
            clamped |= *out != us;
        }
        if clamped {
            faults.set(Fault::ServoClamped);
        }

        let mode = if pkt.flags & flag::INTERP_Q16 != 0 {
            InterpMode::Q16
        } else {
            InterpMode::Float
        };
        self.interp.start(&self.current_us, &target, pkt.t_ms, mode);
        self.state = MotionState::Moving;
        true
    }

    fn enter_estop(&mut self) {
        self.state = MotionState::Estop;
        self.interp.abort();
        self.current_us = [PWM_NEUTRAL_US; CHANNELS];
        self.consumer.set_estop(true);
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn current_us(&self) -> &[u16; CHANNELS] {
        &self.current_us
    }

    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    pub fn rx_count(&self) -> u32 {
        self.rx_count
    }

    pub fn drop_count(&self) -> u32 {
        self.drop_count
    }

    /// Put the outputs to sleep and clear MUSCLE_READY on the way out.
    pub fn shutdown(self) {
        let Self {
            consumer, mut pwm, ..
        } = self;
        pwm.sleep();
        consumer.detach();
    }
}
