//! Time-linear pose interpolation, float or Q16.16 fixed-point.

use s13_core::limits::{CHANNELS, MOTION_TICK_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpMode {
    Float,
    Q16,
}

#[derive(Debug)]
pub struct Interpolator {
    start_us: [u16; CHANNELS],
    target_us: [u16; CHANNELS],
    duration_ms: u32,
    elapsed_ms: u32,
    mode: InterpMode,
    active: bool,
}

impl Interpolator {
    pub fn new() -> Self {
        Self {
            start_us: [0; CHANNELS],
            target_us: [0; CHANNELS],
            duration_ms: 1,
            elapsed_ms: 0,
            mode: InterpMode::Float,
            active: false,
        }
    }

    /// Capture start and target and reset elapsed time. A zero duration
    /// is bumped to 1 ms so the factor math never divides by zero (the
    /// first tick then completes immediately).
    pub fn start(
        &mut self,
        current_us: &[u16; CHANNELS],
        target_us: &[u16; CHANNELS],
        duration_ms: u32,
        mode: InterpMode,
    ) {
        self.start_us = *current_us;
        self.target_us = *target_us;
        self.duration_ms = duration_ms.max(1);
        self.elapsed_ms = 0;
        self.mode = mode;
        self.active = true;
    }

    /// Advance by one 20 ms tick and write the pose into `output_us`.
    /// Returns `true` once the target is reached (output snaps exactly).
    pub fn tick(&mut self, output_us: &mut [u16; CHANNELS]) -> bool {
        if !self.active {
            return true;
        }

        self.elapsed_ms += MOTION_TICK_MS;

        if self.elapsed_ms >= self.duration_ms {
            *output_us = self.target_us;
            self.active = false;
            return true;
        }

        match self.mode {
            InterpMode::Float => {
                let t = self.elapsed_ms as f32 / self.duration_ms as f32;
                for i in 0..CHANNELS {
                    let start = self.start_us[i] as f32;
                    let target = self.target_us[i] as f32;
                    output_us[i] = (start + (target - start) * t) as u16;
                }
            }
            InterpMode::Q16 => {
                // Widened to 64-bit for the shift; elapsed < duration, so
                // the factor itself always fits 16.16.
                let t_q16 = (((self.elapsed_ms as u64) << 16) / self.duration_ms as u64) as i32;
                for i in 0..CHANNELS {
                    let start = self.start_us[i] as i32;
                    let delta = self.target_us[i] as i32 - start;
                    output_us[i] = (start + ((delta * t_q16) >> 16)) as u16;
                }
            }
        }

        false
    }

    /// Freeze at the current output; no further updates.
    pub fn abort(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}
