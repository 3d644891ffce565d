//! Bidirectional sweep with dwell-and-sample.
//!
//! The controller owns only angles and timing; pointing the servo and
//! reading the ranger go through the [`ScanIo`] capabilities handed to
//! each call. One reading is kept per discrete angle (the most recent).

use alloc::collections::BTreeMap;

use log::{debug, info};

/// Sweep parameters. Angles are in the servo frame (90° = straight ahead).
#[derive(Debug, Clone, Copy)]
pub struct ScanProfile {
    pub min_deg: i32,
    pub max_deg: i32,
    pub step_deg: i32,
    pub rate_hz: u32,
    /// Settle time after commanding an angle, before sampling.
    pub dwell_ms: u64,
}

impl Default for ScanProfile {
    fn default() -> Self {
        Self {
            min_deg: 20,
            max_deg: 160,
            step_deg: 10,
            rate_hz: 5,
            dwell_ms: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPoint {
    pub angle_deg: i32,
    /// -1 records a failed or timed-out reading.
    pub distance_mm: i32,
    pub timestamp_ms: u64,
}

/// Capabilities the sweep needs per tick.
pub trait ScanIo {
    fn point_servo(&mut self, angle_deg: i32);
    /// Distance in mm, or -1 on error (timeout, out of range, bus).
    fn read_range_mm(&mut self) -> i32;
    /// Called once per recorded sample.
    fn on_sample(&mut self, _point: &ScanPoint) {}
}

pub struct ScanController {
    profile: ScanProfile,
    running: bool,
    current_angle: i32,
    direction: i32,
    dwelling: bool,
    last_step_ms: u64,
    dwell_start_ms: u64,
    history: BTreeMap<i32, ScanPoint>,
}

impl ScanController {
    pub fn new(profile: ScanProfile) -> Self {
        Self {
            profile,
            running: false,
            current_angle: 90,
            direction: 1,
            dwelling: false,
            last_step_ms: 0,
            dwell_start_ms: 0,
            history: BTreeMap::new(),
        }
    }

    pub fn profile(&self) -> &ScanProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: ScanProfile) {
        self.profile = profile;
    }

    /// Move to `min_deg` and begin sweeping upward.
    pub fn start(&mut self, now_ms: u64, io: &mut dyn ScanIo) {
        if self.running {
            return;
        }
        self.running = true;
        self.current_angle = self.profile.min_deg;
        self.direction = 1;
        self.history.clear();
        self.last_step_ms = now_ms;

        info!(
            "scan started: {}° to {}°, step {}°, {} Hz",
            self.profile.min_deg, self.profile.max_deg, self.profile.step_deg, self.profile.rate_hz
        );

        io.point_servo(self.current_angle);
        self.dwell_start_ms = now_ms;
        self.dwelling = true;
    }

    /// Stop sweeping and recenter the head.
    pub fn stop(&mut self, io: &mut dyn ScanIo) {
        if !self.running {
            return;
        }
        self.running = false;
        io.point_servo(90);
        self.current_angle = 90;
        info!("scan stopped, {} points collected", self.history.len());
    }

    pub fn tick(&mut self, now_ms: u64, io: &mut dyn ScanIo) {
        if !self.running {
            return;
        }

        if self.dwelling {
            if now_ms.saturating_sub(self.dwell_start_ms) >= self.profile.dwell_ms {
                self.dwelling = false;

                let distance = io.read_range_mm();
                let point = ScanPoint {
                    angle_deg: self.current_angle,
                    distance_mm: distance,
                    timestamp_ms: now_ms,
                };
                self.history.insert(self.current_angle, point);
                io.on_sample(&point);
                debug!("scan {}°: {} mm", self.current_angle, distance);
            }
            return;
        }

        let period_ms = 1000 / self.profile.rate_hz as u64;
        if now_ms.saturating_sub(self.last_step_ms) >= period_ms {
            self.current_angle += self.direction * self.profile.step_deg;

            // Bounce at the limits: snap and reverse, never overshoot.
            // The limit angle itself is visited twice per traversal (once
            // arriving, once turning), interior angles exactly once.
            if self.current_angle > self.profile.max_deg {
                self.current_angle = self.profile.max_deg;
                self.direction = -1;
            } else if self.current_angle < self.profile.min_deg {
                self.current_angle = self.profile.min_deg;
                self.direction = 1;
            }

            io.point_servo(self.current_angle);
            self.dwell_start_ms = now_ms;
            self.dwelling = true;
            self.last_step_ms = now_ms;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_angle(&self) -> i32 {
        self.current_angle
    }

    pub fn points(&self) -> impl Iterator<Item = &ScanPoint> {
        self.history.values()
    }

    pub fn point_count(&self) -> usize {
        self.history.len()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Closest valid reading, as (angle, distance).
    pub fn closest(&self) -> Option<(i32, i32)> {
        self.history
            .values()
            .filter(|p| p.distance_mm > 0)
            .min_by_key(|p| p.distance_mm)
            .map(|p| (p.angle_deg, p.distance_mm))
    }

    /// Reading at `angle_deg`, accepting the nearest sample within
    /// `tolerance_deg`.
    pub fn distance_at(&self, angle_deg: i32, tolerance_deg: i32) -> Option<i32> {
        self.history
            .values()
            .filter(|p| (p.angle_deg - angle_deg).abs() <= tolerance_deg)
            .min_by_key(|p| (p.angle_deg - angle_deg).abs())
            .map(|p| p.distance_mm)
    }

    /// Mean of the valid readings inside a cone around `center_deg`.
    pub fn cone_average(&self, center_deg: i32, cone_width_deg: i32) -> Option<i32> {
        let half = cone_width_deg / 2;
        let mut sum: i64 = 0;
        let mut count: i64 = 0;
        for p in self.history.values() {
            if p.distance_mm > 0 && (p.angle_deg - center_deg).abs() <= half {
                sum += p.distance_mm as i64;
                count += 1;
            }
        }
        (count > 0).then(|| (sum / count) as i32)
    }
}
