//! Zone-wise obstacle analysis over the latest scan picture.
//!
//! Pure policy: it reads the scan history and returns a reaction; acting
//! on it (gait changes, eye mood) is the caller's business.

use crate::controller::ScanController;

/// The scan servo frame puts "straight ahead" at 90°; zone math runs in
/// the centered frame.
const FORWARD_DEG: i32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warn_mm: i32,
    pub stop_mm: i32,
    pub critical_mm: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_mm: 400,
            stop_mm: 200,
            critical_mm: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Left,
    Front,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    SlowDown,
    TurnLeft,
    TurnRight,
    Stop,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reaction {
    pub detected: bool,
    pub zone: Option<Zone>,
    pub distance_mm: i32,
    /// 0.3 (just inside warn range) up to 1.0 (inside critical range).
    pub severity: f32,
    pub action: Action,
}

impl Reaction {
    pub const CLEAR: Reaction = Reaction {
        detected: false,
        zone: None,
        distance_mm: 0,
        severity: 0.0,
        action: Action::None,
    };
}

pub struct ObstaclePolicy {
    thresholds: Thresholds,
}

impl ObstaclePolicy {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate the latest scan picture. Readings of -1 (failed samples)
    /// are skipped; an empty or all-clear picture returns
    /// [`Reaction::CLEAR`].
    pub fn evaluate(&self, scan: &ScanController) -> Reaction {
        let mut left_min = i32::MAX;
        let mut front_min = i32::MAX;
        let mut right_min = i32::MAX;

        for p in scan.points() {
            if p.distance_mm <= 0 {
                continue;
            }
            let centered = p.angle_deg - FORWARD_DEG;
            if (-60..-20).contains(&centered) {
                left_min = left_min.min(p.distance_mm);
            } else if (-20..=20).contains(&centered) {
                front_min = front_min.min(p.distance_mm);
            } else if (21..=60).contains(&centered) {
                right_min = right_min.min(p.distance_mm);
            }
        }

        let closest = left_min.min(front_min).min(right_min);
        if closest >= self.thresholds.warn_mm {
            return Reaction::CLEAR;
        }

        let severity = self.severity_for(closest);

        let (zone, action) = if front_min == closest {
            let action = if closest <= self.thresholds.critical_mm {
                Action::Backup
            } else if closest <= self.thresholds.stop_mm {
                Action::Stop
            } else {
                Action::SlowDown
            };
            (Zone::Front, action)
        } else if left_min < right_min {
            // Obstacle on the left: turn away to the right.
            (Zone::Left, Action::TurnRight)
        } else {
            (Zone::Right, Action::TurnLeft)
        };

        Reaction {
            detected: true,
            zone: Some(zone),
            distance_mm: closest,
            severity,
            action,
        }
    }

    /// Piecewise-linear severity over the three bands:
    /// critical → 1.0, stop..critical → 0.7..1.0, warn..stop → 0.3..0.7.
    fn severity_for(&self, closest_mm: i32) -> f32 {
        let t = &self.thresholds;
        if closest_mm <= t.critical_mm {
            1.0
        } else if closest_mm <= t.stop_mm {
            let span = (t.stop_mm - t.critical_mm) as f32;
            0.7 + 0.3 * (1.0 - (closest_mm - t.critical_mm) as f32 / span)
        } else {
            let span = (t.warn_mm - t.stop_mm) as f32;
            0.3 + 0.4 * (1.0 - (closest_mm - t.stop_mm) as f32 / span)
        }
    }
}

impl Default for ObstaclePolicy {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
