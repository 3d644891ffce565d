//! Servo hard limits and the mandatory clamp.
//!
//! The muscle side enforces these ALWAYS, regardless of what the producer
//! put on the wire.

/// Servo PWM hard clamps (µs).
pub const PWM_MIN_US: u16 = 500;
pub const PWM_MAX_US: u16 = 2500;
pub const PWM_NEUTRAL_US: u16 = 1500;

/// Servo angle soft limits. Tightened from the mechanical 20-160° sweep to
/// leave ~35 µs of margin before the PWM clamps engage.
pub const ANGLE_MIN_DEG: i32 = 25;
pub const ANGLE_MAX_DEG: i32 = 155;
pub const ANGLE_CENTER_DEG: i32 = 90;

/// Channel allocation: 8 leg servos, 4 auxiliary, 1 scan head.
pub const LEG_CHANNELS: usize = 8;
pub const CHANNELS: usize = 13;
pub const SCAN_CHANNEL: usize = 12;

/// Timing limits.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 250;
pub const HEARTBEAT_INTERVAL_MS: u64 = 100;
pub const MOTION_UPDATE_HZ: u32 = 50;
pub const MOTION_TICK_MS: u32 = 1000 / MOTION_UPDATE_HZ;

/// Saturating clamp into [PWM_MIN_US, PWM_MAX_US]. No failure path.
#[inline]
pub fn clamp_us(us: u16) -> u16 {
    us.clamp(PWM_MIN_US, PWM_MAX_US)
}

/// Linear angle → pulse mapping: 0° = 500 µs, 90° = 1500 µs, 180° = 2500 µs.
/// The result is clamped to the PWM hard limits.
#[inline]
pub fn angle_to_us(angle_deg: i32) -> u16 {
    let us = 500 + angle_deg * 2000 / 180;
    clamp_us(us.clamp(0, u16::MAX as i32) as u16)
}

/// Inverse of [`angle_to_us`], exact to within 1° over the servo range.
#[inline]
pub fn us_to_angle(us: u16) -> i32 {
    (clamp_us(us) as i32 - 500) * 180 / 2000
}
