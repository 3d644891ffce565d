#![no_std]
#![forbid(unsafe_code)]

//! Muscle-side motion processing.
//!
//! [`Interpolator`] ramps between poses at the 50 Hz tick, and
//! [`MotionRuntime`] is the loop body around it: drain the shared ring,
//! validate and clamp, interpolate, refresh every PWM channel, once per
//! 20 ms tick.

extern crate alloc;

mod interpolator;
mod runtime;

pub use interpolator::{InterpMode, Interpolator};
pub use runtime::{MotionRuntime, MotionState, TickReport};
