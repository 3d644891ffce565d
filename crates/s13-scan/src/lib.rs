#![no_std]
#![forbid(unsafe_code)]

//! Scan head: autonomous sweep of the ranging servo (CH12) plus the
//! obstacle policy that reads the collected picture.

extern crate alloc;

mod controller;
mod obstacle;

pub use controller::{ScanController, ScanIo, ScanPoint, ScanProfile};
pub use obstacle::{Action, ObstaclePolicy, Reaction, Thresholds, Zone};
