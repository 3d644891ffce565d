//! Linux-side implementations of the capability traits.
//!
//! All the unsafe fd and register plumbing lives here, behind the traits
//! in `s13-hal`. Nothing above this crate ever touches a raw pointer or
//! an ioctl.

mod clock;
mod console;
mod doorbell;
mod eye;
mod i2c;
mod pwm;
mod range;
mod region;
mod serial;

pub use clock::MonotonicClock;
pub use console::TcpConsole;
pub use doorbell::{CmdquDoorbell, FifoDoorbell, FifoDoorbellWaiter};
pub use eye::UnixEyeSink;
pub use pwm::Pca9685;
pub use range::Vl53l0x;
pub use region::MappedRing;
pub use serial::SerialPort;
