#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

pub mod crc;
pub mod fault;
pub mod limits;
pub mod packet;

pub use fault::{Fault, FaultFlags};
pub use packet::{flag, PosePacket, POSE_PACKET_SIZE};

/// Protocol tag carried by every pose packet.
pub const POSE_MAGIC: u16 = 0xB31A;
pub const PROTO_VERSION_MAJOR: u8 = 3;
pub const PROTO_VERSION_MINOR: u8 = 1;

pub type S13Result<T> = Result<T, S13Error>;

/// Error kinds for every fallible core operation.
///
/// The RT loop never unwinds; each variant maps to a local outcome
/// (drop the packet, set a fault bit, refuse the command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S13Error {
    // Protocol
    BadMagic,
    BadVersion,
    BadCrc,
    StaleSeq,
    Truncated,
    // Transport
    RingFull,
    DoorbellSend,
    BusWrite,
    // Range sensor
    RangeTimeout,
    RangeOutOfBounds,
    NotInitialized,
    // Safety
    InvalidState,
    HeartbeatStale,
    // Configuration / surfaces
    MissingSequence,
    Config,
}

impl core::fmt::Display for S13Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for S13Error {}
