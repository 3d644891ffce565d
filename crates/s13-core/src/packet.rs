//! PosePacket - the binary motion packet (brain → muscle).
//!
//! Layout (42 bytes, little-endian):
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0      2    magic (0xB31A)
//!   2      1    ver_major (3)
//!   3      1    ver_minor (1)
//!   4      4    seq (monotonic, 0 reserved for "uninitialized")
//!   8      4    t_ms (interpolation time to target)
//!  12      2    flags
//!  14     26    servo_us[13] (CH0-12)
//!  40      2    crc16 over bytes 0..40 (CRC-16/CCITT-FALSE)
//! ```

use crate::crc::crc16;
use crate::limits::{CHANNELS, PWM_NEUTRAL_US};
use crate::{S13Error, S13Result, POSE_MAGIC, PROTO_VERSION_MAJOR, PROTO_VERSION_MINOR};

pub const POSE_PACKET_SIZE: usize = 42;
const CRC_OFFSET: usize = POSE_PACKET_SIZE - 2;

/// Packet flag bits.
pub mod flag {
    /// Emergency stop. Absolute priority, latches on the consumer.
    pub const ESTOP: u16 = 1 << 0;
    /// Freeze at the current pose.
    pub const HOLD: u16 = 1 << 1;
    /// Set in normal operation; the consumer clamps either way.
    pub const CLAMP_ENABLE: u16 = 1 << 2;
    /// Q16.16 fixed-point interpolation (float when clear).
    pub const INTERP_Q16: u16 = 1 << 3;
    /// Scan head sweep active on CH12.
    pub const SCAN_ENABLE: u16 = 1 << 5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosePacket {
    pub magic: u16,
    pub ver_major: u8,
    pub ver_minor: u8,
    pub seq: u32,
    pub t_ms: u32,
    pub flags: u16,
    pub servo_us: [u16; CHANNELS],
    pub crc16: u16,
}

impl PosePacket {
    /// A neutral packet: all channels at 1500 µs, CLAMP_ENABLE set, CRC
    /// left at zero until [`finalize`](Self::finalize).
    pub fn new(seq: u32) -> Self {
        Self {
            magic: POSE_MAGIC,
            ver_major: PROTO_VERSION_MAJOR,
            ver_minor: PROTO_VERSION_MINOR,
            seq,
            t_ms: 0,
            flags: flag::CLAMP_ENABLE,
            servo_us: [PWM_NEUTRAL_US; CHANNELS],
            crc16: 0,
        }
    }

    /// Compute and store the CRC over the first 40 encoded bytes.
    pub fn finalize(&mut self) {
        let buf = self.encode();
        self.crc16 = crc16(&buf[..CRC_OFFSET]);
    }

    pub fn encode(&self) -> [u8; POSE_PACKET_SIZE] {
        let mut buf = [0u8; POSE_PACKET_SIZE];
        buf[0..2].copy_from_slice(&self.magic.to_le_bytes());
        buf[2] = self.ver_major;
        buf[3] = self.ver_minor;
        buf[4..8].copy_from_slice(&self.seq.to_le_bytes());
        buf[8..12].copy_from_slice(&self.t_ms.to_le_bytes());
        buf[12..14].copy_from_slice(&self.flags.to_le_bytes());
        for (i, us) in self.servo_us.iter().enumerate() {
            let at = 14 + i * 2;
            buf[at..at + 2].copy_from_slice(&us.to_le_bytes());
        }
        buf[CRC_OFFSET..].copy_from_slice(&self.crc16.to_le_bytes());
        buf
    }

    /// Decode and validate magic, version and CRC. Sequence checks are the
    /// dispatcher's job; the codec has no history.
    pub fn decode(buf: &[u8]) -> S13Result<Self> {
        if buf.len() < POSE_PACKET_SIZE {
            return Err(S13Error::Truncated);
        }

        let magic = u16::from_le_bytes([buf[0], buf[1]]);
        if magic != POSE_MAGIC {
            return Err(S13Error::BadMagic);
        }

        let (ver_major, ver_minor) = (buf[2], buf[3]);
        if ver_major != PROTO_VERSION_MAJOR || ver_minor != PROTO_VERSION_MINOR {
            return Err(S13Error::BadVersion);
        }

        let stored_crc = u16::from_le_bytes([buf[CRC_OFFSET], buf[CRC_OFFSET + 1]]);
        if crc16(&buf[..CRC_OFFSET]) != stored_crc {
            return Err(S13Error::BadCrc);
        }

        let mut servo_us = [0u16; CHANNELS];
        for (i, us) in servo_us.iter_mut().enumerate() {
            let at = 14 + i * 2;
            *us = u16::from_le_bytes([buf[at], buf[at + 1]]);
        }

        Ok(Self {
            magic,
            ver_major,
            ver_minor,
            seq: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            t_ms: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            flags: u16::from_le_bytes([buf[12], buf[13]]),
            servo_us,
            crc16: stored_crc,
        })
    }
}

// 2 + 1 + 1 + 4 + 4 + 2 + 13*2 + 2
const _: () = assert!(POSE_PACKET_SIZE == 14 + CHANNELS * 2 + 2);
