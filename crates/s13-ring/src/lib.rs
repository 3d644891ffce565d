#![no_std]
#![forbid(unsafe_code)]

//! Shared-memory ring buffer for brain → muscle motion packets.
//!
//! One [`MotionRing`] lives in a physical memory window both domains map.
//! The layout is fixed at 528 bytes:
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │ write_idx (4)   - brain writes         │
//! │ read_idx  (4)   - muscle writes        │
//! │ flags     (4)   - status bits          │
//! │ reserved  (4)                          │
//! │ slots[8][64]    - one packet per slot  │
//! └────────────────────────────────────────┘
//! ```
//!
//! Both indices are monotonic counters; the slot is `idx % 8`. Full iff
//! `write - read == 8`, empty iff `write == read`.
//!
//! Concurrency contract (the only one between the two domains): the
//! producer makes the slot contents visible before publishing the new
//! `write_idx` (release), and the consumer acquires the index before
//! touching slot bytes. Slot words are plain relaxed atomics; the fences
//! around the index hand-off carry the ordering.

use core::sync::atomic::{fence, AtomicU32, Ordering};

use s13_core::{PosePacket, S13Error, S13Result};

pub const RING_SLOTS: usize = 8;
pub const SLOT_SIZE: usize = 64;
const SLOT_WORDS: usize = SLOT_SIZE / 4;

/// Header plus slots. The mapped window must be at least this large.
pub const RING_BYTES: usize = 16 + RING_SLOTS * SLOT_SIZE;

/// Status bits in the ring header. Ownership is partitioned: the brain
/// writes BRAIN_READY and OVERFLOW, the muscle writes MUSCLE_READY and
/// ESTOP.
pub mod status {
    pub const BRAIN_READY: u32 = 1 << 0;
    pub const MUSCLE_READY: u32 = 1 << 1;
    pub const ESTOP: u32 = 1 << 2;
    pub const OVERFLOW: u32 = 1 << 3;
}

/// The shared region, viewed as typed atomics. Neither side ever sees a
/// raw pointer to this memory outside the platform crate that maps it.
#[repr(C)]
pub struct MotionRing {
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    flags: AtomicU32,
    reserved: AtomicU32,
    slots: [[AtomicU32; SLOT_WORDS]; RING_SLOTS],
}

const _: () = assert!(core::mem::size_of::<MotionRing>() == RING_BYTES);

impl MotionRing {
    pub const fn new() -> Self {
        Self {
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            reserved: AtomicU32::new(0),
            slots: [const { [const { AtomicU32::new(0) }; SLOT_WORDS] }; RING_SLOTS],
        }
    }

    pub fn write_idx(&self) -> u32 {
        self.write_idx.load(Ordering::Acquire)
    }

    pub fn read_idx(&self) -> u32 {
        self.read_idx.load(Ordering::Acquire)
    }

    pub fn status(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn available(&self) -> u32 {
        self.write_idx().wrapping_sub(self.read_idx())
    }

    pub fn is_full(&self) -> bool {
        self.available() >= RING_SLOTS as u32
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }
}

impl Default for MotionRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Brain-side handle. Exclusive writer of `write_idx`, the slot bytes and
/// the BRAIN_READY / OVERFLOW status bits.
pub struct RingProducer<'a> {
    ring: &'a MotionRing,
}

impl<'a> RingProducer<'a> {
    /// Attach and run the startup protocol: zero the whole region, then
    /// announce BRAIN_READY. The muscle side tolerates the reset because
    /// its own `last_seq` restarts from the wire, not from the indices.
    pub fn attach(ring: &'a MotionRing) -> Self {
        for slot in &ring.slots {
            for word in slot {
                word.store(0, Ordering::Relaxed);
            }
        }
        ring.write_idx.store(0, Ordering::Relaxed);
        ring.read_idx.store(0, Ordering::Relaxed);
        ring.reserved.store(0, Ordering::Relaxed);
        ring.flags.store(status::BRAIN_READY, Ordering::Release);
        Self { ring }
    }

    /// Write one packet into the next free slot and publish it.
    ///
    /// On a full ring the OVERFLOW status bit is set (sticky until
    /// [`clear_overflow`](Self::clear_overflow)) and the packet is the
    /// caller's to drop.
    pub fn try_push(&mut self, pkt: &PosePacket) -> S13Result<u32> {
        let write = self.ring.write_idx.load(Ordering::Relaxed);
        let read = self.ring.read_idx.load(Ordering::Acquire);

        if write.wrapping_sub(read) >= RING_SLOTS as u32 {
            self.ring.flags.fetch_or(status::OVERFLOW, Ordering::Release);
            return Err(S13Error::RingFull);
        }

        let slot = &self.ring.slots[write as usize % RING_SLOTS];
        let bytes = pkt.encode();
        for (i, word) in slot.iter().enumerate() {
            let mut chunk = [0u8; 4];
            let at = i * 4;
            if at < bytes.len() {
                let n = (bytes.len() - at).min(4);
                chunk[..n].copy_from_slice(&bytes[at..at + n]);
            }
            word.store(u32::from_le_bytes(chunk), Ordering::Relaxed);
        }

        // Slot bytes must be visible before the index moves.
        fence(Ordering::Release);
        let published = write.wrapping_add(1);
        self.ring.write_idx.store(published, Ordering::Release);
        Ok(published)
    }

    pub fn overflowed(&self) -> bool {
        self.ring.status() & status::OVERFLOW != 0
    }

    pub fn clear_overflow(&mut self) {
        self.ring.flags.fetch_and(!status::OVERFLOW, Ordering::Release);
    }

    pub fn muscle_ready(&self) -> bool {
        self.ring.status() & status::MUSCLE_READY != 0
    }

    pub fn ring(&self) -> &MotionRing {
        self.ring
    }

    /// Clear BRAIN_READY on the way out.
    pub fn detach(self) {
        self.ring
            .flags
            .fetch_and(!status::BRAIN_READY, Ordering::Release);
    }
}

/// Muscle-side handle. Exclusive writer of `read_idx` and the
/// MUSCLE_READY / ESTOP status bits.
pub struct RingConsumer<'a> {
    ring: &'a MotionRing,
}

impl<'a> RingConsumer<'a> {
    pub fn attach(ring: &'a MotionRing) -> Self {
        ring.flags.fetch_or(status::MUSCLE_READY, Ordering::Release);
        Self { ring }
    }

    /// Deliver every pending slot to `f` and advance `read_idx` past it.
    ///
    /// `write_idx` is snapshotted once, which bounds a single drain at the
    /// slot count. Draining is idempotent over `[read_idx, write_idx)`, so
    /// a stale or duplicated doorbell wake-up is harmless.
    pub fn drain<F: FnMut(&[u8])>(&mut self, mut f: F) -> u32 {
        let write = self.ring.write_idx.load(Ordering::Acquire);
        let mut read = self.ring.read_idx.load(Ordering::Relaxed);
        let mut delivered = 0;

        while read != write {
            // Pair with the producer's release fence before slot reads.
            fence(Ordering::Acquire);
            let slot = &self.ring.slots[read as usize % RING_SLOTS];
            let mut bytes = [0u8; SLOT_SIZE];
            for (i, word) in slot.iter().enumerate() {
                bytes[i * 4..i * 4 + 4]
                    .copy_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
            }

            f(&bytes);

            read = read.wrapping_add(1);
            self.ring.read_idx.store(read, Ordering::Release);
            delivered += 1;
        }

        delivered
    }

    pub fn set_estop(&mut self, active: bool) {
        if active {
            self.ring.flags.fetch_or(status::ESTOP, Ordering::Release);
        } else {
            self.ring.flags.fetch_and(!status::ESTOP, Ordering::Release);
        }
    }

    pub fn brain_ready(&self) -> bool {
        self.ring.status() & status::BRAIN_READY != 0
    }

    pub fn ring(&self) -> &MotionRing {
        self.ring
    }

    /// Clear MUSCLE_READY on the way out.
    pub fn detach(self) {
        self.ring
            .flags
            .fetch_and(!status::MUSCLE_READY, Ordering::Release);
    }
}
