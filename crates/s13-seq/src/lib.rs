//! Motion sequence store.
//!
//! Sequences are named, ordered lists of legacy 8-channel pose frames,
//! loaded once at startup from a JSON file:
//!
//! ```json
//! {
//!   "sequences": {
//!     "wave": {
//!       "id": 3,
//!       "description": "front-leg wave",
//!       "frames": [
//!         { "servo_us": [1500, 1600, 1500, 1500, 1500, 1500, 1500, 1500], "t_ms": 200 }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! The store owns the sequences; iterators borrow them read-only.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use s13_core::limits::{CHANNELS, LEG_CHANNELS, PWM_NEUTRAL_US};
use s13_core::{S13Error, S13Result};

/// One legacy pose frame: the 8 leg channels plus a time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionFrame {
    pub servo_us: [u16; LEG_CHANNELS],
    pub t_ms: u32,
}

impl MotionFrame {
    /// Expand to the full 13-channel pose: auxiliary channels and the
    /// scan head stay at neutral.
    pub fn expand(&self) -> [u16; CHANNELS] {
        let mut pose = [PWM_NEUTRAL_US; CHANNELS];
        pose[..LEG_CHANNELS].copy_from_slice(&self.servo_us);
        pose
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionSequence {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub frames: Vec<MotionFrame>,
}

impl MotionSequence {
    pub fn iter(&self) -> SequenceIter<'_> {
        SequenceIter {
            sequence: self,
            index: 0,
        }
    }
}

/// Read-only frame cursor over a borrowed sequence.
#[derive(Debug, Clone)]
pub struct SequenceIter<'a> {
    sequence: &'a MotionSequence,
    index: usize,
}

impl<'a> SequenceIter<'a> {
    pub fn current(&self) -> Option<&'a MotionFrame> {
        self.sequence.frames.get(self.index)
    }

    pub fn advance(&mut self) {
        if self.index < self.sequence.frames.len() {
            self.index += 1;
        }
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.sequence.frames.len()
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.sequence.frames.len()
    }
}

// On-disk shapes. Frames may carry fewer than 8 values; missing channels
// fill with neutral, extras are ignored.
#[derive(Deserialize)]
struct RawFile {
    sequences: BTreeMap<String, RawSequence>,
}

#[derive(Deserialize)]
struct RawSequence {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    frames: Vec<RawFrame>,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    servo_us: Vec<u16>,
    #[serde(default = "default_frame_t_ms")]
    t_ms: u32,
}

fn default_frame_t_ms() -> u32 {
    100
}

#[derive(Debug, Default)]
pub struct SequenceStore {
    by_name: BTreeMap<String, MotionSequence>,
    id_to_name: BTreeMap<u32, String>,
}

impl SequenceStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> S13Result<Self> {
        let text = fs::read_to_string(&path).map_err(|err| {
            warn!("cannot read {}: {}", path.as_ref().display(), err);
            S13Error::Config
        })?;
        let store = Self::parse(&text)?;
        info!(
            "loaded {} motion sequences from {}",
            store.len(),
            path.as_ref().display()
        );
        Ok(store)
    }

    pub fn parse(text: &str) -> S13Result<Self> {
        let raw: RawFile = serde_json::from_str(text).map_err(|err| {
            warn!("sequence file rejected: {}", err);
            S13Error::Config
        })?;

        let mut store = Self::default();
        for (name, seq) in raw.sequences {
            let frames = seq
                .frames
                .into_iter()
                .map(|f| {
                    let mut servo_us = [PWM_NEUTRAL_US; LEG_CHANNELS];
                    for (slot, us) in servo_us.iter_mut().zip(f.servo_us) {
                        *slot = us;
                    }
                    MotionFrame {
                        servo_us,
                        t_ms: f.t_ms,
                    }
                })
                .collect();

            store.id_to_name.insert(seq.id, name.clone());
            store.by_name.insert(
                name.clone(),
                MotionSequence {
                    id: seq.id,
                    name,
                    description: seq.description,
                    frames,
                },
            );
        }
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<&MotionSequence> {
        self.by_name.get(name)
    }

    pub fn by_id(&self, id: u32) -> Option<&MotionSequence> {
        self.id_to_name.get(&id).and_then(|name| self.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
