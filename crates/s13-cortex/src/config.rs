//! Persistent daemon configuration (JSON file).

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use s13_core::{S13Error, S13Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionMode {
    /// Sequence playback (the only composer wired up today).
    LegacyPrg,
    PhaseEngine,
    DynamicGen,
    Idle,
}

impl MotionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LegacyPrg => "legacy_prg",
            Self::PhaseEngine => "phase_engine",
            Self::DynamicGen => "dynamic_gen",
            Self::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub v: String,
    pub default_wakepose: String,
    pub eye_backlight: u8,
    pub eye_auto_mode: bool,
    pub motion_mode: MotionMode,
    pub interp_q16: bool,
    pub enable_eye_service: bool,
    pub enable_scan: bool,
    pub enable_obstacle_avoidance: bool,
    pub scan_min_deg: i32,
    pub scan_max_deg: i32,
    pub scan_step_deg: i32,
    pub scan_rate_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            v: "3.1".into(),
            default_wakepose: "default".into(),
            eye_backlight: 180,
            eye_auto_mode: true,
            motion_mode: MotionMode::LegacyPrg,
            interp_q16: false,
            enable_eye_service: true,
            enable_scan: true,
            enable_obstacle_avoidance: true,
            scan_min_deg: 20,
            scan_max_deg: 160,
            scan_step_deg: 10,
            scan_rate_hz: 5,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> S13Result<Self> {
        let text = fs::read_to_string(&path).map_err(|_| S13Error::Config)?;
        let config = serde_json::from_str(&text).map_err(|err| {
            warn!("config {} rejected: {}", path.as_ref().display(), err);
            S13Error::Config
        })?;
        info!("config loaded from {}", path.as_ref().display());
        Ok(config)
    }

    /// Missing or unparseable files fall back to defaults; the daemon
    /// keeps running either way.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_default()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> S13Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|_| S13Error::Config)?;
        fs::write(&path, text).map_err(|err| {
            warn!("config save to {} failed: {}", path.as_ref().display(), err);
            S13Error::Config
        })
    }
}
