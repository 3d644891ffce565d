//! Events for the eye display service.
//!
//! Newline-terminated JSON over whatever [`EyeSink`] the platform
//! provides. Everything here is fire-and-forget; a dead display never
//! stalls the control loop.

use log::debug;
use serde_json::json;

use s13_hal::EyeSink;
use s13_scan::{Reaction, Zone};

/// Obstacle-driven mood updates are throttled to one per this window.
const OBSTACLE_EVENT_MS: u64 = 200;

pub struct EyeLink {
    sink: Box<dyn EyeSink>,
    enabled: bool,
    last_obstacle_ms: u64,
}

impl EyeLink {
    pub fn new(sink: Box<dyn EyeSink>, enabled: bool) -> Self {
        Self {
            sink,
            enabled,
            last_obstacle_ms: 0,
        }
    }

    fn send(&mut self, event: serde_json::Value) {
        if self.enabled {
            self.sink.send_event(&event.to_string());
        }
    }

    /// Forward an already-formed event line (the EYE console command).
    pub fn send_raw(&mut self, line: &str) {
        if self.enabled {
            self.sink.send_event(line);
        }
    }

    pub fn mood(&mut self, mood: &str) {
        self.send(json!({ "type": "mood", "mood": mood }));
    }

    pub fn look(&mut self, x: f32, y: f32) {
        self.send(json!({ "type": "look", "x": x, "y": y }));
    }

    pub fn blink(&mut self) {
        self.send(json!({ "type": "blink" }));
    }

    pub fn wink(&mut self, eye: &str) {
        self.send(json!({ "type": "wink", "eye": eye }));
    }

    pub fn color(&mut self, rgb565: u16) {
        self.send(json!({ "type": "color", "rgb565": rgb565 }));
    }

    pub fn idle(&mut self, enabled: bool) {
        self.send(json!({ "type": "idle", "enabled": enabled }));
    }

    pub fn estop(&mut self) {
        self.send(json!({ "type": "estop" }));
    }

    /// Mood + gaze from the obstacle picture, rate-limited.
    pub fn obstacle_update(&mut self, reaction: &Reaction, now_ms: u64) {
        if !reaction.detected {
            return;
        }
        if now_ms.saturating_sub(self.last_obstacle_ms) < OBSTACLE_EVENT_MS {
            return;
        }
        self.last_obstacle_ms = now_ms;

        let mood = severity_to_mood(reaction.severity);
        let look_x = match reaction.zone {
            Some(Zone::Left) => -0.6,
            Some(Zone::Right) => 0.6,
            _ => 0.0,
        };
        debug!(
            "obstacle at {} mm, mood {} look {}",
            reaction.distance_mm, mood, look_x
        );
        self.mood(mood);
        self.look(look_x, 0.0);
    }
}

pub fn severity_to_mood(severity: f32) -> &'static str {
    if severity >= 0.8 {
        "angry"
    } else if severity >= 0.5 {
        "suspicious"
    } else {
        "neutral"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s13_scan::Action;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl EyeSink for RecordingSink {
        fn send_event(&mut self, json_line: &str) {
            self.0.lock().unwrap().push(json_line.to_string());
        }
    }

    fn reaction(severity: f32, zone: Zone) -> Reaction {
        Reaction {
            detected: true,
            zone: Some(zone),
            distance_mm: 150,
            severity,
            action: Action::Stop,
        }
    }

    #[test]
    fn obstacle_updates_are_rate_limited() {
        let sink = RecordingSink::default();
        let mut link = EyeLink::new(Box::new(sink.clone()), true);

        link.obstacle_update(&reaction(0.9, Zone::Left), 1_000);
        link.obstacle_update(&reaction(0.9, Zone::Left), 1_050);
        link.obstacle_update(&reaction(0.9, Zone::Left), 1_250);

        // Two windows passed → two mood+look pairs.
        assert_eq!(sink.0.lock().unwrap().len(), 4);
    }

    #[test]
    fn severity_bands_map_to_moods() {
        assert_eq!(severity_to_mood(1.0), "angry");
        assert_eq!(severity_to_mood(0.6), "suspicious");
        assert_eq!(severity_to_mood(0.35), "neutral");
    }

    #[test]
    fn disabled_link_swallows_events() {
        let sink = RecordingSink::default();
        let mut link = EyeLink::new(Box::new(sink.clone()), false);
        link.mood("angry");
        link.blink();
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn gaze_points_toward_the_obstacle_side() {
        let sink = RecordingSink::default();
        let mut link = EyeLink::new(Box::new(sink.clone()), true);
        link.obstacle_update(&reaction(0.9, Zone::Right), 1_000);
        let events = sink.0.lock().unwrap();
        assert!(events[0].contains("angry"));
        assert!(events[1].contains("0.6"));
    }
}
