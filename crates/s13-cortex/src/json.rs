//! The v3.1 JSON command surface.
//!
//! Envelope: `{"v":"3.1","type":<type>,"msg":{...}}`. Every command
//! produces exactly one response frame (ack, error or data); ESTOP
//! transitions are always announced in the response.

use log::debug;
use serde_json::{json, Value};

use s13_core::limits::{CHANNELS, PWM_MAX_US, PWM_MIN_US};

use crate::pipeline::MotionCommand;
use crate::Cortex;

const PROTO_V: &str = "3.1";

fn ack(cmd: &str) -> String {
    json!({ "v": PROTO_V, "type": "ack", "msg": { "cmd": cmd } }).to_string()
}

fn err(code: u32, message: &str) -> String {
    json!({ "v": PROTO_V, "type": "error", "msg": { "code": code, "message": message } })
        .to_string()
}

fn data(kind: &str, msg: Value) -> String {
    json!({ "v": PROTO_V, "type": kind, "msg": msg }).to_string()
}

fn f32_field(msg: &Value, key: &str, default: f32) -> f32 {
    msg.get(key)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

/// Parse the 13-element pulse array common to `servos` and `move`.
fn pose_field(msg: &Value, key: &str) -> Result<[u16; CHANNELS], String> {
    let list = msg
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing '{}' array", key))?;
    if list.len() != CHANNELS {
        return Err(format!("expected {} values, got {}", CHANNELS, list.len()));
    }
    let mut pose = [0u16; CHANNELS];
    for (slot, value) in pose.iter_mut().zip(list) {
        let us = value
            .as_u64()
            .ok_or_else(|| "non-integer pulse width".to_string())?;
        if !(PWM_MIN_US as u64..=PWM_MAX_US as u64).contains(&us) {
            return Err(format!("pulse {} out of range (500-2500)", us));
        }
        *slot = us as u16;
    }
    Ok(pose)
}

impl Cortex<'_> {
    /// Handle one envelope; returns exactly one response frame.
    pub fn handle_json(&mut self, text: &str, now_ms: u64) -> String {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(parse_err) => return err(400, &format!("bad json: {}", parse_err)),
        };

        if value.get("v").and_then(Value::as_str) != Some(PROTO_V) {
            return err(400, "invalid envelope (v must be \"3.1\")");
        }
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return err(400, "invalid envelope (missing type)");
        };
        let msg = value.get("msg").cloned().unwrap_or_else(|| json!({}));

        debug!("json command: {}", kind);
        match kind {
            "motion" => self.handle_motion(&msg),
            "servo" => self.handle_servo(&msg, now_ms),
            "servos" => self.handle_servos(&msg, now_ms),
            "move" => self.handle_move(&msg, now_ms),
            "pose" => {
                self.pipeline_mut().resend_pose(100, now_ms);
                ack("pose")
            }
            "scan" => self.handle_scan_servo(&msg, now_ms),
            "scan_start" => {
                if !self.config().enable_scan {
                    return err(403, "scan disabled by config");
                }
                self.start_scan(now_ms);
                ack("scan_start")
            }
            "scan_stop" => {
                self.stop_scan(now_ms);
                ack("scan_stop")
            }
            "scan_status" => data(
                "scan_status",
                json!({
                    "running": self.scan().is_running(),
                    "angle": self.scan().current_angle(),
                    "points": self.scan().point_count(),
                }),
            ),
            "scan_get_data" => {
                let points: Vec<Value> = self
                    .scan_points()
                    .map(|p| {
                        json!({
                            "angle": p.angle_deg,
                            "mm": p.distance_mm,
                            "ts": p.timestamp_ms,
                        })
                    })
                    .collect();
                data("scan_data", json!({ "points": points }))
            }
            "distance" => {
                let mm = self.read_distance_mm();
                data("distance", json!({ "mm": mm }))
            }
            "estop" => {
                self.estop(now_ms);
                data("estop", json!({ "latched": true }))
            }
            "resume" => {
                self.resume(now_ms);
                data("resume", json!({ "latched": false }))
            }
            "status" | "telemetry" => self.telemetry_response(now_ms),
            "eyes" => self.handle_eyes(&msg),
            "sys" => self.handle_sys(&msg, now_ms),
            other => err(404, &format!("unknown type: {}", other)),
        }
    }

    fn handle_motion(&mut self, msg: &Value) -> String {
        let Some(name) = msg.get("cmd").and_then(Value::as_str) else {
            return err(400, "motion needs a cmd name");
        };

        let vec = msg.get("vec").cloned().unwrap_or_else(|| json!({}));
        let cmd = MotionCommand {
            name: name.to_string(),
            vec_fwd: f32_field(&vec, "fwd", 0.0).clamp(-1.0, 1.0),
            vec_strafe: f32_field(&vec, "strafe", 0.0).clamp(-1.0, 1.0),
            vec_turn: f32_field(&vec, "turn", 0.0).clamp(-1.0, 1.0),
            stride: f32_field(msg, "stride", 1.0).clamp(0.8, 1.6),
            speed: f32_field(msg, "speed", 0.8).clamp(0.0, 1.0),
            lift: f32_field(msg, "lift", 0.6).clamp(0.0, 1.0),
            continuous: msg
                .get("continuous")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };

        match self.queue_motion(cmd) {
            Ok(()) => ack(name),
            Err(s13_core::S13Error::MissingSequence) => {
                err(404, &format!("unknown sequence '{}'", name))
            }
            Err(_) => err(409, "estop latched, resume first"),
        }
    }

    fn handle_servo(&mut self, msg: &Value, now_ms: u64) -> String {
        let Some(ch) = msg.get("ch").and_then(Value::as_u64) else {
            return err(400, "servo needs ch");
        };
        let Some(us) = msg.get("us").and_then(Value::as_u64) else {
            return err(400, "servo needs us");
        };
        if ch >= CHANNELS as u64 {
            return err(400, "invalid channel (0-12)");
        }
        if !(PWM_MIN_US as u64..=PWM_MAX_US as u64).contains(&us) {
            return err(400, "us out of range (500-2500)");
        }
        if self.pipeline().is_estopped() {
            return err(409, "estop latched, resume first");
        }
        self.pipeline_mut().set_servo(ch as usize, us as u16, now_ms);
        ack("servo")
    }

    fn handle_servos(&mut self, msg: &Value, now_ms: u64) -> String {
        if self.pipeline().is_estopped() {
            return err(409, "estop latched, resume first");
        }
        match pose_field(msg, "us") {
            Ok(pose) => {
                self.pipeline_mut().set_pose(&pose, 0, now_ms);
                ack("servos")
            }
            Err(message) => err(400, &message),
        }
    }

    fn handle_move(&mut self, msg: &Value, now_ms: u64) -> String {
        if self.pipeline().is_estopped() {
            return err(409, "estop latched, resume first");
        }
        let t_ms = msg.get("t_ms").and_then(Value::as_u64).unwrap_or(0) as u32;
        match pose_field(msg, "us") {
            Ok(pose) => {
                self.pipeline_mut().set_pose(&pose, t_ms, now_ms);
                ack("move")
            }
            Err(message) => err(400, &message),
        }
    }

    fn handle_scan_servo(&mut self, msg: &Value, now_ms: u64) -> String {
        let Some(us) = msg.get("us").and_then(Value::as_u64) else {
            return err(400, "scan needs us");
        };
        if !(PWM_MIN_US as u64..=PWM_MAX_US as u64).contains(&us) {
            return err(400, "us out of range (500-2500)");
        }
        if self.pipeline().is_estopped() {
            return err(409, "estop latched, resume first");
        }
        self.pipeline_mut().point_scan_servo(us as u16, now_ms);
        ack("scan")
    }

    fn handle_eyes(&mut self, msg: &Value) -> String {
        let Some(cmd) = msg.get("cmd").and_then(Value::as_str) else {
            return err(400, "eyes needs a cmd");
        };
        match cmd {
            "mood" => {
                let mood = msg.get("mood").and_then(Value::as_str).unwrap_or("neutral");
                self.eye_mut().mood(mood);
            }
            "look" => {
                let x = f32_field(msg, "x", 0.0).clamp(-1.0, 1.0);
                let y = f32_field(msg, "y", 0.0).clamp(-1.0, 1.0);
                self.eye_mut().look(x, y);
            }
            "blink" => self.eye_mut().blink(),
            "wink" => {
                let eye = msg.get("eye").and_then(Value::as_str).unwrap_or("left");
                self.eye_mut().wink(eye);
            }
            "color" => {
                let rgb = msg.get("rgb565").and_then(Value::as_u64).unwrap_or(0) as u16;
                self.eye_mut().color(rgb);
            }
            "idle" => {
                let on = msg.get("enabled").and_then(Value::as_bool).unwrap_or(true);
                self.eye_mut().idle(on);
            }
            other => return err(404, &format!("unknown eye cmd: {}", other)),
        }
        ack(cmd)
    }

    fn handle_sys(&mut self, msg: &Value, now_ms: u64) -> String {
        let Some(cmd) = msg.get("cmd").and_then(Value::as_str) else {
            return err(400, "sys needs a cmd");
        };
        match cmd {
            "wake" => {
                let pose = msg
                    .get("wakepose")
                    .and_then(Value::as_str)
                    .unwrap_or(self.config().default_wakepose.as_str())
                    .to_string();
                match self.queue_motion(MotionCommand::named(pose)) {
                    Ok(()) => ack("wake"),
                    Err(s13_core::S13Error::MissingSequence) => err(404, "unknown wakepose"),
                    Err(_) => err(409, "estop latched, resume first"),
                }
            }
            "status" => self.telemetry_response(now_ms),
            other => err(404, &format!("unknown sys cmd: {}", other)),
        }
    }

    pub(crate) fn telemetry_response(&self, now_ms: u64) -> String {
        data(
            "telemetry",
            json!({
                "uptime_s": self.telemetry().uptime_s(now_ms),
                "loop_hz": self.telemetry().loop_hz(),
                "packets_sent": self.pipeline().packets_sent(),
                "state": self.state_str(),
                "seq": self.pipeline().next_seq(),
                "ring_w": self.pipeline().ring_write_idx(),
                "ring_r": self.pipeline().ring_read_idx(),
                "scan_running": self.scan().is_running(),
            }),
        )
    }
}
