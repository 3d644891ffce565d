//! The newline-terminated text console (serial / tethered TCP).
//!
//! Commands mirror the JSON surface; responses start with `OK ` or
//! `ERR `.

use log::debug;

use s13_core::limits::{CHANNELS, PWM_MAX_US, PWM_MIN_US};

use crate::pipeline::MotionCommand;
use crate::Cortex;

const USAGE: &str = "Commands: STATUS SERVO SERVOS MOVE SCAN ESTOP RESUME EYE DISTANCE MOTION HELP";

fn parse_us(token: &str) -> Result<u16, String> {
    let us: u32 = token
        .parse()
        .map_err(|_| format!("bad pulse width '{}'", token))?;
    if !(PWM_MIN_US as u32..=PWM_MAX_US as u32).contains(&us) {
        return Err("us out of range (500-2500)".into());
    }
    Ok(us as u16)
}

fn parse_pose(tokens: &[&str]) -> Result<[u16; CHANNELS], String> {
    if tokens.len() != CHANNELS {
        return Err(format!("expected {} values, got {}", CHANNELS, tokens.len()));
    }
    let mut pose = [0u16; CHANNELS];
    for (slot, token) in pose.iter_mut().zip(tokens) {
        *slot = parse_us(token)?;
    }
    Ok(pose)
}

impl Cortex<'_> {
    /// Handle one console line; returns exactly one `OK`/`ERR` response.
    pub fn handle_line(&mut self, line: &str, now_ms: u64) -> String {
        let line = line.trim();
        if line.is_empty() {
            return "ERR empty command".into();
        }
        debug!("console: {}", line);

        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
        let args: Vec<&str> = parts.collect();

        match cmd.as_str() {
            "STATUS" => format!(
                "OK state={} seq={} tx={} hb={} ring={}/{} scan={}",
                self.state_str(),
                self.pipeline().next_seq(),
                self.pipeline().packets_sent(),
                self.pipeline().heartbeats_sent(),
                self.pipeline().ring_write_idx(),
                self.pipeline().ring_read_idx(),
                if self.scan().is_running() { "on" } else { "off" },
            ),
            "SERVO" => self.line_servo(&args, now_ms),
            "SERVOS" => self.line_servos(&args, now_ms),
            "MOVE" => self.line_move(&args, now_ms),
            "SCAN" => self.line_scan(&args, now_ms),
            "ESTOP" => {
                self.estop(now_ms);
                "OK estop latched".into()
            }
            "RESUME" => {
                self.resume(now_ms);
                "OK resumed".into()
            }
            "EYE" => {
                if args.is_empty() {
                    return "ERR usage: EYE <event-json>".into();
                }
                let event = args.join(" ");
                if serde_json::from_str::<serde_json::Value>(&event).is_err() {
                    return "ERR eye event is not valid json".into();
                }
                self.eye_mut().send_raw(&event);
                "OK".into()
            }
            "DISTANCE" => {
                let mm = self.read_distance_mm();
                if mm < 0 {
                    "ERR range read failed".into()
                } else {
                    format!("OK mm={}", mm)
                }
            }
            "MOTION" => self.line_motion(&args),
            "HELP" | "?" => format!("OK {}", USAGE),
            _ => "ERR unknown command".into(),
        }
    }

    fn line_servo(&mut self, args: &[&str], now_ms: u64) -> String {
        if args.len() != 2 {
            return "ERR usage: SERVO <ch> <us>".into();
        }
        let Ok(ch) = args[0].parse::<usize>() else {
            return "ERR invalid channel (0-12)".into();
        };
        if ch >= CHANNELS {
            return "ERR invalid channel (0-12)".into();
        }
        let us = match parse_us(args[1]) {
            Ok(us) => us,
            Err(message) => return format!("ERR {}", message),
        };
        if self.pipeline().is_estopped() {
            return "ERR estop latched".into();
        }
        self.pipeline_mut().set_servo(ch, us, now_ms);
        format!("OK {} {}", ch, us)
    }

    fn line_servos(&mut self, args: &[&str], now_ms: u64) -> String {
        match parse_pose(args) {
            Ok(pose) => {
                if self.pipeline().is_estopped() {
                    return "ERR estop latched".into();
                }
                self.pipeline_mut().set_pose(&pose, 0, now_ms);
                "OK".into()
            }
            Err(message) => format!("ERR {}", message),
        }
    }

    fn line_move(&mut self, args: &[&str], now_ms: u64) -> String {
        if args.len() != CHANNELS + 1 {
            return format!(
                "ERR expected t_ms + {} values, got {}",
                CHANNELS,
                args.len()
            );
        }
        let Ok(t_ms) = args[0].parse::<u32>() else {
            return "ERR bad t_ms".into();
        };
        match parse_pose(&args[1..]) {
            Ok(pose) => {
                if self.pipeline().is_estopped() {
                    return "ERR estop latched".into();
                }
                self.pipeline_mut().set_pose(&pose, t_ms, now_ms);
                format!("OK t={}", t_ms)
            }
            Err(message) => format!("ERR {}", message),
        }
    }

    fn line_scan(&mut self, args: &[&str], now_ms: u64) -> String {
        // SCAN START | SCAN STOP | SCAN <us>
        match args.first().map(|s| s.to_ascii_uppercase()).as_deref() {
            Some("START") => {
                if !self.config().enable_scan {
                    return "ERR scan disabled by config".into();
                }
                self.start_scan(now_ms);
                "OK scan started".into()
            }
            Some("STOP") => {
                self.stop_scan(now_ms);
                "OK scan stopped".into()
            }
            Some(token) => match parse_us(token) {
                Ok(us) => {
                    if self.pipeline().is_estopped() {
                        return "ERR estop latched".into();
                    }
                    self.pipeline_mut().point_scan_servo(us, now_ms);
                    format!("OK scan={}", us)
                }
                Err(message) => format!("ERR {}", message),
            },
            None => "ERR usage: SCAN <us>|START|STOP".into(),
        }
    }

    fn line_motion(&mut self, args: &[&str]) -> String {
        let Some(name) = args.first() else {
            return "ERR usage: MOTION <sequence> [LOOP]".into();
        };
        let mut cmd = MotionCommand::named(*name);
        cmd.continuous = args
            .get(1)
            .map(|t| t.eq_ignore_ascii_case("loop"))
            .unwrap_or(false);
        match self.queue_motion(cmd) {
            Ok(()) => format!("OK {}", name),
            Err(s13_core::S13Error::MissingSequence) => {
                format!("ERR unknown sequence '{}'", name)
            }
            Err(_) => "ERR estop latched".into(),
        }
    }
}
