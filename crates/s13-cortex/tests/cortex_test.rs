use std::sync::{Arc, Mutex};

use s13_core::limits::{CHANNELS, PWM_NEUTRAL_US, SCAN_CHANNEL};
use s13_core::packet::flag;
use s13_core::{PosePacket, S13Result};
use s13_cortex::{Config, Cortex, MotionCommand};
use s13_hal::{Doorbell, DoorbellCmd, EyeSink, RangeSensor, ESTOP_CLEAR, ESTOP_ENGAGE};
use s13_ring::{MotionRing, RingConsumer, RingProducer};
use s13_seq::SequenceStore;

const SEQUENCES: &str = r#"{
  "sequences": {
    "wave": {
      "id": 1,
      "frames": [
        { "servo_us": [1600, 1600, 1600, 1600, 1600, 1600, 1600, 1600], "t_ms": 100 },
        { "servo_us": [1400, 1400, 1400, 1400, 1400, 1400, 1400, 1400], "t_ms": 100 }
      ]
    }
  }
}"#;

#[derive(Clone, Default)]
struct BellLog(Arc<Mutex<Vec<(DoorbellCmd, u32)>>>);

impl BellLog {
    fn count(&self, cmd: DoorbellCmd) -> usize {
        self.0.lock().unwrap().iter().filter(|(c, _)| *c == cmd).count()
    }
    fn last_param(&self, cmd: DoorbellCmd) -> Option<u32> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| *c == cmd)
            .map(|(_, p)| *p)
    }
}

impl Doorbell for BellLog {
    fn notify(&mut self, cmd: DoorbellCmd, param: u32) -> S13Result<()> {
        self.0.lock().unwrap().push((cmd, param));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct EyeLog(Arc<Mutex<Vec<String>>>);

impl EyeSink for EyeLog {
    fn send_event(&mut self, json_line: &str) {
        self.0.lock().unwrap().push(json_line.to_string());
    }
}

struct FixedRange(u16);

impl RangeSensor for FixedRange {
    fn read_range_mm(&mut self) -> S13Result<u16> {
        Ok(self.0)
    }
}

fn build<'r>(ring: &'r MotionRing, bells: &BellLog, eyes: &EyeLog) -> Cortex<'r> {
    let store = SequenceStore::parse(SEQUENCES).unwrap();
    Cortex::new(
        Config::default(),
        store,
        RingProducer::attach(ring),
        Box::new(bells.clone()),
        Box::new(eyes.clone()),
        Some(Box::new(FixedRange(900))),
        0,
    )
}

fn drain_packets(consumer: &mut RingConsumer<'_>) -> Vec<PosePacket> {
    let mut packets = Vec::new();
    consumer.drain(|bytes| packets.push(PosePacket::decode(bytes).unwrap()));
    packets
}

#[test]
fn heartbeats_run_at_cadence_when_idle() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);
    let mut consumer = RingConsumer::attach(&ring);

    let mut packets = Vec::new();
    for now in 1..=1_000 {
        cortex.tick(now);
        // Drain as the muscle would, so the ring never fills.
        packets.extend(drain_packets(&mut consumer));
    }

    assert_eq!(bells.count(DoorbellCmd::Heartbeat), 10);
    // Idle windows carry HOLD-flagged pose packets as the packet-path
    // heartbeat.
    assert!(!packets.is_empty());
    assert!(packets.iter().all(|p| p.flags & flag::HOLD != 0));
    assert!(packets.iter().all(|p| p.servo_us == [PWM_NEUTRAL_US; CHANNELS]));
}

#[test]
fn sequence_playback_streams_frames() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);
    let mut consumer = RingConsumer::attach(&ring);

    cortex.queue_motion(MotionCommand::named("wave")).unwrap();

    let mut motion = Vec::new();
    for now in 1..=400 {
        cortex.tick(now);
        for pkt in drain_packets(&mut consumer) {
            if pkt.flags & flag::HOLD == 0 {
                motion.push(pkt);
            }
        }
    }

    assert_eq!(motion.len(), 2, "one packet per frame");
    assert_eq!(motion[0].servo_us[0], 1600);
    assert_eq!(motion[0].t_ms, 100);
    assert_eq!(motion[1].servo_us[0], 1400);
    // Legacy frames leave the extra channels neutral.
    for pkt in &motion {
        for ch in 8..CHANNELS {
            assert_eq!(pkt.servo_us[ch], PWM_NEUTRAL_US);
        }
    }
    // Sequence numbers strictly increase across all packets.
    let mut all = motion.clone();
    all.sort_by_key(|p| p.seq);
    assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));
    // Each push rang the doorbell with the new write index.
    assert!(bells.count(DoorbellCmd::MotionPacket) >= 2);
    assert_eq!(cortex.state_str(), "idle");
}

#[test]
fn unknown_sequence_is_refused() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);

    assert_eq!(
        cortex.queue_motion(MotionCommand::named("moonwalk")),
        Err(s13_core::S13Error::MissingSequence)
    );
}

#[test]
fn estop_latches_announces_and_refuses_motion() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);
    let mut consumer = RingConsumer::attach(&ring);

    cortex.estop(5);

    // ESTOP packet on the wire plus the immediate doorbell.
    let packets = drain_packets(&mut consumer);
    assert!(packets.iter().any(|p| p.flags & flag::ESTOP != 0));
    assert_eq!(bells.last_param(DoorbellCmd::Estop), Some(ESTOP_ENGAGE));
    assert_eq!(cortex.state_str(), "estop");

    // Display learns about it.
    let events = eyes.0.lock().unwrap().clone();
    assert!(events.iter().any(|e| e.contains("estop")));
    assert!(events.iter().any(|e| e.contains("angry")));

    // Motion refused while latched.
    assert!(cortex.queue_motion(MotionCommand::named("wave")).is_err());

    cortex.resume(10);
    assert_eq!(bells.last_param(DoorbellCmd::Estop), Some(ESTOP_CLEAR));
    assert_eq!(cortex.state_str(), "idle");
    assert!(cortex.queue_motion(MotionCommand::named("wave")).is_ok());
}

#[test]
fn scan_sweep_points_the_head_and_collects_samples() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);
    let mut consumer = RingConsumer::attach(&ring);

    cortex.start_scan(1);
    assert!(cortex.scan().is_running());

    let mut scan_packets = Vec::new();
    for now in 2..=500 {
        cortex.tick(now);
        for pkt in drain_packets(&mut consumer) {
            if pkt.flags & flag::SCAN_ENABLE != 0 && pkt.flags & flag::HOLD == 0 {
                scan_packets.push(pkt);
            }
        }
    }

    // The head was pointed at the start angle (20° → 722 µs).
    assert!(!scan_packets.is_empty());
    assert_eq!(scan_packets[0].servo_us[SCAN_CHANNEL], 722);

    // The dwell elapsed and the fixed 900 mm reading was recorded.
    let points: Vec<_> = cortex.scan_points().collect();
    assert!(!points.is_empty());
    assert_eq!(points[0].distance_mm, 900);

    cortex.stop_scan(501);
    assert!(!cortex.scan().is_running());
    // Recentered to 90° = 1500 µs.
    let packets = drain_packets(&mut consumer);
    let last = packets.last().unwrap();
    assert_eq!(last.servo_us[SCAN_CHANNEL], PWM_NEUTRAL_US);
}

#[test]
fn json_ack_preserves_command_name() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);

    let resp = cortex.handle_json(
        r#"{"v":"3.1","type":"motion","msg":{"cmd":"wave"}}"#,
        1,
    );
    assert!(resp.contains("\"type\":\"ack\""));
    assert!(resp.contains("\"cmd\":\"wave\""));
}

#[test]
fn json_envelope_and_errors() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);

    // Wrong version.
    let resp = cortex.handle_json(r#"{"v":"2.0","type":"status"}"#, 1);
    assert!(resp.contains("error"));

    // Not JSON at all.
    let resp = cortex.handle_json("STATUS", 1);
    assert!(resp.contains("error"));

    // Unknown type.
    let resp = cortex.handle_json(r#"{"v":"3.1","type":"dance"}"#, 1);
    assert!(resp.contains("404"));

    // Unknown sequence.
    let resp = cortex.handle_json(
        r#"{"v":"3.1","type":"motion","msg":{"cmd":"moonwalk"}}"#,
        1,
    );
    assert!(resp.contains("unknown sequence"));

    // Servo bounds.
    let resp = cortex.handle_json(
        r#"{"v":"3.1","type":"servo","msg":{"ch":0,"us":3000}}"#,
        1,
    );
    assert!(resp.contains("out of range"));
    let resp = cortex.handle_json(
        r#"{"v":"3.1","type":"servo","msg":{"ch":13,"us":1500}}"#,
        1,
    );
    assert!(resp.contains("invalid channel"));
}

#[test]
fn json_servo_moves_the_channel() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);
    let mut consumer = RingConsumer::attach(&ring);

    let resp = cortex.handle_json(
        r#"{"v":"3.1","type":"servo","msg":{"ch":4,"us":2000}}"#,
        1,
    );
    assert!(resp.contains("ack"));

    let packets = drain_packets(&mut consumer);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].servo_us[4], 2000);
}

#[test]
fn json_status_reports_telemetry() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);

    for now in 1..=2_000 {
        cortex.tick(now);
    }
    let resp = cortex.handle_json(r#"{"v":"3.1","type":"status"}"#, 2_000);
    assert!(resp.contains("\"uptime_s\":2"));
    assert!(resp.contains("loop_hz"));
    assert!(resp.contains("packets_sent"));
    assert!(resp.contains("\"state\":\"idle\""));
}

#[test]
fn json_estop_always_announces() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);

    let resp = cortex.handle_json(r#"{"v":"3.1","type":"estop"}"#, 1);
    assert!(resp.contains("\"latched\":true"));
    let resp = cortex.handle_json(r#"{"v":"3.1","type":"resume"}"#, 2);
    assert!(resp.contains("\"latched\":false"));
}

#[test]
fn line_protocol_roundtrip() {
    let ring = MotionRing::new();
    let bells = BellLog::default();
    let eyes = EyeLog::default();
    let mut cortex = build(&ring, &bells, &eyes);
    let mut consumer = RingConsumer::attach(&ring);

    assert!(cortex.handle_line("STATUS", 1).starts_with("OK state=idle"));
    assert_eq!(cortex.handle_line("SERVO 3 1800", 1), "OK 3 1800");
    assert_eq!(
        cortex.handle_line("servo 3 1800", 2),
        "OK 3 1800",
        "commands are case-insensitive"
    );
    assert!(cortex.handle_line("SERVO 99 1800", 3).starts_with("ERR"));
    assert!(cortex.handle_line("SERVO 3 9000", 3).starts_with("ERR"));
    assert!(cortex.handle_line("SERVOS 1500", 3).starts_with("ERR"));
    assert!(cortex.handle_line("NOPE", 3).starts_with("ERR"));
    assert!(cortex.handle_line("HELP", 3).starts_with("OK Commands:"));
    assert_eq!(cortex.handle_line("DISTANCE", 3), "OK mm=900");
    assert_eq!(cortex.handle_line("MOTION wave", 4), "OK wave");

    let move_cmd = "MOVE 250 1500 1500 1500 1500 1500 1500 1500 1500 1500 1500 1500 1500 2000";
    assert_eq!(cortex.handle_line(move_cmd, 5), "OK t=250");
    let packets = drain_packets(&mut consumer);
    let last = packets.last().unwrap();
    assert_eq!(last.t_ms, 250);
    assert_eq!(last.servo_us[12], 2000);

    assert_eq!(cortex.handle_line("ESTOP", 6), "OK estop latched");
    assert!(cortex.handle_line("SERVO 0 1500", 7).starts_with("ERR estop"));
    assert_eq!(cortex.handle_line("RESUME", 8), "OK resumed");
}
