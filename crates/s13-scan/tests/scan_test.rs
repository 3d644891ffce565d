use s13_scan::{Action, ObstaclePolicy, ScanController, ScanIo, ScanPoint, ScanProfile, Zone};

/// Scripted scan rig: servo moves are recorded, the ranger replays a
/// distance per angle.
struct ScriptedIo {
    servo_log: Vec<i32>,
    samples: Vec<ScanPoint>,
    range_for: fn(i32) -> i32,
    pointed_at: i32,
}

impl ScriptedIo {
    fn new(range_for: fn(i32) -> i32) -> Self {
        Self {
            servo_log: Vec::new(),
            samples: Vec::new(),
            range_for,
            pointed_at: 90,
        }
    }
}

impl ScanIo for ScriptedIo {
    fn point_servo(&mut self, angle_deg: i32) {
        self.pointed_at = angle_deg;
        self.servo_log.push(angle_deg);
    }
    fn read_range_mm(&mut self) -> i32 {
        (self.range_for)(self.pointed_at)
    }
    fn on_sample(&mut self, point: &ScanPoint) {
        self.samples.push(*point);
    }
}

/// Run the controller with 1 ms time steps for `duration_ms`.
fn run(scan: &mut ScanController, io: &mut ScriptedIo, start_ms: u64, duration_ms: u64) -> u64 {
    let mut now = start_ms;
    for _ in 0..duration_ms {
        now += 1;
        scan.tick(now, io);
    }
    now
}

#[test]
fn sweep_bounces_at_the_limits() {
    // Defaults: 20°..160°, 10° steps, 5 Hz (200 ms per step), 80 ms dwell.
    let mut scan = ScanController::new(ScanProfile::default());
    let mut io = ScriptedIo::new(|_| 500);

    let mut now = 10;
    scan.start(now, &mut io);
    assert_eq!(io.servo_log, vec![20]);

    // 14 steps of 200 ms climb to 160°.
    now = run(&mut scan, &mut io, now, 14 * 200);
    assert_eq!(scan.current_angle(), 160);

    // Step 15 turns around on the limit, step 16 comes back down.
    now = run(&mut scan, &mut io, now, 200);
    assert_eq!(scan.current_angle(), 160);
    now = run(&mut scan, &mut io, now, 200);
    assert_eq!(scan.current_angle(), 150);

    // Let the 150° dwell finish: every commanded angle then has exactly
    // one sample.
    run(&mut scan, &mut io, now, 100);
    assert_eq!(io.samples.len(), io.servo_log.len());

    // One reversal: the log climbs 20..160, holds, then descends.
    let expected: Vec<i32> = (2..=16)
        .map(|x| x * 10)
        .chain([160, 150])
        .collect();
    assert_eq!(io.servo_log, expected);
}

#[test]
fn stop_recenters_the_head() {
    let mut scan = ScanController::new(ScanProfile::default());
    let mut io = ScriptedIo::new(|_| 800);

    scan.start(0, &mut io);
    run(&mut scan, &mut io, 0, 600);
    assert!(scan.is_running());

    scan.stop(&mut io);
    assert!(!scan.is_running());
    assert_eq!(scan.current_angle(), 90);
    assert_eq!(*io.servo_log.last().unwrap(), 90);

    // Stopped controller ignores ticks.
    let samples = io.samples.len();
    run(&mut scan, &mut io, 1_000, 1_000);
    assert_eq!(io.samples.len(), samples);
}

#[test]
fn history_keeps_most_recent_reading_per_angle() {
    let mut scan = ScanController::new(ScanProfile::default());

    // First lap sees 1000 mm everywhere, then the world moves closer.
    let mut io = ScriptedIo::new(|_| 1000);
    scan.start(0, &mut io);
    let now = run(&mut scan, &mut io, 0, 14 * 200 + 100);
    assert_eq!(scan.distance_at(20, 0), Some(1000));

    let mut io2 = ScriptedIo::new(|_| 300);
    io2.pointed_at = scan.current_angle();
    run(&mut scan, &mut io2, now, 16 * 200);
    // Angles revisited on the way back down now read 300.
    assert_eq!(scan.distance_at(150, 0), Some(300));
    assert_eq!(scan.point_count(), 15); // 20°..160° in 10° steps, deduped
}

#[test]
fn failed_readings_are_recorded_as_minus_one() {
    let mut scan = ScanController::new(ScanProfile::default());
    let mut io = ScriptedIo::new(|angle| if angle == 30 { -1 } else { 700 });

    scan.start(0, &mut io);
    run(&mut scan, &mut io, 0, 3 * 200);
    assert_eq!(scan.distance_at(30, 0), Some(-1));
    // Error readings never win "closest".
    assert_eq!(scan.closest(), Some((20, 700)));
}

#[test]
fn aggregate_queries() {
    let mut scan = ScanController::new(ScanProfile::default());
    let mut io = ScriptedIo::new(|angle| match angle {
        80 => 250,
        90 => 400,
        100 => 550,
        _ => 2000,
    });

    scan.start(0, &mut io);
    run(&mut scan, &mut io, 0, 15 * 200);

    assert_eq!(scan.closest(), Some((80, 250)));
    assert_eq!(scan.distance_at(90, 0), Some(400));
    assert_eq!(scan.distance_at(92, 5), Some(400));
    assert_eq!(scan.distance_at(35, 2), None);
    // Cone 80°..100° averages the three near readings.
    assert_eq!(scan.cone_average(90, 20), Some((250 + 400 + 550) / 3));
}

fn scripted_scan(range_for: fn(i32) -> i32) -> ScanController {
    let mut scan = ScanController::new(ScanProfile::default());
    let mut io = ScriptedIo::new(range_for);
    scan.start(0, &mut io);
    run(&mut scan, &mut io, 0, 15 * 200);
    scan
}

#[test]
fn obstacle_clear_when_everything_is_far() {
    let scan = scripted_scan(|_| 1500);
    let policy = ObstaclePolicy::default();
    let reaction = policy.evaluate(&scan);
    assert!(!reaction.detected);
    assert_eq!(reaction.action, Action::None);
}

#[test]
fn obstacle_front_bands() {
    let policy = ObstaclePolicy::default();

    // Front (90° servo = 0° centered) at 350 mm: warn band → slow down.
    let scan = scripted_scan(|a| if a == 90 { 350 } else { 1500 });
    let r = policy.evaluate(&scan);
    assert!(r.detected);
    assert_eq!(r.zone, Some(Zone::Front));
    assert_eq!(r.action, Action::SlowDown);
    assert!(r.severity > 0.3 && r.severity < 0.7);

    // 150 mm: stop band.
    let scan = scripted_scan(|a| if a == 90 { 150 } else { 1500 });
    let r = policy.evaluate(&scan);
    assert_eq!(r.action, Action::Stop);
    assert!(r.severity > 0.7 && r.severity < 1.0);

    // 80 mm: critical → back up, severity pegged.
    let scan = scripted_scan(|a| if a == 90 { 80 } else { 1500 });
    let r = policy.evaluate(&scan);
    assert_eq!(r.action, Action::Backup);
    assert_eq!(r.severity, 1.0);
}

#[test]
fn obstacle_side_zones_turn_away() {
    let policy = ObstaclePolicy::default();

    // 40° servo = -50° centered: left zone → turn right.
    let scan = scripted_scan(|a| if a == 40 { 300 } else { 1500 });
    let r = policy.evaluate(&scan);
    assert_eq!(r.zone, Some(Zone::Left));
    assert_eq!(r.action, Action::TurnRight);

    // 140° servo = +50° centered: right zone → turn left.
    let scan = scripted_scan(|a| if a == 140 { 300 } else { 1500 });
    let r = policy.evaluate(&scan);
    assert_eq!(r.zone, Some(Zone::Right));
    assert_eq!(r.action, Action::TurnLeft);
}

#[test]
fn obstacle_ignores_failed_readings() {
    let policy = ObstaclePolicy::default();
    let scan = scripted_scan(|a| if a == 90 { -1 } else { 1500 });
    assert!(!policy.evaluate(&scan).detected);
}
