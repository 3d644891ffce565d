//! Brain-side kernel.
//!
//! [`Cortex`] owns the command pipeline, the scan sweep, the obstacle
//! policy and the operator surfaces, and is polled by a thin daemon main
//! at ~1 kHz. All hardware goes through the capability traits handed in
//! at construction.

mod config;
mod eye;
mod json;
mod line;
mod pipeline;
mod telemetry;

pub use config::{Config, MotionMode};
pub use eye::{severity_to_mood, EyeLink};
pub use pipeline::{CommandPipeline, MotionCommand};
pub use telemetry::Telemetry;

use log::info;

use s13_core::limits::angle_to_us;
use s13_hal::{Doorbell, EyeSink, RangeSensor};
use s13_ring::RingProducer;
use s13_scan::{ObstaclePolicy, Reaction, ScanController, ScanIo, ScanPoint, ScanProfile};
use s13_seq::SequenceStore;

pub struct Cortex<'r> {
    config: Config,
    store: SequenceStore,
    pipeline: CommandPipeline<'r>,
    scan: ScanController,
    policy: ObstaclePolicy,
    eye: EyeLink,
    range: Option<Box<dyn RangeSensor>>,
    telemetry: Telemetry,
    last_reaction: Reaction,
}

/// Everything a scan tick may touch: the pipeline (to point CH12) and
/// the ranger.
struct ScanBridge<'a, 'r> {
    pipeline: &'a mut CommandPipeline<'r>,
    range: Option<&'a mut dyn RangeSensor>,
    now_ms: u64,
}

impl ScanIo for ScanBridge<'_, '_> {
    fn point_servo(&mut self, angle_deg: i32) {
        self.pipeline
            .point_scan_servo(angle_to_us(angle_deg), self.now_ms);
    }

    fn read_range_mm(&mut self) -> i32 {
        match self.range.as_deref_mut() {
            Some(sensor) => sensor
                .read_range_mm()
                .map(i32::from)
                .unwrap_or(-1),
            None => -1,
        }
    }
}

impl<'r> Cortex<'r> {
    pub fn new(
        config: Config,
        store: SequenceStore,
        producer: RingProducer<'r>,
        doorbell: Box<dyn Doorbell>,
        eye_sink: Box<dyn EyeSink>,
        range: Option<Box<dyn RangeSensor>>,
        now_ms: u64,
    ) -> Self {
        let scan = ScanController::new(ScanProfile {
            min_deg: config.scan_min_deg,
            max_deg: config.scan_max_deg,
            step_deg: config.scan_step_deg,
            rate_hz: config.scan_rate_hz,
            ..ScanProfile::default()
        });
        let pipeline = CommandPipeline::new(producer, doorbell, config.interp_q16, now_ms);
        let eye = EyeLink::new(eye_sink, config.enable_eye_service);

        info!(
            "cortex up: {} sequences, scan {}..{}°, mode {}",
            store.len(),
            config.scan_min_deg,
            config.scan_max_deg,
            config.motion_mode.as_str()
        );

        Self {
            config,
            store,
            pipeline,
            scan,
            policy: ObstaclePolicy::default(),
            eye,
            range,
            telemetry: Telemetry::new(now_ms),
            last_reaction: Reaction::CLEAR,
        }
    }

    /// One pass of the ~1 kHz brain loop.
    pub fn tick(&mut self, now_ms: u64) {
        self.pipeline.tick(&self.store, now_ms);

        if self.scan.is_running() {
            let mut bridge = ScanBridge {
                pipeline: &mut self.pipeline,
                range: self.range.as_deref_mut().map(|r| r as &mut dyn RangeSensor),
                now_ms,
            };
            self.scan.tick(now_ms, &mut bridge);

            if self.config.enable_obstacle_avoidance {
                self.last_reaction = self.policy.evaluate(&self.scan);
                self.eye.obstacle_update(&self.last_reaction, now_ms);
            }
        }

        self.telemetry.tick(now_ms);
    }

    // Motion surface.

    pub fn queue_motion(&mut self, cmd: MotionCommand) -> Result<(), s13_core::S13Error> {
        if !self.store.contains(&cmd.name) {
            return Err(s13_core::S13Error::MissingSequence);
        }
        self.pipeline.queue_motion(cmd)
    }

    pub fn estop(&mut self, now_ms: u64) {
        self.pipeline.estop(now_ms);
        self.eye.estop();
        self.eye.mood("angry");
    }

    pub fn resume(&mut self, now_ms: u64) {
        self.pipeline.resume(now_ms);
        self.eye.mood("neutral");
    }

    // Scan surface.

    pub fn start_scan(&mut self, now_ms: u64) {
        if !self.config.enable_scan {
            return;
        }
        self.pipeline.set_scan_active(true);
        let mut bridge = ScanBridge {
            pipeline: &mut self.pipeline,
            range: self.range.as_deref_mut().map(|r| r as &mut dyn RangeSensor),
            now_ms,
        };
        self.scan.start(now_ms, &mut bridge);
    }

    pub fn stop_scan(&mut self, now_ms: u64) {
        let mut bridge = ScanBridge {
            pipeline: &mut self.pipeline,
            range: self.range.as_deref_mut().map(|r| r as &mut dyn RangeSensor),
            now_ms,
        };
        self.scan.stop(&mut bridge);
        self.pipeline.set_scan_active(false);
    }

    /// One-shot range reading, -1 on any sensor failure.
    pub fn read_distance_mm(&mut self) -> i32 {
        match self.range.as_deref_mut() {
            Some(sensor) => sensor.read_range_mm().map(i32::from).unwrap_or(-1),
            None => -1,
        }
    }

    // Introspection for the surfaces and daemons.

    pub fn pipeline(&self) -> &CommandPipeline<'r> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut CommandPipeline<'r> {
        &mut self.pipeline
    }

    pub fn scan(&self) -> &ScanController {
        &self.scan
    }

    pub fn scan_points(&self) -> impl Iterator<Item = &ScanPoint> {
        self.scan.points()
    }

    pub fn last_reaction(&self) -> &Reaction {
        &self.last_reaction
    }

    pub fn store(&self) -> &SequenceStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn eye_mut(&mut self) -> &mut EyeLink {
        &mut self.eye
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Short state word for status responses.
    pub fn state_str(&self) -> &'static str {
        if self.pipeline.is_estopped() {
            "estop"
        } else {
            self.pipeline.mode().as_str()
        }
    }

    /// Clear BRAIN_READY and release the ring on shutdown.
    pub fn shutdown(self) {
        self.pipeline.detach();
    }
}
