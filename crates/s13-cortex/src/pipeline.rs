//! The brain-side motion composer.
//!
//! High-level commands queue here; each tick turns them into pose
//! packets: resolve the sequence, expand the current frame, clamp,
//! seal the CRC, push to the shared ring and ring the doorbell. The
//! 100 ms heartbeat runs at cadence boundaries regardless of traffic.

use std::collections::VecDeque;

use log::{debug, info, warn};

use s13_core::limits::{clamp_us, CHANNELS, HEARTBEAT_INTERVAL_MS, SCAN_CHANNEL};
use s13_core::packet::flag;
use s13_core::{PosePacket, S13Error};
use s13_hal::{Doorbell, DoorbellCmd, ESTOP_CLEAR, ESTOP_ENGAGE};
use s13_ring::RingProducer;
use s13_seq::SequenceStore;

use crate::config::MotionMode;

/// One queued high-level motion request.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionCommand {
    pub name: String,
    pub vec_fwd: f32,
    pub vec_strafe: f32,
    pub vec_turn: f32,
    pub stride: f32,
    pub speed: f32,
    pub lift: f32,
    pub continuous: bool,
}

impl MotionCommand {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vec_fwd: 0.0,
            vec_strafe: 0.0,
            vec_turn: 0.0,
            stride: 1.0,
            speed: 0.8,
            lift: 0.6,
            continuous: false,
        }
    }
}

#[derive(Debug)]
struct Playback {
    name: String,
    frame: usize,
    /// 0 = frame not yet sent.
    frame_started_ms: u64,
    continuous: bool,
}

pub struct CommandPipeline<'r> {
    producer: RingProducer<'r>,
    doorbell: Box<dyn Doorbell>,
    seq: u32,
    current_pose: [u16; CHANNELS],
    queue: VecDeque<MotionCommand>,
    mode: MotionMode,
    playback: Option<Playback>,
    estop: bool,
    interp_q16: bool,
    scan_active: bool,
    last_heartbeat_ms: u64,
    last_packet_ms: u64,
    packets_sent: u32,
    heartbeats_sent: u32,
    overflow_drops: u32,
}

impl<'r> CommandPipeline<'r> {
    pub fn new(
        producer: RingProducer<'r>,
        doorbell: Box<dyn Doorbell>,
        interp_q16: bool,
        now_ms: u64,
    ) -> Self {
        Self {
            producer,
            doorbell,
            seq: 1,
            current_pose: [s13_core::limits::PWM_NEUTRAL_US; CHANNELS],
            queue: VecDeque::new(),
            mode: MotionMode::Idle,
            playback: None,
            estop: false,
            interp_q16,
            scan_active: false,
            last_heartbeat_ms: now_ms,
            last_packet_ms: now_ms,
            packets_sent: 0,
            heartbeats_sent: 0,
            overflow_drops: 0,
        }
    }

    pub fn tick(&mut self, store: &SequenceStore, now_ms: u64) {
        // 1. HEARTBEAT AT CADENCE, regardless of traffic. The HOLD pose
        // packet rides along only in idle windows, so an in-flight
        // interpolation is never frozen by its own producer.
        if now_ms.saturating_sub(self.last_heartbeat_ms) >= HEARTBEAT_INTERVAL_MS {
            self.last_heartbeat_ms = now_ms;
            self.heartbeats_sent += 1;
            if let Err(err) = self.doorbell.notify(DoorbellCmd::Heartbeat, 0) {
                debug!("heartbeat doorbell failed: {}", err);
            }
            if now_ms.saturating_sub(self.last_packet_ms) >= HEARTBEAT_INTERVAL_MS {
                self.push_packet(0, flag::HOLD, now_ms);
            }
        }

        if self.estop {
            return;
        }

        // 2. ONE COMMAND PER TICK
        if let Some(cmd) = self.queue.pop_front() {
            self.start_command(store, cmd);
        }

        // 3. DRIVE THE ACTIVE SEQUENCE
        if self.mode == MotionMode::LegacyPrg {
            self.drive_playback(store, now_ms);
        }
    }

    /// Queue a motion command. Refused while the ESTOP latch is set.
    pub fn queue_motion(&mut self, cmd: MotionCommand) -> Result<(), S13Error> {
        if self.estop {
            return Err(S13Error::InvalidState);
        }
        self.queue.push_back(cmd);
        Ok(())
    }

    fn start_command(&mut self, store: &SequenceStore, cmd: MotionCommand) {
        if store.contains(&cmd.name) {
            info!("sequence '{}' starting (continuous={})", cmd.name, cmd.continuous);
            self.playback = Some(Playback {
                name: cmd.name,
                frame: 0,
                frame_started_ms: 0,
                continuous: cmd.continuous,
            });
            self.mode = MotionMode::LegacyPrg;
        } else {
            warn!("unknown sequence '{}' dropped", cmd.name);
        }
    }

    fn drive_playback(&mut self, store: &SequenceStore, now_ms: u64) {
        let Some(mut play) = self.playback.take() else {
            self.mode = MotionMode::Idle;
            return;
        };
        let Some(seq) = store.get(&play.name) else {
            self.mode = MotionMode::Idle;
            return;
        };

        if play.frame >= seq.frames.len() {
            if play.continuous {
                play.frame = 0;
                play.frame_started_ms = 0;
            } else {
                info!("sequence '{}' complete", play.name);
                self.mode = MotionMode::Idle;
                return;
            }
        }

        let frame = seq.frames[play.frame];
        if play.frame_started_ms == 0 {
            // Frame entry: adopt the pose and put it on the wire with the
            // frame's own time budget.
            self.current_pose = frame.expand();
            self.push_packet(frame.t_ms, 0, now_ms);
            play.frame_started_ms = now_ms;
        } else if now_ms.saturating_sub(play.frame_started_ms) >= frame.t_ms as u64 {
            play.frame += 1;
            play.frame_started_ms = 0;
        }

        self.playback = Some(play);
    }

    /// Compose, seal and push one packet carrying the current pose, then
    /// ring the doorbell. Ring-full drops the packet (OVERFLOW is already
    /// set by the ring) and the next heartbeat resynchronizes.
    fn push_packet(&mut self, t_ms: u32, extra_flags: u16, now_ms: u64) {
        let mut pkt = PosePacket::new(self.seq);
        pkt.t_ms = t_ms;
        pkt.flags = flag::CLAMP_ENABLE | extra_flags;
        if self.interp_q16 {
            pkt.flags |= flag::INTERP_Q16;
        }
        if self.scan_active {
            pkt.flags |= flag::SCAN_ENABLE;
        }
        if self.estop {
            pkt.flags |= flag::ESTOP;
        }
        for (out, us) in pkt.servo_us.iter_mut().zip(self.current_pose) {
            *out = clamp_us(us);
        }
        pkt.finalize();

        match self.producer.try_push(&pkt) {
            Ok(write_idx) => {
                self.seq = self.seq.wrapping_add(1).max(1);
                self.packets_sent += 1;
                self.last_packet_ms = now_ms;
                if let Err(err) = self.doorbell.notify(DoorbellCmd::MotionPacket, write_idx) {
                    debug!("doorbell failed after push: {}", err);
                }
            }
            Err(S13Error::RingFull) => {
                self.overflow_drops += 1;
                warn!("motion ring full, packet {} dropped", self.seq);
            }
            Err(err) => warn!("ring push failed: {}", err),
        }
    }

    // Direct pose surface (SERVO / SERVOS / MOVE / pose commands).

    pub fn set_servo(&mut self, channel: usize, us: u16, now_ms: u64) {
        self.current_pose[channel] = clamp_us(us);
        self.push_packet(0, 0, now_ms);
    }

    pub fn set_pose(&mut self, pose: &[u16; CHANNELS], t_ms: u32, now_ms: u64) {
        for (out, us) in self.current_pose.iter_mut().zip(pose) {
            *out = clamp_us(*us);
        }
        self.push_packet(t_ms, 0, now_ms);
    }

    pub fn resend_pose(&mut self, t_ms: u32, now_ms: u64) {
        self.push_packet(t_ms, 0, now_ms);
    }

    /// Point the scan head (CH12). Used by the sweep controller.
    pub fn point_scan_servo(&mut self, us: u16, now_ms: u64) {
        self.current_pose[SCAN_CHANNEL] = clamp_us(us);
        self.push_packet(0, 0, now_ms);
    }

    pub fn set_scan_active(&mut self, active: bool) {
        self.scan_active = active;
    }

    /// Latch the emergency stop: drop all queued work and put an ESTOP
    /// packet plus doorbell on the wire immediately.
    pub fn estop(&mut self, now_ms: u64) {
        self.estop = true;
        self.queue.clear();
        self.playback = None;
        self.mode = MotionMode::Idle;
        self.push_packet(0, flag::ESTOP, now_ms);
        if let Err(err) = self.doorbell.notify(DoorbellCmd::Estop, ESTOP_ENGAGE) {
            warn!("ESTOP doorbell failed: {}", err);
        }
        warn!("ESTOP latched on the pipeline");
    }

    /// Release the brain-side latch and ask the muscle to clear its own.
    pub fn resume(&mut self, _now_ms: u64) {
        self.estop = false;
        if let Err(err) = self.doorbell.notify(DoorbellCmd::Estop, ESTOP_CLEAR) {
            warn!("ESTOP clear doorbell failed: {}", err);
        }
        info!("ESTOP released, resuming");
    }

    // Status surface.

    pub fn is_estopped(&self) -> bool {
        self.estop
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    pub fn current_pose(&self) -> &[u16; CHANNELS] {
        &self.current_pose
    }

    pub fn next_seq(&self) -> u32 {
        self.seq
    }

    pub fn packets_sent(&self) -> u32 {
        self.packets_sent
    }

    pub fn heartbeats_sent(&self) -> u32 {
        self.heartbeats_sent
    }

    pub fn overflow_drops(&self) -> u32 {
        self.overflow_drops
    }

    pub fn ring_write_idx(&self) -> u32 {
        self.producer.ring().write_idx()
    }

    pub fn ring_read_idx(&self) -> u32 {
        self.producer.ring().read_idx()
    }

    pub fn detach(self) {
        self.producer.detach();
    }
}
