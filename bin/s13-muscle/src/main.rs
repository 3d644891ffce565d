use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{debug, info, warn};

use s13_core::FaultFlags;
use s13_hal::{Clock, Doorbell, DoorbellCmd, DoorbellWaiter, PwmSink, ESTOP_CLEAR};
use s13_linux::{FifoDoorbell, FifoDoorbellWaiter, MappedRing, MonotonicClock, Pca9685};
use s13_motion::MotionRuntime;
use s13_ring::RingConsumer;
use s13_safety::{Watchdog, WATCHDOG_PERIOD_MS};

const MOTION_TICK: Duration = Duration::from_millis(20);
const STATS_EVERY_TICKS: u32 = 250; // 5 s at 50 Hz

#[derive(Parser)]
#[command(name = "s13-muscle", about = "Muscle-side realtime daemon", version)]
struct Cli {
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Map the ring at this physical address via /dev/mem (the board
    /// setup). Without it a file-backed ring is used.
    #[arg(long)]
    ring_base: Option<String>,
    #[arg(long, default_value = "/dev/shm/s13-ring")]
    ring_file: PathBuf,
    #[arg(long, default_value = "/run/s13-doorbell")]
    doorbell_fifo: PathBuf,
    /// Reverse pipe for MOTION_ACK, if the brain side listens for it.
    #[arg(long)]
    ack_fifo: Option<PathBuf>,

    #[arg(long, default_value = "/dev/i2c-0")]
    pwm_bus: String,
}

/// Stand-in sink for rigs without the PWM chip: positions are dropped,
/// the loop timing stays honest.
struct NullPwm;

impl PwmSink for NullPwm {
    fn set_channel_us(&mut self, _channel: u8, _us: u16) {}
    fn set_all_us(&mut self, _us: u16) {}
    fn sleep(&mut self) {}
    fn wake(&mut self) {}
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .parse_filters(&cli.log_level)
        .init();
    info!("s13-muscle {} starting", env!("CARGO_PKG_VERSION"));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("signal received, shutting down");
        r.store(false, Ordering::SeqCst);
    })?;

    let faults = Arc::new(FaultFlags::new());
    let clock = Arc::new(MonotonicClock::new());

    // 1. SHARED RING
    // Leaked once at startup so the consumer reference is 'static for
    // the motion thread.
    let mapped: &'static MappedRing = Box::leak(Box::new(match &cli.ring_base {
        Some(base) => {
            let base =
                u64::from_str_radix(base.trim_start_matches("0x"), 16).unwrap_or(0x83F0_0000);
            MappedRing::map_phys(base)?
        }
        None => MappedRing::map_file(&cli.ring_file)?,
    }));
    let consumer = RingConsumer::attach(mapped.ring());
    info!(
        "ring attached (brain_ready={})",
        consumer.brain_ready()
    );

    // 2. PWM SINK
    let pwm: Box<dyn PwmSink> = match Pca9685::open(&cli.pwm_bus, faults.clone()) {
        Ok(chip) => Box::new(chip),
        Err(err) => {
            warn!("PCA9685 unavailable ({}), output disabled", err);
            faults.set(s13_core::Fault::PcaInit);
            Box::new(NullPwm)
        }
    };

    // 3. SAFETY
    let watchdog = Arc::new(
        Watchdog::new(clock.now_ms()).with_hooks(
            Some(Box::new(|| warn!("heartbeat timeout, holding pose"))),
            Some(Box::new(|| warn!("failsafe: ESTOP"))),
        ),
    );

    // 4. WATCHDOG TASK (highest priority, absolute 25 ms deadline)
    let wd = watchdog.clone();
    let wd_faults = faults.clone();
    let wd_clock = clock.clone();
    let wd_running = running.clone();
    let watchdog_thread = thread::spawn(move || {
        let mut next = Instant::now();
        while wd_running.load(Ordering::SeqCst) {
            wd.tick(&wd_faults, wd_clock.now_ms());
            next += Duration::from_millis(WATCHDOG_PERIOD_MS);
            if let Some(remaining) = next.checked_duration_since(Instant::now()) {
                thread::sleep(remaining);
            }
        }
    });

    // 5. MOTION TASK (pinned, absolute 20 ms deadline)
    let mut runtime = MotionRuntime::new(consumer, pwm);
    let mut ack_bell = match &cli.ack_fifo {
        Some(path) => Some(FifoDoorbell::create(path)?),
        None => None,
    };
    let mt_watchdog = watchdog.clone();
    let mt_faults = faults.clone();
    let mt_clock = clock.clone();
    let mt_running = running.clone();
    let motion_thread = thread::spawn(move || {
        // Pin to the last core; core 0 keeps the housekeeping load.
        if let Some(cores) = core_affinity::get_core_ids() {
            if let Some(target) = cores.last() {
                if cores.len() > 1 && core_affinity::set_for_current(*target) {
                    info!("motion task pinned to core {}", target.id);
                }
            }
        }

        let mut next = Instant::now();
        let mut ticks: u32 = 0;
        while mt_running.load(Ordering::SeqCst) {
            let report = runtime.tick(&mt_watchdog, &mt_faults, mt_clock.now_ms());

            if report.accepted > 0 {
                if let Some(bell) = ack_bell.as_mut() {
                    let _ = bell.notify(DoorbellCmd::MotionAck, report.read_idx);
                }
            }

            ticks += 1;
            if ticks % STATS_EVERY_TICKS == 0 {
                debug!(
                    "motion: state={} rx={} drop={} seq={} faults={:#x}",
                    report.state.as_str(),
                    runtime.rx_count(),
                    runtime.drop_count(),
                    runtime.last_seq(),
                    mt_faults.all()
                );
            }

            next += MOTION_TICK;
            if let Some(remaining) = next.checked_duration_since(Instant::now()) {
                thread::sleep(remaining);
            }
        }
        runtime.shutdown();
    });

    // 6. DOORBELL DISPATCH (this thread)
    let mut waiter = FifoDoorbellWaiter::open(&cli.doorbell_fifo)?;
    info!("muscle tasks running");
    while running.load(Ordering::SeqCst) {
        match waiter.poll() {
            Ok((DoorbellCmd::Heartbeat, _)) => {
                watchdog.feed(&faults, clock.now_ms());
            }
            Ok((DoorbellCmd::Estop, param)) => {
                if param == ESTOP_CLEAR {
                    match watchdog.clear_estop(&faults, clock.now_ms()) {
                        Ok(()) => info!("ESTOP cleared by brain"),
                        Err(err) => warn!("ESTOP clear refused: {}", err),
                    }
                } else {
                    watchdog.signal_estop(&faults);
                }
            }
            // Motion packets drain on the 20 ms tick either way; the
            // doorbell only shortens worst-case latency on IRQ setups.
            Ok((DoorbellCmd::MotionPacket, _)) | Ok((DoorbellCmd::MotionAck, _)) => {}
            Err(nb::Error::WouldBlock) => thread::sleep(Duration::from_millis(1)),
            Err(nb::Error::Other(err)) => {
                debug!("doorbell poll failed: {}", err);
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    motion_thread.join().ok();
    watchdog_thread.join().ok();
    info!("muscle stopped");
    Ok(())
}
