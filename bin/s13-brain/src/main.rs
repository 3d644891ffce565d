use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};

use s13_cortex::{Config, Cortex};
use s13_hal::Clock;
use s13_linux::{
    CmdquDoorbell, FifoDoorbell, MappedRing, MonotonicClock, SerialPort, TcpConsole, UnixEyeSink,
    Vl53l0x,
};
use s13_ring::RingProducer;
use s13_seq::SequenceStore;

/// Reserved physical window on the reference board.
const DEFAULT_RING_BASE: u64 = 0x83F0_0000;

#[derive(Parser)]
#[command(name = "s13-brain", about = "Brain-side control daemon", version)]
struct Cli {
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, default_value = "/dev/ttyS0")]
    serial_port: String,
    #[arg(long, default_value_t = 115_200)]
    serial_baud: u32,
    /// Tethered console / command port.
    #[arg(long, default_value_t = 9000)]
    port: u16,

    #[arg(long, default_value = "/etc/s13/config.json")]
    config: PathBuf,
    #[arg(long, default_value = "/etc/s13/sequences.json")]
    sequences: PathBuf,

    /// Map the ring at this physical address via /dev/mem (the board
    /// setup). Without it a file-backed ring is used.
    #[arg(long)]
    ring_base: Option<String>,
    #[arg(long, default_value = "/dev/shm/s13-ring")]
    ring_file: PathBuf,
    #[arg(long, default_value = "/run/s13-doorbell")]
    doorbell_fifo: PathBuf,

    #[arg(long, default_value = "/dev/i2c-1")]
    range_bus: String,
    #[arg(long, default_value = "/tmp/s13_eye.sock")]
    eye_socket: PathBuf,
}

fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&cli.log_level);
    if let Some(path) = &cli.log_file {
        match std::fs::File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => eprintln!("cannot open log file {}: {}", path.display(), err),
        }
    }
    builder.init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);
    info!("s13-brain {} starting", env!("CARGO_PKG_VERSION"));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("signal received, shutting down");
        r.store(false, Ordering::SeqCst);
    })?;

    // 1. SHARED RING + DOORBELL
    let mapped = match &cli.ring_base {
        Some(base) => {
            let base = u64::from_str_radix(base.trim_start_matches("0x"), 16)
                .unwrap_or(DEFAULT_RING_BASE);
            MappedRing::map_phys(base)?
        }
        None => MappedRing::map_file(&cli.ring_file)?,
    };
    let producer = RingProducer::attach(mapped.ring());

    let doorbell: Box<dyn s13_hal::Doorbell> = match CmdquDoorbell::open() {
        Ok(bell) => Box::new(bell),
        Err(err) => {
            info!("mailbox device unavailable ({}), using fifo doorbell", err);
            Box::new(FifoDoorbell::create(&cli.doorbell_fifo)?)
        }
    };

    // 2. CONFIG + SEQUENCES
    let config = Config::load_or_default(&cli.config);
    let store = SequenceStore::load_file(&cli.sequences).unwrap_or_else(|_| {
        warn!(
            "no sequences at {}, motion commands limited to direct poses",
            cli.sequences.display()
        );
        SequenceStore::empty()
    });

    // 3. PERIPHERALS (all optional; the core runs without them)
    let range: Option<Box<dyn s13_hal::RangeSensor>> = match Vl53l0x::open(&cli.range_bus) {
        Ok(sensor) => Some(Box::new(sensor)),
        Err(err) => {
            warn!("range sensor unavailable: {}", err);
            None
        }
    };
    let eye_sink = Box::new(UnixEyeSink::new(&cli.eye_socket));

    let mut serial = match SerialPort::open(&cli.serial_port, cli.serial_baud) {
        Ok(port) => Some(port),
        Err(err) => {
            warn!("serial console disabled: {}", err);
            None
        }
    };
    let mut console = TcpConsole::bind(cli.port)?;

    // 4. THE KERNEL
    let clock = MonotonicClock::new();
    let mut cortex = Cortex::new(
        config,
        store,
        producer,
        doorbell,
        eye_sink,
        range,
        clock.now_ms(),
    );

    if let Some(port) = serial.as_mut() {
        port.send_line("OK s13 brain v3.1 ready");
    }
    info!("brain loop running");

    // ~1 kHz cooperative loop: surfaces first, then the pipeline tick.
    while running.load(Ordering::SeqCst) {
        let now = clock.now_ms();

        if let Some(port) = serial.as_mut() {
            for line in port.poll_lines() {
                let response = cortex.handle_line(&line, now);
                port.send_line(&response);
            }
        }

        console.poll(|line| {
            // The tethered port speaks both surfaces: JSON envelopes and
            // bare console commands.
            if line.starts_with('{') {
                cortex.handle_json(line, now)
            } else {
                cortex.handle_line(line, now)
            }
        });

        cortex.tick(now);
        thread::sleep(Duration::from_millis(1));
    }

    cortex.shutdown();
    info!("brain stopped");
    Ok(())
}
