use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use clap::Parser;

use sonicvane::anemo::Geometry;
use sonicvane::config::Config;
use sonicvane::driver::{CaptureContext, FixedTemperature, PulsePattern};
use sonicvane::output::{OutputFormat, create_formatter};
use sonicvane::simulation::{NoiseConfig, SimulatedFrontEnd};
use sonicvane::worker;

#[derive(Parser, Debug)]
#[command(name = "sonicvane")]
#[command(about = "Ultrasonic anemometer measurement loop on a simulated front end", long_about = None)]
struct Args {
    /// Configuration file (TOML); calibration writes pulse offsets back
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Simulated wind speed in m/s
    #[arg(short = 'w', long, default_value = "2.0")]
    wind_speed: f32,

    /// Simulated wind course in degrees
    #[arg(short = 'd', long, default_value = "180.0")]
    wind_course: f32,

    /// Simulated air temperature in degrees Celsius
    #[arg(short = 't', long, default_value = "20.0")]
    temperature: f32,

    /// Echo signal-to-noise ratio in dB
    #[arg(long, default_value = "30.0")]
    snr_db: f32,

    /// Noise seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// How long to run, seconds (0 = until killed)
    #[arg(long, default_value = "30")]
    duration: u64,

    /// Log per-cycle wind and sound numbers
    #[arg(long)]
    log_cycles: bool,

    /// Stream raw ADC frames to stdout for a host visualiser
    #[arg(long)]
    stream_raw: bool,

    /// Record raw frames to this CSV and exit (see analyze_dump)
    #[arg(long)]
    record: Option<PathBuf>,

    /// Measurement rounds to record with --record
    #[arg(long, default_value = "10")]
    record_cycles: usize,

    /// Increase output verbosity (-v for info, -vv for debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = match &args.config {
        Some(path) if path.exists() => Config::load(path)?,
        _ => Config::default(),
    };
    config.validate()?;

    let geometry = Geometry::new(config.anemometer.height, config.anemometer.pitch);
    let course_rad = args.wind_course.to_radians();
    let ns_wind = -args.wind_speed * course_rad.cos();
    let ew_wind = -args.wind_speed * course_rad.sin();

    let pulse = PulsePattern::coded();
    let ctx = CaptureContext::for_pulse(&pulse);
    let mut front_end =
        SimulatedFrontEnd::new(NoiseConfig::default().with_seed(args.seed).with_snr(800.0, args.snr_db));
    front_end.set_dead_zone(ctx.dead_zone);
    front_end.set_conditions(&geometry, args.temperature, ns_wind, ew_wind);

    if let Some(path) = &args.record {
        use sonicvane::driver::AcousticFrontEnd;
        front_end.set_power(80_000, true)?;
        let shutdown = std::sync::atomic::AtomicBool::new(false);
        sonicvane::dump::record_raw_frames(
            path,
            &mut front_end,
            &pulse,
            &ctx,
            args.record_cycles,
            &shutdown,
        )?;
        eprintln!("Recorded {} rounds to {}", args.record_cycles, path.display());
        return Ok(());
    }

    eprintln!("=== sonicvane - ultrasonic anemometer (simulated) ===");
    eprintln!(
        "Geometry: height {:.0} mm, pitch {:.0} mm",
        config.anemometer.height * 1000.0,
        config.anemometer.pitch * 1000.0
    );
    eprintln!(
        "Wind: {:.2} m/s from {:.0} deg at {:.1} degC, SNR {:.0} dB",
        args.wind_speed, args.wind_course, args.temperature, args.snr_db
    );
    eprintln!(
        "Output: every {} ms ({} cycles oversampled)",
        config.anemometer.data_period_ms, config.anemometer.oversampling
    );
    eprintln!();

    let formatter = create_formatter(args.format, args.verbose >= 1);
    if let Some(header) = formatter.header() {
        println!("{header}");
    }

    let handle = worker::spawn(
        config,
        front_end,
        FixedTemperature(args.temperature),
        args.config.clone(),
    );
    handle
        .toggles
        .verbose_cycles
        .store(args.log_cycles, Ordering::Relaxed);
    handle
        .toggles
        .stream_raw
        .store(args.stream_raw, Ordering::Relaxed);

    let started = Instant::now();
    loop {
        if args.duration > 0 && started.elapsed() >= Duration::from_secs(args.duration) {
            break;
        }
        if handle.is_finished() {
            break;
        }
        match handle.measurements.recv_timeout(Duration::from_millis(250)) {
            Ok(measurement) => println!("{}", formatter.format(&measurement)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    handle.stop()?;
    Ok(())
}
