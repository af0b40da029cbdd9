//! Long-running measurement worker.
//!
//! One thread owns the front end, the processor and all its buffers. It
//! shares nothing mutable with the rest of the process except the
//! published-measurement channel, a latest-value slot and a handful of
//! atomic toggles. Faulted cycles re-sample immediately; successful
//! cycles sleep to the next period boundary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{error, info, warn};

use crate::anemo::Measurement;
use crate::config::Config;
use crate::driver::{AcousticFrontEnd, Channel, TemperatureSource};
use crate::dump::ErrorDumper;
use crate::error::Result;
use crate::anemo::calibration::{ambient_zero_levels, check_connection, precharge};
use crate::processing::{AnemometerProcessor, CycleOutcome, CycleSample};

/// Transducer drive frequency handed to the power control, Hz.
const DRIVE_POWER_HZ: u32 = 80_000;
/// Throwaway rounds before calibration while the drive caps charge.
const PRECHARGE_ROUNDS: usize = 50;
/// Baseline delay at the top of every cycle.
const CYCLE_DELAY: Duration = Duration::from_millis(20);

/// Runtime toggles, shared with shell/CLI layers.
#[derive(Clone)]
pub struct Toggles {
    /// Log per-cycle wind and sound numbers.
    pub verbose_cycles: Arc<AtomicBool>,
    /// Stream raw ADC frames to stdout for a host visualiser.
    pub stream_raw: Arc<AtomicBool>,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            verbose_cycles: Arc::new(AtomicBool::new(false)),
            stream_raw: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct WorkerHandle {
    /// Stream of published output samples.
    pub measurements: Receiver<Measurement>,
    /// Most recent published record; readers tolerate a stale snapshot.
    pub latest: Arc<Mutex<Measurement>>,
    pub shutdown: Arc<AtomicBool>,
    pub toggles: Toggles,
    join: JoinHandle<Result<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker to finish its cycle.
    pub fn stop(self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(crate::error::AnemoError::FrontEnd(
                "worker thread panicked".to_string(),
            )),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawn the measurement worker. When `config_path` is given, calibration
/// writes the derived pulse offsets back to that file.
pub fn spawn<FE, TS>(
    config: Config,
    front_end: FE,
    temperature: TS,
    config_path: Option<PathBuf>,
) -> WorkerHandle
where
    FE: AcousticFrontEnd + Send + 'static,
    TS: TemperatureSource + Send + 'static,
{
    let (tx, rx) = bounded(32);
    let latest = Arc::new(Mutex::new(Measurement::default()));
    let shutdown = Arc::new(AtomicBool::new(false));
    let toggles = Toggles::default();

    let worker = Worker {
        config,
        config_path,
        tx,
        latest: latest.clone(),
        shutdown: shutdown.clone(),
        toggles: toggles.clone(),
    };
    let join = std::thread::Builder::new()
        .name("anemometer".to_string())
        .spawn(move || worker.run(front_end, temperature))
        .expect("spawning the worker thread");

    WorkerHandle {
        measurements: rx,
        latest,
        shutdown,
        toggles,
        join,
    }
}

struct Worker {
    config: Config,
    config_path: Option<PathBuf>,
    tx: Sender<Measurement>,
    latest: Arc<Mutex<Measurement>>,
    shutdown: Arc<AtomicBool>,
    toggles: Toggles,
}

impl Worker {
    fn run<FE, TS>(mut self, mut fe: FE, mut temperature: TS) -> Result<()>
    where
        FE: AcousticFrontEnd,
        TS: TemperatureSource,
    {
        let result = self.run_inner(&mut fe, &mut temperature);
        if let Err(err) = fe.set_power(DRIVE_POWER_HZ, false) {
            warn!("powering down the front end failed: {err}");
        }
        result
    }

    fn run_inner<FE, TS>(&mut self, fe: &mut FE, temperature: &mut TS) -> Result<()>
    where
        FE: AcousticFrontEnd,
        TS: TemperatureSource,
    {
        let mut processor = AnemometerProcessor::new(&self.config)?;
        let geo = processor.geometry();
        info!(
            "height {:.0}mm, pitch {:.0}mm, dead zone {} samples, frame {} samples",
            geo.height * 1000.0,
            geo.pitch * 1000.0,
            processor.context().dead_zone,
            processor.context().sample_len,
        );

        fe.set_power(DRIVE_POWER_HZ, true)?;

        self.wait_for_transducers(fe, &mut processor)?;

        let ambient = ambient_zero_levels(fe, processor.context(), 4)?;
        info!(
            "ambient zero levels N:{:.1} S:{:.1} E:{:.1} W:{:.1}",
            ambient[0], ambient[1], ambient[2], ambient[3]
        );

        precharge(fe, processor.pulse(), processor.context(), PRECHARGE_ROUNDS)?;

        info!("calibrating anemometer, expecting calm air");
        let air_temp = temperature.temperature_c();
        info!(
            "air temperature {:.1} degC, estimated sound speed {:.1} m/s",
            air_temp,
            crate::anemo::speed_of_sound(air_temp)
        );
        let summary = processor.calibrate(fe, air_temp)?;
        if summary.accepted == 0 {
            error!("calibration failed; every cycle will fault until re-calibration");
        } else if summary.offsets_valid {
            self.persist_offsets(summary.pulse_offsets);
        }

        let period = Duration::from_millis(self.config.cycle_period_ms());
        let epoch = Instant::now();
        let mut dumper = ErrorDumper::new(std::path::Path::new(&self.config.dump.dir));

        while !self.shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(CYCLE_DELAY);
            if !self.config.anemometer.enabled {
                continue;
            }

            let outcome = processor.run_cycle(fe, temperature.temperature_c())?;

            if self.toggles.stream_raw.load(Ordering::Relaxed) {
                stream_frames(processor.frames());
            }

            match outcome {
                CycleOutcome::Fault(fault) => {
                    self.set_err_code(fault.code());
                    if self.config.dump.dump_error {
                        match dumper.dump(processor.frames(), processor.err_count(), &self.shutdown)
                        {
                            Ok(Some(path)) => {
                                warn!("dumped faulted cycle ({fault}) to {}", path.display());
                            }
                            Ok(None) => {}
                            Err(err) => warn!("error dump failed: {err}"),
                        }
                    }
                    // Re-sample immediately, skipping the period sleep.
                    continue;
                }
                CycleOutcome::Accumulated(sample) => {
                    self.set_err_code(0);
                    self.log_cycle(&sample);
                }
                CycleOutcome::Published(sample, measurement) => {
                    self.log_cycle(&sample);
                    self.publish(measurement);
                }
            }

            self.sleep_to_period_boundary(&epoch, period);
        }

        info!("measurement worker stopped");
        Ok(())
    }

    fn wait_for_transducers<FE: AcousticFrontEnd>(
        &self,
        fe: &mut FE,
        processor: &mut AnemometerProcessor,
    ) -> Result<()> {
        info!("checking transducer connection");
        let mut mask = check_connection(fe, processor.pulse(), processor.context())?;
        if mask != 0xf {
            warn!("transducers missing (mask {mask:#06b}), waiting");
            while mask != 0xf && !self.shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_secs(1));
                mask = check_connection(fe, processor.pulse(), processor.context())?;
            }
            info!("transducers connected");
        }
        Ok(())
    }

    fn persist_offsets(&mut self, offsets: [f32; 4]) {
        self.config.anemometer.pulse_offset = offsets;
        if let Some(path) = &self.config_path {
            match self.config.save(path) {
                Ok(()) => info!("pulse offsets saved to {}", path.display()),
                Err(err) => warn!("saving pulse offsets failed: {err}"),
            }
        }
    }

    fn publish(&self, measurement: Measurement) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = measurement;
        }
        // A full channel only means the consumer lags; the latest slot
        // already carries the record.
        let _ = self.tx.try_send(measurement);
    }

    fn set_err_code(&self, code: u8) {
        if let Ok(mut latest) = self.latest.lock() {
            latest.err_code = code;
        }
    }

    fn log_cycle(&self, sample: &CycleSample) {
        if self.toggles.verbose_cycles.load(Ordering::Relaxed) {
            info!(
                "v={:5.2} m/s, c={:5.1} m/s, ns={:5.2} m/s, ew={:5.2} m/s",
                sample.speed(),
                sample.sound_speed,
                sample.ns_wind,
                sample.ew_wind
            );
        }
    }

    fn sleep_to_period_boundary(&self, epoch: &Instant, period: Duration) {
        let period_ms = period.as_millis().max(1) as u64;
        let elapsed_ms = epoch.elapsed().as_millis() as u64;
        let rest = period_ms - elapsed_ms % period_ms;
        std::thread::sleep(Duration::from_millis(rest));
    }
}

/// Print the four raw frames as CSV rows for a host visualiser, followed
/// by a frame separator.
fn stream_frames(frames: &[Vec<u16>; 4]) {
    let len = frames.iter().map(Vec::len).min().unwrap_or(0);
    for j in 0..len {
        println!(
            "{},{},{},{}",
            frames[Channel::North.index()][j],
            frames[Channel::South.index()][j],
            frames[Channel::East.index()][j],
            frames[Channel::West.index()][j],
        );
    }
    println!("reset");
}
