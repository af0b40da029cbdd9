//! Measurement-cycle controller.
//!
//! Owns the scratch buffers and per-channel state, drives the four
//! channels through the extraction pipeline each cycle, fuses the axis
//! times into wind and sound speed, applies the plausibility gates and
//! accumulates oversampled output.

use log::{debug, info, warn};

use crate::anemo::calibration::{self, CalibrationOutcome, Calibrator};
use crate::anemo::{FaultCode, Geometry, Measurement, course_degrees, speed_of_sound};
use crate::config::Config;
use crate::constants::{
    COURSE_MIN_SPEED, HISTORY_SMOOTHING, MSE_GATE_FLOOR, MSE_REJECT_FACTOR, PEAK_THRESHOLD_RATIO,
    SOUND_SPEED_HISTORY_TOLERANCE, SOUND_SPEED_MAX, SOUND_SPEED_MIN, SOUND_SPEED_MODEL_TOLERANCE,
};
use crate::driver::{AcousticFrontEnd, CaptureContext, Channel, PulsePattern};
use crate::error::Result;
use crate::signal_processing::{
    Bandpass, Constellation, HistoryRing, capture_peaks, find_crossings, match_shape, preprocess,
};

/// Summary of a calibration run, for logging and config write-back.
pub struct CalibrationSummary {
    pub accepted: usize,
    pub pulse_offsets: [f32; 4],
    pub propagation_time_us: f32,
    pub offsets_valid: bool,
}

/// Per-cycle derived values, before oversampling.
#[derive(Debug, Clone, Copy)]
pub struct CycleSample {
    pub ns_wind: f32,
    pub ew_wind: f32,
    pub sound_speed: f32,
}

impl CycleSample {
    pub fn speed(&self) -> f32 {
        (self.ns_wind * self.ns_wind + self.ew_wind * self.ew_wind).sqrt()
    }
}

/// Outcome of one measurement cycle.
pub enum CycleOutcome {
    /// Valid cycle accumulated; not enough of them yet for an output
    /// sample.
    Accumulated(CycleSample),
    /// Oversampling target reached: a new output sample was published.
    Published(CycleSample, Measurement),
    /// The cycle was discarded; re-sample immediately.
    Fault(FaultCode),
}

pub struct AnemometerProcessor {
    ctx: CaptureContext,
    pulse: PulsePattern,
    geometry: Geometry,
    bandpass: Bandpass,
    oversampling: u32,

    reference: Option<[Constellation; 4]>,
    pulse_offsets: [f32; 4],

    // Scratch, owned here so the hot loop never allocates.
    frames: [Vec<u16>; 4],
    work: Vec<f32>,
    filtered: Vec<f32>,

    mse_history: [f32; 4],
    sound_speed_history: f32,

    ns_acc: f32,
    ew_acc: f32,
    sound_acc: f32,
    accumulated: u32,

    wind_history: HistoryRing,
    err_count: u64,
    last_fault: FaultCode,
    published: u64,
}

impl AnemometerProcessor {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let pulse = PulsePattern::default();
        let ctx = CaptureContext::for_pulse(&pulse);
        let bandpass = Bandpass::new(config.filter.bandwidth, config.filter.order)?;
        let sample_len = ctx.sample_len;
        Ok(Self {
            ctx,
            pulse,
            geometry: Geometry::new(config.anemometer.height, config.anemometer.pitch),
            bandpass,
            oversampling: config.anemometer.oversampling,
            reference: None,
            pulse_offsets: config.anemometer.pulse_offset,
            frames: std::array::from_fn(|_| vec![0u16; sample_len]),
            work: vec![0.0; sample_len],
            filtered: vec![0.0; sample_len],
            mse_history: [0.0; 4],
            sound_speed_history: 0.0,
            ns_acc: 0.0,
            ew_acc: 0.0,
            sound_acc: 0.0,
            accumulated: 0,
            wind_history: HistoryRing::new(config.history_capacity()),
            err_count: 0,
            last_fault: FaultCode::Normal,
            published: 0,
        })
    }

    pub fn context(&self) -> &CaptureContext {
        &self.ctx
    }

    pub fn pulse(&self) -> &PulsePattern {
        &self.pulse
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Raw frames of the most recent cycle, for dumps and streaming.
    pub fn frames(&self) -> &[Vec<u16>; 4] {
        &self.frames
    }

    pub fn err_count(&self) -> u64 {
        self.err_count
    }

    pub fn last_fault(&self) -> FaultCode {
        self.last_fault
    }

    pub fn is_calibrated(&self) -> bool {
        self.reference.is_some()
    }

    /// Adopt previously persisted pulse offsets without re-deriving them.
    /// A reference shape is still required before cycles can pass.
    pub fn set_pulse_offsets(&mut self, offsets: [f32; 4]) {
        self.pulse_offsets = offsets;
    }

    /// Run the calibration procedure and adopt its reference shape and
    /// pulse offsets. With zero accepted iterations the processor stays
    /// uncalibrated and every subsequent cycle faults deterministically.
    pub fn calibrate(
        &mut self,
        fe: &mut dyn AcousticFrontEnd,
        temperature_c: f32,
    ) -> Result<CalibrationSummary> {
        let calibrator = Calibrator::new(&self.ctx, &self.bandpass, &self.pulse);
        let outcome: CalibrationOutcome = calibrator.run(fe)?;

        let est_c = speed_of_sound(temperature_c);
        let propagation_time_us = self.geometry.propagation_time_us(est_c);

        if outcome.accepted == 0 {
            warn!("calibration failed; proceeding without a validated reference");
            return Ok(CalibrationSummary {
                accepted: 0,
                pulse_offsets: [0.0; 4],
                propagation_time_us,
                offsets_valid: false,
            });
        }
        if outcome.accepted < 5 {
            warn!(
                "calibration is weak, based on {} measurements",
                outcome.accepted
            );
        } else {
            info!(
                "calibration completed, based on {} measurements",
                outcome.accepted
            );
        }

        let offsets = calibration::pulse_offsets(
            &outcome.zero_cross_base,
            propagation_time_us,
            self.ctx.num_zc_avg,
        );
        let valid = calibration::offsets_valid(&offsets, self.ctx.sample_len);
        if valid {
            self.pulse_offsets = offsets;
            self.reference = Some(outcome.reference);
            info!(
                "propagation time {:.2} us, offsets: {:.2}, {:.2}, {:.2}, {:.2}",
                propagation_time_us, offsets[0], offsets[1], offsets[2], offsets[3]
            );
        } else {
            warn!(
                "derived pulse offsets out of range ({:.2}, {:.2}, {:.2}, {:.2}); calibration rejected",
                offsets[0], offsets[1], offsets[2], offsets[3]
            );
        }

        Ok(CalibrationSummary {
            accepted: outcome.accepted,
            pulse_offsets: offsets,
            propagation_time_us,
            offsets_valid: valid,
        })
    }

    /// Capture and process one measurement cycle.
    pub fn run_cycle(
        &mut self,
        fe: &mut dyn AcousticFrontEnd,
        temperature_c: f32,
    ) -> Result<CycleOutcome> {
        let mut sig_level = [0.0f32; 4];
        for ch in Channel::ALL {
            sig_level[ch.index()] =
                fe.measure_channel(ch, &self.pulse, &mut self.frames[ch.index()], true)?;
        }

        match self.extract_and_fuse(&sig_level, temperature_c) {
            Ok(outcome) => {
                self.last_fault = FaultCode::Normal;
                Ok(outcome)
            }
            Err(fault) => {
                self.err_count += 1;
                self.last_fault = fault;
                debug!("cycle fault {fault}, err_count {}", self.err_count);
                Ok(CycleOutcome::Fault(fault))
            }
        }
    }

    fn extract_and_fuse(
        &mut self,
        sig_level: &[f32; 4],
        temperature_c: f32,
    ) -> std::result::Result<CycleOutcome, FaultCode> {
        // Run every channel to completion even when one faults, so each
        // channel's MSE history keeps tracking; the cycle's verdict is
        // decided only after the full pass, and with several faulting
        // channels the last one sets the code.
        let mut times_s = [0.0f32; 4];
        let mut fault = None;
        for ch in Channel::ALL {
            match self.extract_channel(ch, sig_level[ch.index()]) {
                Ok(time_us) => times_s[ch.index()] = time_us * 1e-6,
                Err(code) => fault = Some(code),
            }
        }
        if let Some(code) = fault {
            return Err(code);
        }

        let ns_wind = self.geometry.wind_component(
            times_s[Channel::North.index()],
            times_s[Channel::South.index()],
        );
        let ew_wind = self.geometry.wind_component(
            times_s[Channel::East.index()],
            times_s[Channel::West.index()],
        );
        let ns_sound = self.geometry.sound_component(
            times_s[Channel::North.index()],
            times_s[Channel::South.index()],
        );
        let ew_sound = self.geometry.sound_component(
            times_s[Channel::East.index()],
            times_s[Channel::West.index()],
        );
        let sound = (ns_sound + ew_sound) / 2.0;

        // Hard physical window first.
        if !(SOUND_SPEED_MIN..=SOUND_SPEED_MAX).contains(&sound) {
            warn!("sound speed {sound:.1} outside physical window (ns {ns_sound:.1}, ew {ew_sound:.1})");
            return Err(FaultCode::WindSpeed);
        }

        // Then the model and history cross-checks.
        if self.sound_speed_history == 0.0 {
            self.sound_speed_history = sound;
        }
        self.sound_speed_history = (1.0 - HISTORY_SMOOTHING) * self.sound_speed_history
            + HISTORY_SMOOTHING * sound;
        let est_c = speed_of_sound(temperature_c);
        if (est_c - sound).abs() > SOUND_SPEED_MODEL_TOLERANCE
            || (sound - self.sound_speed_history).abs() > SOUND_SPEED_HISTORY_TOLERANCE
        {
            warn!(
                "sound speed {sound:.1} vs model {est_c:.1} / history {:.1}",
                self.sound_speed_history
            );
            return Err(FaultCode::WindSpeed);
        }

        let sample = CycleSample {
            ns_wind,
            ew_wind,
            sound_speed: sound,
        };

        self.ns_acc += ns_wind;
        self.ew_acc += ew_wind;
        self.sound_acc += sound;
        self.accumulated += 1;

        if self.accumulated < self.oversampling {
            return Ok(CycleOutcome::Accumulated(sample));
        }

        let ns_avg = self.ns_acc / self.accumulated as f32;
        let ew_avg = self.ew_acc / self.accumulated as f32;
        let sound_avg = self.sound_acc / self.accumulated as f32;
        self.ns_acc = 0.0;
        self.ew_acc = 0.0;
        self.sound_acc = 0.0;
        self.accumulated = 0;

        let speed = (ns_avg * ns_avg + ew_avg * ew_avg).sqrt();
        let course = if speed >= COURSE_MIN_SPEED {
            course_degrees(ns_avg, ew_avg)
        } else {
            -1.0
        };

        self.wind_history.push(speed);
        self.published += 1;

        Ok(CycleOutcome::Published(
            sample,
            Measurement {
                speed,
                course,
                sound_speed: sound_avg,
                speed_30s_avg: self.wind_history.mean(),
                speed_30s_max: self.wind_history.max(),
                err_code: FaultCode::Normal.code(),
                cycle: self.published,
            },
        ))
    }

    /// Extract the absolute propagation time of one channel, microseconds.
    fn extract_channel(
        &mut self,
        ch: Channel,
        zero_level: f32,
    ) -> std::result::Result<f32, FaultCode> {
        let ctx = &self.ctx;
        let Some(reference) = &self.reference else {
            // No validated reference: every cycle fails until
            // re-calibration.
            return Err(FaultCode::ShapeMismatch);
        };

        preprocess::remove_dc(&self.frames[ch.index()], &mut self.work, zero_level);
        self.bandpass.apply(&self.work, &mut self.filtered);
        if !preprocess::normalize(&mut self.filtered[ctx.dead_zone..]) {
            return Err(FaultCode::ShapeMismatch);
        }

        let shape = capture_peaks(
            &self.filtered[ctx.dead_zone..],
            ctx.peak_left,
            ctx.peak_right,
            PEAK_THRESHOLD_RATIO,
            ctx.min_peak_spacing,
        );

        let matched = match_shape(&reference[ch.index()], &shape, ctx.mse_search_range);
        let Some(lobe_offset) = matched.offset() else {
            return Err(FaultCode::MseNan);
        };
        let best_mse = matched.best_mse();

        // Gate against the history as it stood before this cycle, then
        // fold the accepted score in. Folding first would make the gate
        // unreachable (m > 9h + m never holds), and folding rejected
        // scores would let a persistent distortion mask itself.
        let history = &mut self.mse_history[ch.index()];
        if best_mse > (*history * MSE_REJECT_FACTOR).max(MSE_GATE_FLOOR) {
            debug!(
                "{ch}: cannot match echo shape, history {:.4}, best {:.4}",
                *history, best_mse
            );
            return Err(FaultCode::ShapeMismatch);
        }
        *history = (1.0 - HISTORY_SMOOTHING) * *history + HISTORY_SMOOTHING * best_mse;
        if lobe_offset.abs() > 2 {
            debug!("{ch}: lobe offset {lobe_offset}, mse {:?}", matched.mse);
        }

        // Anchor the crossing extraction on the constellation slot the
        // reference anchor drifted to.
        let anchor_slot = ctx.zc_anchor_slot as isize + lobe_offset;
        let anchor = shape
            .slot(usize::try_from(anchor_slot).map_err(|_| FaultCode::ShapeMismatch)?)
            .filter(|p| p.present)
            .ok_or(FaultCode::ShapeMismatch)?;

        // Positions in `shape` are relative to the dead-zone cut.
        let start = ctx.dead_zone + anchor.position as usize;
        if start >= self.filtered.len() {
            return Err(FaultCode::ShapeMismatch);
        }
        let mut crossings = find_crossings(&self.filtered[start..], ctx.zero_cross_len);
        if crossings.len() < ctx.zero_cross_len {
            return Err(FaultCode::ShapeMismatch);
        }
        for zc in crossings.iter_mut() {
            *zc += start as f32;
        }

        let n = ctx.num_zc_avg.min(crossings.len());
        let mean: f32 = crossings.iter().take(n).sum::<f32>() / n as f32;
        Ok(mean + self.pulse_offsets[ch.index()])
    }
}
