//! Calibration: per-channel reference shape and zero-crossing baseline.
//!
//! Run in calm air. The engine waits for the axis pairs to stabilise,
//! picks the channel with the most prominent main lobe as the alignment
//! template, then accumulates peak constellations and zero crossings over
//! repeated measurements, keeping only iterations where all four channels
//! agree.

use log::{debug, info, warn};

use crate::driver::{AcousticFrontEnd, CaptureContext, Channel, PulsePattern};
use crate::error::Result;
use crate::signal_processing::{
    Bandpass, Constellation, Peak, capture_peaks, capture_peaks_from, find_crossings, preprocess,
};

/// Rounds of the level-stability wait.
const STABILITY_ROUNDS: usize = 16;
/// Maximum signal-level difference between axis partners, ADC counts.
const STABILITY_TOLERANCE: f32 = 2.0;
/// Accumulation stops after this many accepted iterations.
const TARGET_ACCEPTANCES: usize = 32;
/// ... or after this many attempts, whichever comes first.
const MAX_ITERATIONS: usize = 256;
/// Alignment margin left of the template's first peak, samples.
const ANCHOR_MARGIN: usize = 8;
/// Zero-crossing agreement gates, samples.
const SAME_AXIS_TOLERANCE: f32 = 2.0;
const CROSS_AXIS_TOLERANCE: f32 = 10.0;

/// Averaged reference data for one calibrated session.
pub struct CalibrationOutcome {
    pub reference: [Constellation; 4],
    pub zero_cross_base: [Vec<f32>; 4],
    /// Number of accepted iterations behind the averages. Zero means the
    /// calibration failed and no reference is valid.
    pub accepted: usize,
}

/// Per-channel pulse offsets: theoretical propagation time minus the
/// averaged zero-crossing baseline, microseconds.
pub fn pulse_offsets(
    base: &[Vec<f32>; 4],
    propagation_time_us: f32,
    num_avg: usize,
) -> [f32; 4] {
    let mut offsets = [0.0f32; 4];
    for ch in Channel::ALL {
        let zc = &base[ch.index()];
        let n = num_avg.min(zc.len()).max(1);
        let mean: f32 = zc.iter().take(n).sum::<f32>() / n as f32;
        offsets[ch.index()] = propagation_time_us - mean;
    }
    offsets
}

/// An offset's magnitude must stay inside the capture window, and exactly
/// zero is reserved as the "never calibrated" sentinel in the persisted
/// configuration. Anything else means the calibration geometry or
/// temperature estimate was wrong.
pub fn offsets_valid(offsets: &[f32; 4], sample_len: usize) -> bool {
    offsets
        .iter()
        .all(|&o| o.is_finite() && o != 0.0 && o.abs() < sample_len as f32)
}

/// Averaged ambient DC level per channel from passive captures.
pub fn ambient_zero_levels(
    fe: &mut dyn AcousticFrontEnd,
    ctx: &CaptureContext,
    rounds: usize,
) -> Result<[f32; 4]> {
    let mut frame = vec![0u16; ctx.sample_len];
    let mut levels = [0.0f32; 4];
    for _ in 0..rounds.max(1) {
        for ch in Channel::ALL {
            fe.sample(ch, &mut frame)?;
            levels[ch.index()] += preprocess::zero_level(&frame[ctx.dead_zone..]);
        }
    }
    for level in levels.iter_mut() {
        *level /= rounds.max(1) as f32;
    }
    Ok(levels)
}

/// Bitmask of channels whose pulsed response rises clearly above the
/// ambient level; 0xf means all four transducers answer.
pub fn check_connection(
    fe: &mut dyn AcousticFrontEnd,
    pulse: &PulsePattern,
    ctx: &CaptureContext,
) -> Result<u8> {
    let mut frame = vec![0u16; ctx.sample_len];
    let mut mask = 0u8;
    for ch in Channel::ALL {
        let zero = fe.measure_channel(ch, pulse, &mut frame, true)?;
        let max = frame[ctx.dead_zone..]
            .iter()
            .copied()
            .max()
            .unwrap_or(0) as f32;
        if max > zero + 50.0 {
            mask |= 1 << ch.index();
        }
    }
    Ok(mask)
}

/// Fire a few throwaway rounds so the drive capacitors reach their
/// working charge before anything is measured.
pub fn precharge(
    fe: &mut dyn AcousticFrontEnd,
    pulse: &PulsePattern,
    ctx: &CaptureContext,
    rounds: usize,
) -> Result<()> {
    let mut frame = vec![0u16; ctx.sample_len];
    for _ in 0..rounds {
        for ch in Channel::ALL {
            fe.measure_channel(ch, pulse, &mut frame, false)?;
        }
    }
    Ok(())
}

pub struct Calibrator<'a> {
    ctx: &'a CaptureContext,
    bandpass: &'a Bandpass,
    pulse: &'a PulsePattern,
}

impl<'a> Calibrator<'a> {
    pub fn new(ctx: &'a CaptureContext, bandpass: &'a Bandpass, pulse: &'a PulsePattern) -> Self {
        Self {
            ctx,
            bandpass,
            pulse,
        }
    }

    /// Run the full calibration procedure. An outcome with
    /// `accepted == 0` is a failed calibration; the caller decides whether
    /// to proceed uncalibrated.
    pub fn run(&self, fe: &mut dyn AcousticFrontEnd) -> Result<CalibrationOutcome> {
        let ctx = self.ctx;
        let mut frames: [Vec<u16>; 4] = std::array::from_fn(|_| vec![0u16; ctx.sample_len]);
        let mut work = vec![0.0f32; ctx.sample_len];
        let mut filtered = vec![0.0f32; ctx.sample_len];
        let mut sig_level = [0.0f32; 4];

        // Wait for the axis pairs to report comparable signal levels.
        for round in 0..STABILITY_ROUNDS {
            for ch in Channel::ALL {
                sig_level[ch.index()] =
                    fe.measure_channel(ch, self.pulse, &mut frames[ch.index()], true)?;
            }
            let ns = (sig_level[Channel::North.index()] - sig_level[Channel::South.index()]).abs();
            let ew = (sig_level[Channel::East.index()] - sig_level[Channel::West.index()]).abs();
            if ns < STABILITY_TOLERANCE && ew < STABILITY_TOLERANCE {
                debug!("signal levels stable after {} rounds", round + 1);
                break;
            }
        }

        // Pick the channel with the most prominent main lobe as the
        // alignment template.
        let mut prominence = [0.0f32; 4];
        let mut template = [const { None::<Constellation> }; 4];
        for ch in Channel::ALL {
            let constellation = self.condition_and_capture(
                &frames[ch.index()],
                sig_level[ch.index()],
                &mut work,
                &mut filtered,
            );
            if let Some(c) = &constellation {
                let main = c.main_slot();
                let main_amp = c.get(main).amplitude;
                prominence[ch.index()] = (main_amp - c.get(main - 2).amplitude)
                    + (main_amp - c.get(main + 2).amplitude);
            }
            template[ch.index()] = constellation;
        }
        let selected = Channel::ALL[argmax4(&prominence)];
        info!(
            "shape alignment based on channel {}, prominence N:{:.2} S:{:.2} E:{:.2} W:{:.2}",
            selected, prominence[0], prominence[1], prominence[2], prominence[3]
        );

        // Walk start, relative to the dead-zone cut: a little left of the
        // template's first peak to absorb channel-to-channel misalignment.
        let anchor = template[selected.index()]
            .as_ref()
            .and_then(|c| c.first_present())
            .map(|p| {
                (p.position as usize)
                    .saturating_sub(ctx.dead_zone)
                    .saturating_sub(ANCHOR_MARGIN)
            })
            .unwrap_or(0);

        self.accumulate(fe, anchor, &mut frames, &mut work, &mut filtered)
    }

    /// Condition one frame and capture its centred constellation with
    /// positions re-projected to absolute frame indices.
    fn condition_and_capture(
        &self,
        frame: &[u16],
        zero_level: f32,
        work: &mut [f32],
        filtered: &mut [f32],
    ) -> Option<Constellation> {
        let ctx = self.ctx;
        preprocess::remove_dc(frame, work, zero_level);
        self.bandpass.apply(work, filtered);
        if !preprocess::normalize(&mut filtered[ctx.dead_zone..]) {
            return None;
        }
        let mut constellation = capture_peaks(
            &filtered[ctx.dead_zone..],
            ctx.peak_left,
            ctx.peak_right,
            crate::constants::PEAK_THRESHOLD_RATIO,
            ctx.min_peak_spacing,
        );
        constellation.shift_positions(ctx.dead_zone as f32);
        Some(constellation)
    }

    fn accumulate(
        &self,
        fe: &mut dyn AcousticFrontEnd,
        anchor: usize,
        frames: &mut [Vec<u16>; 4],
        work: &mut [f32],
        filtered: &mut [f32],
    ) -> Result<CalibrationOutcome> {
        let ctx = self.ctx;
        let peak_len = ctx.peak_len();
        let zc_len = ctx.zero_cross_len;

        let mut peak_pos_sum = vec![[0.0f64; 2]; peak_len * 4];
        let mut peak_count = vec![0u32; peak_len * 4];
        let mut zc_sum = vec![0.0f64; zc_len * 4];
        let mut accepted = 0usize;

        for _ in 0..MAX_ITERATIONS {
            if accepted >= TARGET_ACCEPTANCES {
                break;
            }

            let mut sig_level = [0.0f32; 4];
            for ch in Channel::ALL {
                sig_level[ch.index()] =
                    fe.measure_channel(ch, self.pulse, &mut frames[ch.index()], true)?;
            }

            let mut peaks: [Vec<Peak>; 4] = std::array::from_fn(|_| Vec::new());
            let mut crossings: [Vec<f32>; 4] = std::array::from_fn(|_| Vec::new());
            let mut usable = true;
            for ch in Channel::ALL {
                preprocess::remove_dc(&frames[ch.index()], work, sig_level[ch.index()]);
                self.bandpass.apply(work, filtered);
                if !preprocess::normalize(&mut filtered[ctx.dead_zone..]) {
                    usable = false;
                    break;
                }
                // Align every channel on the template anchor so the slot
                // layout is comparable across channels and iterations.
                let start = ctx.dead_zone + anchor;
                let mut chan_peaks = capture_peaks_from(
                    &filtered[start..],
                    peak_len,
                    crate::constants::PEAK_THRESHOLD_RATIO,
                    ctx.min_peak_spacing,
                );
                for p in chan_peaks.iter_mut().filter(|p| p.present) {
                    p.position += start as f32;
                }

                let zc_anchor = &chan_peaks[ctx.zc_anchor_slot];
                if !zc_anchor.present {
                    usable = false;
                    break;
                }
                let off = zc_anchor.position as usize;
                let mut chan_zc = find_crossings(&filtered[off..], zc_len);
                if chan_zc.len() < zc_len {
                    usable = false;
                    break;
                }
                for zc in chan_zc.iter_mut() {
                    *zc += off as f32;
                }

                peaks[ch.index()] = chan_peaks;
                crossings[ch.index()] = chan_zc;
            }
            if !usable {
                continue;
            }

            if !self.channels_agree(&crossings) {
                continue;
            }

            accepted += 1;
            for ch in 0..4 {
                for (j, zc) in crossings[ch].iter().enumerate() {
                    zc_sum[ch * zc_len + j] += *zc as f64;
                }
                for (j, p) in peaks[ch].iter().enumerate() {
                    if p.present {
                        peak_pos_sum[ch * peak_len + j][0] += p.position as f64;
                        peak_pos_sum[ch * peak_len + j][1] += p.amplitude as f64;
                        peak_count[ch * peak_len + j] += 1;
                    }
                }
            }
        }

        if accepted == 0 {
            warn!("calibration accumulated no acceptable iterations");
            return Ok(CalibrationOutcome {
                reference: std::array::from_fn(|_| {
                    Constellation::empty(ctx.peak_left, ctx.peak_right)
                }),
                zero_cross_base: std::array::from_fn(|_| Vec::new()),
                accepted: 0,
            });
        }

        let mut reference: [Constellation; 4] =
            std::array::from_fn(|_| Constellation::empty(ctx.peak_left, ctx.peak_right));
        let mut zero_cross_base: [Vec<f32>; 4] = std::array::from_fn(|_| vec![0.0f32; zc_len]);
        for ch in 0..4 {
            for j in 0..zc_len {
                zero_cross_base[ch][j] = (zc_sum[ch * zc_len + j] / accepted as f64) as f32;
            }
            for j in 0..peak_len {
                let count = peak_count[ch * peak_len + j];
                if count > 0 {
                    reference[ch].set(
                        j,
                        Peak {
                            position: (peak_pos_sum[ch * peak_len + j][0] / count as f64) as f32,
                            amplitude: (peak_pos_sum[ch * peak_len + j][1] / count as f64) as f32,
                            present: true,
                        },
                    );
                }
            }
        }

        Ok(CalibrationOutcome {
            reference,
            zero_cross_base,
            accepted,
        })
    }

    /// Acceptance gates: partners on the same axis must agree closely at
    /// the anchor crossing, opposite axes loosely.
    fn channels_agree(&self, crossings: &[Vec<f32>; 4]) -> bool {
        let probe = self.ctx.zc_anchor_slot.min(self.ctx.zero_cross_len - 1);
        let zc = |ch: Channel| crossings[ch.index()][probe];
        (zc(Channel::North) - zc(Channel::South)).abs() < SAME_AXIS_TOLERANCE
            && (zc(Channel::West) - zc(Channel::East)).abs() < SAME_AXIS_TOLERANCE
            && (zc(Channel::North) - zc(Channel::East)).abs() < CROSS_AXIS_TOLERANCE
            && (zc(Channel::South) - zc(Channel::West)).abs() < CROSS_AXIS_TOLERANCE
    }
}

fn argmax4(values: &[f32; 4]) -> usize {
    let mut arg = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[arg] {
            arg = i;
        }
    }
    arg
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_pulse_offsets_subtract_baseline_mean() {
        let base: [Vec<f32>; 4] = std::array::from_fn(|ch| {
            (0..6).map(|j| 100.0 + ch as f32 + 12.5 * j as f32).collect()
        });
        let offsets = pulse_offsets(&base, 300.0, 6);
        // Mean of the baseline is 100 + ch + 31.25.
        for (ch, &off) in offsets.iter().enumerate() {
            assert_abs_diff_eq!(off, 300.0 - (100.0 + ch as f32 + 31.25), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_offsets_validation_window() {
        assert!(offsets_valid(&[10.0, 20.0, 30.0, 40.0], 1000));
        assert!(offsets_valid(&[-150.0, -151.0, -149.5, -150.2], 1000));
        assert!(!offsets_valid(&[10.0, 20.0, 30.0, 1000.0], 1000));
        assert!(!offsets_valid(&[10.0, -1200.0, 30.0, 40.0], 1000));
        assert!(!offsets_valid(&[0.0, 20.0, 30.0, 40.0], 1000));
        assert!(!offsets_valid(&[f32::NAN, 20.0, 30.0, 40.0], 1000));
    }
}
