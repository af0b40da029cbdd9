//! Turning-point and peak extraction around the main echo lobe.
//!
//! The echo of the coded burst arrives as a lobe of alternating carrier
//! peaks roughly 12.5 samples apart. Detection walks outward from the
//! global maximum, collecting local extrema into a fixed-slot
//! constellation that later serves as a shape descriptor.

/// A detected local extremum. `position` is a sample index within the
/// region handed to the extractor; it stays integral here and only becomes
/// fractional after averaging in calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Peak {
    pub position: f32,
    pub amplitude: f32,
    pub present: bool,
}

/// Ordered set of peaks around and including the main peak. The main peak
/// always sits at `main_slot`; side slots may be absent when the lobe is
/// short or distorted.
#[derive(Debug, Clone)]
pub struct Constellation {
    peaks: Vec<Peak>,
    main_slot: usize,
}

impl Constellation {
    pub fn empty(left: usize, right: usize) -> Self {
        Self {
            peaks: vec![Peak::default(); left + right + 1],
            main_slot: left,
        }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn main_slot(&self) -> usize {
        self.main_slot
    }

    pub fn get(&self, slot: usize) -> Peak {
        self.peaks[slot]
    }

    pub fn slot(&self, slot: usize) -> Option<&Peak> {
        self.peaks.get(slot)
    }

    pub fn set(&mut self, slot: usize, peak: Peak) {
        self.peaks[slot] = peak;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter()
    }

    pub fn detected(&self) -> usize {
        self.peaks.iter().filter(|p| p.present).count()
    }

    /// Shift every present position by `offset`, re-projecting slice-local
    /// indices back to absolute frame indices.
    pub fn shift_positions(&mut self, offset: f32) {
        for p in self.peaks.iter_mut().filter(|p| p.present) {
            p.position += offset;
        }
    }

    /// First present peak, scanning from slot 0.
    pub fn first_present(&self) -> Option<Peak> {
        self.peaks.iter().copied().find(|p| p.present)
    }
}

fn sign_differs(a: f32, b: f32) -> bool {
    a.is_sign_negative() != b.is_sign_negative()
}

/// Find the next turning point at or after `start + 3`.
///
/// A turning point is an index `i` where the slope changes sign between
/// `x[i] - x[i-1]` and `x[i+1] - x[i]`. The first few differences are
/// skipped for stability against filter transients.
pub fn next_turning(sig: &[f32], start: usize) -> Option<usize> {
    if start + 4 > sig.len() {
        return None;
    }
    let mut prev_dt = sig[start + 3] - sig[start + 2];
    for i in (start + 3)..(sig.len() - 1) {
        let dt = sig[i + 1] - sig[i];
        if sign_differs(prev_dt, dt) {
            return Some(i);
        }
        prev_dt = dt;
    }
    None
}

/// Find the previous turning point at or before `start - 3`, scanning
/// backward. `start` must lie strictly inside the buffer with at least
/// three samples of history.
pub fn prev_turning(sig: &[f32], start: usize) -> Option<usize> {
    if start < 4 || start >= sig.len() {
        return None;
    }
    let mut prev_dt = sig[start - 2] - sig[start - 3];
    for i in 3..start {
        let dt = sig[start - i] - sig[start - i - 1];
        if sign_differs(prev_dt, dt) {
            return Some(start - i);
        }
        prev_dt = dt;
    }
    None
}

fn argmax(sig: &[f32]) -> usize {
    let mut arg = 0;
    let mut max = sig[0];
    for (i, &v) in sig.iter().enumerate() {
        if v > max {
            arg = i;
            max = v;
        }
    }
    arg
}

/// Capture the peak constellation around the global maximum.
///
/// The main peak lands at slot `left`; up to `right` turning points are
/// examined walking right and up to `left` walking left. A turning point
/// is accepted as a peak when its magnitude reaches `threshold_ratio`
/// times the main amplitude and it sits at least `min_spacing` samples
/// from the previously accepted peak in the same direction. The walk stops
/// beyond 25 * (side + 2) samples from the main peak.
pub fn capture_peaks(
    sig: &[f32],
    left: usize,
    right: usize,
    threshold_ratio: f32,
    min_spacing: usize,
) -> Constellation {
    let mut constellation = Constellation::empty(left, right);
    if sig.len() < 4 {
        return constellation;
    }

    let main_idx = argmax(sig);
    let threshold = sig[main_idx] * threshold_ratio;
    constellation.set(
        left,
        Peak {
            position: main_idx as f32,
            amplitude: sig[main_idx],
            present: true,
        },
    );

    // Right walk.
    let max_distance_right = 25 * (right + 2);
    let mut sig_idx = main_idx;
    let mut prev_pos = main_idx;
    let mut slot = left + 1;
    for _ in 0..right {
        let Some(turning) = next_turning(sig, sig_idx) else {
            break;
        };
        sig_idx = turning;
        if sig_idx - main_idx > max_distance_right {
            break;
        }
        if sig[sig_idx].abs() >= threshold && sig_idx.abs_diff(prev_pos) >= min_spacing {
            constellation.set(
                slot,
                Peak {
                    position: sig_idx as f32,
                    amplitude: sig[sig_idx],
                    present: true,
                },
            );
            slot += 1;
            prev_pos = sig_idx;
        }
    }

    // Left walk, mirrored.
    let max_distance_left = 25 * (left + 2);
    sig_idx = main_idx;
    prev_pos = main_idx;
    let mut slot = left;
    for _ in 0..left {
        if slot == 0 {
            break;
        }
        let Some(turning) = prev_turning(sig, sig_idx) else {
            break;
        };
        sig_idx = turning;
        if main_idx - sig_idx > max_distance_left {
            break;
        }
        if sig[sig_idx].abs() >= threshold && prev_pos.abs_diff(sig_idx) >= min_spacing {
            slot -= 1;
            constellation.set(
                slot,
                Peak {
                    position: sig_idx as f32,
                    amplitude: sig[sig_idx],
                    present: true,
                },
            );
            prev_pos = sig_idx;
        }
    }

    constellation
}

/// Capture up to `peak_len` peaks walking rightward from index 0, without
/// centring on the maximum. The threshold is still relative to the global
/// maximum of the slice. Used by calibration once the lobe anchor is known.
pub fn capture_peaks_from(
    sig: &[f32],
    peak_len: usize,
    threshold_ratio: f32,
    min_spacing: usize,
) -> Vec<Peak> {
    let mut peaks = vec![Peak::default(); peak_len];
    if sig.len() < 4 {
        return peaks;
    }

    let main_idx = argmax(sig);
    let threshold = sig[main_idx] * threshold_ratio;
    let max_distance_right = 25 * (peak_len + 2) as isize;

    let mut sig_idx = 0usize;
    let mut prev_pos: Option<usize> = None;
    let mut slot = 0usize;
    for _ in 0..peak_len {
        let Some(turning) = next_turning(sig, sig_idx) else {
            break;
        };
        sig_idx = turning;
        if sig_idx as isize - main_idx as isize > max_distance_right {
            break;
        }
        let spaced = prev_pos.is_none_or(|p| sig_idx.abs_diff(p) >= min_spacing);
        if sig[sig_idx].abs() >= threshold && spaced {
            peaks[slot] = Peak {
                position: sig_idx as f32,
                amplitude: sig[sig_idx],
                present: true,
            };
            slot += 1;
            prev_pos = Some(sig_idx);
        }
    }

    peaks
}
