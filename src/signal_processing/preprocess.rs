//! Raw-frame conditioning: DC removal and normalisation.

use crate::constants::MIN_SIGNAL_AMPLITUDE;

/// Convert a raw ADC frame to floats centred on a known zero level.
pub fn remove_dc(raw: &[u16], out: &mut [f32], zero_level: f32) {
    for (o, &r) in out.iter_mut().zip(raw.iter()) {
        *o = r as f32 - zero_level;
    }
}

/// Convert a raw ADC frame to floats centred on its own mean.
/// Returns the mean so the caller can track the channel's DC level.
pub fn remove_dc_auto(raw: &[u16], out: &mut [f32]) -> f32 {
    let zero = zero_level(raw);
    remove_dc(raw, out, zero);
    zero
}

/// Mean of a raw frame, used for ambient zero-level calibration.
pub fn zero_level(raw: &[u16]) -> f32 {
    if raw.is_empty() {
        return 0.0;
    }
    let sum: f64 = raw.iter().map(|&r| r as f64).sum();
    (sum / raw.len() as f64) as f32
}

/// Scale a signal to [-1, 1] in place by its absolute maximum.
///
/// Returns `false` when the signal is effectively silent; the caller must
/// discard the cycle in that case.
pub fn normalize(sig: &mut [f32]) -> bool {
    let max = sig.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    if !(max > MIN_SIGNAL_AMPLITUDE) {
        return false;
    }
    for v in sig.iter_mut() {
        *v /= max;
    }
    true
}
