//! Fixed-coefficient IIR band-pass around the 40 kHz carrier.
//!
//! Coefficients are pre-tabulated for a 1 MSPS sample rate; redesigning the
//! filter at run time buys nothing when the carrier and sample clock are
//! fixed by the transducers.

use crate::error::{AnemoError, Result};

/// Band-pass width around the 40 kHz centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandpassBandwidth {
    /// 2 kHz wide: strong rejection, slower settling.
    Narrow,
    /// 10 kHz wide: the default; settles within the dead zone.
    Wide,
}

type Coeff = [f32; 2]; // (b, a) pair per tap

const COEFF_40K_2K_BP_1ORDER: [Coeff; 3] = [
    [0.0124111, 1.0],
    [0.0, -1.9132751],
    [-0.0124111, 0.9751779],
];
const COEFF_40K_2K_BP_2ORDER: [Coeff; 5] = [
    [0.0001551, 1.0],
    [0.0, -3.840213],
    [-0.0003103, 5.6515555],
    [0.0, -3.7725641],
    [0.0001551, 0.9650812],
];
const COEFF_40K_2K_BP_3ORDER: [Coeff; 7] = [
    [1.9e-06, 1.0],
    [0.0, -5.763269],
    [-5.8e-06, 14.02188],
    [0.0, -18.4249013],
    [5.8e-06, 13.7888872],
    [0.0, -5.5733324],
    [-1.9e-06, 0.9509757],
];

const COEFF_40K_10K_BP_1ORDER: [Coeff; 3] = [
    [0.0304687, 1.0],
    [0.0, -1.8790705],
    [-0.0304687, 0.9390625],
];
const COEFF_40K_10K_BP_2ORDER: [Coeff; 5] = [
    [0.0009447, 1.0],
    [0.0, -3.7901898],
    [-0.0018894, 5.504279],
    [0.0, -3.6254026],
    [0.0009447, 0.9149758],
];
const COEFF_40K_10K_BP_3ORDER: [Coeff; 7] = [
    [2.91e-05, 1.0],
    [0.0, -5.6926121],
    [-8.74e-05, 13.6786558],
    [0.0, -17.7500413],
    [8.74e-05, 13.1173539],
    [0.0, -5.2350269],
    [-2.91e-05, 0.8818931],
];

/// Direct-form IIR band-pass with tabulated coefficients.
pub struct Bandpass {
    coeff: &'static [Coeff],
}

impl Bandpass {
    pub fn new(bandwidth: BandpassBandwidth, order: usize) -> Result<Self> {
        let coeff: &'static [Coeff] = match (bandwidth, order) {
            (BandpassBandwidth::Narrow, 1) => &COEFF_40K_2K_BP_1ORDER,
            (BandpassBandwidth::Narrow, 2) => &COEFF_40K_2K_BP_2ORDER,
            (BandpassBandwidth::Narrow, 3) => &COEFF_40K_2K_BP_3ORDER,
            (BandpassBandwidth::Wide, 1) => &COEFF_40K_10K_BP_1ORDER,
            (BandpassBandwidth::Wide, 2) => &COEFF_40K_10K_BP_2ORDER,
            (BandpassBandwidth::Wide, 3) => &COEFF_40K_10K_BP_3ORDER,
            (_, order) => {
                return Err(AnemoError::Config(format!(
                    "no band-pass table for order {order}"
                )));
            }
        };
        Ok(Self { coeff })
    }

    pub fn order(&self) -> usize {
        (self.coeff.len() - 1) / 2
    }

    /// Number of leading output samples that are forced to zero.
    pub fn settle_len(&self) -> usize {
        self.coeff.len()
    }

    /// Apply the difference equation:
    /// y[i] = sum(b[c]*x[i-c]) - sum(a[c]*y[i-c]) for c = 1..taps.
    /// The first `settle_len()` outputs are undefined and set to zero.
    pub fn apply(&self, x: &[f32], y: &mut [f32]) {
        debug_assert_eq!(x.len(), y.len());
        let taps = self.coeff.len();
        let n = x.len().min(y.len());
        let head = taps.min(n);
        y[..head].fill(0.0);
        for i in head..n {
            let mut acc = 0.0;
            for (c, ba) in self.coeff.iter().enumerate() {
                acc += ba[0] * x[i - c];
            }
            for (c, ba) in self.coeff.iter().enumerate().skip(1) {
                acc -= ba[1] * y[i - c];
            }
            y[i] = acc;
        }
    }
}

impl Default for Bandpass {
    fn default() -> Self {
        Self {
            coeff: &COEFF_40K_10K_BP_1ORDER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq_hz: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq_hz * i as f32 / 1_000_000.0).sin())
            .collect()
    }

    fn rms(sig: &[f32]) -> f32 {
        (sig.iter().map(|v| v * v).sum::<f32>() / sig.len() as f32).sqrt()
    }

    #[test]
    fn test_settle_region_zeroed() {
        let bp = Bandpass::new(BandpassBandwidth::Wide, 2).unwrap();
        let x = tone(40_000.0, 200);
        let mut y = vec![1.0; 200];
        bp.apply(&x, &mut y);
        assert!(y[..bp.settle_len()].iter().all(|&v| v == 0.0));
        assert!(y[bp.settle_len()..].iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_passes_carrier() {
        let bp = Bandpass::default();
        let x = tone(40_000.0, 2000);
        let mut y = vec![0.0; 2000];
        bp.apply(&x, &mut y);
        // Skip the transient, compare steady-state energy.
        let gain = rms(&y[500..]) / rms(&x[500..]);
        assert!(gain > 0.7, "carrier attenuated to {gain}");
    }

    #[test]
    fn test_rejects_out_of_band() {
        let bp = Bandpass::default();
        let x = tone(5_000.0, 2000);
        let mut y = vec![0.0; 2000];
        bp.apply(&x, &mut y);
        let gain = rms(&y[500..]) / rms(&x[500..]);
        assert!(gain < 0.2, "5 kHz leaked through at {gain}");
    }

    #[test]
    fn test_all_orders_available() {
        for bw in [BandpassBandwidth::Narrow, BandpassBandwidth::Wide] {
            for order in 1..=3 {
                let bp = Bandpass::new(bw, order).unwrap();
                assert_eq!(bp.order(), order);
            }
        }
        assert!(Bandpass::new(BandpassBandwidth::Wide, 4).is_err());
    }
}
