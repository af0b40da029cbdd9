//! Synthetic echo frame generation.
//!
//! Models what the ADC sees after a coded burst: a DC-offset baseline,
//! decaying emitter crosstalk inside the dead zone, and a 40 kHz echo
//! lobe whose envelope follows the transducer's ring-up and ring-down.

use std::f32::consts::PI;

use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Carrier frequency in cycles per sample (40 kHz at 1 MSPS).
const CARRIER: f32 = 0.04;
/// Default samples from echo onset to the envelope maximum.
const RING_UP: f32 = 150.0;
/// ADC full scale (12-bit converter).
const ADC_MAX: f32 = 4095.0;

/// One channel's echo parameters.
#[derive(Debug, Clone, Copy)]
pub struct EchoProfile {
    /// Echo onset in microseconds (equal to samples at 1 MSPS).
    pub tof_us: f32,
    /// Peak amplitude in ADC counts.
    pub amplitude: f32,
    /// Samples from onset to the envelope maximum. Shrinking this narrows
    /// the lobe, which is how tests fake an acoustically distorted echo.
    pub ring_up_us: f32,
}

impl Default for EchoProfile {
    fn default() -> Self {
        Self {
            tof_us: 500.0,
            amplitude: 800.0,
            ring_up_us: RING_UP,
        }
    }
}

/// Envelope peaking at 1.0 when `tau == ring_up`, rising like the
/// transducer charges and decaying once the burst has passed.
fn envelope(tau: f32, ring_up: f32) -> f32 {
    if tau <= 0.0 {
        return 0.0;
    }
    let x = tau / ring_up;
    (x * (1.0 - x).exp()).powi(2)
}

/// Synthesize one raw frame into `frame`.
///
/// `crosstalk` is the relative amplitude of the direct-path ringing at the
/// start of the frame; `noise_rms` is additive Gaussian noise in counts.
pub fn synthesize_frame(
    profile: &EchoProfile,
    zero_level: f32,
    crosstalk: f32,
    noise_rms: f32,
    dead_zone: usize,
    rng: &mut ChaCha8Rng,
    frame: &mut [u16],
) {
    let noise = Normal::new(0.0f32, noise_rms.max(1e-12)).expect("noise sigma is finite");
    for (i, slot) in frame.iter_mut().enumerate() {
        let t = i as f32;
        let mut value = zero_level;

        // Direct crosstalk, confined to the dead zone.
        if crosstalk > 0.0 && i < dead_zone {
            let decay = (-t / 80.0).exp();
            value += crosstalk * profile.amplitude * decay * (2.0 * PI * CARRIER * t).sin();
        }

        let tau = t - profile.tof_us;
        value += profile.amplitude * envelope(tau, profile.ring_up_us) * (2.0 * PI * CARRIER * tau).sin();

        if noise_rms > 0.0 {
            value += noise.sample(rng);
        }

        *slot = value.round().clamp(0.0, ADC_MAX) as u16;
    }
}
