//! Noise configuration for synthetic frames.

/// Additive Gaussian noise on the ADC samples.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct NoiseConfig {
    pub seed: u64,
    /// Noise RMS in ADC counts.
    pub rms_counts: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            rms_counts: 0.0,
        }
    }
}

impl NoiseConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Noise level for a target echo SNR in dB.
    pub fn with_snr(mut self, echo_amplitude: f32, snr_db: f32) -> Self {
        // Echo power is A^2/2 for a sinusoidal carrier.
        let signal_rms = echo_amplitude / std::f32::consts::SQRT_2;
        self.rms_counts = signal_rms / 10.0f32.powf(snr_db / 20.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_snr_sets_rms() {
        let noise = NoiseConfig::default().with_snr(800.0, 20.0);
        assert_relative_eq!(
            noise.rms_counts,
            800.0 / std::f32::consts::SQRT_2 / 10.0,
            epsilon = 1e-3
        );
    }
}
