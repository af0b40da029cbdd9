//! Configuration for the anemometer measurement core.
//!
//! The configuration persists as a TOML file. Calibration writes the four
//! derived pulse offsets back into the same file so a restart can reuse
//! them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnemoError, Result};
use crate::signal_processing::BandpassBandwidth;

/// System-wide configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub anemometer: AnemometerConfig,
    pub filter: FilterConfig,
    pub dump: DumpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnemometerConfig {
    /// Height to the reflection panel, metres.
    pub height: f32,
    /// Distance between opposing transducers, metres.
    pub pitch: f32,
    /// Valid cycles averaged into one published sample.
    pub oversampling: u32,
    /// Output period, milliseconds.
    pub data_period_ms: u64,
    /// Master enable; the worker idles when false.
    pub enabled: bool,
    /// Calibrated per-channel offsets in microseconds; written back by
    /// calibration.
    pub pulse_offset: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub bandwidth: BandpassBandwidth,
    pub order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Persist raw frames of faulted cycles.
    pub dump_error: bool,
    /// Directory for error dumps.
    pub dir: String,
}

impl Default for AnemometerConfig {
    fn default() -> Self {
        Self {
            height: 0.05,
            pitch: 0.04,
            oversampling: 4,
            data_period_ms: 1000,
            enabled: true,
            pulse_offset: [0.0; 4],
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bandwidth: BandpassBandwidth::Wide,
            order: 1,
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            dump_error: true,
            dir: "wind_err".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AnemoError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AnemoError::Config(format!("serialize: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.anemometer.oversampling == 0 {
            return Err(AnemoError::Config(
                "anemometer.oversampling must be at least 1".to_string(),
            ));
        }
        if self.anemometer.data_period_ms == 0 {
            return Err(AnemoError::Config(
                "anemometer.data_period_ms must be at least 1".to_string(),
            ));
        }
        if !(self.anemometer.height > 0.0) || !(self.anemometer.pitch > 0.0) {
            return Err(AnemoError::Config(
                "anemometer.height and pitch must be positive".to_string(),
            ));
        }
        if !(1..=3).contains(&self.filter.order) {
            return Err(AnemoError::Config(
                "filter.order must be 1, 2 or 3".to_string(),
            ));
        }
        Ok(())
    }

    /// Period of one measurement cycle: the output period divided by the
    /// oversampling factor.
    pub fn cycle_period_ms(&self) -> u64 {
        (self.anemometer.data_period_ms / self.anemometer.oversampling as u64).max(1)
    }

    /// Capacity of the 30-second wind history ring.
    pub fn history_capacity(&self) -> usize {
        (30_000 / self.anemometer.data_period_ms).max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.anemometer.oversampling, config.anemometer.oversampling);
        assert_eq!(parsed.anemometer.pulse_offset, config.anemometer.pulse_offset);
        assert_eq!(parsed.dump.dir, config.dump.dir);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[anemometer]\nheight = 0.06\n").unwrap();
        assert_eq!(parsed.anemometer.height, 0.06);
        assert_eq!(parsed.anemometer.pitch, 0.04);
        assert!(parsed.dump.dump_error);
    }

    #[test]
    fn test_zero_oversampling_rejected() {
        let mut config = Config::default();
        config.anemometer.oversampling = 0;
        match config.validate() {
            Err(AnemoError::Config(msg)) => assert!(msg.contains("oversampling")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_history_capacity_spans_thirty_seconds() {
        let config = Config::default();
        assert_eq!(config.history_capacity(), 30);
        let mut fast = Config::default();
        fast.anemometer.data_period_ms = 500;
        assert_eq!(fast.history_capacity(), 60);
    }

    #[test]
    fn test_cycle_period_divides_output_period() {
        let config = Config::default();
        assert_eq!(config.cycle_period_ms(), 250);
    }
}
