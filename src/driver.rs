//! Analogue front-end interface.
//!
//! The crate does not drive hardware directly. Pulse emission and ADC
//! capture are behind [`AcousticFrontEnd`]; the firmware integration (or the
//! feature-gated simulation) supplies the implementation.

use crate::error::Result;

/// PWM level encoding for pulse patterns: duty cycle 0..=99.
pub const PWM_HIGH: u16 = 99;
pub const PWM_LOW: u16 = 0;

/// Transducer channel. The numeric order is fixed and used as an array
/// index throughout the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Channel {
    North = 0,
    South = 1,
    East = 2,
    West = 3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::North, Channel::South, Channel::East, Channel::West];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The opposing transducer on the same axis.
    pub fn partner(self) -> Channel {
        match self {
            Channel::North => Channel::South,
            Channel::South => Channel::North,
            Channel::East => Channel::West,
            Channel::West => Channel::East,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::North => "North",
            Channel::South => "South",
            Channel::East => "East",
            Channel::West => "West",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Coded ultrasonic burst, one PWM level per 80 kHz bit slot (two slots per
/// 40 kHz half-cycle). A '+' chip is `H, L`, a '-' chip is `L, H`; the
/// leading `L` works around timers that refuse a full-width first cycle.
#[derive(Debug, Clone)]
pub struct PulsePattern {
    levels: &'static [u16],
}

// ++++++---++-+
const CODED_PULSE: [u16; 25] = [
    PWM_LOW, PWM_HIGH, PWM_LOW, PWM_HIGH, PWM_LOW, PWM_HIGH, PWM_LOW, PWM_HIGH, PWM_LOW, PWM_HIGH,
    PWM_LOW, PWM_HIGH, PWM_HIGH, PWM_LOW, PWM_HIGH, PWM_LOW, PWM_HIGH, PWM_LOW, PWM_HIGH, PWM_HIGH,
    PWM_LOW, PWM_HIGH, PWM_LOW, PWM_LOW, PWM_HIGH,
];

impl PulsePattern {
    /// The default 13-chip coded burst.
    pub fn coded() -> Self {
        Self {
            levels: &CODED_PULSE,
        }
    }

    pub fn levels(&self) -> &[u16] {
        self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl Default for PulsePattern {
    fn default() -> Self {
        Self::coded()
    }
}

/// Capture geometry shared by calibration and the measurement controller.
///
/// All sizes are in ADC samples (1 MSPS, so one sample is one microsecond).
#[derive(Debug, Clone)]
pub struct CaptureContext {
    /// Samples captured per channel per cycle.
    pub sample_len: usize,
    /// Leading samples dominated by direct crosstalk; excluded from detection.
    pub dead_zone: usize,
    /// Zero crossings extracted per channel.
    pub zero_cross_len: usize,
    /// Number of leading crossings averaged into the propagation time.
    pub num_zc_avg: usize,
    /// Side peaks captured left of the main peak.
    pub peak_left: usize,
    /// Side peaks captured right of the main peak.
    pub peak_right: usize,
    /// Constellation slot from which zero-crossing extraction starts.
    pub zc_anchor_slot: usize,
    /// Minimum distance between accepted peaks, samples.
    pub min_peak_spacing: usize,
    /// Width of the shape-matcher offset search window.
    pub mse_search_range: usize,
}

impl CaptureContext {
    /// Derive the context for a pulse pattern. The dead zone covers the
    /// emitted burst (12.5 samples per 80 kHz slot) plus settling margin.
    pub fn for_pulse(pulse: &PulsePattern) -> Self {
        Self {
            sample_len: 1000,
            dead_zone: (pulse.len() as f32 * 12.5) as usize + 25,
            zero_cross_len: 6,
            num_zc_avg: 6,
            peak_left: 8,
            peak_right: 8,
            zc_anchor_slot: 5,
            min_peak_spacing: 5,
            mse_search_range: 9,
        }
    }

    /// Samples available for echo detection after the dead zone.
    pub fn valid_len(&self) -> usize {
        self.sample_len - self.dead_zone
    }

    /// Constellation length: left + main + right.
    pub fn peak_len(&self) -> usize {
        self.peak_left + self.peak_right + 1
    }

    /// Slot of the main peak within a constellation.
    pub fn main_slot(&self) -> usize {
        self.peak_left
    }
}

/// Pulse emission and ADC capture, implemented by the hardware layer.
pub trait AcousticFrontEnd {
    /// Emit `pulse` on `ch` and capture `frame.len()` samples. When
    /// `return_zero_level` is set, also compute and return the DC level of
    /// the captured frame; otherwise the return value is 0.
    fn measure_channel(
        &mut self,
        ch: Channel,
        pulse: &PulsePattern,
        frame: &mut [u16],
        return_zero_level: bool,
    ) -> Result<f32>;

    /// Passive capture without emitting a pulse, for ambient zero-level
    /// calibration.
    fn sample(&mut self, ch: Channel, frame: &mut [u16]) -> Result<()>;

    /// Switch the transducer drive supply on or off.
    fn set_power(&mut self, frequency_hz: u32, on: bool) -> Result<()>;
}

/// Source of ambient air temperature for the sound-speed model.
pub trait TemperatureSource {
    fn temperature_c(&mut self) -> f32;
}

/// A constant temperature, for tests and offline analysis.
pub struct FixedTemperature(pub f32);

impl TemperatureSource for FixedTemperature {
    fn temperature_c(&mut self) -> f32 {
        self.0
    }
}
