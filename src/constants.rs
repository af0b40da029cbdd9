//! Numeric constants for signal processing stability
//!
//! These constants define thresholds and epsilon values used throughout
//! the echo extraction pipeline to ensure numerical stability.

/// Epsilon for preventing division by zero in interpolation calculations.
/// Used when computing sub-sample positions (e.g., zero-crossing interpolation).
pub const INTERPOLATION_EPSILON: f32 = 1e-10;

/// Minimum absolute maximum for the normalisation step.
/// A conditioned frame whose absolute maximum falls below this is treated
/// as silent and the cycle is discarded.
pub const MIN_SIGNAL_AMPLITUDE: f32 = 1e-6;

/// Ratio of the main-peak amplitude used as the acceptance threshold when
/// walking the echo lobe for side peaks.
pub const PEAK_THRESHOLD_RATIO: f32 = 0.2;

/// Smoothing factor for the per-channel MSE history and for the sound-speed
/// history used by the plausibility gates.
pub const HISTORY_SMOOTHING: f32 = 0.1;

/// A cycle is rejected when its best shape-match MSE exceeds the smoothed
/// history by this factor.
pub const MSE_REJECT_FACTOR: f32 = 10.0;

/// Absolute floor under the shape-mismatch gate. Normalised amplitudes
/// keep any meaningful mismatch well above this; without the floor a
/// near-zero history would reject arbitrarily small fluctuations.
pub const MSE_GATE_FLOOR: f32 = 1e-3;

/// Physical window for a plausible speed of sound in air, m/s.
pub const SOUND_SPEED_MIN: f32 = 270.0;
pub const SOUND_SPEED_MAX: f32 = 365.0;

/// Maximum tolerated deviation between the measured sound speed and the
/// air-temperature model, m/s.
pub const SOUND_SPEED_MODEL_TOLERANCE: f32 = 10.0;

/// Maximum tolerated deviation between the measured sound speed and its
/// smoothed history, m/s.
pub const SOUND_SPEED_HISTORY_TOLERANCE: f32 = 5.0;

/// Below this wind speed the course is undefined and published as -1.
pub const COURSE_MIN_SPEED: f32 = 0.25;
