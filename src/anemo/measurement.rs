//! Published measurement record.

/// One oversampled output sample, as read by downstream consumers.
/// `course` is -1 when the wind is too weak for a defined direction.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Measurement {
    /// Wind speed, m/s.
    pub speed: f32,
    /// Wind course in degrees [0, 360), or -1 when undefined.
    pub course: f32,
    /// Measured speed of sound, m/s.
    pub sound_speed: f32,
    /// Rolling 30-second mean wind speed, m/s.
    pub speed_30s_avg: f32,
    /// Rolling 30-second maximum wind speed, m/s.
    pub speed_30s_max: f32,
    /// Numeric code of the most recent fault.
    pub err_code: u8,
    /// Monotonic count of published samples.
    pub cycle: u64,
}
