//! Reflector geometry and axis arithmetic.
//!
//! Sound travels transducer -> reflector -> opposing transducer. With
//! reflector height `h` and transducer pitch `p` the beam leaves at
//! alpha = atan(2h / p); wind along the axis stretches one direction of
//! flight and shrinks the other, while the speed of sound sets their sum.

/// Cached reflector geometry.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub height: f32,
    pub pitch: f32,
    alpha: f32,
    sin_a: f32,
    cos_a: f32,
}

impl Geometry {
    pub fn new(height: f32, pitch: f32) -> Self {
        let alpha = (2.0 * height / pitch).atan();
        Self {
            height,
            pitch,
            alpha,
            sin_a: alpha.sin(),
            cos_a: alpha.cos(),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Wind component along one axis from the two opposing flight times,
    /// seconds in, m/s out. Positive when the `forward` flight is faster.
    pub fn wind_component(&self, t_forward: f32, t_backward: f32) -> f32 {
        self.height / (self.sin_a * self.cos_a) * (1.0 / t_forward - 1.0 / t_backward)
    }

    /// Speed of sound measured along one axis, m/s.
    pub fn sound_component(&self, t_forward: f32, t_backward: f32) -> f32 {
        self.height / self.sin_a * (1.0 / t_forward + 1.0 / t_backward)
    }

    /// Theoretical one-way propagation time in microseconds for a given
    /// speed of sound.
    pub fn propagation_time_us(&self, sound_speed: f32) -> f32 {
        2.0 * self.height / (self.sin_a * sound_speed) * 1e6
    }

    /// Flight times (forward, backward) in microseconds that a given axis
    /// wind and sound speed would produce. Inverse of the component
    /// formulas; the simulation and tests build frames from this.
    pub fn flight_times_us(&self, sound_speed: f32, axis_wind: f32) -> (f32, f32) {
        let v_term = axis_wind * self.sin_a * self.cos_a / self.height;
        let c_term = sound_speed * self.sin_a / self.height;
        let inv_forward = (c_term + v_term) / 2.0;
        let inv_backward = (c_term - v_term) / 2.0;
        (1e6 / inv_forward, 1e6 / inv_backward)
    }
}

/// Speed of sound in air from temperature, m/s.
/// c = 20.05 * sqrt(T + 273.15); good to well under 1 m/s over the
/// instrument's operating range.
pub fn speed_of_sound(temperature_c: f32) -> f32 {
    20.05 * (temperature_c + 273.15).sqrt()
}

/// Wind course in degrees [0, 360) from the two axis components.
/// A pure positive vNS maps to 180, a pure positive vEW to 270.
pub fn course_degrees(ns_wind: f32, ew_wind: f32) -> f32 {
    (-ew_wind).atan2(-ns_wind).to_degrees().rem_euclid(360.0)
}
