//! Simulated acoustic front end.
//!
//! Generates the frames a real converter would capture for a configured
//! wind field, so the whole pipeline can run without hardware.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::anemo::{Geometry, speed_of_sound};
use crate::driver::{AcousticFrontEnd, Channel, PulsePattern};
use crate::error::Result;
use crate::signal_processing::preprocess;

use super::echo::{EchoProfile, synthesize_frame};
use super::noise::NoiseConfig;

/// ADC midpoint the simulated channels idle at.
const DEFAULT_ZERO_LEVEL: f32 = 2048.0;
/// Relative amplitude of the direct-path crosstalk in the dead zone.
const CROSSTALK: f32 = 0.3;

pub struct SimulatedFrontEnd {
    profiles: [EchoProfile; 4],
    zero_level: f32,
    noise: NoiseConfig,
    rng: ChaCha8Rng,
    dead_zone: usize,
    powered: bool,
}

impl SimulatedFrontEnd {
    pub fn new(noise: NoiseConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(noise.seed);
        Self {
            profiles: [EchoProfile::default(); 4],
            zero_level: DEFAULT_ZERO_LEVEL,
            noise,
            rng,
            dead_zone: 0,
            powered: false,
        }
    }

    /// Configure per-channel flight times for a wind field.
    /// `ns_wind` is positive when the North->South flight is the faster
    /// one, matching the instrument's sign convention.
    pub fn set_conditions(
        &mut self,
        geometry: &Geometry,
        temperature_c: f32,
        ns_wind: f32,
        ew_wind: f32,
    ) {
        let c = speed_of_sound(temperature_c);
        let (t_north, t_south) = geometry.flight_times_us(c, ns_wind);
        let (t_east, t_west) = geometry.flight_times_us(c, ew_wind);
        self.profiles[Channel::North.index()].tof_us = t_north;
        self.profiles[Channel::South.index()].tof_us = t_south;
        self.profiles[Channel::East.index()].tof_us = t_east;
        self.profiles[Channel::West.index()].tof_us = t_west;
    }

    /// The dead zone is only used to confine the synthetic crosstalk.
    pub fn set_dead_zone(&mut self, dead_zone: usize) {
        self.dead_zone = dead_zone;
    }

    pub fn tof_us(&self, ch: Channel) -> f32 {
        self.profiles[ch.index()].tof_us
    }

    /// Displace one channel's echo, for fault-injection tests.
    pub fn shift_tof(&mut self, ch: Channel, delta_us: f32) {
        self.profiles[ch.index()].tof_us += delta_us;
    }

    /// Scale every flight time, e.g. to fake an implausible sound speed.
    pub fn scale_tofs(&mut self, factor: f32) {
        for profile in self.profiles.iter_mut() {
            profile.tof_us *= factor;
        }
    }

    pub fn set_amplitude(&mut self, ch: Channel, amplitude: f32) {
        self.profiles[ch.index()].amplitude = amplitude;
    }

    /// Narrow or widen every channel's lobe, distorting the echo shape
    /// without moving its timing.
    pub fn set_ring_up(&mut self, ring_up_us: f32) {
        for profile in self.profiles.iter_mut() {
            profile.ring_up_us = ring_up_us;
        }
    }
}

impl AcousticFrontEnd for SimulatedFrontEnd {
    fn measure_channel(
        &mut self,
        ch: Channel,
        _pulse: &PulsePattern,
        frame: &mut [u16],
        return_zero_level: bool,
    ) -> Result<f32> {
        if self.powered {
            synthesize_frame(
                &self.profiles[ch.index()],
                self.zero_level,
                CROSSTALK,
                self.noise.rms_counts,
                self.dead_zone,
                &mut self.rng,
                frame,
            );
        } else {
            // No drive power: nothing but the converter baseline.
            frame.fill(self.zero_level as u16);
        }
        if return_zero_level {
            Ok(preprocess::zero_level(&frame[self.dead_zone.min(frame.len())..]))
        } else {
            Ok(0.0)
        }
    }

    fn sample(&mut self, _ch: Channel, frame: &mut [u16]) -> Result<()> {
        frame.fill(self.zero_level as u16);
        Ok(())
    }

    fn set_power(&mut self, _frequency_hz: u32, on: bool) -> Result<()> {
        self.powered = on;
        Ok(())
    }
}
