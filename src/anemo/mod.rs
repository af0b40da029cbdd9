pub mod calibration;
pub mod fault;
pub mod geometry;
pub mod measurement;

pub use calibration::{CalibrationOutcome, Calibrator, pulse_offsets};
pub use fault::FaultCode;
pub use geometry::{Geometry, course_degrees, speed_of_sound};
pub use measurement::Measurement;
