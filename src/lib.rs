pub mod anemo;
pub mod config;
pub mod constants;
pub mod driver;
pub mod dump;
pub mod error;
pub mod output;
pub mod processing;
pub mod recorder;
pub mod signal_processing;
pub mod worker;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use anemo::{FaultCode, Geometry, Measurement};
pub use config::Config;
pub use driver::{AcousticFrontEnd, Channel, PulsePattern, TemperatureSource};
pub use error::{AnemoError, Result};
pub use processing::AnemometerProcessor;
