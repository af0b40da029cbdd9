//! Shared rig for end-to-end pipeline tests.

use sonicvane::anemo::Measurement;
use sonicvane::config::Config;
use sonicvane::driver::AcousticFrontEnd;
use sonicvane::processing::{AnemometerProcessor, CycleOutcome};
use sonicvane::simulation::{NoiseConfig, SimulatedFrontEnd};

pub const AIR_TEMP: f32 = 20.0;

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.anemometer.oversampling = 4;
    config.anemometer.data_period_ms = 1000;
    config.dump.dump_error = false;
    config
}

/// Build a processor and simulated front end, calibrate in calm air at
/// `temperature`, and hand both back ready for measurement cycles.
pub fn calibrated_rig(
    temperature: f32,
    noise: NoiseConfig,
) -> (AnemometerProcessor, SimulatedFrontEnd) {
    let config = test_config();
    let mut processor = AnemometerProcessor::new(&config).expect("processor construction");
    let mut fe = SimulatedFrontEnd::new(noise);
    fe.set_dead_zone(processor.context().dead_zone);
    let geometry = *processor.geometry();
    fe.set_conditions(&geometry, temperature, 0.0, 0.0);
    fe.set_power(80_000, true).expect("simulated power on");

    let summary = processor
        .calibrate(&mut fe, temperature)
        .expect("calibration run");
    assert!(
        summary.accepted > 0,
        "calibration accepted no iterations in calm simulated air"
    );
    assert!(summary.offsets_valid, "derived offsets out of range");
    (processor, fe)
}

/// Drive cycles until one output sample is published. Panics on any fault
/// or when `max_cycles` passes without a publication.
pub fn run_until_published(
    processor: &mut AnemometerProcessor,
    fe: &mut SimulatedFrontEnd,
    temperature: f32,
    max_cycles: usize,
) -> Measurement {
    for _ in 0..max_cycles {
        match processor.run_cycle(fe, temperature).expect("cycle") {
            CycleOutcome::Published(_, measurement) => return measurement,
            CycleOutcome::Accumulated(_) => {}
            CycleOutcome::Fault(fault) => {
                panic!("unexpected fault {fault} (err_count {})", processor.err_count())
            }
        }
    }
    panic!("no publication within {max_cycles} cycles");
}

/// Smallest angular distance between two courses in degrees.
pub fn course_error(a: f32, b: f32) -> f32 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}
