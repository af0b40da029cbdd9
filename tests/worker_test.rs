//! Worker-thread test: the full loop from power-up through calibration to
//! periodic publication, against the simulated front end.

use std::time::Duration;

use sonicvane::config::Config;
use sonicvane::driver::{CaptureContext, FixedTemperature, PulsePattern};
use sonicvane::simulation::{NoiseConfig, SimulatedFrontEnd};
use sonicvane::worker;

const AIR_TEMP: f32 = 20.0;

fn fast_config() -> Config {
    let mut config = Config::default();
    // Keep the wall-clock short: publish every 200 ms from 2 cycles.
    config.anemometer.data_period_ms = 200;
    config.anemometer.oversampling = 2;
    config.dump.dump_error = false;
    config.dump.dir = std::env::temp_dir()
        .join("sonicvane_worker_test")
        .display()
        .to_string();
    config
}

#[test]
fn test_worker_publishes_and_stops() {
    let config = fast_config();
    let geometry = sonicvane::Geometry::new(config.anemometer.height, config.anemometer.pitch);

    let ctx = CaptureContext::for_pulse(&PulsePattern::coded());
    let mut front_end = SimulatedFrontEnd::new(NoiseConfig::default().with_seed(99));
    front_end.set_dead_zone(ctx.dead_zone);
    front_end.set_conditions(&geometry, AIR_TEMP, 2.0, 0.0);

    let handle = worker::spawn(config, front_end, FixedTemperature(AIR_TEMP), None);

    // Calibration runs against the same (steady) wind field, so its
    // reference simply encodes the slightly asymmetric flight times and
    // the measured differential reads relative to it as zero wind; what
    // matters here is the loop mechanics: publication cadence, monotonic
    // cycle counts and clean shutdown.
    let mut received = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(20);
    while received.len() < 3 && std::time::Instant::now() < deadline {
        match handle.measurements.recv_timeout(Duration::from_millis(500)) {
            Ok(m) => received.push(m),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                assert!(!handle.is_finished(), "worker died before publishing");
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                panic!("worker dropped the channel before publishing")
            }
        }
    }
    assert!(
        received.len() >= 3,
        "expected 3 publications, got {}",
        received.len()
    );

    for pair in received.windows(2) {
        assert_eq!(pair[1].cycle, pair[0].cycle + 1, "publication must be monotonic");
    }
    for m in &received {
        assert_eq!(m.err_code, 0);
        assert!(m.sound_speed > 270.0 && m.sound_speed < 365.0);
    }

    let latest = *handle.latest.lock().unwrap();
    assert!(latest.cycle >= received.last().unwrap().cycle);

    handle.stop().expect("worker shuts down cleanly");
}
