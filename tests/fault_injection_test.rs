//! Fault-gate tests: distorted echoes, implausible sound speeds, silent
//! channels, and recovery after a fault window.

mod common;

use common::{AIR_TEMP, calibrated_rig, run_until_published, test_config};
use sonicvane::FaultCode;
use sonicvane::driver::{AcousticFrontEnd, Channel};
use sonicvane::processing::{AnemometerProcessor, CycleOutcome};
use sonicvane::simulation::{NoiseConfig, SimulatedFrontEnd};

fn expect_fault(
    processor: &mut AnemometerProcessor,
    fe: &mut SimulatedFrontEnd,
    expected: FaultCode,
) {
    let before = processor.err_count();
    match processor.run_cycle(fe, AIR_TEMP).expect("cycle") {
        CycleOutcome::Fault(fault) => assert_eq!(fault, expected),
        _ => panic!("expected {expected} fault"),
    }
    assert_eq!(processor.err_count(), before + 1, "fault must bump err_count");
    assert_eq!(processor.last_fault(), expected);
}

#[test]
fn test_implausible_sound_speed_faults() {
    let (mut processor, mut fe) = calibrated_rig(AIR_TEMP, NoiseConfig::default());
    run_until_published(&mut processor, &mut fe, AIR_TEMP, 16);

    // Compress the flight times until the derived sound speed leaves the
    // physical window near 400 m/s.
    fe.scale_tofs(343.0 / 400.0);
    expect_fault(&mut processor, &mut fe, FaultCode::WindSpeed);
}

#[test]
fn test_model_mismatch_faults() {
    let (mut processor, mut fe) = calibrated_rig(AIR_TEMP, NoiseConfig::default());
    run_until_published(&mut processor, &mut fe, AIR_TEMP, 16);

    // Stretch the flight times ~6%: the derived c stays inside the hard
    // window but drifts >10 m/s from the temperature model.
    fe.scale_tofs(1.06);
    expect_fault(&mut processor, &mut fe, FaultCode::WindSpeed);
}

#[test]
fn test_distorted_echo_shape_faults() {
    let (mut processor, mut fe) = calibrated_rig(AIR_TEMP, NoiseConfig::default());

    // Warm the per-channel MSE history with a few clean cycles.
    for _ in 0..8 {
        match processor.run_cycle(&mut fe, AIR_TEMP).unwrap() {
            CycleOutcome::Fault(fault) => panic!("clean cycle faulted: {fault}"),
            _ => {}
        }
    }

    // Collapse the lobe to a third of its ring-up: same timing, very
    // different peak constellation.
    fe.set_ring_up(50.0);
    expect_fault(&mut processor, &mut fe, FaultCode::ShapeMismatch);
}

#[test]
fn test_silent_channel_faults() {
    let (mut processor, mut fe) = calibrated_rig(AIR_TEMP, NoiseConfig::default());
    run_until_published(&mut processor, &mut fe, AIR_TEMP, 16);

    fe.set_amplitude(Channel::East, 0.0);
    expect_fault(&mut processor, &mut fe, FaultCode::ShapeMismatch);
}

#[test]
fn test_uncalibrated_processor_always_faults() {
    let config = test_config();
    let mut processor = AnemometerProcessor::new(&config).unwrap();
    let mut fe = SimulatedFrontEnd::new(NoiseConfig::default());
    fe.set_dead_zone(processor.context().dead_zone);
    let geometry = *processor.geometry();
    fe.set_conditions(&geometry, AIR_TEMP, 0.0, 0.0);
    fe.set_power(80_000, true).unwrap();

    assert!(!processor.is_calibrated());
    for _ in 0..4 {
        match processor.run_cycle(&mut fe, AIR_TEMP).unwrap() {
            CycleOutcome::Fault(fault) => assert_eq!(fault, FaultCode::ShapeMismatch),
            _ => panic!("uncalibrated cycles must fault deterministically"),
        }
    }
    assert_eq!(processor.err_count(), 4);
}

#[test]
fn test_recovery_after_fault_window() {
    let (mut processor, mut fe) = calibrated_rig(AIR_TEMP, NoiseConfig::default());
    let geometry = *processor.geometry();
    fe.set_conditions(&geometry, AIR_TEMP, 2.0, 0.0);
    let first = run_until_published(&mut processor, &mut fe, AIR_TEMP, 16);

    // Ten consecutive faulted cycles.
    fe.scale_tofs(343.0 / 400.0);
    for _ in 0..10 {
        match processor.run_cycle(&mut fe, AIR_TEMP).unwrap() {
            CycleOutcome::Fault(fault) => assert_eq!(fault, FaultCode::WindSpeed),
            _ => panic!("expected fault while the echo is displaced"),
        }
    }
    let err_after_window = processor.err_count();
    assert!(err_after_window >= 10);

    // Restore the air and confirm publication resumes.
    fe.set_conditions(&geometry, AIR_TEMP, 2.0, 0.0);
    let recovered = run_until_published(&mut processor, &mut fe, AIR_TEMP, 16);
    assert!(
        (recovered.speed - 2.0).abs() < 0.05,
        "post-recovery speed {:.3}",
        recovered.speed
    );
    assert_eq!(recovered.cycle, first.cycle + 1);
    assert_eq!(
        processor.err_count(),
        err_after_window,
        "valid cycles must not move the error counter"
    );
    assert_eq!(recovered.err_code, 0);
}

#[test]
fn test_no_publication_during_faults() {
    let (mut processor, mut fe) = calibrated_rig(AIR_TEMP, NoiseConfig::default());

    // Three clean cycles accumulate toward the 4-cycle oversampling
    // target without publishing.
    for _ in 0..3 {
        match processor.run_cycle(&mut fe, AIR_TEMP).unwrap() {
            CycleOutcome::Accumulated(_) => {}
            other => panic!(
                "expected accumulation, got {}",
                match other {
                    CycleOutcome::Published(..) => "publication",
                    CycleOutcome::Fault(_) => "fault",
                    CycleOutcome::Accumulated(_) => unreachable!(),
                }
            ),
        }
    }

    // A faulted cycle must not publish the pending accumulation.
    fe.scale_tofs(343.0 / 400.0);
    expect_fault(&mut processor, &mut fe, FaultCode::WindSpeed);

    // The next valid cycle completes the oversampling window instead.
    fe.scale_tofs(400.0 / 343.0);
    match processor.run_cycle(&mut fe, AIR_TEMP).unwrap() {
        CycleOutcome::Published(_, m) => assert_eq!(m.cycle, 1),
        _ => panic!("expected the fourth valid cycle to publish"),
    }
}
