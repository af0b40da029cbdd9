//! Offline analysis of a dumped frame CSV.
//!
//! Re-runs the conditioning and extraction pipeline on a recorded
//! four-channel frame set and prints what the controller would have seen,
//! which is usually enough to tell a silent channel from a distorted echo.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use sonicvane::driver::{CaptureContext, Channel, PulsePattern};
use sonicvane::dump::read_frames;
use sonicvane::signal_processing::{
    Bandpass, BandpassBandwidth, capture_peaks, find_crossings, preprocess,
};

#[derive(Parser, Debug)]
#[command(name = "analyze_dump")]
#[command(about = "Inspect a dumped anemometer frame CSV", long_about = None)]
struct Args {
    /// Dump file to analyze
    file: PathBuf,

    /// Band-pass order (1-3)
    #[arg(long, default_value = "1")]
    order: usize,

    /// Use the narrow 2 kHz band-pass instead of the 10 kHz default
    #[arg(long)]
    narrow: bool,

    /// Print every detected peak instead of a summary
    #[arg(long)]
    peaks: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let frames = read_frames(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let ctx = CaptureContext::for_pulse(&PulsePattern::coded());
    let bandwidth = if args.narrow {
        BandpassBandwidth::Narrow
    } else {
        BandpassBandwidth::Wide
    };
    let bandpass = Bandpass::new(bandwidth, args.order)?;

    println!(
        "{}: {} samples/channel, dead zone {}",
        args.file.display(),
        frames[0].len(),
        ctx.dead_zone
    );

    for ch in Channel::ALL {
        let raw = &frames[ch.index()];
        if raw.len() <= ctx.dead_zone {
            println!("{ch:>5}: frame too short");
            continue;
        }
        let mut work = vec![0.0f32; raw.len()];
        let mut filtered = vec![0.0f32; raw.len()];
        let zero = preprocess::remove_dc_auto(raw, &mut work);
        bandpass.apply(&work, &mut filtered);
        if !preprocess::normalize(&mut filtered[ctx.dead_zone..]) {
            println!("{ch:>5}: zero level {zero:.1}, silent after conditioning");
            continue;
        }

        let shape = capture_peaks(
            &filtered[ctx.dead_zone..],
            ctx.peak_left,
            ctx.peak_right,
            sonicvane::constants::PEAK_THRESHOLD_RATIO,
            ctx.min_peak_spacing,
        );
        let main = shape.get(shape.main_slot());
        println!(
            "{ch:>5}: zero level {zero:.1}, {} peaks, main at {:.0} ({:.0} abs)",
            shape.detected(),
            main.position,
            main.position + ctx.dead_zone as f32
        );

        if args.peaks {
            for (slot, peak) in shape.iter().enumerate() {
                if peak.present {
                    println!(
                        "       slot {slot:>2}: pos {:>6.1}, amp {:>6.3}",
                        peak.position + ctx.dead_zone as f32,
                        peak.amplitude
                    );
                }
            }
        }

        if let Some(anchor) = shape.slot(ctx.zc_anchor_slot).filter(|p| p.present) {
            let start = ctx.dead_zone + anchor.position as usize;
            let mut crossings = find_crossings(&filtered[start..], ctx.zero_cross_len);
            for zc in crossings.iter_mut() {
                *zc += start as f32;
            }
            if crossings.len() == ctx.zero_cross_len {
                let mean: f32 =
                    crossings.iter().take(ctx.num_zc_avg).sum::<f32>() / ctx.num_zc_avg as f32;
                println!(
                    "       anchor crossing mean {:.2} us (uncorrected), first {:.2}",
                    mean, crossings[0]
                );
            } else {
                println!("       only {} crossings after anchor", crossings.len());
            }
        } else {
            println!("       no anchor peak; crossing extraction impossible");
        }
    }

    Ok(())
}
