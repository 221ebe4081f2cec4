// Simulated acquisition node
//
// Runs the acquisition loop against a scripted trigger line and a scripted
// analog front-end, writes the frames to a file (or discards them), and
// decodes them back to check the stream.

use clap::Parser;
use edge_sampler::sim::{Fault, ScriptedSource, SquareLine};
use edge_sampler::config::ADC_CHANNEL;
use edge_sampler::{frame_len, AcquisitionConfig, AcquisitionLoop, FrameDecoder};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "simulated_node")]
#[command(about = "Run the acquisition loop on simulated hardware")]
struct Args {
    /// Number of rising+falling periods to run
    #[arg(short, long, default_value_t = 10)]
    cycles: u64,

    /// Samples per window
    #[arg(short = 'n', long, default_value_t = 200)]
    window_len: usize,

    /// Line reads per half period of the simulated trigger
    #[arg(long, default_value_t = 50)]
    half_period: u64,

    /// Inject a capture timeout every this many cycles (0 = never)
    #[arg(long, default_value_t = 0)]
    fault_every: u64,

    /// Write the raw frame stream to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    println!("Simulated Acquisition Node");
    println!("==========================");
    println!("Cycles: {}", args.cycles);
    println!(
        "Window: {} samples ({} bytes per frame)\n",
        args.window_len,
        frame_len(args.window_len)
    );

    let config = AcquisitionConfig::default()
        .with_window_len(args.window_len)
        .with_coarse_poll(Duration::from_micros(100))
        .with_startup_delay(Duration::ZERO);

    let mut node = AcquisitionLoop::new(
        config,
        SquareLine::new(args.half_period),
        ScriptedSource::ramp(ADC_CHANNEL),
        Vec::new(),
    )?;

    let start = Instant::now();
    for cycle in 1..=args.cycles {
        if args.fault_every > 0 && cycle % args.fault_every == 0 {
            node.source_mut().inject(Fault::Timeout);
        }
        node.run_cycle()?;
    }
    let elapsed = start.elapsed();
    let stats = node.stats();
    let stream = node.into_sink();

    println!("Ran {} cycles in {:.1} ms", stats.cycles, elapsed.as_secs_f64() * 1000.0);
    println!("  frames emitted:    {}", stats.frames_emitted);
    println!("  capture timeouts:  {}", stats.capture_timeouts);
    println!("  transmit failures: {}", stats.transmit_failures);

    let mut decoder = FrameDecoder::new(args.window_len);
    decoder.push(&stream);
    let mut decoded = 0;
    while let Some(frame) = decoder.next_frame() {
        decoded += 1;
        log::debug!(
            "{:?} frame, first samples {:?}",
            frame.transition,
            &frame.samples[..frame.samples.len().min(4)]
        );
    }
    println!("Decoded {} frames back, {} bytes discarded", decoded, decoder.discarded());

    if let Some(path) = args.output {
        File::create(&path)?.write_all(&stream)?;
        println!("Wrote {} bytes to {}", stream.len(), path.display());
    }

    Ok(())
}
