// Ramp receiver
//
// Reads frames from an acquisition node, pairs rising and falling ramps, and
// prints a summary per pair. Optionally appends every pair as CSV.

use clap::Parser;
use edge_sampler::{open_link, FrameError, FrameReader, RampAssembler, ReceiverConfig};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "receive_ramps")]
#[command(about = "Receive and pair ramp frames from an acquisition node")]
struct Args {
    /// Serial port the node is connected to
    port: String,

    /// Samples per frame, as configured on the node
    #[arg(short = 'n', long, default_value_t = 200)]
    window_len: usize,

    /// Samples kept from each ramp
    #[arg(short, long)]
    samples_per_ramp: Option<usize>,

    /// Append each ramp pair as CSV to this file
    #[arg(long)]
    csv: Option<PathBuf>,

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

    let config = ReceiverConfig {
        window_len: args.window_len,
        samples_per_ramp: args.samples_per_ramp.unwrap_or(args.window_len),
        ..ReceiverConfig::default()
    };
    config.validate()?;

    let port = open_link(&args.port, config.baud_rate)?;
    let mut reader = FrameReader::new(port, config.window_len);
    let mut ramps = RampAssembler::new(config.samples_per_ramp);
    let mut pairs = 0u64;

    println!("Listening on {} for {}-sample frames", args.port, config.window_len);

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(e)) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e.into()),
        };

        let Some(pair) = ramps.push(frame) else {
            continue;
        };
        pairs += 1;

        let peak = |s: &[i16]| s.iter().copied().max().unwrap_or(0);
        println!(
            "Pair {}: rising peak {}, falling peak {} ({} bytes skipped so far)",
            pairs,
            peak(&pair.rising),
            peak(&pair.falling),
            reader.decoder().discarded()
        );

        if let Some(path) = &args.csv {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            pair.write_csv(config.sample_rate_hz, file)?;
        }
    }
}
