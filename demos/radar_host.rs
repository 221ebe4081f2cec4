// FMCW radar host
//
// Reads ramp frames from two acquisition nodes, one digitizing the I mixer
// output and one the Q output. Each channel's ramps are paired, I and Q are
// combined, and every measurement is printed and optionally sent to a display
// controller as a `D:<m>,V:<m/s>,DIR:<direction>` line.

use clap::Parser;
use edge_sampler::{
    open_link, DisplayWriter, FrameError, FrameReader, IqAssembler, IqChannel, RadarConfig,
    RadarProcessor, RampAssembler, RampPair, ReceiverConfig,
};
use std::io::ErrorKind;
use std::sync::mpsc::{self, Sender};
use std::thread;

#[derive(Parser)]
#[command(name = "radar_host")]
#[command(about = "Range and velocity from two I/Q acquisition nodes")]
struct Args {
    /// Port of the node digitizing the I channel
    #[arg(short = 'i', long)]
    in_phase: String,

    /// Port of the node digitizing the Q channel
    #[arg(short = 'q', long)]
    quadrature: String,

    /// Display controller port
    #[arg(short, long)]
    display: Option<String>,

    /// Samples per frame, as configured on the nodes
    #[arg(short = 'n', long, default_value_t = 200)]
    window_len: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_channel(
    port: String,
    channel: IqChannel,
    config: ReceiverConfig,
    ramps: Sender<(IqChannel, RampPair)>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut reader = FrameReader::new(open_link(&port, config.baud_rate)?, config.window_len);
    let mut assembler = RampAssembler::new(config.samples_per_ramp);
    log::info!("[{}] Reading ramps from {}", channel.as_str(), port);

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(e)) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e.into()),
        };
        if let Some(pair) = assembler.push(frame) {
            if ramps.send((channel, pair)).is_err() {
                return Ok(());
            }
        }
    }
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

    let receiver = ReceiverConfig {
        window_len: args.window_len,
        samples_per_ramp: args.window_len,
        ..ReceiverConfig::default()
    };
    receiver.validate()?;

    let radar = RadarConfig::default().with_chirp_samples(receiver.samples_per_ramp);
    let mut display = match &args.display {
        Some(port) => Some(DisplayWriter::new(open_link(port, radar.display_baud_rate)?)),
        None => None,
    };
    let mut processor = RadarProcessor::new(radar)?;

    let (tx, rx) = mpsc::channel();
    for (port, channel) in [
        (args.in_phase.clone(), IqChannel::InPhase),
        (args.quadrature.clone(), IqChannel::Quadrature),
    ] {
        let tx = tx.clone();
        let config = receiver.clone();
        thread::spawn(move || {
            if let Err(e) = read_channel(port, channel, config, tx) {
                log::error!("[{}] Reader stopped: {}", channel.as_str(), e);
            }
        });
    }
    drop(tx);

    println!("FMCW radar host: I on {}, Q on {}", args.in_phase, args.quadrature);

    let mut iq = IqAssembler::new();
    for (channel, pair) in rx {
        let Some(ramps) = iq.push(channel, pair) else {
            continue;
        };
        let m = processor.process(&ramps)?;
        println!(
            "f_up {:10.2} Hz  f_down {:10.2} Hz  distance {:8.4} m  velocity {:8.4} m/s  {}",
            m.f_up,
            m.f_down,
            m.distance_m,
            m.velocity_mps,
            m.direction.as_str()
        );

        if let Some(display) = display.as_mut() {
            if let Err(e) = display.send(&m) {
                log::error!("Failed to update display: {}", e);
            }
        }
    }

    println!("Both channel readers stopped");
    Ok(())
}
