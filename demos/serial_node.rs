// Acquisition node on a hosted machine
//
// Uses a serial port as the outbound link, one of its modem-status inputs as
// the trigger line, and a second serial port streaming packed conversion
// results as the analog front-end. Runs until the trigger line fails.

use clap::Parser;
use edge_sampler::{
    connector, open_link, AcquisitionConfig, AcquisitionLoop, ModemInput, ModemLine, StreamSource,
    LINK_BAUD_RATE,
};

#[derive(Parser)]
#[command(name = "serial_node")]
#[command(about = "Edge-triggered capture node over serial ports")]
struct Args {
    /// Outbound link port (first discovered node bridge if omitted)
    #[arg(short, long)]
    link: Option<String>,

    /// Port streaming raw conversion results
    #[arg(short, long)]
    adc: String,

    /// Baud rate of the conversion stream
    #[arg(long, default_value_t = 921_600)]
    adc_baud: u32,

    /// Modem input carrying the trigger (cts, dsr, cd, ri)
    #[arg(short, long, default_value = "cts")]
    trigger: ModemInput,

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

    let link = connector::connect(args.link.as_deref(), LINK_BAUD_RATE)?;
    let line = ModemLine::new(link.try_clone()?, args.trigger);
    let adc = StreamSource::new(open_link(&args.adc, args.adc_baud)?);

    let mut node = AcquisitionLoop::new(AcquisitionConfig::default(), line, adc, link)?;
    let err = match node.run() {
        Ok(never) => match never {},
        Err(e) => e,
    };

    eprintln!("Acquisition stopped: {}", err);
    eprintln!("Stats: {:?}", node.stats());
    Err(err.into())
}
