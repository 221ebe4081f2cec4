//! # Edge Sampler
//!
//! Captures fixed-length analog windows on every edge of a digital trigger
//! line and streams them over a serial link as delimited binary frames.
//!
//! A node alternates forever between two capture cycles. It waits for a
//! rising edge, samples N conversions, and sends them tagged `Rising`. It then
//! waits for a falling edge, samples again, and sends them tagged `Falling`.
//!
//! ## Features
//!
//! - **Edge detection**: two-phase wait, a sleeping poll until the line is at
//!   the pre-edge level, then a spinning poll until the edge itself
//! - **Window capture**: exactly N samples per edge; timeouts and faults
//!   yield a zeroed window so the frame cadence never breaks
//! - **Framing**: `AA 55 | type | N × i16 LE | 55 AA`, no length, no checksum
//! - **Receiving**: a resynchronizing decoder and a ramp assembler with
//!   `polars` output
//! - **Radar processing**: I/Q ramp pairing, Hann-windowed `rustfft` beat
//!   analysis, FMCW range, velocity and direction, and a display line writer
//! - **Hosted bindings**: `serialport` based sink, trigger line and sample
//!   stream, plus USB-UART node discovery
//!
//! ## Examples
//!
//! ### Simulated Node
//!
//! ```rust
//! use edge_sampler::sim::{ScriptedSource, SquareLine};
//! use edge_sampler::{frame_len, AcquisitionConfig, AcquisitionLoop};
//! use std::time::Duration;
//!
//! let config = AcquisitionConfig::default()
//!     .with_window_len(16)
//!     .with_coarse_poll(Duration::ZERO)
//!     .with_cycle_delay(Duration::ZERO);
//!
//! let line = SquareLine::new(4);
//! let mut node = AcquisitionLoop::new(config, line, ScriptedSource::ramp(6), Vec::new())?;
//! node.run_cycles(2)?;
//!
//! assert_eq!(node.sink().len(), 4 * frame_len(16));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Frame Encoding
//!
//! ```rust
//! use edge_sampler::{encode_frame, FrameDecoder, Transition};
//!
//! let mut wire = Vec::new();
//! encode_frame(Transition::Rising, &[10, 20, 30, 40], &mut wire);
//! assert_eq!(
//!     wire,
//!     [0xAA, 0x55, 0x01, 0x0A, 0x00, 0x14, 0x00, 0x1E, 0x00, 0x28, 0x00, 0x55, 0xAA]
//! );
//!
//! let mut decoder = FrameDecoder::new(4);
//! decoder.push(&wire);
//! let frame = decoder.next_frame().unwrap();
//! assert_eq!(frame.transition, Transition::Rising);
//! assert_eq!(frame.samples, vec![10, 20, 30, 40]);
//! ```
//!
//! ### Serial Node
//!
//! ```rust,no_run
//! use edge_sampler::{
//!     connector, open_link, AcquisitionConfig, AcquisitionLoop, ModemInput, ModemLine,
//!     StreamSource, LINK_BAUD_RATE,
//! };
//!
//! let link = connector::connect(None, LINK_BAUD_RATE)?;
//! let line = ModemLine::new(link.try_clone()?, ModemInput::ClearToSend);
//! let adc = StreamSource::new(open_link("/dev/ttyUSB1", 921_600)?);
//!
//! let mut node = AcquisitionLoop::new(AcquisitionConfig::default(), line, adc, link)?;
//! node.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Receiving Ramps
//!
//! ```rust,no_run
//! use edge_sampler::{open_link, FrameReader, RampAssembler, ReceiverConfig};
//!
//! let config = ReceiverConfig::default();
//! let port = open_link("/dev/ttyUSB0", config.baud_rate)?;
//! let mut reader = FrameReader::new(port, config.window_len);
//! let mut ramps = RampAssembler::new(config.samples_per_ramp);
//!
//! loop {
//!     if let Some(pair) = ramps.push(reader.read_frame()?) {
//!         let df = pair.to_lazy_frame(config.sample_rate_hz)?.collect()?;
//!         println!("{}", df);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod acquisition;
pub mod config;
pub mod connector;
pub mod edge_detector;
pub mod frame;
pub mod frame_decoder;
pub mod processing;
pub mod receiver;
pub mod serial_link;
pub mod sim;
pub mod window_sampler;

// Re-export the main types for convenience
pub use acquisition::{AcquisitionError, AcquisitionLoop, AcquisitionStats, LoopState};

pub use config::{
    AcquisitionConfig, ConfigError, RadarConfig, ReceiverConfig, LINK_BAUD_RATE, MAX_MAGNITUDE,
};

pub use edge_detector::{EdgeDetector, Level, LevelSource, LineError, Transition};

pub use window_sampler::{
    CaptureOutcome, RawConversion, SampleSource, SampleSourceError, SampleWindow, WindowSampler,
};

pub use frame::{encode_frame, frame_len, FrameEncoder, FrameError, END_MARKER, START_MARKER};

pub use frame_decoder::{DecodedFrame, FrameDecoder, FrameReader};

pub use receiver::{RampAssembler, RampPair};

pub use processing::{
    BeatAnalyzer, Direction, DisplayWriter, IqAssembler, IqChannel, IqRamps, ProcessingError,
    RadarMeasurement, RadarProcessor, Spectrum,
};

pub use serial_link::{
    open_link, ConversionStream, ModemInput, ModemLine, SerialLinkError, StreamSource,
};

pub use connector::{ConnectorError, NodePort};
