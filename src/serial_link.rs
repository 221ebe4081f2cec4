use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, ErrorKind, Read};
use std::time::{Duration, Instant};

use crate::edge_detector::{Level, LevelSource};
use crate::window_sampler::{RawConversion, SampleSource, SampleSourceError};

/// Per-read timeout of opened ports. Capture deadlines are enforced on top.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum SerialLinkError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open `port` as 8N1 without flow control and drop anything already queued.
pub fn open_link(port: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, SerialLinkError> {
    let serial = serialport::new(port, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(PORT_READ_TIMEOUT)
        .open()?;

    serial.clear(ClearBuffer::All)?;
    log::debug!("Opened {} at {} baud", port, baud_rate);
    Ok(serial)
}

/// Modem-status input used as the trigger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemInput {
    ClearToSend,
    DataSetReady,
    CarrierDetect,
    RingIndicator,
}

impl ModemInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModemInput::ClearToSend => "cts",
            ModemInput::DataSetReady => "dsr",
            ModemInput::CarrierDetect => "cd",
            ModemInput::RingIndicator => "ri",
        }
    }
}

impl std::str::FromStr for ModemInput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cts" => Ok(ModemInput::ClearToSend),
            "dsr" => Ok(ModemInput::DataSetReady),
            "cd" | "dcd" => Ok(ModemInput::CarrierDetect),
            "ri" => Ok(ModemInput::RingIndicator),
            other => Err(format!("unknown modem input '{}'", other)),
        }
    }
}

/// A serial port's modem-status pin read as a digital trigger line.
pub struct ModemLine {
    port: Box<dyn SerialPort>,
    input: ModemInput,
}

impl ModemLine {
    pub fn new(port: Box<dyn SerialPort>, input: ModemInput) -> Self {
        log::debug!(
            "Trigger line on {} of {}",
            input.as_str(),
            port.name().unwrap_or_else(|| "unnamed port".to_string())
        );
        Self { port, input }
    }
}

impl LevelSource for ModemLine {
    type Error = serialport::Error;

    fn level(&mut self) -> Result<Level, serialport::Error> {
        let high = match self.input {
            ModemInput::ClearToSend => self.port.read_clear_to_send()?,
            ModemInput::DataSetReady => self.port.read_data_set_ready()?,
            ModemInput::CarrierDetect => self.port.read_carrier_detect()?,
            ModemInput::RingIndicator => self.port.read_ring_indicator()?,
        };
        Ok(Level::from(high))
    }
}

/// Byte stream of conversions that keeps flowing between captures.
pub trait ConversionStream: Read {
    /// Drop everything received but not yet read.
    fn discard_pending(&mut self) -> io::Result<()>;
}

impl ConversionStream for Box<dyn SerialPort> {
    fn discard_pending(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Sample source fed by a byte stream of packed little-endian conversions,
/// such as an ADC bridge on a second serial port.
///
/// `start` discards whatever the stream queued while the trigger was awaited,
/// so a window only holds conversions made after the edge. The stream should
/// use short read timeouts; the capture deadline is checked between reads.
#[derive(Debug)]
pub struct StreamSource<R> {
    reader: R,
    bytes: Vec<u8>,
    running: bool,
}

impl<R: ConversionStream> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            bytes: Vec::new(),
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: ConversionStream> SampleSource for StreamSource<R> {
    fn start(&mut self) -> Result<(), SampleSourceError> {
        self.bytes.clear();
        self.reader.discard_pending()?;
        self.running = true;
        Ok(())
    }

    fn read_exactly(
        &mut self,
        results: &mut [RawConversion],
        timeout: Duration,
    ) -> Result<usize, SampleSourceError> {
        if !self.running {
            return Err(SampleSourceError::Device("stream source not started".to_string()));
        }

        let wanted = 2 * results.len();
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];
        let mut closed = false;

        while self.bytes.len() < wanted {
            let room = (wanted - self.bytes.len()).min(chunk.len());
            match self.reader.read(&mut chunk[..room]) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => self.bytes.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        let words = self.bytes.len() / 2;
        if words == 0 {
            return Err(if closed {
                SampleSourceError::Device("conversion stream closed".to_string())
            } else {
                SampleSourceError::Timeout(timeout)
            });
        }

        for (dst, pair) in results.iter_mut().zip(self.bytes.chunks_exact(2)) {
            *dst = RawConversion::from_le_bytes([pair[0], pair[1]]);
        }
        self.bytes.drain(..words * 2);
        Ok(words)
    }

    fn stop(&mut self) -> Result<(), SampleSourceError> {
        self.bytes.clear();
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn packed(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Bridge stream with bytes already queued before a capture and bytes
    /// that only arrive once it has started.
    struct BridgeStream {
        queued: Cursor<Vec<u8>>,
        incoming: Cursor<Vec<u8>>,
    }

    impl BridgeStream {
        fn live(bytes: Vec<u8>) -> Self {
            Self::with_backlog(Vec::new(), bytes)
        }

        fn with_backlog(queued: Vec<u8>, incoming: Vec<u8>) -> Self {
            Self {
                queued: Cursor::new(queued),
                incoming: Cursor::new(incoming),
            }
        }
    }

    impl Read for BridgeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.queued.read(buf)? {
                0 => self.incoming.read(buf),
                n => Ok(n),
            }
        }
    }

    impl ConversionStream for BridgeStream {
        fn discard_pending(&mut self) -> io::Result<()> {
            self.queued = Cursor::new(Vec::new());
            Ok(())
        }
    }

    #[test]
    fn test_modem_input_parse() {
        assert_eq!("CTS".parse::<ModemInput>(), Ok(ModemInput::ClearToSend));
        assert_eq!("dcd".parse::<ModemInput>(), Ok(ModemInput::CarrierDetect));
        assert!("rts".parse::<ModemInput>().is_err());
    }

    #[test]
    fn test_stream_source_reads_packed_words() {
        let stream = BridgeStream::live(packed(&[0x6001, 0x6FFF, 0x6123]));
        let mut source = StreamSource::new(stream);
        let mut results = [RawConversion::default(); 3];

        source.start().unwrap();
        let n = source.read_exactly(&mut results, Duration::from_millis(50)).unwrap();
        source.stop().unwrap();

        assert_eq!(n, 3);
        assert_eq!(results[0].magnitude(), 1);
        assert_eq!(results[1].magnitude(), 4095);
        assert_eq!(results[2].channel(), 6);
    }

    #[test]
    fn test_stream_source_short_stream() {
        let mut bytes = packed(&[7, 8]);
        bytes.push(0x09);
        let mut source = StreamSource::new(BridgeStream::live(bytes));
        let mut results = [RawConversion::default(); 4];

        source.start().unwrap();
        assert_eq!(
            source.read_exactly(&mut results, Duration::from_millis(50)).unwrap(),
            2
        );
    }

    #[test]
    fn test_stream_source_closed_stream() {
        let mut source = StreamSource::new(BridgeStream::live(Vec::new()));
        let mut results = [RawConversion::default(); 2];

        source.start().unwrap();
        assert!(matches!(
            source.read_exactly(&mut results, Duration::from_millis(50)),
            Err(SampleSourceError::Device(_))
        ));
    }

    struct SilentPort;

    impl Read for SilentPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(1));
            Err(io::Error::new(ErrorKind::TimedOut, "no data"))
        }
    }

    impl ConversionStream for SilentPort {
        fn discard_pending(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_start_discards_conversions_queued_before_the_edge() {
        let before = packed(&[1, 2, 3, 4]);
        let after = packed(&[100, 101, 102, 103]);
        let stream = BridgeStream::with_backlog(before, after);
        let mut source = StreamSource::new(stream);
        let mut results = [RawConversion::default(); 4];

        source.start().unwrap();
        let n = source.read_exactly(&mut results, Duration::from_millis(50)).unwrap();

        assert_eq!(n, 4);
        let magnitudes: Vec<u16> = results.iter().map(|r| r.magnitude()).collect();
        assert_eq!(magnitudes, [100, 101, 102, 103]);
    }

    #[test]
    fn test_stream_source_times_out() {
        let mut source = StreamSource::new(SilentPort);
        let mut results = [RawConversion::default(); 2];

        source.start().unwrap();
        let started = Instant::now();
        let result = source.read_exactly(&mut results, Duration::from_millis(20));

        assert!(matches!(result, Err(SampleSourceError::Timeout(_))));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stream_source_requires_start() {
        let mut source = StreamSource::new(BridgeStream::live(packed(&[1])));
        let mut results = [RawConversion::default(); 1];
        assert!(source.read_exactly(&mut results, Duration::ZERO).is_err());
    }
}
