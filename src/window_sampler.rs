use std::time::Duration;

const MAGNITUDE_MASK: u16 = 0x0FFF;
const CHANNEL_SHIFT: u32 = 12;

/// One packed conversion result as delivered by the analog front-end.
///
/// Bits 0..12 hold the magnitude, bits 12..16 the channel it was taken on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawConversion(u16);

impl RawConversion {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub fn from_parts(channel: u8, magnitude: u16) -> Self {
        Self((u16::from(channel & 0x0F) << CHANNEL_SHIFT) | (magnitude & MAGNITUDE_MASK))
    }

    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn channel(self) -> u8 {
        (self.0 >> CHANNEL_SHIFT) as u8
    }

    pub fn magnitude(self) -> u16 {
        self.0 & MAGNITUDE_MASK
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SampleSourceError {
    #[error("No conversion results within {0:?}")]
    Timeout(Duration),

    #[error("Analog front-end error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The analog front-end as seen by the sampler.
pub trait SampleSource {
    /// Begin converting.
    fn start(&mut self) -> Result<(), SampleSourceError>;

    /// Fill `results` with up to `results.len()` conversions, waiting at most
    /// `timeout`. Returns how many entries were written.
    fn read_exactly(
        &mut self,
        results: &mut [RawConversion],
        timeout: Duration,
    ) -> Result<usize, SampleSourceError>;

    /// Stop converting.
    fn stop(&mut self) -> Result<(), SampleSourceError>;
}

/// Fixed-length buffer of samples, reused for every capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleWindow {
    samples: Box<[i16]>,
}

impl SampleWindow {
    /// Allocate a zeroed window of `len` samples.
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    pub fn zero(&mut self) {
        self.samples.fill(0);
    }

    fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.samples
    }
}

/// How a capture ended. The window is fully defined in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// All samples came from the front-end.
    Complete,
    /// Only `received` samples arrived; the rest of the window is zero.
    Partial { received: usize },
    /// Nothing arrived before the timeout; the window is zero.
    TimedOut,
    /// The front-end reported a fault; the window is zero.
    DeviceError,
}

impl CaptureOutcome {
    pub fn is_complete(self) -> bool {
        self == CaptureOutcome::Complete
    }
}

/// Captures one window per call, bracketing every read with start and stop.
#[derive(Debug)]
pub struct WindowSampler<S> {
    source: S,
    timeout: Duration,
    scratch: Vec<RawConversion>,
}

impl<S: SampleSource> WindowSampler<S> {
    pub fn new(source: S, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            scratch: Vec::new(),
        }
    }

    /// Fill `window` with fresh magnitudes, or zeros on failure.
    pub fn capture_window(&mut self, window: &mut SampleWindow) -> CaptureOutcome {
        let n = window.len();
        let _span = tracing::debug_span!("capture_window", samples = n).entered();

        self.scratch.clear();
        self.scratch.resize(n, RawConversion::default());

        let read = match self.source.start() {
            Ok(()) => self.source.read_exactly(&mut self.scratch, self.timeout),
            Err(e) => Err(e),
        };
        if let Err(e) = self.source.stop() {
            log::error!("Failed to stop analog front-end: {}", e);
        }

        match read {
            Ok(received) => {
                let received = received.min(n);
                let out = window.as_mut_slice();
                for (dst, conv) in out.iter_mut().zip(&self.scratch[..received]) {
                    *dst = conv.magnitude() as i16;
                }
                out[received..].fill(0);

                if received == n {
                    log::trace!("Captured {} samples", n);
                    CaptureOutcome::Complete
                } else {
                    log::warn!("Short capture: {} of {} samples", received, n);
                    CaptureOutcome::Partial { received }
                }
            }
            Err(SampleSourceError::Timeout(after)) => {
                log::warn!("Capture timed out after {:?}", after);
                window.zero();
                CaptureOutcome::TimedOut
            }
            Err(e) => {
                log::error!("Capture failed: {}", e);
                window.zero();
                CaptureOutcome::DeviceError
            }
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_MAGNITUDE;
    use crate::sim::{Fault, ScriptedSource};

    const TIMEOUT: Duration = Duration::from_millis(1000);

    #[test]
    fn test_raw_conversion_fields() {
        let conv = RawConversion::new(0x6ABC);
        assert_eq!(conv.channel(), 6);
        assert_eq!(conv.magnitude(), 0x0ABC);

        let conv = RawConversion::from_parts(6, 4095);
        assert_eq!(conv.raw(), 0x6FFF);
        assert_eq!(RawConversion::from_le_bytes([0xFF, 0x6F]), conv);
    }

    #[test]
    fn test_complete_capture_fills_every_sample() {
        for n in [1, 2, 7, 200] {
            let mut sampler = WindowSampler::new(ScriptedSource::ramp(6), TIMEOUT);
            let mut window = SampleWindow::new(n);

            assert_eq!(sampler.capture_window(&mut window), CaptureOutcome::Complete);
            assert_eq!(window.len(), n);
            assert!(window
                .as_slice()
                .iter()
                .all(|s| (0..=MAX_MAGNITUDE).contains(s)));
        }
    }

    #[test]
    fn test_channel_bits_are_dropped() {
        let mut source = ScriptedSource::ramp(15);
        source.set_values(vec![RawConversion::from_parts(15, 4095); 4]);
        let mut sampler = WindowSampler::new(source, TIMEOUT);
        let mut window = SampleWindow::new(4);

        sampler.capture_window(&mut window);
        assert_eq!(window.as_slice(), &[4095; 4]);
    }

    #[test]
    fn test_timeout_zero_fills() {
        let mut window = SampleWindow::new(8);
        let mut sampler = WindowSampler::new(ScriptedSource::ramp(6), TIMEOUT);
        sampler.capture_window(&mut window);
        assert!(window.as_slice().iter().any(|&s| s != 0));

        sampler.source_mut().inject(Fault::Timeout);
        assert_eq!(sampler.capture_window(&mut window), CaptureOutcome::TimedOut);
        assert_eq!(window.as_slice(), &[0; 8]);
    }

    #[test]
    fn test_device_error_zero_fills() {
        let mut window = SampleWindow::new(5);
        let mut sampler = WindowSampler::new(ScriptedSource::ramp(6), TIMEOUT);
        sampler.capture_window(&mut window);

        sampler.source_mut().inject(Fault::Device);
        assert_eq!(sampler.capture_window(&mut window), CaptureOutcome::DeviceError);
        assert_eq!(window.as_slice(), &[0; 5]);
    }

    #[test]
    fn test_start_failure_is_a_device_error() {
        let mut window = SampleWindow::new(3);
        let mut sampler = WindowSampler::new(ScriptedSource::ramp(6), TIMEOUT);
        sampler.source_mut().inject(Fault::StartFails);

        assert_eq!(sampler.capture_window(&mut window), CaptureOutcome::DeviceError);
        assert_eq!(window.as_slice(), &[0; 3]);
        assert!(!sampler.source().is_running());
    }

    #[test]
    fn test_short_read_zeroes_the_tail() {
        let mut window = SampleWindow::new(6);
        let mut sampler = WindowSampler::new(ScriptedSource::ramp(6), TIMEOUT);
        sampler.capture_window(&mut window);

        sampler.source_mut().inject(Fault::Short(2));
        assert_eq!(
            sampler.capture_window(&mut window),
            CaptureOutcome::Partial { received: 2 }
        );
        let samples = window.as_slice();
        assert_eq!(&samples[..2], &[0, 37]);
        assert_eq!(&samples[2..], &[0; 4]);
    }

    #[test]
    fn test_front_end_is_stopped_after_every_capture() {
        let mut window = SampleWindow::new(4);
        let mut sampler = WindowSampler::new(ScriptedSource::ramp(6), TIMEOUT);

        for fault in [None, Some(Fault::Timeout), Some(Fault::Device), Some(Fault::Short(1))] {
            if let Some(fault) = fault {
                sampler.source_mut().inject(fault);
            }
            sampler.capture_window(&mut window);
            assert!(!sampler.source().is_running());
        }
        assert_eq!(sampler.source().starts(), 4);
        assert_eq!(sampler.source().stops(), 4);
    }
}
