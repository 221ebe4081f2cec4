use std::time::Duration;

/// Samples captured per trigger edge.
pub const WINDOW_LEN: usize = 200;
/// Front-end conversion rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = 20_000;
/// Magnitude resolution of the analog front-end in bits.
pub const RESOLUTION_BITS: u32 = 12;
/// Largest magnitude a conversion can report.
pub const MAX_MAGNITUDE: i16 = (1 << RESOLUTION_BITS) - 1;
/// Baud rate of the outbound serial link.
pub const LINK_BAUD_RATE: u32 = 115_200;
/// Analog input channel (GPIO 34 on the reference board).
pub const ADC_CHANNEL: u8 = 6;
/// Propagation speed used for range and velocity, in m/s.
pub const SPEED_OF_LIGHT: f64 = 3e8;

const CAPTURE_TIMEOUT: Duration = Duration::from_millis(1000);
const COARSE_POLL: Duration = Duration::from_millis(1);
const CYCLE_DELAY: Duration = Duration::from_millis(10);
const STARTUP_DELAY: Duration = Duration::from_millis(1000);

const FFT_SIZE: usize = 1024;
const CHIRP_BANDWIDTH_HZ: f64 = 250e6;
const CARRIER_HZ: f64 = 24e9;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Window length must be at least one sample")]
    EmptyWindow,

    #[error("Capture timeout must be non-zero")]
    ZeroTimeout,

    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("FFT size {fft_size} is shorter than a {chirp_samples}-sample chirp")]
    FftTooShort { fft_size: usize, chirp_samples: usize },

    #[error("{0} must be a positive, finite frequency")]
    InvalidFrequency(&'static str),
}

/// Fixed acquisition parameters of one node.
///
/// `Default` yields the node's compile-time configuration. The `with_*`
/// setters exist for tests and simulations that need shorter timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub window_len: usize,
    pub sample_rate_hz: u32,
    pub capture_timeout: Duration,
    pub coarse_poll: Duration,
    pub cycle_delay: Duration,
    pub startup_delay: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            window_len: WINDOW_LEN,
            sample_rate_hz: SAMPLE_RATE_HZ,
            capture_timeout: CAPTURE_TIMEOUT,
            coarse_poll: COARSE_POLL,
            cycle_delay: CYCLE_DELAY,
            startup_delay: STARTUP_DELAY,
        }
    }
}

impl AcquisitionConfig {
    pub fn with_window_len(mut self, window_len: usize) -> Self {
        self.window_len = window_len;
        self
    }

    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    pub fn with_coarse_poll(mut self, interval: Duration) -> Self {
        self.coarse_poll = interval;
        self
    }

    pub fn with_cycle_delay(mut self, delay: Duration) -> Self {
        self.cycle_delay = delay;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_len == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.capture_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        Ok(())
    }

    /// Wall-clock span of one window at the configured sample rate.
    pub fn window_duration(&self) -> Duration {
        let nanos = self.window_len as u64 * 1_000_000_000 / u64::from(self.sample_rate_hz);
        Duration::from_nanos(nanos)
    }
}

/// Host-side parameters for reassembling ramps from received frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub window_len: usize,
    pub samples_per_ramp: usize,
    pub sample_rate_hz: u32,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            window_len: WINDOW_LEN,
            samples_per_ramp: WINDOW_LEN,
            sample_rate_hz: SAMPLE_RATE_HZ,
            baud_rate: LINK_BAUD_RATE,
            read_timeout: Duration::from_secs(2),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_len == 0 || self.samples_per_ramp == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        Ok(())
    }
}

/// Host-side FMCW parameters for turning I/Q ramp pairs into range and
/// velocity.
///
/// A chirp spans one ramp, so its duration is `chirp_samples / sample_rate_hz`
/// and its slope is `bandwidth_hz` over that duration.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarConfig {
    pub sample_rate_hz: u32,
    pub chirp_samples: usize,
    pub bandwidth_hz: f64,
    pub carrier_hz: f64,
    pub fft_size: usize,
    pub display_baud_rate: u32,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            chirp_samples: WINDOW_LEN,
            bandwidth_hz: CHIRP_BANDWIDTH_HZ,
            carrier_hz: CARRIER_HZ,
            fft_size: FFT_SIZE,
            display_baud_rate: LINK_BAUD_RATE,
        }
    }
}

impl RadarConfig {
    pub fn with_chirp_samples(mut self, chirp_samples: usize) -> Self {
        self.chirp_samples = chirp_samples;
        self
    }

    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }

    /// Chirp duration in seconds.
    pub fn chirp_duration(&self) -> f64 {
        self.chirp_samples as f64 / f64::from(self.sample_rate_hz)
    }

    /// Frequency sweep rate in Hz/s.
    pub fn chirp_slope(&self) -> f64 {
        self.bandwidth_hz / self.chirp_duration()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chirp_samples == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.fft_size < self.chirp_samples {
            return Err(ConfigError::FftTooShort {
                fft_size: self.fft_size,
                chirp_samples: self.chirp_samples,
            });
        }
        if !(self.bandwidth_hz.is_finite() && self.bandwidth_hz > 0.0) {
            return Err(ConfigError::InvalidFrequency("Chirp bandwidth"));
        }
        if !(self.carrier_hz.is_finite() && self.carrier_hz > 0.0) {
            return Err(ConfigError::InvalidFrequency("Carrier frequency"));
        }
        Ok(())
    }
}
