//! FMCW range and velocity from paired I/Q ramps
//!
//! Two nodes digitize the in-phase and quadrature mixer outputs of the same
//! radar front-end. Each channel's rising and falling ramps form a
//! [`RampPair`]; an I pair and a Q pair together form the complex up-chirp and
//! down-chirp beat signals. The beat frequency of each chirp gives range and
//! radial velocity.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::io::Write;
use std::sync::Arc;

use crate::config::{ConfigError, RadarConfig, SPEED_OF_LIGHT};
use crate::receiver::RampPair;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot analyze an empty chirp")]
    EmptySignal,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mixer output a node digitizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqChannel {
    InPhase,
    Quadrature,
}

impl IqChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IqChannel::InPhase => "I",
            IqChannel::Quadrature => "Q",
        }
    }
}

/// One ramp pair from each channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqRamps {
    pub in_phase: RampPair,
    pub quadrature: RampPair,
}

impl IqRamps {
    /// `I + jQ` over the rising ramps.
    pub fn up_chirp(&self) -> Vec<Complex<f64>> {
        combine(&self.in_phase.rising, &self.quadrature.rising)
    }

    /// `I + jQ` over the falling ramps.
    pub fn down_chirp(&self) -> Vec<Complex<f64>> {
        combine(&self.in_phase.falling, &self.quadrature.falling)
    }
}

fn combine(i: &[i16], q: &[i16]) -> Vec<Complex<f64>> {
    i.iter()
        .zip(q)
        .map(|(&i, &q)| Complex::new(f64::from(i), f64::from(q)))
        .collect()
}

/// Pairs ramp pairs from the I and Q channels.
///
/// A newer pair from one channel replaces one still waiting for the other
/// channel.
#[derive(Debug, Default)]
pub struct IqAssembler {
    in_phase: Option<RampPair>,
    quadrature: Option<RampPair>,
}

impl IqAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: IqChannel, pair: RampPair) -> Option<IqRamps> {
        let slot = match channel {
            IqChannel::InPhase => &mut self.in_phase,
            IqChannel::Quadrature => &mut self.quadrature,
        };
        if slot.replace(pair).is_some() {
            log::debug!("{} ramps without a partner, replaced", channel.as_str());
        }

        if self.in_phase.is_some() && self.quadrature.is_some() {
            let in_phase = self.in_phase.take()?;
            let quadrature = self.quadrature.take()?;
            return Some(IqRamps {
                in_phase,
                quadrature,
            });
        }
        None
    }
}

/// Centered magnitude spectrum of one chirp.
///
/// Bin `k` holds frequency `(k - fft_size / 2) * resolution_hz`, so negative
/// frequencies come first and DC sits in the middle.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub magnitude: Vec<f64>,
    pub resolution_hz: f64,
}

impl Spectrum {
    pub fn frequency(&self, bin: usize) -> f64 {
        (bin as f64 - (self.magnitude.len() / 2) as f64) * self.resolution_hz
    }

    /// Bin of the strongest component. The first one wins on ties.
    pub fn peak_bin(&self) -> usize {
        self.magnitude
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (bin, &m)| {
                if m > best.1 {
                    (bin, m)
                } else {
                    best
                }
            })
            .0
    }

    /// Absolute frequency of the strongest component in Hz.
    pub fn peak_frequency(&self) -> f64 {
        self.frequency(self.peak_bin()).abs()
    }
}

/// Hann-windowed, zero-padded FFT of complex beat signals.
pub struct BeatAnalyzer {
    sample_rate: f64,
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl BeatAnalyzer {
    pub fn new(fft_size: usize, sample_rate_hz: u32) -> Self {
        let fft = FftPlanner::<f64>::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            sample_rate: f64::from(sample_rate_hz),
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.buffer.len()
    }

    /// Frequency step between bins in Hz.
    pub fn resolution_hz(&self) -> f64 {
        self.sample_rate / self.fft_size() as f64
    }

    /// Remove the mean, apply a Hann window, zero-pad and transform.
    ///
    /// Signals longer than the FFT are cut to its size.
    pub fn spectrum(&mut self, signal: &[Complex<f64>]) -> Result<Spectrum, ProcessingError> {
        let signal = &signal[..signal.len().min(self.fft_size())];
        if signal.is_empty() {
            return Err(ProcessingError::EmptySignal);
        }

        let mean = signal.iter().sum::<Complex<f64>>() / signal.len() as f64;
        let window = hann_window(signal.len());

        self.buffer.fill(Complex::new(0.0, 0.0));
        for ((dst, &s), w) in self.buffer.iter_mut().zip(signal).zip(window) {
            *dst = (s - mean) * w;
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let mut magnitude: Vec<f64> = self.buffer.iter().map(|c| c.norm()).collect();
        let half = magnitude.len() / 2;
        magnitude.rotate_right(half);

        Ok(Spectrum {
            magnitude,
            resolution_hz: self.resolution_hz(),
        })
    }
}

/// Symmetric Hann window; a single sample gets weight one.
fn hann_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos())
        })
        .collect()
}

/// Radial direction of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Approaching,
    Receding,
    Static,
}

impl Direction {
    /// Approaching when the up-chirp beat is higher than the down-chirp beat.
    pub fn from_beats(f_up: f64, f_down: f64) -> Self {
        if f_up > f_down {
            Direction::Approaching
        } else if f_up < f_down {
            Direction::Receding
        } else {
            Direction::Static
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Approaching => "APPROACHING",
            Direction::Receding => "RECEDING",
            Direction::Static => "STATIC",
        }
    }
}

/// Target range in meters: `(f_up + f_down) * c / (12 * K)`.
pub fn distance_m(f_up: f64, f_down: f64, chirp_slope: f64) -> f64 {
    (f_up + f_down) * SPEED_OF_LIGHT / (12.0 * chirp_slope)
}

/// Radial velocity in m/s: `(f_up - f_down) * c / (4 * fc)`.
pub fn velocity_mps(f_up: f64, f_down: f64, carrier_hz: f64) -> f64 {
    (f_up - f_down) * SPEED_OF_LIGHT / (4.0 * carrier_hz)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarMeasurement {
    pub f_up: f64,
    pub f_down: f64,
    pub distance_m: f64,
    pub velocity_mps: f64,
    pub direction: Direction,
}

impl RadarMeasurement {
    /// Display line: `D:<m>,V:<m/s>,DIR:<direction>\n`, two decimals.
    pub fn display_message(&self) -> String {
        format!(
            "D:{:.2},V:{:.2},DIR:{}\n",
            self.distance_m,
            self.velocity_mps,
            self.direction.as_str()
        )
    }
}

pub struct RadarProcessor {
    config: RadarConfig,
    analyzer: BeatAnalyzer,
}

impl RadarProcessor {
    pub fn new(config: RadarConfig) -> Result<Self, ProcessingError> {
        config.validate()?;
        let analyzer = BeatAnalyzer::new(config.fft_size, config.sample_rate_hz);
        Ok(Self { config, analyzer })
    }

    pub fn config(&self) -> &RadarConfig {
        &self.config
    }

    pub fn analyzer_mut(&mut self) -> &mut BeatAnalyzer {
        &mut self.analyzer
    }

    pub fn process(&mut self, ramps: &IqRamps) -> Result<RadarMeasurement, ProcessingError> {
        let _span = tracing::debug_span!("radar_process").entered();

        let f_up = self.analyzer.spectrum(&ramps.up_chirp())?.peak_frequency();
        let f_down = self.analyzer.spectrum(&ramps.down_chirp())?.peak_frequency();

        let measurement = RadarMeasurement {
            f_up,
            f_down,
            distance_m: distance_m(f_up, f_down, self.config.chirp_slope()),
            velocity_mps: velocity_mps(f_up, f_down, self.config.carrier_hz),
            direction: Direction::from_beats(f_up, f_down),
        };

        log::info!(
            "f_up {:.2} Hz, f_down {:.2} Hz: {:.4} m, {:.4} m/s, {}",
            measurement.f_up,
            measurement.f_down,
            measurement.distance_m,
            measurement.velocity_mps,
            measurement.direction.as_str()
        );
        Ok(measurement)
    }
}

/// Writes measurement lines to a display controller.
pub struct DisplayWriter<W> {
    sink: W,
}

impl<W: Write> DisplayWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn send(&mut self, measurement: &RadarMeasurement) -> Result<(), ProcessingError> {
        let message = measurement.display_message();
        self.sink.write_all(message.as_bytes())?;
        self.sink.flush()?;
        log::debug!("Sent to display: {}", message.trim_end());
        Ok(())
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }
}
