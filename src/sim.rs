//! Scripted stand-ins for the trigger line and the analog front-end.
//!
//! Used by the test suites and by the `simulated_node` demo. Everything here
//! is deterministic apart from `PulseLine`, which follows the wall clock.

use std::time::{Duration, Instant};

use crate::edge_detector::{Level, LevelSource};
use crate::window_sampler::{RawConversion, SampleSource, SampleSourceError};

#[derive(Debug, thiserror::Error)]
#[error("Scripted line ran out of levels")]
pub struct ScriptExhausted;

/// Replays a fixed list of levels, one per read.
///
/// Once the script is used up the last level repeats, or reads fail when
/// built with `failing_after`.
#[derive(Debug, Clone)]
pub struct ScriptedLine {
    levels: Vec<Level>,
    reads: usize,
    fail_when_done: bool,
}

impl ScriptedLine {
    pub fn new(levels: Vec<Level>) -> Self {
        Self {
            levels,
            reads: 0,
            fail_when_done: false,
        }
    }

    pub fn failing_after(levels: Vec<Level>) -> Self {
        Self {
            fail_when_done: true,
            ..Self::new(levels)
        }
    }

    /// Number of successful reads so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl LevelSource for ScriptedLine {
    type Error = ScriptExhausted;

    fn level(&mut self) -> Result<Level, ScriptExhausted> {
        let level = match self.levels.get(self.reads) {
            Some(level) => *level,
            None if self.fail_when_done => return Err(ScriptExhausted),
            None => *self.levels.last().ok_or(ScriptExhausted)?,
        };
        self.reads += 1;
        Ok(level)
    }
}

/// Square wave counted in reads: `half_period` reads low, then as many high.
#[derive(Debug, Clone)]
pub struct SquareLine {
    half_period: u64,
    reads: u64,
}

impl SquareLine {
    pub fn new(half_period: u64) -> Self {
        Self {
            half_period: half_period.max(1),
            reads: 0,
        }
    }
}

impl LevelSource for SquareLine {
    type Error = std::convert::Infallible;

    fn level(&mut self) -> Result<Level, Self::Error> {
        let high = (self.reads / self.half_period) % 2 == 1;
        self.reads += 1;
        Ok(Level::from(high))
    }
}

/// One pulse in wall-clock time: low for `low_for` after the first read,
/// high for `high_for`, then low for good.
#[derive(Debug, Clone)]
pub struct PulseLine {
    low_for: Duration,
    high_for: Duration,
    origin: Option<Instant>,
}

impl PulseLine {
    pub fn new(low_for: Duration, high_for: Duration) -> Self {
        Self {
            low_for,
            high_for,
            origin: None,
        }
    }
}

impl LevelSource for PulseLine {
    type Error = std::convert::Infallible;

    fn level(&mut self) -> Result<Level, Self::Error> {
        let elapsed = self.origin.get_or_insert_with(Instant::now).elapsed();
        let high = elapsed >= self.low_for && elapsed < self.low_for + self.high_for;
        Ok(Level::from(high))
    }
}

/// Failure to apply to the next capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Timeout,
    Device,
    StartFails,
    /// Deliver only this many conversions.
    Short(usize),
}

/// Deterministic analog front-end.
///
/// Each read starts again at the beginning of its value table, so identical
/// captures produce identical windows. Faults are one-shot.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<RawConversion>,
    pending_fault: Option<Fault>,
    running: bool,
    starts: usize,
    stops: usize,
}

impl ScriptedSource {
    const RAMP_LEN: u16 = 256;
    const RAMP_STEP: u16 = 37;

    /// A sawtooth of distinct 12-bit values tagged with `channel`.
    pub fn ramp(channel: u8) -> Self {
        let values = (0..Self::RAMP_LEN)
            .map(|i| RawConversion::from_parts(channel, (i * Self::RAMP_STEP) % 4096))
            .collect();
        Self::with_values(values)
    }

    pub fn with_values(values: Vec<RawConversion>) -> Self {
        Self {
            values,
            pending_fault: None,
            running: false,
            starts: 0,
            stops: 0,
        }
    }

    pub fn set_values(&mut self, values: Vec<RawConversion>) {
        self.values = values;
    }

    pub fn inject(&mut self, fault: Fault) {
        self.pending_fault = Some(fault);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn starts(&self) -> usize {
        self.starts
    }

    pub fn stops(&self) -> usize {
        self.stops
    }
}

impl SampleSource for ScriptedSource {
    fn start(&mut self) -> Result<(), SampleSourceError> {
        self.starts += 1;
        if self.pending_fault == Some(Fault::StartFails) {
            self.pending_fault = None;
            return Err(SampleSourceError::Device("start rejected".to_string()));
        }
        self.running = true;
        Ok(())
    }

    fn read_exactly(
        &mut self,
        results: &mut [RawConversion],
        timeout: Duration,
    ) -> Result<usize, SampleSourceError> {
        if !self.running {
            return Err(SampleSourceError::Device("not started".to_string()));
        }

        let wanted = match self.pending_fault.take() {
            Some(Fault::Timeout) => return Err(SampleSourceError::Timeout(timeout)),
            Some(Fault::Device) => {
                return Err(SampleSourceError::Device("conversion overrun".to_string()))
            }
            Some(Fault::Short(n)) => n.min(results.len()),
            Some(Fault::StartFails) | None => results.len(),
        };
        if self.values.is_empty() {
            return Err(SampleSourceError::Timeout(timeout));
        }

        for (dst, value) in results[..wanted].iter_mut().zip(self.values.iter().cycle()) {
            *dst = *value;
        }
        Ok(wanted)
    }

    fn stop(&mut self) -> Result<(), SampleSourceError> {
        self.stops += 1;
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_line_repeats_last_level() {
        let mut line = ScriptedLine::new(vec![Level::Low, Level::High]);
        let seen: Vec<_> = (0..4).map(|_| line.level().unwrap()).collect();
        assert_eq!(seen, [Level::Low, Level::High, Level::High, Level::High]);
    }

    #[test]
    fn test_square_line_period() {
        let mut line = SquareLine::new(2);
        let seen: Vec<_> = (0..6).map(|_| line.level().unwrap().is_high()).collect();
        assert_eq!(seen, [false, false, true, true, false, false]);
    }

    #[test]
    fn test_ramp_restarts_each_read() {
        let mut source = ScriptedSource::ramp(6);
        let mut a = [RawConversion::default(); 10];
        let mut b = [RawConversion::default(); 10];

        source.start().unwrap();
        source.read_exactly(&mut a, Duration::ZERO).unwrap();
        source.read_exactly(&mut b, Duration::ZERO).unwrap();
        source.stop().unwrap();

        assert_eq!(a, b);
        assert_eq!(a[1].magnitude(), 37);
        assert_eq!(a[1].channel(), 6);
    }

    #[test]
    fn test_read_requires_start() {
        let mut source = ScriptedSource::ramp(6);
        let mut buf = [RawConversion::default(); 2];
        assert!(matches!(
            source.read_exactly(&mut buf, Duration::ZERO),
            Err(SampleSourceError::Device(_))
        ));
    }
}
