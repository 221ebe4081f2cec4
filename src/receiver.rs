use polars::prelude::*;
use std::io::Write;

use crate::edge_detector::Transition;
use crate::frame_decoder::DecodedFrame;

const TIME_COLUMN_NAME: &str = "time";
const RISING_COLUMN_NAME: &str = "rising";
const FALLING_COLUMN_NAME: &str = "falling";

/// Rising and falling ramp of one trigger period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampPair {
    pub rising: Vec<i16>,
    pub falling: Vec<i16>,
}

impl RampPair {
    /// Ramp samples as a lazy table with a time axis in seconds.
    pub fn to_lazy_frame(&self, sample_rate_hz: u32) -> Result<LazyFrame, PolarsError> {
        let widen = |s: &[i16]| s.iter().map(|&v| i32::from(v)).collect::<Vec<_>>();

        let df = DataFrame::new(vec![
            Series::new(RISING_COLUMN_NAME.into(), widen(&self.rising)).into(),
            Series::new(FALLING_COLUMN_NAME.into(), widen(&self.falling)).into(),
        ])?;

        Ok(df
            .lazy()
            .with_row_index("row_index", Some(0))
            .with_columns([(col("row_index").cast(DataType::Float64)
                * lit(1.0 / f64::from(sample_rate_hz)))
            .alias(TIME_COLUMN_NAME)])
            .select([
                col(TIME_COLUMN_NAME),
                col(RISING_COLUMN_NAME),
                col(FALLING_COLUMN_NAME),
            ]))
    }

    /// Write the pair as CSV with a header row.
    pub fn write_csv<W: Write>(&self, sample_rate_hz: u32, writer: W) -> Result<(), PolarsError> {
        let mut df = self.to_lazy_frame(sample_rate_hz)?.collect()?;
        CsvWriter::new(writer).include_header(true).finish(&mut df)
    }
}

/// Pairs up decoded frames into ramp pairs.
///
/// A rising ramp keeps the head of its window, a falling ramp the tail. A
/// newer frame of the same direction replaces one still waiting for its
/// partner.
#[derive(Debug)]
pub struct RampAssembler {
    samples_per_ramp: usize,
    rising: Option<Vec<i16>>,
    falling: Option<Vec<i16>>,
}

impl RampAssembler {
    pub fn new(samples_per_ramp: usize) -> Self {
        Self {
            samples_per_ramp,
            rising: None,
            falling: None,
        }
    }

    pub fn push(&mut self, frame: DecodedFrame) -> Option<RampPair> {
        let keep = self.samples_per_ramp.min(frame.samples.len());
        let mut samples = frame.samples;

        match frame.transition {
            Transition::Rising => {
                samples.truncate(keep);
                if self.rising.replace(samples).is_some() {
                    log::debug!("Rising ramp without a falling partner, replaced");
                }
            }
            Transition::Falling => {
                samples.drain(..samples.len() - keep);
                if self.falling.replace(samples).is_some() {
                    log::debug!("Falling ramp without a rising partner, replaced");
                }
            }
        }

        if self.rising.is_some() && self.falling.is_some() {
            let rising = self.rising.take()?;
            let falling = self.falling.take()?;
            return Some(RampPair { rising, falling });
        }
        None
    }

    pub fn reset(&mut self) {
        self.rising = None;
        self.falling = None;
    }
}
