use std::convert::Infallible;
use std::io::Write;
use std::thread;

use crate::config::{AcquisitionConfig, ConfigError};
use crate::edge_detector::{EdgeDetector, LevelSource, LineError, Transition};
use crate::frame::FrameEncoder;
use crate::window_sampler::{CaptureOutcome, SampleSource, SampleWindow, WindowSampler};

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Line(#[from] LineError),
}

/// Position of the acquisition loop within one trigger period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitRising,
    CaptureRising,
    AwaitFalling,
    CaptureFalling,
}

impl LoopState {
    pub fn next(self) -> Self {
        match self {
            LoopState::AwaitRising => LoopState::CaptureRising,
            LoopState::CaptureRising => LoopState::AwaitFalling,
            LoopState::AwaitFalling => LoopState::CaptureFalling,
            LoopState::CaptureFalling => LoopState::AwaitRising,
        }
    }
}

/// Running totals kept by the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub cycles: u64,
    pub frames_emitted: u64,
    pub partial_captures: u64,
    pub capture_timeouts: u64,
    pub device_errors: u64,
    pub transmit_failures: u64,
}

impl AcquisitionStats {
    fn record_capture(&mut self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Complete => {}
            CaptureOutcome::Partial { .. } => self.partial_captures += 1,
            CaptureOutcome::TimedOut => self.capture_timeouts += 1,
            CaptureOutcome::DeviceError => self.device_errors += 1,
        }
    }
}

/// Owns the three capabilities and the reusable window, and sequences
/// edge wait, capture and transmission forever.
pub struct AcquisitionLoop<L, S, W> {
    detector: EdgeDetector<L>,
    sampler: WindowSampler<S>,
    encoder: FrameEncoder<W>,
    window: SampleWindow,
    state: LoopState,
    config: AcquisitionConfig,
    stats: AcquisitionStats,
}

impl<L, S, W> AcquisitionLoop<L, S, W>
where
    L: LevelSource,
    S: SampleSource,
    W: Write,
{
    pub fn new(
        config: AcquisitionConfig,
        line: L,
        source: S,
        sink: W,
    ) -> Result<Self, AcquisitionError> {
        config.validate()?;

        Ok(Self {
            detector: EdgeDetector::new(line, config.coarse_poll),
            sampler: WindowSampler::new(source, config.capture_timeout),
            encoder: FrameEncoder::new(sink),
            window: SampleWindow::new(config.window_len),
            state: LoopState::AwaitRising,
            config,
            stats: AcquisitionStats::default(),
        })
    }

    /// Run forever after the startup pause. Only a failing trigger line ends
    /// the loop.
    pub fn run(&mut self) -> Result<Infallible, AcquisitionError> {
        log::info!(
            "Sampling {} Hz, {} samples per ramp",
            self.config.sample_rate_hz,
            self.config.window_len
        );
        thread::sleep(self.config.startup_delay);
        log::info!("Waiting for triggers");

        loop {
            self.run_cycle()?;
        }
    }

    /// Run `cycles` full rising+falling periods.
    pub fn run_cycles(&mut self, cycles: u64) -> Result<(), AcquisitionError> {
        for _ in 0..cycles {
            self.run_cycle()?;
        }
        Ok(())
    }

    /// Advance from the current state through one complete period, ending
    /// back in `AwaitRising`.
    pub fn run_cycle(&mut self) -> Result<(), AcquisitionError> {
        let _span = tracing::debug_span!("acquisition_cycle", cycle = self.stats.cycles).entered();

        loop {
            let finished = self.state == LoopState::CaptureFalling;
            self.step()?;
            if finished {
                return Ok(());
            }
        }
    }

    /// Execute the current state and move to the next one.
    pub fn step(&mut self) -> Result<LoopState, AcquisitionError> {
        match self.state {
            LoopState::AwaitRising => self.await_edge(Transition::Rising)?,
            LoopState::AwaitFalling => self.await_edge(Transition::Falling)?,
            LoopState::CaptureRising => self.capture_and_emit(Transition::Rising),
            LoopState::CaptureFalling => {
                self.capture_and_emit(Transition::Falling);
                self.stats.cycles += 1;
                log::debug!("Cycle complete: {:?}", self.stats);
                thread::sleep(self.config.cycle_delay);
            }
        }
        self.state = self.state.next();
        Ok(self.state)
    }

    fn await_edge(&mut self, transition: Transition) -> Result<(), AcquisitionError> {
        self.detector.wait_for_edge(transition)?;
        log::info!("{} edge detected", transition.as_str());
        Ok(())
    }

    fn capture_and_emit(&mut self, transition: Transition) {
        let outcome = self.sampler.capture_window(&mut self.window);
        self.stats.record_capture(outcome);

        match self.encoder.emit_frame(transition, &self.window) {
            Ok(()) => self.stats.frames_emitted += 1,
            Err(e) => {
                self.stats.transmit_failures += 1;
                log::error!("Failed to send {} frame: {}", transition.as_str(), e);
            }
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn sink(&self) -> &W {
        self.encoder.sink()
    }

    pub fn source_mut(&mut self) -> &mut S {
        self.sampler.source_mut()
    }

    pub fn into_sink(self) -> W {
        self.encoder.into_sink()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge_detector::Level::{High, Low};
    use crate::frame::frame_len;
    use crate::frame_decoder::FrameDecoder;
    use crate::sim::{Fault, PulseLine, ScriptedLine, ScriptedSource, SquareLine};
    use std::io;
    use std::time::Duration;

    const N: usize = 8;

    fn fast_config() -> AcquisitionConfig {
        AcquisitionConfig::default()
            .with_window_len(N)
            .with_coarse_poll(Duration::ZERO)
            .with_cycle_delay(Duration::ZERO)
            .with_startup_delay(Duration::ZERO)
    }

    fn decode_all(bytes: &[u8]) -> Vec<Transition> {
        let mut decoder = FrameDecoder::new(N);
        decoder.push(bytes);
        let mut kinds = Vec::new();
        while let Some(frame) = decoder.next_frame() {
            assert_eq!(frame.samples.len(), N);
            kinds.push(frame.transition);
        }
        assert_eq!(decoder.discarded(), 0);
        kinds
    }

    #[test]
    fn test_state_order() {
        let mut state = LoopState::AwaitRising;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(state);
            state = state.next();
        }
        assert_eq!(
            seen,
            [
                LoopState::AwaitRising,
                LoopState::CaptureRising,
                LoopState::AwaitFalling,
                LoopState::CaptureFalling,
                LoopState::AwaitRising,
            ]
        );
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = AcquisitionLoop::new(
            fast_config().with_window_len(0),
            ScriptedLine::new(vec![Low]),
            ScriptedSource::ramp(6),
            Vec::new(),
        );
        assert!(matches!(
            result,
            Err(AcquisitionError::Config(ConfigError::EmptyWindow))
        ));
    }

    #[test]
    fn test_step_walks_the_states() {
        let line = ScriptedLine::new(vec![Low, High, High, Low]);
        let mut acq =
            AcquisitionLoop::new(fast_config(), line, ScriptedSource::ramp(6), Vec::new()).unwrap();

        assert_eq!(acq.step().unwrap(), LoopState::CaptureRising);
        assert!(acq.sink().is_empty());
        assert_eq!(acq.step().unwrap(), LoopState::AwaitFalling);
        assert_eq!(acq.sink().len(), frame_len(N));
        assert_eq!(acq.step().unwrap(), LoopState::CaptureFalling);
        assert_eq!(acq.step().unwrap(), LoopState::AwaitRising);
        assert_eq!(acq.sink().len(), 2 * frame_len(N));
        assert_eq!(acq.stats().cycles, 1);
    }

    #[test]
    fn test_frames_strictly_alternate() {
        let line = SquareLine::new(3);
        let mut acq =
            AcquisitionLoop::new(fast_config(), line, ScriptedSource::ramp(6), Vec::new()).unwrap();
        acq.run_cycles(5).unwrap();

        let kinds = decode_all(acq.sink());
        assert_eq!(kinds.len(), 10);
        for pair in kinds.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(kinds[0], Transition::Rising);
        assert_eq!(acq.stats().frames_emitted, 10);
    }

    #[test]
    fn test_identical_input_gives_identical_frames() {
        let run = || {
            let mut acq = AcquisitionLoop::new(
                fast_config(),
                SquareLine::new(2),
                ScriptedSource::ramp(6),
                Vec::new(),
            )
            .unwrap();
            acq.run_cycles(3).unwrap();
            acq.into_sink()
        };

        let first = run();
        let second = run();
        assert_eq!(first.len(), 6 * frame_len(N));
        assert_eq!(first, second);

        // Every frame of a deterministic source carries the same samples.
        let frames: Vec<_> = first.chunks(frame_len(N)).collect();
        assert_eq!(&frames[0][3..], &frames[2][3..]);
    }

    #[test]
    fn test_single_pulse_emits_one_rising_then_one_falling_frame() {
        let line = PulseLine::new(Duration::from_millis(5), Duration::from_millis(50));
        let config = fast_config().with_coarse_poll(Duration::from_millis(1));
        let mut acq =
            AcquisitionLoop::new(config, line, ScriptedSource::ramp(6), Vec::new()).unwrap();

        acq.run_cycle().unwrap();

        assert_eq!(
            decode_all(acq.sink()),
            vec![Transition::Rising, Transition::Falling]
        );
        assert_eq!(acq.state(), LoopState::AwaitRising);
    }

    #[test]
    fn test_capture_faults_still_produce_zeroed_frames() {
        let mut acq = AcquisitionLoop::new(
            fast_config(),
            SquareLine::new(1),
            ScriptedSource::ramp(6),
            Vec::new(),
        )
        .unwrap();

        acq.source_mut().inject(Fault::Timeout);
        acq.run_cycle().unwrap();
        acq.source_mut().inject(Fault::Device);
        acq.run_cycle().unwrap();

        let stats = acq.stats();
        assert_eq!(stats.frames_emitted, 4);
        assert_eq!(stats.capture_timeouts, 1);
        assert_eq!(stats.device_errors, 1);

        let mut decoder = FrameDecoder::new(N);
        decoder.push(acq.sink());
        let first = decoder.next_frame().unwrap();
        assert_eq!(first.transition, Transition::Rising);
        assert_eq!(first.samples, vec![0; N]);
        let second = decoder.next_frame().unwrap();
        assert!(second.samples.iter().any(|&s| s != 0));
    }

    struct FlakySink {
        writes: usize,
        fail_on: usize,
        out: Vec<u8>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            if self.writes == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "tx stalled"));
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_transmit_failure_keeps_the_cadence() {
        let sink = FlakySink {
            writes: 0,
            fail_on: 2,
            out: Vec::new(),
        };
        let mut acq =
            AcquisitionLoop::new(fast_config(), SquareLine::new(1), ScriptedSource::ramp(6), sink)
                .unwrap();
        acq.run_cycles(2).unwrap();

        let stats = acq.stats();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.transmit_failures, 1);
        assert_eq!(stats.frames_emitted, 3);
        assert_eq!(
            decode_all(&acq.sink().out),
            vec![Transition::Rising, Transition::Rising, Transition::Falling]
        );
    }

    #[test]
    fn test_line_failure_ends_the_loop() {
        let line = ScriptedLine::failing_after(vec![Low, High]);
        let mut acq =
            AcquisitionLoop::new(fast_config(), line, ScriptedSource::ramp(6), Vec::new()).unwrap();
        let result = acq.run_cycles(3);

        assert!(matches!(result, Err(AcquisitionError::Line(_))));
        assert_eq!(acq.stats().frames_emitted, 1);
        assert_eq!(acq.state(), LoopState::AwaitFalling);
    }
}
