use std::io::Write;

use crate::edge_detector::Transition;
use crate::window_sampler::SampleWindow;

/// Bytes opening every frame.
pub const START_MARKER: [u8; 2] = [0xAA, 0x55];

/// Bytes closing every frame.
pub const END_MARKER: [u8; 2] = [0x55, 0xAA];

/// Start marker plus type tag.
pub const HEADER_SIZE: usize = 3;

pub const FOOTER_SIZE: usize = 2;

/// Wire size of a frame carrying `samples` samples.
pub const fn frame_len(samples: usize) -> usize {
    HEADER_SIZE + 2 * samples + FOOTER_SIZE
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed (incomplete frame)")]
    ConnectionClosed,
}

/// Serialize one frame into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────┬──────────────────────┬──────────┐
/// │ AA 55    │ type │ samples (N × i16 LE) │ 55 AA    │
/// └──────────┴──────┴──────────────────────┴──────────┘
/// ```
///
/// There is no length field and no checksum. Receivers know N in advance and
/// resynchronize on the markers.
pub fn encode_frame(transition: Transition, samples: &[i16], dst: &mut Vec<u8>) {
    dst.reserve(frame_len(samples.len()));
    dst.extend_from_slice(&START_MARKER);
    dst.push(transition.tag());
    for sample in samples {
        dst.extend_from_slice(&sample.to_le_bytes());
    }
    dst.extend_from_slice(&END_MARKER);
}

/// Writes tagged sample windows to a byte sink.
#[derive(Debug)]
pub struct FrameEncoder<W> {
    sink: W,
    buf: Vec<u8>,
}

impl<W: Write> FrameEncoder<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            buf: Vec::new(),
        }
    }

    /// Encode and transmit one frame.
    pub fn emit_frame(
        &mut self,
        transition: Transition,
        window: &SampleWindow,
    ) -> Result<(), FrameError> {
        self.buf.clear();
        encode_frame(transition, window.as_slice(), &mut self.buf);

        self.sink.write_all(&self.buf)?;
        self.sink.flush()?;

        log::debug!(
            "Sent {} frame, {} samples, first: {:?}",
            transition.as_str(),
            window.len(),
            &window.as_slice()[..window.len().min(4)]
        );
        Ok(())
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }
}
