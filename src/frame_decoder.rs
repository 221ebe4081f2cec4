//! Receiver side of the frame protocol.
//!
//! Frames carry no length and no checksum, so the decoder relies on the
//! configured window length and on both marker pairs to find boundaries.
//! Anything that does not line up is dropped a byte at a time until the next
//! start marker yields a well-formed frame.

use std::io::{ErrorKind, Read};

use crate::edge_detector::Transition;
use crate::frame::{frame_len, FrameError, END_MARKER, HEADER_SIZE, START_MARKER};

/// A frame recovered from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub transition: Transition,
    pub samples: Vec<i16>,
}

/// Push-style decoder for a fixed window length.
#[derive(Debug)]
pub struct FrameDecoder {
    window_len: usize,
    buf: Vec<u8>,
    discarded: u64,
}

impl FrameDecoder {
    pub fn new(window_len: usize) -> Self {
        Self {
            window_len,
            buf: Vec::with_capacity(2 * frame_len(window_len)),
            discarded: 0,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<DecodedFrame> {
        let total = frame_len(self.window_len);

        loop {
            match find_start(&self.buf) {
                Some(pos) => self.discard(pos),
                None => {
                    // A trailing first marker byte may still become a frame.
                    let keep = usize::from(self.buf.last() == Some(&START_MARKER[0]));
                    self.discard(self.buf.len() - keep);
                    return None;
                }
            }

            if self.buf.len() < total {
                return None;
            }

            let tag = self.buf[HEADER_SIZE - 1];
            let footer_ok = self.buf[total - END_MARKER.len()..total] == END_MARKER;

            match Transition::from_tag(tag) {
                Some(transition) if footer_ok => {
                    let samples = self.buf[HEADER_SIZE..total - END_MARKER.len()]
                        .chunks_exact(2)
                        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                        .collect();
                    self.buf.drain(..total);
                    return Some(DecodedFrame {
                        transition,
                        samples,
                    });
                }
                _ => {
                    log::debug!("Bad frame at marker (type 0x{:02x}), resynchronizing", tag);
                    self.discard(1);
                }
            }
        }
    }

    /// Bytes dropped while hunting for frame boundaries.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    fn discard(&mut self, count: usize) {
        if count > 0 {
            self.buf.drain(..count);
            self.discarded += count as u64;
        }
    }
}

fn find_start(buf: &[u8]) -> Option<usize> {
    buf.windows(START_MARKER.len())
        .position(|w| w == START_MARKER)
}

/// Blocking frame reader over any byte stream, typically a serial port.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, window_len: usize) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(window_len),
            chunk: vec![0; frame_len(window_len)],
        }
    }

    /// Block until the next valid frame arrives.
    ///
    /// Read timeouts from the underlying stream surface as `FrameError::Io`
    /// with bytes received so far kept for the next call.
    pub fn read_frame(&mut self) -> Result<DecodedFrame, FrameError> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(frame);
            }

            let n = match self.reader.read(&mut self.chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.decoder.push(&self.chunk[..n]);
        }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use std::io::Cursor;

    const REFERENCE: [u8; 13] = [
        0xAA, 0x55, 0x01, 0x0A, 0x00, 0x14, 0x00, 0x1E, 0x00, 0x28, 0x00, 0x55, 0xAA,
    ];

    #[test]
    fn test_decode_reference_frame() {
        let mut decoder = FrameDecoder::new(4);
        decoder.push(&REFERENCE);

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.transition, Transition::Rising);
        assert_eq!(frame.samples, vec![10, 20, 30, 40]);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.discarded(), 0);
    }

    #[test]
    fn test_incomplete_frame_waits() {
        let mut decoder = FrameDecoder::new(4);
        decoder.push(&REFERENCE[..7]);
        assert!(decoder.next_frame().is_none());

        decoder.push(&REFERENCE[7..]);
        assert!(decoder.next_frame().is_some());
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut decoder = FrameDecoder::new(4);
        decoder.push(&[0x00, 0x13, 0x55, 0xAA]);
        decoder.push(&REFERENCE);

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.samples, vec![10, 20, 30, 40]);
        assert_eq!(decoder.discarded(), 4);
    }

    #[test]
    fn test_split_start_marker_is_kept() {
        let mut decoder = FrameDecoder::new(4);
        decoder.push(&[0x42, 0xAA]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), 1);

        decoder.push(&REFERENCE[1..]);
        assert_eq!(decoder.next_frame().unwrap().transition, Transition::Rising);
    }

    #[test]
    fn test_truncated_frame_resyncs_on_next_marker() {
        let mut stream = REFERENCE[..8].to_vec();
        let mut falling = Vec::new();
        encode_frame(Transition::Falling, &[1, 2, 3, 4], &mut falling);
        stream.extend_from_slice(&falling);

        let mut decoder = FrameDecoder::new(4);
        decoder.push(&stream);

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.transition, Transition::Falling);
        assert_eq!(frame.samples, vec![1, 2, 3, 4]);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let mut bad = REFERENCE;
        bad[2] = 0x07;
        let mut decoder = FrameDecoder::new(4);
        decoder.push(&bad);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_reader_yields_frames_in_order() {
        let mut stream = Vec::new();
        encode_frame(Transition::Rising, &[1, 2], &mut stream);
        encode_frame(Transition::Falling, &[3, 4], &mut stream);

        let mut reader = FrameReader::new(Cursor::new(stream), 2);
        assert_eq!(reader.read_frame().unwrap().transition, Transition::Rising);
        assert_eq!(reader.read_frame().unwrap().samples, vec![3, 4]);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }
}
