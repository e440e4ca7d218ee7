//! Splits the serial byte stream into delimiter-terminated frames.
use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4096;

/// Codec that yields trimmed frames terminated by a single delimiter byte.
///
/// Frames may arrive split across any number of reads, partial data stays buffered until
/// the delimiter shows up. A frame growing past `max_length` is dropped together with
/// everything up to the next delimiter. Frames that are empty after trimming are skipped.
#[derive(Debug, Clone)]
pub struct FrameCodec
{
    delimiter: u8,
    max_length: usize,
    /// Index up to which the buffer was already searched for a delimiter.
    next_index: usize,
    discarding: bool,
}

impl FrameCodec {
    pub fn new(delimiter: u8, max_length: usize) -> Self {
        FrameCodec {
            delimiter,
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    fn frame_from(bytes: &[u8]) -> Option<String> {
        let frame = String::from_utf8_lossy(bytes);
        let trimmed = frame.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let search_end = src.len().min(self.max_length.saturating_add(1));
            let position = src[self.next_index..search_end]
                .iter()
                .position(|b| *b == self.delimiter)
                .map(|offset| self.next_index + offset);

            match (self.discarding, position) {
                (true, Some(position)) => {
                    src.advance(position + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(search_end);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(position)) => {
                    let frame = src.split_to(position + 1);
                    self.next_index = 0;
                    match Self::frame_from(&frame[..position]) {
                        Some(frame) => return Ok(Some(frame)),
                        None => continue,
                    }
                }
                (false, None) if src.len() > self.max_length => {
                    log::warn!(target: "sensorlogd::serial",
                               "Dropping frame longer than {} bytes without delimiter!", self.max_length);
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.discarding || src.is_empty() {
            src.clear();
            return Ok(None);
        }
        let rest = src.split();
        self.next_index = 0;
        Ok(Self::frame_from(&rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(codec: &mut FrameCodec, buf: &mut BytesMut, chunk: &[u8]) -> Vec<String> {
        buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn reassembles_frames_across_chunks() {
        let mut codec = FrameCodec::new(b'\n', 64);
        let mut buf = BytesMut::new();

        assert!(feed(&mut codec, &mut buf, b"{\"temperatura\": 2").is_empty());
        assert!(feed(&mut codec, &mut buf, b"4.5, \"umidade\"").is_empty());
        let frames = feed(&mut codec, &mut buf, b": 60}\r\n{\"a\"");
        assert_eq!(frames, vec!["{\"temperatura\": 24.5, \"umidade\": 60}".to_string()]);
        assert_eq!(feed(&mut codec, &mut buf, b": 1}\n"), vec!["{\"a\": 1}".to_string()]);
    }

    #[test]
    fn splits_on_period_for_radar_device() {
        let mut codec = FrameCodec::new(b'.', 64);
        let mut buf = BytesMut::new();
        assert_eq!(feed(&mut codec, &mut buf, b" 45,120. 50,80.60"), vec!["45,120", "50,80"]);
        assert_eq!(feed(&mut codec, &mut buf, b",30."), vec!["60,30"]);
    }

    #[test]
    fn skips_blank_frames() {
        let mut codec = FrameCodec::new(b'\n', 64);
        let mut buf = BytesMut::new();
        assert_eq!(feed(&mut codec, &mut buf, b"\r\n  \nabc\n\n"), vec!["abc"]);
    }

    #[test]
    fn drops_oversize_frame_and_resumes() {
        let mut codec = FrameCodec::new(b'\n', 8);
        let mut buf = BytesMut::new();

        assert!(feed(&mut codec, &mut buf, b"0123456789").is_empty());
        assert!(feed(&mut codec, &mut buf, b"abcdef").is_empty());
        assert_eq!(feed(&mut codec, &mut buf, b"xyz\nok\n"), vec!["ok"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn flushes_partial_frame_at_eof() {
        let mut codec = FrameCodec::new(b'\n', 64);
        let mut buf = BytesMut::from(&b"first\nsecond"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("first".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("second".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn replaces_invalid_utf8_and_keeps_framing() {
        let mut codec = FrameCodec::new(b'\n', 64);
        let mut buf = BytesMut::new();

        let frames = feed(&mut codec, &mut buf, b"\xff\xfe{\"lux\": 3}\nnext\n");

        assert_eq!(frames, vec!["\u{FFFD}\u{FFFD}{\"lux\": 3}".to_string(), "next".to_string()]);
        assert!(crate::decode::decode_sensor_line(&frames[0]).is_err());
    }
}
