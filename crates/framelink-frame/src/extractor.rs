use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::config::{FrameConfig, FrameDetection};
use crate::error::Result;
use crate::frame::RawFrame;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Splits a growing byte buffer into frames.
///
/// Feed every inbound chunk to [`push`](Self::push); complete frames come
/// back in stream order and incomplete data stays buffered for the next call.
#[derive(Debug)]
pub struct FrameExtractor {
    config: FrameConfig,
    buf: BytesMut,
    sequence: u64,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self {
            config: FrameConfig::default(),
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            sequence: 0,
        }
    }
}

impl FrameExtractor {
    /// Create an extractor after validating the configuration.
    pub fn new(config: FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Replace the configuration. Buffered bytes are discarded.
    pub fn set_config(&mut self, config: FrameConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.buf.clear();
        Ok(())
    }

    /// Bytes currently retained between calls.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Sequence number of the last emitted frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Drop buffered bytes and restart sequence numbering.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.sequence = 0;
    }

    /// Append `data` and extract every complete frame.
    pub fn push(&mut self, data: &[u8]) -> Vec<RawFrame> {
        self.buf.extend_from_slice(data);
        self.extract()
    }

    /// Extract every complete frame from the current buffer.
    pub fn extract(&mut self) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        match self.config.frame_detection {
            FrameDetection::EndDelimiterOnly => self.extract_end_delimited(&mut frames),
            FrameDetection::StartAndEndDelimiter => self.extract_start_end_delimited(&mut frames),
            FrameDetection::StartDelimiterOnly => self.extract_start_delimited(&mut frames),
            FrameDetection::NoDelimiters => self.extract_pass_through(&mut frames),
        }
        if !frames.is_empty() {
            trace!(
                count = frames.len(),
                retained = self.buf.len(),
                "extracted frames"
            );
        }
        frames
    }

    /// Emit the unterminated trailing frame, if the policy allows one, and
    /// clear the buffer.
    ///
    /// A start-delimited stream has no terminator for its last frame, so
    /// the caller decides when the stream is over.
    pub fn finish(&mut self) -> Option<RawFrame> {
        let rest = self.buf.split().freeze();
        let data = match self.config.frame_detection {
            FrameDetection::EndDelimiterOnly | FrameDetection::NoDelimiters => rest,
            FrameDetection::StartDelimiterOnly => {
                let start = &self.config.start_sequence;
                if !rest.starts_with(start) {
                    return None;
                }
                rest.slice(start.len()..)
            }
            FrameDetection::StartAndEndDelimiter => return None,
        };
        self.frame(data)
    }

    fn extract_end_delimited(&mut self, frames: &mut Vec<RawFrame>) {
        let finish = self.config.finish_sequence.clone();
        while let Some(pos) = find(&self.buf, &finish, 0) {
            let data = self.buf.split_to(pos).freeze();
            self.buf.advance(finish.len());
            frames.extend(self.frame(data));
        }
    }

    fn extract_start_end_delimited(&mut self, frames: &mut Vec<RawFrame>) {
        let start = self.config.start_sequence.clone();
        let finish = self.config.finish_sequence.clone();

        loop {
            let Some(start_pos) = find(&self.buf, &start, 0) else {
                // Only a partial start delimiter can still matter.
                self.keep_tail(start.len() - 1);
                break;
            };
            let body = start_pos + start.len();
            let Some(end_pos) = find(&self.buf, &finish, body) else {
                self.buf.advance(start_pos);
                break;
            };

            self.buf.advance(body);
            let data = self.buf.split_to(end_pos - body).freeze();
            self.buf.advance(finish.len());
            frames.extend(self.frame(data));
        }
    }

    fn extract_start_delimited(&mut self, frames: &mut Vec<RawFrame>) {
        let start = self.config.start_sequence.clone();

        let Some(first) = find(&self.buf, &start, 0) else {
            self.keep_tail(start.len() - 1);
            return;
        };
        self.buf.advance(first);

        // The buffer now begins with a delimiter; each later delimiter closes a frame.
        while let Some(next) = find(&self.buf, &start, start.len()) {
            self.buf.advance(start.len());
            let data = self.buf.split_to(next - start.len()).freeze();
            frames.extend(self.frame(data));
        }
    }

    fn extract_pass_through(&mut self, frames: &mut Vec<RawFrame>) {
        let data = self.buf.split().freeze();
        frames.extend(self.frame(data));
    }

    fn keep_tail(&mut self, keep: usize) {
        if self.buf.len() > keep {
            let drop = self.buf.len() - keep;
            self.buf.advance(drop);
        }
    }

    fn frame(&mut self, data: Bytes) -> Option<RawFrame> {
        if data.is_empty() {
            return None;
        }
        self.sequence += 1;
        Some(RawFrame::new(data, self.sequence))
    }
}

/// Position of the first `needle` in `haystack` at or after `from`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;

    fn payloads(frames: &[RawFrame]) -> Vec<&[u8]> {
        frames.iter().map(|f| f.data.as_ref()).collect()
    }

    fn extractor(config: FrameConfig) -> FrameExtractor {
        FrameExtractor::new(config).unwrap()
    }

    #[test]
    fn end_delimited_lines() {
        let mut ex = extractor(FrameConfig::end_delimited(Bytes::from_static(b"\n")));
        let frames = ex.push(b"frame1\nframe2\n");

        assert_eq!(payloads(&frames), vec![&b"frame1"[..], &b"frame2"[..]]);
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn end_delimited_keeps_trailing_bytes() {
        let mut ex = extractor(FrameConfig::end_delimited(Bytes::from_static(b"\r\n")));
        assert!(ex.push(b"abc\r").is_empty());
        assert_eq!(ex.buffered(), 4);

        let frames = ex.push(b"\ndef");
        assert_eq!(payloads(&frames), vec![&b"abc"[..]]);
        assert_eq!(ex.buffered(), 3);

        let tail = ex.finish().unwrap();
        assert_eq!(tail.data.as_ref(), b"def");
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn start_end_delimited_single_frame() {
        let mut ex = extractor(FrameConfig::start_end_delimited(
            Bytes::from_static(&[0x02]),
            Bytes::from_static(&[0x03]),
        ));
        let frames = ex.push(&[0x02, b'd', b'a', b't', b'a', 0x03]);

        assert_eq!(payloads(&frames), vec![&b"data"[..]]);
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn start_end_delimited_drops_noise_outside_frames() {
        let mut ex = extractor(FrameConfig::start_end_delimited(
            Bytes::from_static(b"<<"),
            Bytes::from_static(b">>"),
        ));

        let frames = ex.push(b"noise<<one>>junk<<tw");
        assert_eq!(payloads(&frames), vec![&b"one"[..]]);
        // Retained from the unmatched start delimiter.
        assert_eq!(ex.buffered(), b"<<tw".len());

        let frames = ex.push(b"o>>garbage<");
        assert_eq!(payloads(&frames), vec![&b"two"[..]]);
        // Only a possible partial start delimiter survives.
        assert_eq!(ex.buffered(), 1);

        let frames = ex.push(b"<three>>");
        assert_eq!(payloads(&frames), vec![&b"three"[..]]);
    }

    #[test]
    fn start_end_delimited_discards_trailing_on_finish() {
        let mut ex = extractor(FrameConfig::start_end_delimited(
            Bytes::from_static(b"{"),
            Bytes::from_static(b"}"),
        ));
        assert!(ex.push(b"{partial").is_empty());
        assert!(ex.finish().is_none());
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn start_delimited_emits_once_next_delimiter_seen() {
        let mut ex = extractor(FrameConfig::start_delimited(Bytes::from_static(b"$")));
        let frames = ex.push(b"$frame1$frame2");

        assert_eq!(payloads(&frames), vec![&b"frame1"[..]]);
        assert_eq!(ex.buffered(), b"$frame2".len());
    }

    #[test]
    fn start_delimited_never_reemits_trailing_frame() {
        let mut ex = extractor(FrameConfig::start_delimited(Bytes::from_static(b"$")));
        assert!(ex.push(b"$abc").is_empty());
        assert!(ex.push(b"def").is_empty());
        assert!(ex.extract().is_empty());

        let frames = ex.push(b"$x");
        assert_eq!(payloads(&frames), vec![&b"abcdef"[..]]);

        let tail = ex.finish().unwrap();
        assert_eq!(tail.data.as_ref(), b"x");
        assert!(ex.finish().is_none());
    }

    #[test]
    fn pass_through_emits_whole_buffer() {
        let mut ex = extractor(FrameConfig::pass_through());
        let frames = ex.push(b"anything\n$goes");
        assert_eq!(payloads(&frames), vec![&b"anything\n$goes"[..]]);
        assert_eq!(ex.buffered(), 0);
        assert!(ex.push(b"").is_empty());
    }

    #[test]
    fn consecutive_delimiters_never_emit_empty_frames() {
        let mut end = extractor(FrameConfig::end_delimited(Bytes::from_static(b"\n")));
        assert_eq!(payloads(&end.push(b"\n\na\n\n\nb\n")), vec![&b"a"[..], &b"b"[..]]);

        let mut start = extractor(FrameConfig::start_delimited(Bytes::from_static(b"$")));
        assert_eq!(payloads(&start.push(b"$$$a$$b$")), vec![&b"a"[..], &b"b"[..]]);

        let mut both = extractor(FrameConfig::start_end_delimited(
            Bytes::from_static(b"["),
            Bytes::from_static(b"]"),
        ));
        assert_eq!(payloads(&both.push(b"[][a][]")), vec![&b"a"[..]]);
    }

    #[test]
    fn sequence_numbers_increase_per_frame() {
        let mut ex = extractor(FrameConfig::default());
        let frames = ex.push(b"a\nb\n");
        let more = ex.push(b"c\n");
        let seqs: Vec<u64> = frames.iter().chain(&more).map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(frames.iter().all(|f| f.checksum_valid));

        ex.reset();
        assert_eq!(ex.push(b"d\n")[0].sequence, 1);
    }

    #[test]
    fn set_config_discards_buffer_and_validates() {
        let mut ex = extractor(FrameConfig::default());
        ex.push(b"half");
        assert_eq!(ex.buffered(), 4);

        let err = ex
            .set_config(FrameConfig::start_delimited(Bytes::new()))
            .unwrap_err();
        assert!(matches!(err, FrameError::MissingDelimiter { .. }));
        assert_eq!(ex.buffered(), 4);

        ex.set_config(FrameConfig::pass_through()).unwrap();
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn find_handles_edges() {
        assert_eq!(find(b"abcabc", b"bc", 0), Some(1));
        assert_eq!(find(b"abcabc", b"bc", 2), Some(4));
        assert_eq!(find(b"abc", b"", 0), None);
        assert_eq!(find(b"abc", b"abcd", 0), None);
        assert_eq!(find(b"abc", b"c", 3), None);
    }
}
