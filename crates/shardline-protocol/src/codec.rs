//! Codec for the gateway's zlib-stream transport compression.
//!
//! The gateway compresses the whole connection as one zlib stream. Each
//! logical frame ends with a sync flush, i.e. the bytes `00 00 FF FF`.
//! A frame may arrive split over several socket messages, so chunks are
//! buffered until the suffix is seen and only then inflated. The inflate
//! context is shared by every frame of a connection and must be reset on
//! reconnect.

use bytes::BytesMut;
use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;

/// Marker ending every complete compressed frame.
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Output buffer growth step while inflating.
const INFLATE_CHUNK: usize = 32 * 1024;

/// Upper bound for buffered compressed bytes (16 MiB).
pub const MAX_BUFFERED: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during decoding and encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The compressed stream is corrupt.
    #[error("Decompression failed: {0}")]
    Decompress(#[from] flate2::DecompressError),

    /// Inflated bytes are not valid UTF-8.
    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Buffered data grew past [`MAX_BUFFERED`] without a frame suffix.
    #[error("Buffered {0} bytes without a complete frame")]
    FrameTooLarge(usize),

    /// A HELLO asked for heartbeats every 0 ms.
    #[error("Heartbeat interval must be positive")]
    ZeroHeartbeatInterval,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Incremental decoder for a zlib-stream connection.
pub struct FrameCodec {
    inflater: Decompress,
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a codec with a fresh inflate context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Drop buffered bytes and start a new inflate context.
    pub fn reset(&mut self) {
        self.inflater.reset(true);
        self.buffer.clear();
    }

    /// Number of compressed bytes waiting for a frame suffix.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk of the compressed stream.
    ///
    /// Returns `Ok(Some(text))` once a frame is complete and `Ok(None)` while
    /// more chunks are needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is corrupt. The codec must be
    /// [`reset`](Self::reset) before it is used again.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<String>, ProtocolError> {
        self.buffer.extend_from_slice(chunk);

        if !self.buffer.ends_with(&ZLIB_SUFFIX) {
            if self.buffer.len() > MAX_BUFFERED {
                return Err(ProtocolError::FrameTooLarge(self.buffer.len()));
            }
            return Ok(None);
        }

        let input = self.buffer.split();
        let inflated = self.inflate(&input)?;
        Ok(Some(String::from_utf8(inflated)?))
    }

    fn inflate(&mut self, input: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(INFLATE_CHUNK));
        let mut offset = 0;

        loop {
            if output.len() == output.capacity() {
                output.reserve(INFLATE_CHUNK);
            }

            let in_before = self.inflater.total_in();
            let out_before = self.inflater.total_out();
            let status =
                self.inflater
                    .decompress_vec(&input[offset..], &mut output, FlushDecompress::Sync)?;
            let consumed = (self.inflater.total_in() - in_before) as usize;
            let produced = self.inflater.total_out() - out_before;
            offset += consumed;

            let drained = offset >= input.len() && output.len() < output.capacity();
            if drained || status == Status::StreamEnd || (consumed == 0 && produced == 0) {
                break;
            }
        }

        Ok(output)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("buffered", &self.buffer.len())
            .field("total_in", &self.inflater.total_in())
            .field("total_out", &self.inflater.total_out())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Compress frames the way the gateway does: one stream, a sync flush
    /// after every frame.
    pub(crate) fn compress_frames(frames: &[&str]) -> Vec<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let mut out = Vec::new();
        for frame in frames {
            encoder.write_all(frame.as_bytes()).unwrap();
            encoder.flush().unwrap();
            out.push(std::mem::take(encoder.get_mut()));
        }
        out
    }

    const READY: &str = r#"{"op":0,"s":1,"t":"READY","d":{"session_id":"abc","guilds":[]}}"#;

    #[test]
    fn test_single_chunk_frame() {
        let compressed = compress_frames(&[READY]);
        assert!(compressed[0].ends_with(&ZLIB_SUFFIX));

        let mut codec = FrameCodec::new();
        assert_eq!(codec.push(&compressed[0]).unwrap().as_deref(), Some(READY));
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_reassembly_across_every_split_point() {
        let compressed = compress_frames(&[READY]).remove(0);

        for split in 1..compressed.len() {
            let mut codec = FrameCodec::new();
            let (head, tail) = compressed.split_at(split);
            assert_eq!(codec.push(head).unwrap(), None, "split at {split}");
            assert_eq!(codec.push(tail).unwrap().as_deref(), Some(READY));
        }
    }

    #[test]
    fn test_reassembly_byte_by_byte() {
        let compressed = compress_frames(&[READY]).remove(0);
        let mut codec = FrameCodec::new();
        let mut frames = Vec::new();

        for byte in &compressed {
            if let Some(frame) = codec.push(std::slice::from_ref(byte)).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames, vec![READY.to_string()]);
    }

    #[test]
    fn test_shared_context_across_frames() {
        let first = r#"{"op":10,"d":{"heartbeat_interval":41250}}"#;
        let second = r#"{"op":11}"#;
        let compressed = compress_frames(&[first, second, first]);

        let mut codec = FrameCodec::new();
        assert_eq!(codec.push(&compressed[0]).unwrap().as_deref(), Some(first));
        assert_eq!(codec.push(&compressed[1]).unwrap().as_deref(), Some(second));
        assert_eq!(codec.push(&compressed[2]).unwrap().as_deref(), Some(first));
    }

    #[test]
    fn test_no_frame_without_suffix() {
        let compressed = compress_frames(&[READY]).remove(0);
        let truncated = &compressed[..compressed.len() - ZLIB_SUFFIX.len()];

        let mut codec = FrameCodec::new();
        assert_eq!(codec.push(truncated).unwrap(), None);
        assert_eq!(codec.buffered(), truncated.len());
    }

    #[test]
    fn test_corrupt_stream_errors() {
        let mut codec = FrameCodec::new();
        let garbage = [0x13, 0x37, 0xde, 0xad, 0x00, 0x00, 0xFF, 0xFF];
        assert!(matches!(
            codec.push(&garbage),
            Err(ProtocolError::Decompress(_))
        ));
    }

    #[test]
    fn test_reset_starts_new_stream() {
        let first_connection = compress_frames(&[READY]);
        let second_connection = compress_frames(&[READY]);

        let mut codec = FrameCodec::new();
        codec.push(&first_connection[0]).unwrap();
        codec.reset();
        assert_eq!(
            codec.push(&second_connection[0]).unwrap().as_deref(),
            Some(READY)
        );
    }

    #[test]
    fn test_large_frame() {
        let content = "x".repeat(200_000);
        let frame = format!(r#"{{"op":0,"s":2,"t":"MESSAGE_CREATE","d":{{"content":"{content}"}}}}"#);
        let compressed = compress_frames(&[&frame]).remove(0);

        let mut codec = FrameCodec::new();
        assert_eq!(codec.push(&compressed).unwrap(), Some(frame));
    }
}
