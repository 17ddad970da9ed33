//! Framing and decompression: turning received frames into complete JSON
//! payloads, regardless of whether transport compression is enabled.

use flate2::{Decompress, DecompressError, FlushDecompress};
use std::fmt::{self, Display, Formatter};

const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];
const INTERNAL_BUFFER_SIZE: usize = 32 * 1024;

/// Error produced while decoding a gateway message.
#[derive(Debug)]
pub enum DecodeError {
    /// A frame arrived in the wrong shape for the configured mode (e.g. a
    /// binary frame while zlib-stream compression is disabled).
    UnexpectedFrameKind,
    /// The accumulated bytes could not be decompressed.
    Decompressing(DecompressError),
    /// The decompressed (or plain) bytes were not valid UTF-8.
    NotUtf8(std::str::Utf8Error),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedFrameKind => {
                f.write_str("received a frame of a kind not valid for the configured transport mode")
            }
            Self::Decompressing(_) => f.write_str("a frame could not be decompressed"),
            Self::NotUtf8(_) => f.write_str("decoded payload was not valid UTF-8"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decompressing(source) => Some(source),
            Self::NotUtf8(source) => Some(source),
            Self::UnexpectedFrameKind => None,
        }
    }
}

/// Decodes received frames into complete JSON payload strings.
///
/// `zlib_stream` is a runtime choice (it comes from [`crate::config::Config`]),
/// not a Cargo feature: both code paths are always compiled so a caller can
/// pick per connection.
pub enum Decoder {
    /// Each `Frame::Text` is already a complete payload.
    Plain,
    /// A persistent zlib stream spans the whole connection; logical message
    /// boundaries are marked by a trailing sync-flush marker.
    ZlibStream(Box<Inflater>),
}

impl Decoder {
    /// Create a decoder for the given mode.
    pub fn new(zlib_stream: bool) -> Self {
        if zlib_stream {
            Self::ZlibStream(Box::new(Inflater::new()))
        } else {
            Self::Plain
        }
    }

    /// Feed one text frame into the decoder.
    ///
    /// Only valid in plain mode; Discord never sends text frames when
    /// compression is negotiated.
    pub fn feed_text(&mut self, text: String) -> Result<Option<String>, DecodeError> {
        match self {
            Self::Plain => Ok(Some(text)),
            Self::ZlibStream(_) => Err(DecodeError::UnexpectedFrameKind),
        }
    }

    /// Feed one binary frame into the decoder.
    ///
    /// Only valid in zlib-stream mode. Returns `Ok(None)` until a frame
    /// terminated by the sync-flush marker completes a logical message.
    pub fn feed_binary(&mut self, bytes: &[u8]) -> Result<Option<String>, DecodeError> {
        match self {
            Self::Plain => Err(DecodeError::UnexpectedFrameKind),
            Self::ZlibStream(inflater) => inflater.feed(bytes),
        }
    }

    /// Reset the decoder's state for a brand-new connection.
    ///
    /// The zlib decompression context is never reset across payloads within
    /// one connection — only across reconnects, where a fresh context is
    /// required because the peer's compressor also restarted.
    pub fn reset(&mut self) {
        if let Self::ZlibStream(inflater) = self {
            **inflater = Inflater::new();
        }
    }
}

/// Streaming zlib-stream decompressor.
///
/// A single [`Decompress`] context persists across every message the
/// connection receives; Discord flushes with `Z_SYNC_FLUSH` after each
/// logical message, which both terminates the frame (the 4-byte suffix) and
/// keeps the compression dictionary warm for the next one.
pub struct Inflater {
    decompress: Decompress,
    compressed: Vec<u8>,
    scratch: Vec<u8>,
    output: Vec<u8>,
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            decompress: Decompress::new(true),
            compressed: Vec::new(),
            scratch: Vec::with_capacity(INTERNAL_BUFFER_SIZE),
            output: Vec::with_capacity(INTERNAL_BUFFER_SIZE),
        }
    }

    /// Accumulate bytes from one binary frame. If the frame completes a
    /// logical message (ends with the sync-flush marker), decompress and
    /// return the payload as a UTF-8 string; otherwise return `Ok(None)` and
    /// wait for more fragments.
    fn feed(&mut self, bytes: &[u8]) -> Result<Option<String>, DecodeError> {
        self.compressed.extend_from_slice(bytes);

        let len = self.compressed.len();

        if len < 4 || self.compressed[len - 4..] != ZLIB_SUFFIX {
            return Ok(None);
        }

        self.output.clear();

        let before = self.decompress.total_in();
        let mut offset = 0usize;

        loop {
            self.scratch.clear();

            self.decompress
                .decompress_vec(&self.compressed[offset..], &mut self.scratch, FlushDecompress::Sync)
                .map_err(DecodeError::Decompressing)?;

            offset = (self.decompress.total_in() - before) as usize;
            self.output.extend_from_slice(&self.scratch);

            let not_at_capacity = self.scratch.len() < self.scratch.capacity();

            if not_at_capacity || offset >= self.compressed.len() {
                break;
            }
        }

        self.compressed.clear();

        let text = std::str::from_utf8(&self.output).map_err(DecodeError::NotUtf8)?;

        Ok(Some(text.to_owned()))
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}
