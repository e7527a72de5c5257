//! Streaming compression for export pipelines
//!
//! Wraps the supported codecs behind a uniform feed/finish contract so the
//! export engine can stay codec-agnostic. Compressed bytes are appended to a
//! caller-owned buffer; nothing is written to descriptors from here.

use crate::error::{ExportError, Result};
use flate2::write::GzEncoder;
use lz4_flex::frame::FrameEncoder;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use zstd::stream::write::Encoder as ZstdEncoder;

/// Supported compression kinds
///
/// `Uncompressed` is a valid kind meaning pass-through; it is also what
/// enables the reflink/sendfile fast paths in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression, bytes pass through verbatim
    #[default]
    Uncompressed,
    /// gzip container (flate2)
    Gzip,
    /// zstd frame
    Zstd,
    /// LZ4 frame format
    Lz4,
}

impl Compression {
    /// All kinds, in CLI help order
    pub const ALL: [Compression; 4] = [
        Compression::Uncompressed,
        Compression::Gzip,
        Compression::Zstd,
        Compression::Lz4,
    ];

    /// Canonical lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Compression::Uncompressed => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Lz4 => "lz4",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "uncompressed" | "raw" => Ok(Compression::Uncompressed),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zstd" | "zst" => Ok(Compression::Zstd),
            "lz4" => Ok(Compression::Lz4),
            other => Err(ExportError::UnknownCompression(other.to_string())),
        }
    }
}

enum Inner {
    Passthrough,
    Gzip(GzEncoder<Vec<u8>>),
    Zstd(ZstdEncoder<'static, Vec<u8>>),
    Lz4(FrameEncoder<Vec<u8>>),
    /// Terminal state after `finish`
    Finished,
    /// Test-only codec whose `feed` always fails
    #[cfg(test)]
    Failing,
}

/// Incremental compressor with a feed/finish contract
///
/// Each codec writes into an internal `Vec` which is drained into the
/// caller's output buffer on every call, so produced bytes are emitted in
/// the order the codec generated them.
pub struct Compressor {
    inner: Inner,
    kind: Compression,
}

impl Compressor {
    /// Create a compressor for the given kind
    pub fn new(kind: Compression) -> Result<Self> {
        let inner = match kind {
            Compression::Uncompressed => Inner::Passthrough,
            Compression::Gzip => Inner::Gzip(GzEncoder::new(
                Vec::new(),
                flate2::Compression::default(),
            )),
            Compression::Zstd => Inner::Zstd(
                ZstdEncoder::new(Vec::new(), zstd::DEFAULT_COMPRESSION_LEVEL)
                    .map_err(|e| ExportError::CompressionError(e.to_string()))?,
            ),
            Compression::Lz4 => Inner::Lz4(FrameEncoder::new(Vec::new())),
        };
        Ok(Self { inner, kind })
    }

    /// Test-only compressor whose `feed` fails mid-stream
    #[cfg(test)]
    pub(crate) fn failing() -> Self {
        Self {
            inner: Inner::Failing,
            kind: Compression::Gzip,
        }
    }

    /// The kind this compressor was created for
    pub fn kind(&self) -> Compression {
        self.kind
    }

    /// Whether this compressor passes bytes through unmodified
    pub fn is_passthrough(&self) -> bool {
        self.kind == Compression::Uncompressed
    }

    /// Compress `input`, appending any produced bytes to `out`
    ///
    /// Codecs buffer internally; a call may legitimately produce nothing.
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match &mut self.inner {
            Inner::Passthrough => {
                out.extend_from_slice(input);
                Ok(())
            }
            Inner::Gzip(enc) => {
                enc.write_all(input)
                    .map_err(|e| ExportError::CompressionError(e.to_string()))?;
                out.append(enc.get_mut());
                Ok(())
            }
            Inner::Zstd(enc) => {
                enc.write_all(input)
                    .map_err(|e| ExportError::CompressionError(e.to_string()))?;
                out.append(enc.get_mut());
                Ok(())
            }
            Inner::Lz4(enc) => {
                enc.write_all(input)
                    .map_err(|e| ExportError::CompressionError(e.to_string()))?;
                out.append(enc.get_mut());
                Ok(())
            }
            Inner::Finished => Err(ExportError::CompressionError(
                "feed after finish".to_string(),
            )),
            #[cfg(test)]
            Inner::Failing => Err(ExportError::CompressionError(
                "injected codec failure".to_string(),
            )),
        }
    }

    /// Flush the codec, appending any trailing container bytes to `out`
    ///
    /// Valid exactly once; the compressor is unusable afterwards.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match std::mem::replace(&mut self.inner, Inner::Finished) {
            Inner::Passthrough => Ok(()),
            Inner::Gzip(enc) => {
                let mut tail = enc
                    .finish()
                    .map_err(|e| ExportError::CompressionError(e.to_string()))?;
                out.append(&mut tail);
                Ok(())
            }
            Inner::Zstd(enc) => {
                let mut tail = enc
                    .finish()
                    .map_err(|e| ExportError::CompressionError(e.to_string()))?;
                out.append(&mut tail);
                Ok(())
            }
            Inner::Lz4(enc) => {
                let mut tail = enc
                    .finish()
                    .map_err(|e| ExportError::CompressionError(e.to_string()))?;
                out.append(&mut tail);
                Ok(())
            }
            Inner::Finished => Err(ExportError::CompressionError(
                "finish called twice".to_string(),
            )),
            #[cfg(test)]
            Inner::Failing => Err(ExportError::CompressionError(
                "injected codec failure".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compressor").field("kind", &self.kind).finish()
    }
}
