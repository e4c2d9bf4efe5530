//! Checksummed binary envelope shared by packages and model artifacts.
//!
//! # Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("MPKG" for packages, "MPKM" for models)
//! 4       1     Version major
//! 5       1     Version minor
//! 6       2     Flags (bitfield, little-endian)
//! 8       4     Payload size (bytes, as stored)
//! 12      4     CRC32 of the stored payload
//! 16      4     Count (artifacts for packages, features for models)
//! 20      4     Reserved
//! ```
//!
//! The payload that follows is a postcard-encoded, version-tagged enum,
//! optionally zstd-compressed (flag bit 0, `compression` feature).

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Current format version (major). Readers reject anything newer.
pub const FORMAT_VERSION_MAJOR: u8 = 1;

/// Current format version (minor).
pub const FORMAT_VERSION_MINOR: u8 = 0;

/// Size of the envelope header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Minimum payload size for compression (32KB).
#[cfg(feature = "compression")]
pub const COMPRESSION_THRESHOLD: usize = 32 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Errors reading or writing an envelope.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Leading bytes are not the expected magic.
    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: String, found: String },

    /// Written by a newer major version.
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("corrupt payload: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "compression")]
    #[error("compression error: {0}")]
    Compression(std::io::Error),
}

// ============================================================================
// Flags
// ============================================================================

/// Bitfield flags for format features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags(u16);

impl FormatFlags {
    /// Payload is compressed with zstd.
    pub const COMPRESSED: u16 = 1 << 0;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }
}

// ============================================================================
// Header
// ============================================================================

/// Fixed-size envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version_major: u8,
    pub version_minor: u8,
    pub flags: FormatFlags,
    pub payload_size: u32,
    pub checksum: u32,
    pub count: u32,
}

impl Header {
    /// Header at the current version; size and checksum are filled on write.
    pub fn new(magic: [u8; 4], count: u32) -> Self {
        Self {
            magic,
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            flags: FormatFlags::empty(),
            payload_size: 0,
            checksum: 0,
            count,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[6..8].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf[16..20].copy_from_slice(&self.count.to_le_bytes());
        // 20..24 reserved
        buf
    }

    /// Parse a header, checking magic and version.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE], expected: &[u8; 4]) -> Result<Self, FormatError> {
        if &buf[0..4] != expected {
            return Err(FormatError::BadMagic {
                expected: String::from_utf8_lossy(expected).into_owned(),
                found: String::from_utf8_lossy(&buf[0..4]).into_owned(),
            });
        }

        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major > FORMAT_VERSION_MAJOR {
            return Err(FormatError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(Self {
            magic: *expected,
            version_major,
            version_minor,
            flags: FormatFlags::from_bits(u16::from_le_bytes([buf[6], buf[7]])),
            payload_size: u32_at(8),
            checksum: u32_at(12),
            count: u32_at(16),
        })
    }
}

/// CRC32 of `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

// ============================================================================
// Codec
// ============================================================================

/// Writes and reads envelopes.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    /// Compress payloads above [`COMPRESSION_THRESHOLD`].
    #[cfg(feature = "compression")]
    pub compress: bool,

    /// zstd level (1-22, default 3).
    #[cfg(feature = "compression")]
    pub compression_level: i32,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "compression")]
            compress: true,
            #[cfg(feature = "compression")]
            compression_level: 3,
        }
    }

    /// Codec that never compresses.
    #[cfg(feature = "compression")]
    pub fn without_compression() -> Self {
        Self {
            compress: false,
            compression_level: 0,
        }
    }

    /// Write header and payload.
    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
        header: &mut Header,
        payload: &[u8],
    ) -> Result<(), FormatError> {
        #[cfg(feature = "compression")]
        let (stored, compressed) = if self.compress && payload.len() >= COMPRESSION_THRESHOLD {
            let packed = zstd::encode_all(payload, self.compression_level)
                .map_err(FormatError::Compression)?;
            (packed, true)
        } else {
            (payload.to_vec(), false)
        };

        #[cfg(not(feature = "compression"))]
        let (stored, compressed) = (payload.to_vec(), false);

        header.payload_size = u32::try_from(stored.len())
            .map_err(|_| FormatError::Corrupt(format!("payload of {} bytes", stored.len())))?;
        header.checksum = compute_checksum(&stored);
        if compressed {
            header.flags.set(FormatFlags::COMPRESSED);
        }

        writer.write_all(&header.to_bytes())?;
        writer.write_all(&stored)?;
        Ok(())
    }

    /// Read and verify header and payload; the payload is returned
    /// decompressed.
    pub fn read_from<R: Read>(
        &self,
        reader: &mut R,
        magic: &[u8; 4],
    ) -> Result<(Header, Vec<u8>), FormatError> {
        let mut header_buf = [0u8; HEADER_SIZE];
        let got = read_fully(reader, &mut header_buf)?;
        if got < HEADER_SIZE {
            return Err(FormatError::Truncated {
                expected: HEADER_SIZE,
                actual: got,
            });
        }
        let header = Header::from_bytes(&header_buf, magic)?;

        let expected = header.payload_size as usize;
        let mut payload = Vec::new();
        reader
            .by_ref()
            .take(u64::from(header.payload_size))
            .read_to_end(&mut payload)?;
        if payload.len() < expected {
            return Err(FormatError::Truncated {
                expected,
                actual: payload.len(),
            });
        }

        let actual = compute_checksum(&payload);
        if actual != header.checksum {
            return Err(FormatError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        #[cfg(feature = "compression")]
        let payload = if header.flags.contains(FormatFlags::COMPRESSED) {
            zstd::decode_all(payload.as_slice()).map_err(FormatError::Compression)?
        } else {
            payload
        };

        #[cfg(not(feature = "compression"))]
        if header.flags.contains(FormatFlags::COMPRESSED) {
            return Err(FormatError::Corrupt(
                "payload is compressed but the compression feature is not enabled".into(),
            ));
        }

        Ok((header, payload))
    }

    /// Encode `payload` with postcard and wrap it in an envelope.
    pub fn encode<T: Serialize>(
        &self,
        magic: [u8; 4],
        count: u32,
        payload: &T,
    ) -> Result<Vec<u8>, FormatError> {
        let bytes = postcard::to_allocvec(payload)?;
        let mut header = Header::new(magic, count);
        let mut out = Vec::with_capacity(HEADER_SIZE + bytes.len());
        self.write_to(&mut out, &mut header, &bytes)?;
        Ok(out)
    }

    /// Unwrap an envelope and decode its postcard payload.
    pub fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        magic: &[u8; 4],
    ) -> Result<(Header, T), FormatError> {
        let mut cursor = bytes;
        let (header, payload) = self.read_from(&mut cursor, magic)?;
        let value = postcard::from_bytes(&payload)?;
        Ok((header, value))
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Whether `bytes` begins with `magic`.
#[inline]
pub fn has_magic(bytes: &[u8], magic: &[u8; 4]) -> bool {
    bytes.len() >= 4 && &bytes[..4] == magic
}

/// Whether `bytes` looks like a JSON object.
#[inline]
pub fn looks_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}
