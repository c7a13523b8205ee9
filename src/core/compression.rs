//! Per-node compression
//!
//! Every node in the node region is compressed as a whole with the method
//! recorded in the container header. Decompression failure is always
//! reported as corruption.
//!
//! **Methods**:
//! - `None`: stored as-is, handy when inspecting files by hand
//! - `Deflate`: raw DEFLATE stream (default, best ratio for text entries)
//! - `Lz4`: size-prepended LZ4 block (fastest reads)
//! - `Zstd`: zstd frame at level 3

use crate::error::{DictError, Result};
use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Upper bound on a decompressed node; larger claims are treated as corrupt
pub const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Compression method for nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionMethod {
    /// No compression
    None = 0,
    /// DEFLATE (flate2, default level)
    #[default]
    Deflate = 1,
    /// LZ4 compression (fast, moderate ratio)
    Lz4 = 2,
    /// Zstd compression (slower, better ratio)
    Zstd = 3,
}

impl CompressionMethod {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Deflate),
            2 => Some(CompressionMethod::Lz4),
            3 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }
}

/// Compress data using the specified method
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        CompressionMethod::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionMethod::Zstd => Ok(zstd::bulk::compress(data, 3)?),
    }
}

/// Decompress data using the specified method
///
/// `offset` is the position of `data` in the container and is only used to
/// annotate errors.
pub fn decompress(data: &[u8], method: CompressionMethod, offset: u64) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Deflate => inflate(data, offset),
        CompressionMethod::Lz4 => {
            if data.len() < 4 {
                return Err(DictError::corrupt(offset, "lz4: missing size prefix"));
            }
            let claimed = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if claimed > MAX_DECOMPRESSED_SIZE {
                return Err(DictError::corrupt(
                    offset,
                    format!("lz4: implausible decompressed size {}", claimed),
                ));
            }
            lz4_flex::decompress_size_prepended(data)
                .map_err(|e| DictError::corrupt(offset, format!("lz4: {}", e)))
        }
        CompressionMethod::Zstd => zstd::stream::decode_all(data)
            .map_err(|e| DictError::corrupt(offset, format!("zstd: {}", e))),
    }
}

/// Inflate a raw DEFLATE stream, requiring the final block to be present and
/// every input byte to be consumed.
///
/// Output grows between calls, so decoding runs without a finishing flush;
/// only the stream-end status ends the loop.
fn inflate(data: &[u8], offset: u64) -> Result<Vec<u8>> {
    let mut decoder = Decompress::new(false);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(64));

    loop {
        if out.len() == out.capacity() {
            if out.len() >= MAX_DECOMPRESSED_SIZE {
                return Err(DictError::corrupt(offset, "deflate: output too large"));
            }
            out.reserve(out.capacity());
        }

        let consumed = decoder.total_in() as usize;
        let produced = decoder.total_out();
        let status = decoder
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| DictError::corrupt(offset, format!("deflate: {}", e)))?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let stalled =
                    decoder.total_in() as usize == consumed && decoder.total_out() == produced;
                if stalled && out.len() < out.capacity() {
                    return Err(DictError::corrupt(offset, "deflate: truncated stream"));
                }
            }
        }
    }

    if (decoder.total_in() as usize) != data.len() {
        return Err(DictError::corrupt(
            offset,
            format!(
                "deflate: {} trailing bytes after stream end",
                data.len() - decoder.total_in() as usize
            ),
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CompressionMethod; 4] = [
        CompressionMethod::None,
        CompressionMethod::Deflate,
        CompressionMethod::Lz4,
        CompressionMethod::Zstd,
    ];

    #[test]
    fn test_compression_method_conversion() {
        for method in ALL {
            assert_eq!(CompressionMethod::from_u8(method as u8), Some(method));
        }
        assert_eq!(CompressionMethod::from_u8(99), None);
        assert_eq!(CompressionMethod::default(), CompressionMethod::Deflate);
    }

    #[test]
    fn test_round_trip_all_methods() {
        let data = b"headword: definition; ".repeat(200);
        for method in ALL {
            let compressed = compress(&data, method).unwrap();
            let decompressed = decompress(&compressed, method, 0).unwrap();
            assert_eq!(decompressed, data, "{:?}", method);
            if method != CompressionMethod::None {
                assert!(compressed.len() < data.len(), "{:?}", method);
            }
        }
    }

    #[test]
    fn test_empty_input() {
        for method in ALL {
            let compressed = compress(b"", method).unwrap();
            assert_eq!(decompress(&compressed, method, 0).unwrap(), b"");
        }
    }

    #[test]
    fn test_garbage_is_corruption() {
        let garbage = vec![0xFFu8; 64];
        for method in [
            CompressionMethod::Deflate,
            CompressionMethod::Lz4,
            CompressionMethod::Zstd,
        ] {
            let err = decompress(&garbage, method, 1234).unwrap_err();
            assert!(
                matches!(err, DictError::CorruptData { offset: 1234, .. }),
                "{:?}: {}",
                method,
                err
            );
        }
    }

    #[test]
    fn test_highly_compressible_deflate() {
        // Far beyond the initial output estimate, so the buffer must grow
        let data = vec![b'a'; 1 << 20];
        let compressed = compress(&data, CompressionMethod::Deflate).unwrap();
        assert!(compressed.len() * 100 < data.len());
        assert_eq!(decompress(&compressed, CompressionMethod::Deflate, 0).unwrap(), data);

        let text = b"definition text ".repeat(4096);
        let compressed = compress(&text, CompressionMethod::Deflate).unwrap();
        assert_eq!(decompress(&compressed, CompressionMethod::Deflate, 0).unwrap(), text);
    }

    #[test]
    fn test_trailing_bytes_after_deflate_stream() {
        let mut compressed = compress(b"abc", CompressionMethod::Deflate).unwrap();
        compressed.extend_from_slice(&[0, 0, 0]);
        assert!(decompress(&compressed, CompressionMethod::Deflate, 0)
            .unwrap_err()
            .is_corruption());
    }

    #[test]
    fn test_truncated_deflate_is_corruption() {
        let data = b"abcdefghij".repeat(100);
        let compressed = compress(&data, CompressionMethod::Deflate).unwrap();
        let truncated = &compressed[..compressed.len() - 1];
        assert!(decompress(truncated, CompressionMethod::Deflate, 0)
            .unwrap_err()
            .is_corruption());
    }
}
