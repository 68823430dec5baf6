//! Tile matrix <-> text codecs.
//!
//! Two representations are supported:
//!
//! - **plain**: decimal ids separated by commas, row-major (`1,0,0,7`).
//! - **base64**: every id as a little-endian `i32`, concatenated row-major, optionally
//!   run through zlib or zstd, then base64 encoded with the standard RFC 4648 alphabet.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tile_matrix::{TileExtent, TileId, TileMatrix};

/// Text representation of a tile stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileEncoding {
    /// Comma separated decimal ids.
    #[default]
    Plain,
    /// Little-endian `i32` ids, base64 encoded.
    Base64,
}

/// Compression applied to a base64 stream before encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileCompression {
    /// Raw bytes.
    #[default]
    None,
    /// zlib (RFC 1950).
    Zlib,
    /// Zstandard.
    Zstd,
}

impl TileEncoding {
    /// Name used in map files.
    pub fn name(self) -> &'static str {
        match self {
            TileEncoding::Plain => "plain",
            TileEncoding::Base64 => "base64",
        }
    }
}

impl TileCompression {
    /// Name used in map files.
    pub fn name(self) -> &'static str {
        match self {
            TileCompression::None => "none",
            TileCompression::Zlib => "zlib",
            TileCompression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for TileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TileCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TileEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" | "csv" => Ok(TileEncoding::Plain),
            "base64" => Ok(TileEncoding::Base64),
            other => Err(other.to_owned()),
        }
    }
}

impl FromStr for TileCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(TileCompression::None),
            "zlib" => Ok(TileCompression::Zlib),
            "zstd" => Ok(TileCompression::Zstd),
            other => Err(other.to_owned()),
        }
    }
}

/// zlib level used when none is configured.
pub const DEFAULT_ZLIB_LEVEL: u32 = 6;
/// zstd level used when none is configured.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// How tile layer data is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TileFormat {
    /// Text representation.
    pub encoding: TileEncoding,
    /// Ignored for plain text.
    pub compression: TileCompression,
    /// Overrides [`DEFAULT_ZLIB_LEVEL`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zlib_level: Option<u32>,
    /// Overrides [`DEFAULT_ZSTD_LEVEL`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zstd_level: Option<i32>,
}

impl TileFormat {
    /// Plain CSV, uncompressed.
    pub const fn plain() -> Self {
        TileFormat {
            encoding: TileEncoding::Plain,
            compression: TileCompression::None,
            zlib_level: None,
            zstd_level: None,
        }
    }

    /// Base64 with the given compression and default levels.
    pub const fn base64(compression: TileCompression) -> Self {
        TileFormat {
            encoding: TileEncoding::Base64,
            compression,
            zlib_level: None,
            zstd_level: None,
        }
    }

    /// Plain text cannot carry a compressed stream; compression only applies to base64.
    pub fn effective_compression(&self) -> TileCompression {
        match self.encoding {
            TileEncoding::Plain => TileCompression::None,
            TileEncoding::Base64 => self.compression,
        }
    }
}

/// Failure to decode or encode a tile stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// zlib or zstd failed.
    #[error("compressed stream could not be processed: {0}")]
    Compression(#[from] io::Error),
    /// A CSV token is not an integer in tile id range.
    #[error("'{0}' is not a tile id")]
    InvalidToken(String),
    /// The decoded byte stream does not hold whole ids.
    #[error("byte stream length {0} is not a multiple of 4")]
    UnalignedByteCount(usize),
    /// The number of ids differs from the extent.
    #[error("expected {expected} tiles, found {actual}")]
    LengthMismatch {
        /// Cells in the declared extent.
        expected: usize,
        /// Ids actually decoded.
        actual: usize,
    },
    /// Rows times columns overflows.
    #[error("a {rows}x{cols} grid has more cells than can be addressed")]
    ExtentTooLarge {
        /// Declared rows.
        rows: usize,
        /// Declared columns.
        cols: usize,
    },
}

/// Encodes `matrix` as text in the given format.
pub fn encode_tiles(matrix: &TileMatrix, format: &TileFormat) -> Result<String, CodecError> {
    match format.encoding {
        TileEncoding::Plain => Ok(encode_csv(matrix, false)),
        TileEncoding::Base64 => {
            let bytes = tiles_to_bytes(matrix);
            let bytes = compress(&bytes, format)?;
            Ok(STANDARD.encode(bytes))
        }
    }
}

/// Decodes text produced by [`encode_tiles`] or by Tiled.
pub fn decode_tiles(
    text: &str,
    extent: TileExtent,
    format: &TileFormat,
) -> Result<TileMatrix, CodecError> {
    match format.encoding {
        TileEncoding::Plain => decode_csv(text, extent),
        TileEncoding::Base64 => {
            // Tiled pretty-prints the payload with surrounding whitespace.
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let bytes = STANDARD.decode(compact)?;
            let bytes = decompress(bytes, format.compression)?;
            tiles_from_bytes(&bytes, extent)
        }
    }
}

/// Comma separated ids. With `fold` each row ends up on its own line.
pub fn encode_csv(matrix: &TileMatrix, fold: bool) -> String {
    let separator = if fold { ",\n" } else { "," };
    matrix
        .rows()
        .map(|row| {
            row.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Parses comma separated ids, tolerating a trailing comma and line breaks.
pub fn decode_csv(text: &str, extent: TileExtent) -> Result<TileMatrix, CodecError> {
    let mut tokens: Vec<&str> = text.split(',').map(str::trim).collect();
    if tokens.last().is_some_and(|t| t.is_empty()) {
        tokens.pop();
    }

    let ids = tokens
        .into_iter()
        .map(parse_tile_id)
        .collect::<Result<Vec<_>, _>>()?;

    matrix_from_ids(&ids, extent)
}

/// Accepts the full unsigned range too, since Tiled stores flip flags in the high bits.
pub fn parse_tile_id(token: &str) -> Result<TileId, CodecError> {
    token
        .parse::<i64>()
        .ok()
        .filter(|v| *v >= i64::from(i32::MIN) && *v <= i64::from(u32::MAX))
        .map(|v| v as TileId)
        .ok_or_else(|| CodecError::InvalidToken(token.to_owned()))
}

/// Builds a matrix from exactly `rows * cols` row-major ids.
pub fn matrix_from_ids(ids: &[TileId], extent: TileExtent) -> Result<TileMatrix, CodecError> {
    let expected = extent.cell_count().ok_or(CodecError::ExtentTooLarge {
        rows: extent.rows,
        cols: extent.cols,
    })?;
    TileMatrix::from_row_major(extent, ids).ok_or(CodecError::LengthMismatch {
        expected,
        actual: ids.len(),
    })
}

/// Byte order is fixed, independent of the host.
pub fn tiles_to_bytes(matrix: &TileMatrix) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(matrix.row_count() * matrix.col_count() * 4);
    for id in matrix.iter() {
        bytes.extend_from_slice(&id.to_le_bytes());
    }
    bytes
}

/// Reads little-endian ids. The byte count must be a multiple of four.
pub fn tiles_from_bytes(bytes: &[u8], extent: TileExtent) -> Result<TileMatrix, CodecError> {
    if bytes.len() % 4 != 0 {
        return Err(CodecError::UnalignedByteCount(bytes.len()));
    }
    let ids: Vec<TileId> = bytes
        .chunks_exact(4)
        .map(|c| TileId::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    matrix_from_ids(&ids, extent)
}

fn compress(bytes: &[u8], format: &TileFormat) -> Result<Vec<u8>, CodecError> {
    match format.compression {
        TileCompression::None => Ok(bytes.to_vec()),
        TileCompression::Zlib => {
            let level = format.zlib_level.unwrap_or(DEFAULT_ZLIB_LEVEL).min(9);
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
            encoder.write_all(bytes)?;
            Ok(encoder.finish()?)
        }
        TileCompression::Zstd => {
            let level = format.zstd_level.unwrap_or(DEFAULT_ZSTD_LEVEL);
            Ok(zstd::encode_all(bytes, level)?)
        }
    }
}

fn decompress(bytes: Vec<u8>, compression: TileCompression) -> Result<Vec<u8>, CodecError> {
    match compression {
        TileCompression::None => Ok(bytes),
        TileCompression::Zlib => {
            let mut out = Vec::new();
            ZlibDecoder::new(bytes.as_slice()).read_to_end(&mut out)?;
            Ok(out)
        }
        TileCompression::Zstd => Ok(zstd::decode_all(bytes.as_slice())?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_matrix::tile_pos;

    fn sample() -> TileMatrix {
        let ids: Vec<TileId> = (0..12).map(|i| if i % 3 == 0 { 0 } else { i * 101 }).collect();
        let mut m = TileMatrix::from_row_major(TileExtent::new(3, 4), &ids).unwrap();
        m.set(tile_pos(2, 3), -7).unwrap();
        m
    }

    #[test]
    fn every_format_round_trips() {
        let m = sample();
        for encoding in [TileEncoding::Plain, TileEncoding::Base64] {
            for compression in [TileCompression::None, TileCompression::Zlib, TileCompression::Zstd] {
                let format = TileFormat {
                    encoding,
                    compression,
                    zlib_level: Some(9),
                    zstd_level: None,
                };
                let text = encode_tiles(&m, &format).unwrap();
                let back = decode_tiles(&text, m.extent(), &format).unwrap();
                assert_eq!(back, m, "{encoding}/{compression}");
            }
        }
    }

    #[test]
    fn bytes_are_little_endian() {
        let m = TileMatrix::from_row_major(TileExtent::new(1, 2), &[1, 0x0102_0304]).unwrap();
        assert_eq!(tiles_to_bytes(&m), vec![1, 0, 0, 0, 4, 3, 2, 1]);
    }

    #[test]
    fn known_base64_payload() {
        // Two tiles, ids 1 and 2, uncompressed.
        let m = decode_tiles("AQAAAAIAAAA=", TileExtent::new(1, 2), &TileFormat::base64(TileCompression::None))
            .unwrap();
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn folded_csv_decodes() {
        let m = sample();
        let text = encode_csv(&m, true);
        assert_eq!(text.lines().count(), 3);
        assert_eq!(decode_csv(&text, m.extent()).unwrap(), m);
    }

    #[test]
    fn malformed_csv_token_is_an_error() {
        let err = decode_csv("1,x,3,4", TileExtent::new(2, 2)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidToken(t) if t == "x"));

        let err = decode_csv("1,,3,4", TileExtent::new(2, 2)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidToken(_)));
    }

    #[test]
    fn wrong_tile_count_is_an_error() {
        let err = decode_csv("1,2,3", TileExtent::new(2, 2)).unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn corrupt_compressed_stream_is_an_error() {
        let format = TileFormat::base64(TileCompression::Zlib);
        let garbage = STANDARD.encode([1u8, 2, 3, 4, 5]);
        assert!(decode_tiles(&garbage, TileExtent::new(1, 1), &format).is_err());
    }

    #[test]
    fn large_unsigned_ids_wrap_into_signed_range() {
        assert_eq!(parse_tile_id("2147483649").unwrap(), i32::MIN + 1);
        assert!(parse_tile_id("4294967296").is_err());
    }

    #[test]
    fn overflowing_extent_is_an_error() {
        let extent = TileExtent::new(1 << 32, 1 << 32);
        let err = decode_csv("1", extent).unwrap_err();
        assert!(matches!(err, CodecError::ExtentTooLarge { .. }));

        let format = TileFormat::base64(TileCompression::None);
        let data = STANDARD.encode(1i32.to_le_bytes());
        let err = decode_tiles(&data, extent, &format).unwrap_err();
        assert!(matches!(err, CodecError::ExtentTooLarge { .. }));
    }
}
