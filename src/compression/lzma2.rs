use crate::error::{Result, SevenZipError};
use lzma_rust2::{Lzma2Options, Lzma2Writer};
use std::io::Write;

/// LZMA2 end-of-stream marker byte.
pub const LZMA2_END_MARKER: u8 = 0x00;

/// Encoder configuration derived from the user-facing options.
#[derive(Debug, Clone)]
pub struct Lzma2Config {
    /// Compression preset level (0-9). Higher = better compression, slower.
    pub preset: u32,
    /// Dictionary size in bytes.
    pub dict_size: u32,
    /// Block size for parallel compression within a chunk.
    /// If `None`, defaults to `2 × dict_size` (minimum 1 MiB).
    pub block_size: Option<usize>,
}

impl Lzma2Config {
    pub fn new(preset: u32, dict_size: u32) -> Self {
        Self {
            preset,
            dict_size,
            block_size: None,
        }
    }

    fn to_lzma2_options(&self) -> Lzma2Options {
        let mut opts = Lzma2Options::with_preset(self.preset);
        opts.lzma_options.dict_size = self.dict_size;
        opts
    }

    /// Effective block size for intra-chunk splitting.
    pub fn effective_block_size(&self) -> usize {
        self.block_size
            .unwrap_or_else(|| (2 * self.dict_size as usize).max(1 << 20))
    }
}

/// Encodes a dictionary size into the LZMA2 properties byte used in the 7z
/// header.
///
/// The standard encoding is a 1-bit mantissa / 5-bit exponent scheme:
///   prop=0: dict_size = (2 | 0) << (0/2 + 11) = 2 << 11 = 4096
///   prop=1: dict_size = (2 | 1) << (1/2 + 11) = 3 << 11 = 6144
///   prop=2: dict_size = (2 | 0) << (2/2 + 11) = 2 << 12 = 8192
///   ...
///   prop=40: 4 GiB (clamped)
///
/// Returns the smallest property byte whose decoded size covers `dict_size`.
pub fn encode_properties_byte(dict_size: u32) -> u8 {
    if dict_size <= 4096 {
        return 0;
    }

    for prop in 1u8..=40 {
        if decode_dict_size(prop) >= dict_size {
            return prop;
        }
    }
    40
}

/// Inverse of [`encode_properties_byte`].
pub fn decode_dict_size(prop: u8) -> u32 {
    if prop > 40 {
        return u32::MAX;
    }
    let mantissa = 2u64 | ((prop as u64) & 1);
    let exponent = (prop as u32) / 2 + 11;
    let size = mantissa << exponent;
    if size > u32::MAX as u64 {
        u32::MAX
    } else {
        size as u32
    }
}

/// Compresses one block into a self-contained LZMA2 stream (dictionary reset
/// at the start, end marker at the close).
pub fn compress_block(data: &[u8], config: &Lzma2Config) -> Result<Vec<u8>> {
    let options = config.to_lzma2_options();
    let mut writer = Lzma2Writer::new(Vec::new(), options);
    writer
        .write_all(data)
        .map_err(|e| SevenZipError::IoWrite(std::io::Error::other(format!(
            "LZMA2 write failed: {e}"
        ))))?;
    writer
        .finish()
        .map_err(|e| SevenZipError::IoWrite(std::io::Error::other(format!(
            "LZMA2 finish failed: {e}"
        ))))
}

/// Strips the trailing end-of-stream marker from an independently compressed
/// LZMA2 stream so further chunks can follow it.
///
/// The streams produced by [`compress_block`] always end with the `0x00`
/// marker; concatenating the stripped bodies and appending a single final
/// marker yields one valid LZMA2 stream whose output is the concatenation of
/// the blocks.
pub fn strip_end_marker(stream: &[u8]) -> Result<&[u8]> {
    match stream.last() {
        Some(&LZMA2_END_MARKER) => Ok(&stream[..stream.len() - 1]),
        _ => Err(SevenZipError::corrupt(
            None,
            "LZMA2 block missing end-of-stream marker",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_properties_byte_small() {
        assert_eq!(encode_properties_byte(4096), 0);
        assert_eq!(encode_properties_byte(1024), 0);
    }

    #[test]
    fn test_properties_byte_known() {
        assert_eq!(decode_dict_size(2), 8192);
        assert_eq!(encode_properties_byte(8192), 2);

        // 2 << (24/2 + 11) = 16 MiB
        assert_eq!(decode_dict_size(24), 16 << 20);
        assert_eq!(encode_properties_byte(16 << 20), 24);

        // 32 MiB, the Normal-level default dictionary
        assert_eq!(decode_dict_size(26), 32 << 20);
        assert_eq!(encode_properties_byte(32 << 20), 26);
    }

    #[test]
    fn test_properties_byte_roundtrip() {
        for prop in 0..=40u8 {
            let size = decode_dict_size(prop);
            assert_eq!(
                encode_properties_byte(size),
                prop,
                "roundtrip failed for prop={prop}, size={size}"
            );
        }
    }

    #[test]
    fn test_compress_block_ends_with_marker() {
        let config = Lzma2Config::new(3, 1 << 20);
        let stream = compress_block(b"hello, archive", &config).unwrap();
        assert_eq!(*stream.last().unwrap(), LZMA2_END_MARKER);
    }

    #[test]
    fn test_strip_end_marker() {
        let config = Lzma2Config::new(3, 1 << 20);
        let stream = compress_block(b"payload", &config).unwrap();
        let body = strip_end_marker(&stream).unwrap();
        assert_eq!(body.len(), stream.len() - 1);

        assert!(strip_end_marker(&[0xFF]).is_err());
        assert!(strip_end_marker(&[]).is_err());
    }

    #[test]
    fn test_concatenated_blocks_decode_as_one_stream() {
        let config = Lzma2Config::new(3, 1 << 20);
        let a = compress_block(b"first block ", &config).unwrap();
        let b = compress_block(b"second block", &config).unwrap();

        let mut joined = Vec::new();
        joined.extend_from_slice(strip_end_marker(&a).unwrap());
        joined.extend_from_slice(strip_end_marker(&b).unwrap());
        joined.push(LZMA2_END_MARKER);

        let mut decoder =
            lzma_rust2::Lzma2Reader::new(std::io::Cursor::new(joined), config.dict_size, None);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first block second block");
    }

    #[test]
    fn test_effective_block_size() {
        let config = Lzma2Config::new(6, 32 << 20);
        assert_eq!(config.effective_block_size(), 64 << 20);

        let tiny = Lzma2Config::new(1, 4096);
        assert!(tiny.effective_block_size() >= 1 << 20);

        let explicit = Lzma2Config {
            preset: 6,
            dict_size: 1 << 20,
            block_size: Some(16 << 10),
        };
        assert_eq!(explicit.effective_block_size(), 16 << 10);
    }
}
