use std::io::Read;
use std::path::Path;

/// Bytes sampled from the head of the payload.
pub const SAMPLE_LIMIT: usize = 64 * 1024;

/// Inputs below this size always go through the compressor.
const MIN_SAMPLE: usize = 1024;

/// Frequent-byte count above which the payload is treated as incompressible.
/// Typical text keeps 60-100 byte values above the frequency threshold;
/// random or already-compressed data saturates nearly all 256.
const UNIQUE_BYTE_LIMIT: usize = 220;

/// Judges whether a payload is worth compressing by sampling its byte
/// distribution.
///
/// Counts the byte values whose frequency exceeds `sample_len / 512`; when
/// more than [`UNIQUE_BYTE_LIMIT`] values clear that bar the payload looks
/// like random or encrypted data and the folder falls back to the Copy
/// coder.
pub fn is_incompressible(sample: &[u8]) -> bool {
    if sample.len() < MIN_SAMPLE {
        return false;
    }

    let sample = &sample[..sample.len().min(SAMPLE_LIMIT)];

    let mut freq = [0usize; 256];
    for &byte in sample {
        freq[byte as usize] += 1;
    }

    let threshold = sample.len() / 512;
    let frequent = freq.iter().filter(|&&count| count > threshold).count();

    frequent > UNIQUE_BYTE_LIMIT
}

/// Reads up to [`SAMPLE_LIMIT`] bytes from the head of a file.
pub fn sample_file_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut sample = Vec::with_capacity(SAMPLE_LIMIT);
    file.take(SAMPLE_LIMIT as u64).read_to_end(&mut sample)?;
    Ok(sample)
}
