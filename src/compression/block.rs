/// A raw (uncompressed) slice of a pipeline chunk with its index.
pub struct RawBlock {
    pub data: Vec<u8>,
    pub block_index: usize,
}

/// An independently compressed LZMA2 stream for one raw block.
pub struct CompressedBlock {
    pub stream: Vec<u8>,
    pub block_index: usize,
}

/// Splits a chunk into blocks of at most `block_size` bytes.
pub fn split_into_blocks(data: &[u8], block_size: usize) -> Vec<RawBlock> {
    data.chunks(block_size)
        .enumerate()
        .map(|(i, chunk)| RawBlock {
            data: chunk.to_vec(),
            block_index: i,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_exact() {
        let blocks = split_into_blocks(&[1, 2, 3, 4, 5, 6], 3);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].data, vec![1, 2, 3]);
        assert_eq!(blocks[0].block_index, 0);
        assert_eq!(blocks[1].data, vec![4, 5, 6]);
        assert_eq!(blocks[1].block_index, 1);
    }

    #[test]
    fn test_split_remainder() {
        let blocks = split_into_blocks(&[1, 2, 3, 4, 5], 3);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].data, vec![4, 5]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_into_blocks(&[], 10).is_empty());
    }
}
