use crate::compression::block::{CompressedBlock, RawBlock};
use crate::compression::lzma2::{compress_block, Lzma2Config};
use crate::error::Result;

/// Compresses a single raw block into an independent LZMA2 stream.
pub fn compress_raw_block(block: RawBlock, config: &Lzma2Config) -> Result<CompressedBlock> {
    let stream = compress_block(&block.data, config)?;
    Ok(CompressedBlock {
        stream,
        block_index: block.block_index,
    })
}
