use crate::compression::block::{CompressedBlock, RawBlock};
use crate::compression::lzma2::Lzma2Config;
use crate::error::Result;
use rayon::prelude::*;

/// Compresses blocks in parallel, returning them sorted by block index.
///
/// With a dedicated pool the work runs inside it; otherwise rayon's global
/// pool is used. Either way the call blocks until every block is done, so
/// the pipeline above stays synchronous.
pub fn compress_blocks_parallel(
    blocks: Vec<RawBlock>,
    config: &Lzma2Config,
    pool: Option<&rayon::ThreadPool>,
) -> Result<Vec<CompressedBlock>> {
    let compress = || {
        blocks
            .into_par_iter()
            .map(|block| crate::threading::worker::compress_raw_block(block, config))
            .collect::<Result<Vec<_>>>()
    };

    let mut results = match pool {
        Some(pool) => pool.install(compress)?,
        None => compress()?,
    };

    results.sort_by_key(|b| b.block_index);
    Ok(results)
}
