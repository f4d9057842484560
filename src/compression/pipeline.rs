use std::fs::File;
use std::io::{Read, Write};

use log::debug;

use crate::compression::block::split_into_blocks;
use crate::compression::heuristic::{is_incompressible, sample_file_head};
use crate::compression::lzma2::{
    encode_properties_byte, strip_end_marker, Lzma2Config, LZMA2_END_MARKER,
};
use crate::compression::Coder;
use crate::error::{Result, SevenZipError};
use crate::options::{CompressionLevel, WriteOptions};
use crate::progress::{Progress, ProgressUpdate};
use crate::scanner::FileEntry;
use crate::threading::scheduler::compress_blocks_parallel;
use crate::volume::VolumeSink;

/// Inputs whose first file is larger than this get the incompressibility
/// check before the coder is committed.
const HEURISTIC_INPUT_MIN: u64 = 1 << 20;

/// Result of encoding one solid folder.
#[derive(Debug, Clone, Copy)]
pub struct FolderRecord {
    pub coder: Coder,
    /// Sum of the regular-file sizes the folder covers.
    pub unpack_size: u64,
    /// Bytes the folder occupies in the packed region.
    pub pack_size: u64,
}

/// Picks the folder coder once, before any packed byte is written.
fn select_coder(entries: &[FileEntry], options: &WriteOptions) -> Result<Coder> {
    let lzma2 = Coder::Lzma2 {
        properties_byte: encode_properties_byte(options.effective_dict_size()),
    };

    if options.level == CompressionLevel::Store {
        return Ok(Coder::Copy);
    }

    let first = entries
        .iter()
        .find(|e| e.has_stream())
        .expect("caller checked the folder is non-empty");
    if first.size > HEURISTIC_INPUT_MIN {
        let sample = sample_file_head(&first.path)
            .map_err(|e| SevenZipError::open_failed(&first.path, e))?;
        if is_incompressible(&sample) {
            debug!(
                "head of {} looks incompressible, folder falls back to copy",
                first.name
            );
            return Ok(Coder::Copy);
        }
    }

    Ok(lzma2)
}

fn build_pool(threads: u32) -> Result<Option<rayon::ThreadPool>> {
    if threads == 0 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads as usize)
        .build()
        .map(Some)
        .map_err(|e| SevenZipError::InvalidParam(format!("cannot build thread pool: {e}")))
}

struct PipelineState<'a> {
    sink: &'a mut VolumeSink,
    coder: Coder,
    config: Lzma2Config,
    pool: Option<rayon::ThreadPool>,
    chunk: Vec<u8>,
    chunk_cap: usize,
    bytes_done: u64,
    bytes_total: u64,
}

impl PipelineState<'_> {
    /// Encodes and drains the pending chunk, then reports progress.
    fn flush(
        &mut self,
        progress: &mut dyn Progress,
        file_name: &str,
        file_done: u64,
        file_total: u64,
    ) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }

        match self.coder {
            Coder::Copy => self
                .sink
                .write_all(&self.chunk)
                .map_err(SevenZipError::IoWrite)?,
            Coder::Lzma2 { .. } => {
                let blocks = split_into_blocks(&self.chunk, self.config.effective_block_size());
                let compressed =
                    compress_blocks_parallel(blocks, &self.config, self.pool.as_ref())?;
                for block in &compressed {
                    let body = strip_end_marker(&block.stream)?;
                    self.sink.write_all(body).map_err(SevenZipError::IoWrite)?;
                }
            }
        }

        self.bytes_done += self.chunk.len() as u64;
        self.chunk.clear();

        let update = ProgressUpdate {
            bytes_done: self.bytes_done,
            bytes_total: self.bytes_total,
            file_bytes_done: file_done,
            file_bytes_total: file_total,
            file_name,
        };
        if !progress.report(&update) {
            return Err(SevenZipError::Canceled);
        }
        Ok(())
    }
}

/// Streams every regular file through the chosen coder into the sink.
///
/// All files form one logical byte sequence in list order (solid folder);
/// per-file CRCs are accumulated as the bytes pass through and written back
/// into `entries`. Returns `None` when no entry contributes data, in which
/// case nothing is written.
pub fn run(
    entries: &mut [FileEntry],
    options: &WriteOptions,
    sink: &mut VolumeSink,
    progress: &mut dyn Progress,
) -> Result<Option<FolderRecord>> {
    let bytes_total: u64 = entries
        .iter()
        .filter(|e| e.has_stream())
        .map(|e| e.size)
        .sum();
    if bytes_total == 0 {
        return Ok(None);
    }

    let coder = select_coder(entries, options)?;
    let config = Lzma2Config::new(options.level.preset(), options.effective_dict_size());
    let chunk_cap = options
        .effective_chunk_size()
        .min(usize::try_from(bytes_total).unwrap_or(usize::MAX))
        .max(1);

    let mut chunk = Vec::new();
    chunk
        .try_reserve_exact(chunk_cap)
        .map_err(|_| SevenZipError::OutOfMemory(format!("{chunk_cap} byte chunk buffer")))?;

    let pack_start = sink.position();
    let mut state = PipelineState {
        sink,
        coder,
        config,
        pool: build_pool(options.threads)?,
        chunk,
        chunk_cap,
        bytes_done: 0,
        bytes_total,
    };

    let mut last_name = String::new();
    let mut last_done = 0u64;
    let mut last_total = 0u64;

    for entry in entries.iter_mut() {
        if !entry.has_stream() {
            continue;
        }

        let mut file =
            File::open(&entry.path).map_err(|e| SevenZipError::open_failed(&entry.path, e))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = entry.size;
        let mut file_done = 0u64;

        while remaining > 0 {
            if state.chunk.len() == state.chunk_cap {
                state.flush(progress, &entry.name, file_done, entry.size)?;
            }

            let space = state.chunk_cap - state.chunk.len();
            let want = remaining.min(space as u64) as usize;
            let start = state.chunk.len();
            state.chunk.resize(start + want, 0);
            let n = file
                .read(&mut state.chunk[start..])
                .map_err(SevenZipError::IoRead)?;
            state.chunk.truncate(start + n);

            if n == 0 {
                return Err(SevenZipError::IoRead(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("{} shrank while being archived", entry.path.display()),
                )));
            }

            hasher.update(&state.chunk[start..start + n]);
            remaining -= n as u64;
            file_done += n as u64;
        }

        entry.crc = hasher.finalize();
        last_name.clear();
        last_name.push_str(&entry.name);
        last_done = file_done;
        last_total = entry.size;
    }

    state.flush(progress, &last_name, last_done, last_total)?;

    if matches!(coder, Coder::Lzma2 { .. }) {
        state
            .sink
            .write_all(&[LZMA2_END_MARKER])
            .map_err(SevenZipError::IoWrite)?;
    }

    let pack_size = state.sink.position() - pack_start;
    debug!(
        "folder packed: {bytes_total} -> {pack_size} bytes ({})",
        match coder {
            Coder::Copy => "copy",
            Coder::Lzma2 { .. } => "lzma2",
        }
    );

    Ok(Some(FolderRecord {
        coder,
        unpack_size: bytes_total,
        pack_size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan_inputs;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn run_to_file(
        dir: &TempDir,
        options: &WriteOptions,
        entries: &mut [FileEntry],
    ) -> (Option<FolderRecord>, Vec<u8>) {
        let out = dir.path().join("packed.bin");
        let mut sink = VolumeSink::create(&out, 0).unwrap();
        let record = run(entries, options, &mut sink, &mut ()).unwrap();
        sink.close().unwrap();
        (record, fs::read(&out).unwrap())
    }

    #[test]
    fn test_solid_lzma2_roundtrip() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), vec![b'a'; 3000]).unwrap();
        fs::write(dir.path().join("b.txt"), vec![b'b'; 5000]).unwrap();

        let mut entries = scan_inputs(&[
            dir.path().join("a.txt"),
            dir.path().join("b.txt"),
        ])
        .unwrap();

        // Tiny chunks force several flushes through the block scheduler.
        let options = WriteOptions::new()
            .level(CompressionLevel::Fast)
            .chunk_size(1024);
        let (record, packed) = run_to_file(&dir, &options, &mut entries);
        let record = record.unwrap();

        assert!(matches!(record.coder, Coder::Lzma2 { .. }));
        assert_eq!(record.unpack_size, 8000);
        assert_eq!(record.pack_size, packed.len() as u64);

        let mut decoder = lzma_rust2::Lzma2Reader::new(
            Cursor::new(packed),
            options.effective_dict_size(),
            None,
        );
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();

        let mut expected = vec![b'a'; 3000];
        expected.extend(vec![b'b'; 5000]);
        assert_eq!(out, expected);

        assert_eq!(entries[0].crc, crc32fast::hash(&vec![b'a'; 3000]));
        assert_eq!(entries[1].crc, crc32fast::hash(&vec![b'b'; 5000]));
    }

    #[test]
    fn test_store_level_uses_copy() {
        let dir = TempDir::new().unwrap();
        let data = b"uncompressed payload".to_vec();
        fs::write(dir.path().join("raw.bin"), &data).unwrap();

        let mut entries = scan_inputs(&[dir.path().join("raw.bin")]).unwrap();
        let options = WriteOptions::new().level(CompressionLevel::Store);
        let (record, packed) = run_to_file(&dir, &options, &mut entries);
        let record = record.unwrap();

        assert_eq!(record.coder, Coder::Copy);
        assert_eq!(packed, data);
        assert_eq!(record.pack_size, data.len() as u64);
    }

    #[test]
    fn test_incompressible_fallback() {
        let dir = TempDir::new().unwrap();
        let mut state = 0x12345678DEADBEEFu64;
        let data: Vec<u8> = (0..2 << 20)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect();
        fs::write(dir.path().join("noise.bin"), &data).unwrap();

        let mut entries = scan_inputs(&[dir.path().join("noise.bin")]).unwrap();
        let options = WriteOptions::new();
        let (record, packed) = run_to_file(&dir, &options, &mut entries);
        let record = record.unwrap();

        assert_eq!(record.coder, Coder::Copy);
        assert_eq!(record.pack_size, data.len() as u64);
        assert_eq!(packed, data);
    }

    #[test]
    fn test_empty_folder() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("empty.txt"), b"").unwrap();

        let mut entries = scan_inputs(&[dir.path().join("empty.txt")]).unwrap();
        let options = WriteOptions::new();
        let (record, packed) = run_to_file(&dir, &options, &mut entries);
        assert!(record.is_none());
        assert!(packed.is_empty());
    }

    #[test]
    fn test_cancellation_at_chunk_boundary() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big.bin"), vec![0u8; 64 << 10]).unwrap();

        let mut entries = scan_inputs(&[dir.path().join("big.bin")]).unwrap();
        let options = WriteOptions::new()
            .level(CompressionLevel::Fastest)
            .chunk_size(4096);

        let out = dir.path().join("packed.bin");
        let mut sink = VolumeSink::create(&out, 0).unwrap();
        let mut cancel_after = 2;
        let mut progress = crate::progress::ProgressFn(|_: &ProgressUpdate<'_>| {
            cancel_after -= 1;
            cancel_after > 0
        });
        let err = run(&mut entries, &options, &mut sink, &mut progress).unwrap_err();
        assert!(matches!(err, SevenZipError::Canceled));
    }
}
