use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use log::debug;

use crate::archive::parse::{parse_header_block, ArchiveEntry, ParsedArchive};
use crate::archive::signature::{parse_signature_header, SIGNATURE_HEADER_SIZE};
use crate::compression::lzma2::decode_dict_size;
use crate::compression::Coder;
use crate::error::{Result, SevenZipError};
use crate::progress::{Progress, ProgressUpdate};
use crate::scanner::filetime_to_unix;
use crate::volume::VolumeSource;

/// Headers claiming to be larger than this are refused before allocation.
const MAX_HEADER_SIZE: u64 = 256 << 20;

/// Read/write granularity of the extract loop.
const COPY_UNIT: usize = 64 << 10;

/// An opened archive: verified Signature Header, loaded and parsed Header
/// Block, ready to list or extract.
pub struct Archive {
    source: VolumeSource,
    parsed: ParsedArchive,
}

impl Archive {
    /// Opens an archive, accepting a base path, a `.001` volume path, or a
    /// single-file archive.
    pub fn open(path: &Path) -> Result<Self> {
        let mut source = VolumeSource::open(path)?;

        // VERIFY_SIG
        if source.size() < SIGNATURE_HEADER_SIZE {
            return Err(SevenZipError::corrupt(
                0u64,
                "file shorter than the signature header",
            ));
        }
        let mut sig = [0u8; 32];
        source
            .read_exact_at(&mut sig, 0)
            .map_err(SevenZipError::IoRead)?;
        let start = parse_signature_header(&sig)?;

        // LOAD_HEADER
        if start.next_header_size == 0 {
            return Err(SevenZipError::corrupt(20u64, "archive has no header block"));
        }
        if start.next_header_size > MAX_HEADER_SIZE {
            return Err(SevenZipError::OutOfMemory(format!(
                "header block claims {} bytes",
                start.next_header_size
            )));
        }
        let header_pos = SIGNATURE_HEADER_SIZE
            .checked_add(start.next_header_offset)
            .ok_or_else(|| SevenZipError::corrupt(12u64, "next header offset overflows"))?;
        if header_pos
            .checked_add(start.next_header_size)
            .map_or(true, |end| end > source.size())
        {
            return Err(SevenZipError::corrupt(
                header_pos,
                "header block extends past end of archive",
            ));
        }

        let mut header_bytes = vec![0u8; start.next_header_size as usize];
        source
            .read_exact_at(&mut header_bytes, header_pos)
            .map_err(SevenZipError::IoRead)?;

        let actual_crc = crc32fast::hash(&header_bytes);
        if actual_crc != start.next_header_crc {
            return Err(SevenZipError::corrupt(
                header_pos,
                format!(
                    "header block CRC mismatch: stored {:#010x}, computed {actual_crc:#010x}",
                    start.next_header_crc
                ),
            ));
        }

        // PARSE_HEADER
        let parsed = parse_header_block(&header_bytes, header_pos)?;

        if parsed.folder.is_some() {
            let pack_end = parsed
                .pack_position
                .checked_add(parsed.pack_size)
                .and_then(|end| end.checked_add(SIGNATURE_HEADER_SIZE))
                .ok_or_else(|| SevenZipError::corrupt(header_pos, "packed region overflows"))?;
            if pack_end > header_pos {
                return Err(SevenZipError::corrupt(
                    header_pos,
                    "packed region overlaps the header block",
                ));
            }
        }

        debug!(
            "opened archive: {} entries, {} packed bytes, {} volume(s)",
            parsed.entries.len(),
            parsed.pack_size,
            source.volume_count()
        );

        Ok(Self { source, parsed })
    }

    /// Entries in writer order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.parsed.entries
    }

    /// The folder's coder, when the archive carries packed data.
    pub fn coder(&self) -> Option<Coder> {
        self.parsed.folder.map(|f| f.coder)
    }

    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.parsed.entries
    }

    /// Extracts everything under `output_dir`, creating it as needed.
    pub fn extract(&mut self, output_dir: &Path, progress: &mut dyn Progress) -> Result<()> {
        fs::create_dir_all(output_dir)
            .map_err(|e| SevenZipError::open_failed(output_dir, e))?;
        self.process(Some(output_dir), progress)
    }

    /// Runs the extract loop discarding output, verifying every CRC.
    pub fn test(&mut self, progress: &mut dyn Progress) -> Result<()> {
        self.process(None, progress)
    }

    fn process(&mut self, output_dir: Option<&Path>, progress: &mut dyn Progress) -> Result<()> {
        let parsed = &self.parsed;
        let source = &mut self.source;

        let bytes_total: u64 = parsed.entries.iter().map(|e| e.size).sum();
        let mut bytes_done = 0u64;

        // The packed stream has no file boundaries; one decoder instance
        // runs the whole loop and each entry takes the next `size` bytes.
        let mut decoder: Option<Box<dyn Read + '_>> = match parsed.folder {
            Some(folder) => {
                let pack_start = SIGNATURE_HEADER_SIZE + parsed.pack_position;
                source
                    .seek(SeekFrom::Start(pack_start))
                    .map_err(SevenZipError::IoRead)?;
                let limited = (&mut *source).take(parsed.pack_size);
                match folder.coder {
                    Coder::Copy => Some(Box::new(limited)),
                    Coder::Lzma2 { properties_byte } => {
                        if properties_byte > 40 {
                            return Err(SevenZipError::corrupt(
                                None,
                                format!("invalid LZMA2 dictionary property {properties_byte}"),
                            ));
                        }
                        let dict_size = decode_dict_size(properties_byte);
                        Some(Box::new(lzma_rust2::Lzma2Reader::new(
                            limited, dict_size, None,
                        )))
                    }
                }
            }
            None => None,
        };

        let mut buf = vec![0u8; COPY_UNIT];

        for entry in &parsed.entries {
            let dest = match output_dir {
                Some(dir) => Some(safe_join(dir, &entry.name)?),
                None => None,
            };

            if entry.is_directory {
                if let Some(path) = &dest {
                    fs::create_dir_all(path)
                        .map_err(|e| SevenZipError::open_failed(path.as_path(), e))?;
                }
                continue;
            }

            if let Some(path) = &dest {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| SevenZipError::open_failed(parent, e))?;
                }
            }

            let mut out = match &dest {
                Some(path) => Some(
                    File::create(path)
                        .map_err(|e| SevenZipError::open_failed(path.as_path(), e))?,
                ),
                None => None,
            };

            if entry.size > 0 {
                let decoder = decoder.as_mut().ok_or_else(|| {
                    SevenZipError::corrupt(None, "entry references data but archive has none")
                })?;

                let mut hasher = crc32fast::Hasher::new();
                let mut remaining = entry.size;
                let mut file_done = 0u64;

                while remaining > 0 {
                    let want = remaining.min(COPY_UNIT as u64) as usize;
                    let n = decoder.read(&mut buf[..want]).map_err(|e| {
                        SevenZipError::corrupt_data(&entry.name, format!("decoder failed: {e}"))
                    })?;
                    if n == 0 {
                        return Err(SevenZipError::corrupt_data(
                            &entry.name,
                            "packed stream ended early",
                        ));
                    }

                    hasher.update(&buf[..n]);
                    if let Some(file) = out.as_mut() {
                        file.write_all(&buf[..n]).map_err(SevenZipError::IoWrite)?;
                    }

                    remaining -= n as u64;
                    file_done += n as u64;
                    bytes_done += n as u64;

                    let update = ProgressUpdate {
                        bytes_done,
                        bytes_total,
                        file_bytes_done: file_done,
                        file_bytes_total: entry.size,
                        file_name: &entry.name,
                    };
                    if !progress.report(&update) {
                        return Err(SevenZipError::Canceled);
                    }
                }

                let actual = hasher.finalize();
                if let Some(expected) = entry.crc {
                    if expected != actual {
                        return Err(SevenZipError::crc_mismatch(&entry.name, expected, actual));
                    }
                }
            }

            drop(out);
            if let (Some(path), Some(mtime)) = (&dest, entry.mtime) {
                let (secs, nanos) = filetime_to_unix(mtime);
                filetime::set_file_mtime(path, FileTime::from_unix_time(secs, nanos))
                    .map_err(SevenZipError::IoWrite)?;
            }
        }

        Ok(())
    }
}

/// Joins an archive-relative name onto the output root, refusing names that
/// would escape it.
fn safe_join(root: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(SevenZipError::corrupt(None, "empty entry name"));
    }

    let mut path = root.to_path_buf();
    for part in name.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\0') {
            return Err(SevenZipError::corrupt(
                None,
                format!("unsafe entry path: {name}"),
            ));
        }
        path.push(part);
    }
    Ok(path)
}
