use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::archive::header::ArchiveHeader;
use crate::archive::signature::{write_signature_header, StartHeader, SIGNATURE_HEADER_SIZE};
use crate::compression::pipeline;
use crate::error::{Result, SevenZipError};
use crate::options::WriteOptions;
use crate::progress::Progress;
use crate::scanner::scan_inputs;
use crate::volume::VolumeSink;

/// Totals reported back after a successful archive creation.
#[derive(Debug, Clone, Copy)]
pub struct CreateSummary {
    pub files: usize,
    pub unpack_size: u64,
    pub pack_size: u64,
    pub volumes: u32,
}

/// Creates a 7z archive from the input paths.
///
/// The Signature Header is written as 32 placeholder bytes, the packed
/// stream and Header Block follow, then the placeholder is patched with the
/// real tuple and the volumes are fsynced. A crash before the patch leaves a
/// file the reader rejects at the signature CRC.
pub fn create_archive(
    output: &Path,
    inputs: &[PathBuf],
    options: &WriteOptions,
    progress: &mut dyn Progress,
) -> Result<CreateSummary> {
    options.validate()?;
    if output.as_os_str().is_empty() {
        return Err(SevenZipError::InvalidParam("empty output path".into()));
    }
    if !options.solid {
        debug!("solid=false requested; archives are always solid, ignoring");
    }

    let mut entries = scan_inputs(inputs)?;

    let mut sink = VolumeSink::create(output, options.split_size)
        .map_err(|e| SevenZipError::open_failed(output, e))?;

    sink.write_all(&[0u8; 32]).map_err(SevenZipError::IoWrite)?;

    let folder = pipeline::run(&mut entries, options, &mut sink, progress)?;

    let header = ArchiveHeader {
        entries: &entries,
        folder,
        pack_position: 0,
    };
    let header_bytes = header.serialize()?;
    let header_crc = crc32fast::hash(&header_bytes);

    let header_offset = sink.position() - SIGNATURE_HEADER_SIZE;
    sink.write_all(&header_bytes).map_err(SevenZipError::IoWrite)?;

    sink.seek(SeekFrom::Start(0)).map_err(SevenZipError::IoWrite)?;
    write_signature_header(
        &mut sink,
        &StartHeader {
            next_header_offset: header_offset,
            next_header_size: header_bytes.len() as u64,
            next_header_crc: header_crc,
        },
    )
    .map_err(SevenZipError::IoWrite)?;
    sink.seek(SeekFrom::End(0)).map_err(SevenZipError::IoWrite)?;

    let volume_sizes = sink.close().map_err(SevenZipError::IoWrite)?;

    let summary = CreateSummary {
        files: entries.len(),
        unpack_size: folder.map(|f| f.unpack_size).unwrap_or(0),
        pack_size: folder.map(|f| f.pack_size).unwrap_or(0),
        volumes: volume_sizes.len() as u32,
    };
    debug!(
        "archive complete: {} entries, {} -> {} bytes, {} volume(s)",
        summary.files, summary.unpack_size, summary.pack_size, summary.volumes
    );
    Ok(summary)
}
