use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::debug;
use walkdir::WalkDir;

use crate::error::{Result, SevenZipError};

/// Windows-style attribute bits stored in the archive header.
pub const ATTR_READONLY: u32 = 0x01;
pub const ATTR_DIRECTORY: u32 = 0x10;
pub const ATTR_ARCHIVE: u32 = 0x20;

/// One entry of the ordered file list, from scan through encode.
///
/// The order assigned here is the order entries are compressed in and the
/// order the reader reproduces them in.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Archive-relative name, `/`-separated regardless of host OS.
    pub name: String,
    /// Source path on disk.
    pub path: PathBuf,
    pub is_directory: bool,
    /// Uncompressed size; 0 for directories.
    pub size: u64,
    /// Modification time as a Windows FILETIME, when the filesystem has one.
    pub mtime: Option<u64>,
    pub attributes: u32,
    /// CRC-32 of the uncompressed bytes, filled in by the pipeline.
    /// Undefined for directories.
    pub crc: u32,
}

impl FileEntry {
    /// True for entries that contribute bytes to the packed stream.
    pub fn has_stream(&self) -> bool {
        !self.is_directory && self.size > 0
    }
}

/// Converts a Unix timestamp to a Windows FILETIME (100 ns ticks since
/// 1601-01-01 UTC).
pub fn unix_to_filetime(unix_secs: u64, nanos: u32) -> u64 {
    (unix_secs + 11_644_473_600) * 10_000_000 + nanos as u64 / 100
}

/// Converts a FILETIME back to whole seconds and nanoseconds since the Unix
/// epoch. Times before 1970 clamp to the epoch.
pub fn filetime_to_unix(filetime: u64) -> (i64, u32) {
    let secs = (filetime / 10_000_000) as i64 - 11_644_473_600;
    let nanos = (filetime % 10_000_000) as u32 * 100;
    if secs < 0 {
        (0, 0)
    } else {
        (secs, nanos)
    }
}

fn mtime_of(meta: &Metadata) -> Option<u64> {
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(unix_to_filetime(since_epoch.as_secs(), since_epoch.subsec_nanos()))
}

fn attributes_of(meta: &Metadata) -> u32 {
    let mut attrs = if meta.is_dir() {
        ATTR_DIRECTORY
    } else {
        ATTR_ARCHIVE
    };
    if meta.permissions().readonly() {
        attrs |= ATTR_READONLY;
    }
    attrs
}

fn entry_from_meta(name: String, path: &Path, meta: &Metadata) -> FileEntry {
    FileEntry {
        name,
        path: path.to_path_buf(),
        is_directory: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        mtime: mtime_of(meta),
        attributes: attributes_of(meta),
        crc: 0,
    }
}

/// Archive-relative name for a descendant of a scanned directory: the
/// top-level directory's last segment joined with the relative path, using
/// `/` regardless of host separator.
fn descendant_name(top_name: &str, relative: &Path) -> String {
    let mut name = String::from(top_name);
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

fn last_segment(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            SevenZipError::InvalidParam(format!(
                "input path {} has no final component",
                path.display()
            ))
        })
}

/// Walks the input paths and builds the ordered file list.
///
/// Regular files produce one entry named after their last path segment.
/// Directories produce an entry for themselves followed by every descendant
/// in directory-iterator order. Symlinks, devices and sockets are skipped;
/// a failed stat on any visited path is fatal.
pub fn scan_inputs(inputs: &[PathBuf]) -> Result<Vec<FileEntry>> {
    if inputs.is_empty() {
        return Err(SevenZipError::InvalidParam("no input paths".into()));
    }

    let mut entries = Vec::new();

    for input in inputs {
        let meta = std::fs::symlink_metadata(input)
            .map_err(|e| SevenZipError::open_failed(input, e))?;

        if meta.file_type().is_symlink() {
            debug!("skipping symlink input {}", input.display());
            continue;
        }

        if meta.is_file() {
            entries.push(entry_from_meta(last_segment(input)?, input, &meta));
            continue;
        }

        if !meta.is_dir() {
            debug!("skipping special file {}", input.display());
            continue;
        }

        let top_name = last_segment(input)?;
        for walked in WalkDir::new(input).follow_links(false) {
            let walked = walked.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| input.clone());
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                SevenZipError::open_failed(path, source)
            })?;

            let file_type = walked.file_type();
            if file_type.is_symlink() || !(file_type.is_file() || file_type.is_dir()) {
                continue;
            }

            let meta = walked
                .metadata()
                .map_err(|e| {
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("stat failed"));
                    SevenZipError::open_failed(walked.path(), source)
                })?;

            let name = if walked.depth() == 0 {
                top_name.clone()
            } else {
                let relative = walked
                    .path()
                    .strip_prefix(input)
                    .expect("walkdir yields paths under its root");
                descendant_name(&top_name, relative)
            };

            entries.push(entry_from_meta(name, walked.path(), &meta));
        }
    }

    debug!("scanned {} entries", entries.len());
    Ok(entries)
}
