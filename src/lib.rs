#![forbid(unsafe_code)]

pub mod archive;
pub mod compression;
pub mod crypto;
pub mod error;
pub mod io;
pub mod options;
pub mod progress;
pub mod scanner;
pub mod threading;
pub mod volume;

use std::path::{Path, PathBuf};

use log::debug;

pub use archive::{Archive, ArchiveEntry, CreateSummary};
pub use error::{last_error, ErrorKind, LastError, Result, SevenZipError};
pub use options::{options_defaults, CompressionLevel, WriteOptions};
pub use progress::{Progress, ProgressFn, ProgressUpdate};

/// Creates a 7z archive at `output` from the given input paths.
///
/// With `split_size` set in the options the archive is written as
/// `output.001`, `output.002`, ... volumes instead of a single file.
pub fn create_archive(
    output: &Path,
    inputs: &[PathBuf],
    options: &WriteOptions,
    progress: &mut dyn Progress,
) -> Result<CreateSummary> {
    error::with_error_context(|| archive::create_archive(output, inputs, options, progress))
}

/// Extracts every entry of the archive into `output_dir`.
pub fn extract_archive(
    input: &Path,
    output_dir: &Path,
    password: Option<&str>,
    progress: &mut dyn Progress,
) -> Result<()> {
    error::with_error_context(|| {
        check_password(password)?;
        let mut archive = Archive::open(input)?;
        archive.extract(output_dir, progress)
    })
}

/// Lists the archive's entries in writer order without extracting.
pub fn list_archive(input: &Path, password: Option<&str>) -> Result<Vec<ArchiveEntry>> {
    error::with_error_context(|| {
        check_password(password)?;
        Ok(Archive::open(input)?.into_entries())
    })
}

/// Runs the extract loop discarding output, verifying every stored CRC.
pub fn test_archive(
    input: &Path,
    password: Option<&str>,
    progress: &mut dyn Progress,
) -> Result<()> {
    error::with_error_context(|| {
        check_password(password)?;
        let mut archive = Archive::open(input)?;
        archive.test(progress)
    })
}

/// Archives this crate writes are never encrypted, so a password is only
/// sanity-checked and otherwise ignored, the way 7-Zip ignores `-p` for
/// plain archives.
fn check_password(password: Option<&str>) -> Result<()> {
    match password {
        Some("") => Err(SevenZipError::InvalidParam("empty password".into())),
        Some(_) => {
            debug!("password supplied for an unencrypted archive, ignoring");
            Ok(())
        }
        None => Ok(()),
    }
}
