use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SevenZipError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("cannot open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed: {0}")]
    IoRead(#[source] io::Error),

    #[error("write failed: {0}")]
    IoWrite(#[source] io::Error),

    #[error("corrupt archive{}: {reason}", offset.map(|o| format!(" at offset {o:#x}")).unwrap_or_default())]
    CorruptArchive { offset: Option<u64>, reason: String },

    #[error("corrupt data in {name}: {reason}")]
    CorruptData { name: String, reason: String },

    #[error("wrong password or corrupt data")]
    WrongPasswordOrCorrupt,

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("operation canceled")]
    Canceled,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, SevenZipError>;

impl SevenZipError {
    pub fn corrupt(offset: impl Into<Option<u64>>, reason: impl Into<String>) -> Self {
        SevenZipError::CorruptArchive {
            offset: offset.into(),
            reason: reason.into(),
        }
    }

    pub fn open_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SevenZipError::OpenFailed {
            path: path.into(),
            source,
        }
    }

    pub fn crc_mismatch(name: impl Into<String>, expected: u32, actual: u32) -> Self {
        SevenZipError::CorruptData {
            name: name.into(),
            reason: format!("CRC expected {expected:#010x}, got {actual:#010x}"),
        }
    }

    pub fn corrupt_data(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SevenZipError::CorruptData {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Coarse classification used by the last-error context and the CLI.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SevenZipError::InvalidParam(_) => ErrorKind::InvalidParam,
            SevenZipError::OpenFailed { .. } => ErrorKind::OpenFailed,
            SevenZipError::IoRead(_) => ErrorKind::IoRead,
            SevenZipError::IoWrite(_) => ErrorKind::IoWrite,
            SevenZipError::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            SevenZipError::CorruptData { .. } => ErrorKind::CorruptData,
            SevenZipError::WrongPasswordOrCorrupt => ErrorKind::WrongPasswordOrCorrupt,
            SevenZipError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            SevenZipError::Canceled => ErrorKind::Canceled,
            SevenZipError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            SevenZipError::OpenFailed { .. } => Some("check that the path exists and is readable"),
            SevenZipError::CorruptArchive { .. } => {
                Some("the archive may be truncated; re-download or re-create it")
            }
            SevenZipError::CorruptData { .. } => Some("the packed data is damaged"),
            SevenZipError::WrongPasswordOrCorrupt => Some("verify the password"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParam,
    OpenFailed,
    IoRead,
    IoWrite,
    CorruptArchive,
    CorruptData,
    WrongPasswordOrCorrupt,
    OutOfMemory,
    Canceled,
    Unsupported,
}

/// Snapshot of the most recent error on this thread.
///
/// Cleared at the start of every public library call and filled in once when
/// the first error surfaces, so callers that only see a coarse failure (the
/// CLI, FFI shims) can still report where things went wrong.
#[derive(Debug, Clone)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub offset: Option<u64>,
    pub suggestion: Option<&'static str>,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().take());
}

pub(crate) fn record_last_error(err: &SevenZipError) {
    LAST_ERROR.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return;
        }
        let (file, offset) = match err {
            SevenZipError::OpenFailed { path, .. } => (Some(path.display().to_string()), None),
            SevenZipError::CorruptArchive { offset, .. } => (None, *offset),
            SevenZipError::CorruptData { name, .. } => (Some(name.clone()), None),
            _ => (None, None),
        };
        *slot = Some(LastError {
            kind: err.kind(),
            message: err.to_string(),
            file,
            offset,
            suggestion: err.suggestion(),
        });
    });
}

/// Returns the last error recorded on this thread, if any.
pub fn last_error() -> Option<LastError> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Runs a public entry point with the thread-local error context maintained.
pub(crate) fn with_error_context<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    clear_last_error();
    let result = f();
    if let Err(ref e) = result {
        record_last_error(e);
    }
    result
}
