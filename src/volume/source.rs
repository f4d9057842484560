use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::{strip_volume_suffix, volume_path};
use crate::error::{Result, SevenZipError};

/// Read + Seek view over a split archive, presenting the volumes as one
/// logical byte range `[0, total)`.
///
/// Accepts the base path or the path of any `.NNN` volume. When
/// `<base>.001` does not exist, a plain file named exactly `base` is used.
/// Volume handles open lazily on first access.
#[derive(Debug)]
pub struct VolumeSource {
    base: PathBuf,
    /// None for a single-file archive opened directly at `base`.
    multi_volume: bool,
    handles: Vec<Option<BufReader<File>>>,
    sizes: Vec<u64>,
    total: u64,
    position: u64,
}

impl VolumeSource {
    pub fn open(path: &Path) -> Result<Self> {
        let base = strip_volume_suffix(path).unwrap_or_else(|| path.to_path_buf());

        let (multi_volume, sizes) = if volume_path(&base, 1).exists() {
            (true, Self::scan_volumes(&base)?)
        } else {
            let meta = std::fs::metadata(&base)
                .map_err(|e| SevenZipError::open_failed(&base, e))?;
            (false, vec![meta.len()])
        };

        let total = sizes.iter().sum();
        let handles = sizes.iter().map(|_| None).collect();

        Ok(Self {
            base,
            multi_volume,
            handles,
            sizes,
            total,
            position: 0,
        })
    }

    /// Total size of the logical stream.
    pub fn size(&self) -> u64 {
        self.total
    }

    pub fn volume_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    /// Stats `<base>.001`, `<base>.002`, ... until the first missing index.
    fn scan_volumes(base: &Path) -> Result<Vec<u64>> {
        let mut sizes = Vec::new();
        for num in 1.. {
            let path = volume_path(base, num);
            match std::fs::metadata(&path) {
                Ok(meta) => sizes.push(meta.len()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(SevenZipError::open_failed(path, e)),
            }
        }
        Ok(sizes)
    }

    fn locate(&self, pos: u64) -> (usize, u64) {
        let mut remaining = pos;
        for (i, &size) in self.sizes.iter().enumerate() {
            if remaining < size {
                return (i, remaining);
            }
            remaining -= size;
        }
        let last = self.sizes.len() - 1;
        (last, self.sizes[last])
    }

    fn handle(&mut self, index: usize) -> io::Result<&mut BufReader<File>> {
        if self.handles[index].is_none() {
            let path = if self.multi_volume {
                volume_path(&self.base, index as u32 + 1)
            } else {
                self.base.clone()
            };
            let file = File::open(&path).map_err(|e| {
                io::Error::new(e.kind(), format!("open volume {}: {e}", path.display()))
            })?;
            self.handles[index] = Some(BufReader::new(file));
        }
        Ok(self.handles[index].as_mut().expect("handle just opened"))
    }

    /// Reads exactly `buf.len()` bytes starting at logical offset `at`,
    /// without disturbing the streaming cursor semantics callers rely on
    /// (the cursor is left after the read range).
    pub fn read_exact_at(&mut self, buf: &mut [u8], at: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(at))?;
        self.read_exact(buf)
    }
}

impl Read for VolumeSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.total || buf.is_empty() {
            return Ok(0);
        }

        let (index, offset) = self.locate(self.position);
        let in_volume = (self.sizes[index] - offset) as usize;
        let to_read = buf.len().min(in_volume);

        let reader = self.handle(index)?;
        reader.seek(SeekFrom::Start(offset))?;
        let n = reader.read(&mut buf[..to_read])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "volume shorter than its recorded size",
            ));
        }

        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for VolumeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.total as i64 + p,
            SeekFrom::Current(p) => self.position as i64 + p,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.position = (target as u64).min(self.total);
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_volumes(dir: &Path, name: &str, chunks: &[&[u8]]) -> PathBuf {
        let base = dir.join(name);
        for (i, chunk) in chunks.iter().enumerate() {
            let mut f = File::create(volume_path(&base, i as u32 + 1)).unwrap();
            f.write_all(chunk).unwrap();
        }
        base
    }

    #[test]
    fn test_single_file() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("plain.7z");
        fs::write(&base, b"0123456789").unwrap();

        let mut src = VolumeSource::open(&base).unwrap();
        assert_eq!(src.size(), 10);
        assert_eq!(src.volume_count(), 1);

        let mut buf = [0u8; 4];
        src.read_exact_at(&mut buf, 3).unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn test_multi_volume_read_spans_boundaries() {
        let dir = TempDir::new().unwrap();
        let base = write_volumes(dir.path(), "s.7z", &[b"abcd", b"efgh", b"ij"]);

        let mut src = VolumeSource::open(&base).unwrap();
        assert_eq!(src.size(), 10);
        assert_eq!(src.volume_count(), 3);

        let mut all = Vec::new();
        src.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"abcdefghij");
    }

    #[test]
    fn test_open_by_volume_path() {
        let dir = TempDir::new().unwrap();
        let base = write_volumes(dir.path(), "s.7z", &[b"abc", b"def"]);

        let src = VolumeSource::open(&volume_path(&base, 1)).unwrap();
        assert_eq!(src.size(), 6);
    }

    #[test]
    fn test_seek_then_read() {
        let dir = TempDir::new().unwrap();
        let base = write_volumes(dir.path(), "s.7z", &[b"abcd", b"efgh"]);

        let mut src = VolumeSource::open(&base).unwrap();
        src.seek(SeekFrom::Start(5)).unwrap();
        let mut buf = [0u8; 3];
        src.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"fgh");

        src.seek(SeekFrom::End(-2)).unwrap();
        let mut buf = [0u8; 2];
        src.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"gh");
    }

    #[test]
    fn test_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = VolumeSource::open(&dir.path().join("nope.7z")).unwrap_err();
        assert!(matches!(err, SevenZipError::OpenFailed { .. }));
    }
}
