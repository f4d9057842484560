use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{volume_path, MAX_VOLUMES};

/// Write + Seek sink that spreads one logical byte stream over fixed-size
/// volume files.
///
/// With `max_size == 0` the sink is a single file named exactly `base`.
/// Otherwise volumes are `base.001`, `base.002`, ... each exactly `max_size`
/// bytes except the last. Because every volume but the last is full, a
/// logical offset maps to `(offset / max_size, offset % max_size)` and
/// seeking back to patch the Signature Header needs no bookkeeping beyond
/// the cursor.
///
/// Volumes are created lazily as the cursor crosses their start. Handles
/// stay open until [`VolumeSink::close`], which flushes and fsyncs them in
/// ascending index order.
pub struct VolumeSink {
    base: PathBuf,
    max_size: u64,
    volumes: Vec<File>,
    /// Logical cursor for the next write.
    position: u64,
    /// High-water mark of bytes ever written.
    total: u64,
}

impl VolumeSink {
    pub fn create(base: &Path, max_size: u64) -> io::Result<Self> {
        let mut sink = Self {
            base: base.to_path_buf(),
            max_size,
            volumes: Vec::new(),
            position: 0,
            total: 0,
        };
        // Create the first file eagerly so an unwritable output fails fast.
        sink.open_volume(0)?;
        Ok(sink)
    }

    /// Current logical position of the write cursor.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total bytes in the logical stream.
    pub fn total_written(&self) -> u64 {
        self.total
    }

    /// Number of volumes created so far.
    pub fn volume_count(&self) -> u32 {
        self.volumes.len() as u32
    }

    fn path_for(&self, index: usize) -> PathBuf {
        if self.max_size == 0 {
            self.base.clone()
        } else {
            volume_path(&self.base, index as u32 + 1)
        }
    }

    fn open_volume(&mut self, index: usize) -> io::Result<()> {
        debug_assert_eq!(index, self.volumes.len());
        if self.max_size != 0 && index as u32 >= MAX_VOLUMES {
            return Err(io::Error::other(format!(
                "archive would exceed {MAX_VOLUMES} volumes"
            )));
        }
        let path = self.path_for(index);
        let file = File::create(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("create volume {}: {e}", path.display()))
        })?;
        self.volumes.push(file);
        Ok(())
    }

    /// Maps a logical offset to `(volume_index, offset_in_volume)`.
    fn locate(&self, pos: u64) -> (usize, u64) {
        if self.max_size == 0 {
            (0, pos)
        } else {
            ((pos / self.max_size) as usize, pos % self.max_size)
        }
    }

    /// Flushes and fsyncs every volume in ascending order, consuming the
    /// sink. Returns the size of each volume.
    pub fn close(mut self) -> io::Result<Vec<u64>> {
        let count = self.volumes.len();
        let mut sizes = Vec::with_capacity(count);
        for (index, mut file) in self.volumes.drain(..).enumerate() {
            file.flush()?;
            file.sync_all()?;
            let size = if self.max_size == 0 {
                self.total
            } else {
                let start = index as u64 * self.max_size;
                (self.total - start).min(self.max_size)
            };
            sizes.push(size);
        }
        Ok(sizes)
    }
}

impl Write for VolumeSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (index, offset) = self.locate(self.position);
        if index == self.volumes.len() {
            self.open_volume(index)?;
        }

        let room = if self.max_size == 0 {
            buf.len()
        } else {
            (self.max_size - offset) as usize
        };
        let to_write = buf.len().min(room);

        let file = &mut self.volumes[index];
        file.seek(SeekFrom::Start(offset))?;
        let n = file.write(&buf[..to_write])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "volume refused write",
            ));
        }

        self.position += n as u64;
        self.total = self.total.max(self.position);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        for file in &mut self.volumes {
            file.flush()?;
        }
        Ok(())
    }
}

impl Seek for VolumeSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.total as i64 + p,
            SeekFrom::Current(p) => self.position as i64 + p,
        };
        if target < 0 || target as u64 > self.total {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside written range",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_single_file_mode() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out.7z");
        let mut sink = VolumeSink::create(&base, 0).unwrap();
        sink.write_all(b"hello world").unwrap();
        let sizes = sink.close().unwrap();
        assert_eq!(sizes, vec![11]);
        assert_eq!(fs::read(&base).unwrap(), b"hello world");
    }

    #[test]
    fn test_split_across_volumes() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out.7z");
        let mut sink = VolumeSink::create(&base, 100).unwrap();
        sink.write_all(&[7u8; 250]).unwrap();
        let sizes = sink.close().unwrap();
        assert_eq!(sizes, vec![100, 100, 50]);

        for i in 1..=3u32 {
            let path = volume_path(&base, i);
            assert_eq!(
                fs::metadata(&path).unwrap().len(),
                sizes[(i - 1) as usize],
                "size mismatch for {}",
                path.display()
            );
        }
    }

    #[test]
    fn test_concatenation_matches_logical_stream() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out.7z");
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut sink = VolumeSink::create(&base, 300).unwrap();
        // Uneven write sizes to cross boundaries mid-call.
        for chunk in data.chunks(77) {
            sink.write_all(chunk).unwrap();
        }
        sink.close().unwrap();

        let mut joined = Vec::new();
        for i in 1..=4u32 {
            joined.extend(fs::read(volume_path(&base, i)).unwrap());
        }
        assert_eq!(joined, data);
    }

    #[test]
    fn test_patch_first_volume() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out.7z");
        let mut sink = VolumeSink::create(&base, 64).unwrap();
        sink.write_all(&[0u8; 150]).unwrap();

        sink.seek(SeekFrom::Start(0)).unwrap();
        sink.write_all(&[0xAB; 32]).unwrap();
        assert_eq!(sink.position(), 32);

        sink.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(sink.position(), 150);
        sink.close().unwrap();

        let first = fs::read(volume_path(&base, 1)).unwrap();
        assert_eq!(&first[..32], &[0xAB; 32]);
        assert_eq!(&first[32..], &[0u8; 32]);
    }

    #[test]
    fn test_seek_past_end_rejected() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out.7z");
        let mut sink = VolumeSink::create(&base, 0).unwrap();
        sink.write_all(b"abc").unwrap();
        assert!(sink.seek(SeekFrom::Start(10)).is_err());
    }
}
