pub mod sink;
pub mod source;

pub use sink::VolumeSink;
pub use source::VolumeSource;

use std::path::{Path, PathBuf};

/// Largest supported volume index; `.999` is the last legal suffix.
pub const MAX_VOLUMES: u32 = 999;

/// Returns the path of volume `num` (1-indexed) for a base archive path.
pub fn volume_path(base: &Path, num: u32) -> PathBuf {
    PathBuf::from(format!("{}.{:03}", base.display(), num))
}

/// If `path` ends in a `.NNN` volume suffix, returns the base path it was
/// derived from. `archive.7z.002` -> `archive.7z`.
pub fn strip_volume_suffix(path: &Path) -> Option<PathBuf> {
    let s = path.to_string_lossy();
    let (base, suffix) = s.rsplit_once('.')?;
    if suffix.len() == 3 && suffix.bytes().all(|b| b.is_ascii_digit()) && !base.is_empty() {
        Some(PathBuf::from(base))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_path() {
        assert_eq!(
            volume_path(Path::new("a.7z"), 1),
            PathBuf::from("a.7z.001")
        );
        assert_eq!(
            volume_path(Path::new("a.7z"), 42),
            PathBuf::from("a.7z.042")
        );
        assert_eq!(
            volume_path(Path::new("a.7z"), 999),
            PathBuf::from("a.7z.999")
        );
    }

    #[test]
    fn test_strip_volume_suffix() {
        assert_eq!(
            strip_volume_suffix(Path::new("a.7z.001")),
            Some(PathBuf::from("a.7z"))
        );
        assert_eq!(
            strip_volume_suffix(Path::new("dir/a.7z.123")),
            Some(PathBuf::from("dir/a.7z"))
        );
        assert_eq!(strip_volume_suffix(Path::new("a.7z")), None);
        assert_eq!(strip_volume_suffix(Path::new("a.7z.12")), None);
        assert_eq!(strip_volume_suffix(Path::new("a.7z.abcd")), None);
    }
}
