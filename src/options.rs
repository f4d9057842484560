use crate::error::{Result, SevenZipError};

/// Compression level presets, in increasing effort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// No compression: the folder uses the Copy coder.
    Store,
    Fastest,
    Fast,
    #[default]
    Normal,
    Maximum,
    Ultra,
}

impl CompressionLevel {
    /// LZMA2 preset (0-9) backing this level.
    pub fn preset(self) -> u32 {
        match self {
            CompressionLevel::Store => 0,
            CompressionLevel::Fastest => 1,
            CompressionLevel::Fast => 3,
            CompressionLevel::Normal => 6,
            CompressionLevel::Maximum => 7,
            CompressionLevel::Ultra => 9,
        }
    }

    /// Dictionary size chosen when `WriteOptions.dict_size` is 0.
    pub fn default_dict_size(self) -> u32 {
        match self {
            CompressionLevel::Store => 0,
            CompressionLevel::Fastest => 1 << 20,
            CompressionLevel::Fast => 4 << 20,
            CompressionLevel::Normal => 32 << 20,
            CompressionLevel::Maximum | CompressionLevel::Ultra => 64 << 20,
        }
    }
}

/// Default chunk size for the streaming pipeline: 64 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 << 20;

/// Smallest and largest dictionary the LZMA2 properties byte can express
/// with the sizes we accept.
const MIN_DICT_SIZE: u32 = 4 << 10;
const MAX_DICT_SIZE: u32 = 1 << 30;

/// Options for archive creation.
///
/// Zero means "auto" for every numeric field, matching the C API this crate
/// grew out of.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub level: CompressionLevel,
    /// Worker threads for block compression. 0 = rayon's global pool.
    pub threads: u32,
    /// LZMA2 dictionary size in bytes. 0 = derived from `level`.
    pub dict_size: u32,
    /// Maximum volume size in bytes. 0 = single output file.
    pub split_size: u64,
    /// Pipeline chunk size in bytes. 0 = 64 MiB.
    pub chunk_size: usize,
    /// Reserved: encrypted output is rejected until the salt layout in the
    /// header is settled. See the crypto module.
    pub password: Option<String>,
    /// Accepted for API compatibility; archives are always solid.
    pub solid: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            level: CompressionLevel::Normal,
            threads: 0,
            dict_size: 0,
            split_size: 0,
            chunk_size: 0,
            password: None,
            solid: true,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn dict_size(mut self, dict_size: u32) -> Self {
        self.dict_size = dict_size;
        self
    }

    pub fn split_size(mut self, split_size: u64) -> Self {
        self.split_size = split_size;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Effective dictionary size after applying the level default and clamps.
    pub fn effective_dict_size(&self) -> u32 {
        let dict = if self.dict_size != 0 {
            self.dict_size
        } else {
            self.level.default_dict_size()
        };
        dict.clamp(MIN_DICT_SIZE, MAX_DICT_SIZE)
    }

    /// Effective pipeline chunk size.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size != 0 {
            self.chunk_size
        } else {
            DEFAULT_CHUNK_SIZE
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.split_size != 0 && self.split_size < 1024 {
            return Err(SevenZipError::InvalidParam(format!(
                "split_size {} is below the 1 KiB minimum",
                self.split_size
            )));
        }
        if let Some(ref password) = self.password {
            if password.is_empty() {
                return Err(SevenZipError::InvalidParam("empty password".into()));
            }
            return Err(SevenZipError::Unsupported(
                "encrypted archive output".into(),
            ));
        }
        Ok(())
    }
}

/// Returns the canonical default options.
pub fn options_defaults() -> WriteOptions {
    WriteOptions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = options_defaults();
        assert_eq!(opts.level, CompressionLevel::Normal);
        assert_eq!(opts.threads, 0);
        assert_eq!(opts.split_size, 0);
        assert_eq!(opts.effective_chunk_size(), 64 << 20);
        assert_eq!(opts.effective_dict_size(), 32 << 20);
        assert!(opts.solid);
    }

    #[test]
    fn test_level_presets() {
        assert_eq!(CompressionLevel::Store.preset(), 0);
        assert_eq!(CompressionLevel::Fastest.preset(), 1);
        assert_eq!(CompressionLevel::Ultra.preset(), 9);
    }

    #[test]
    fn test_dict_override_and_clamp() {
        let opts = WriteOptions::new().dict_size(1 << 10);
        assert_eq!(opts.effective_dict_size(), 4 << 10);

        let opts = WriteOptions::new().dict_size(8 << 20);
        assert_eq!(opts.effective_dict_size(), 8 << 20);
    }

    #[test]
    fn test_store_level_dict() {
        // Store never consults the dictionary, but the accessor stays sane.
        let opts = WriteOptions::new().level(CompressionLevel::Store);
        assert_eq!(opts.effective_dict_size(), 4 << 10);
    }

    #[test]
    fn test_tiny_split_rejected() {
        let opts = WriteOptions::new().split_size(512);
        assert!(matches!(
            opts.validate(),
            Err(SevenZipError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_password_rejected_for_now() {
        let mut opts = WriteOptions::new();
        opts.password = Some("secret".into());
        assert!(matches!(
            opts.validate(),
            Err(SevenZipError::Unsupported(_))
        ));
    }
}
