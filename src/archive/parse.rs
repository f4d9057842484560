use std::io::{Cursor, Read};

use crate::archive::header::{
    K_ATTRIBUTES, K_CODERS_UNPACK_SIZE, K_CRC, K_EMPTY_FILE, K_EMPTY_STREAM, K_ENCODED_HEADER,
    K_END, K_FILES_INFO, K_FOLDER, K_HEADER, K_MAIN_STREAMS_INFO, K_M_TIME, K_NAME,
    K_NUM_UNPACK_STREAM, K_PACK_INFO, K_SIZE, K_SUB_STREAMS_INFO, K_UNPACK_INFO,
};
use crate::compression::{Coder, COPY_METHOD_ID, LZMA2_METHOD_ID};
use crate::error::{Result, SevenZipError};
use crate::io::reader::{
    read_all_or_bits, read_bool_vector, read_bytes, read_u32_le, read_u64_le, read_u8,
    read_utf16le_string,
};
use crate::io::varint::read_number;

/// Ceiling on the entry count a header may claim before we refuse to
/// allocate for it.
const MAX_ENTRIES: u64 = 1 << 24;

/// One entry of a parsed archive listing, in writer order.
#[derive(Debug, Clone, Default)]
pub struct ArchiveEntry {
    pub name: String,
    pub is_directory: bool,
    /// Uncompressed size; 0 for directories and empty files.
    pub size: u64,
    /// Modification time as a Windows FILETIME.
    pub mtime: Option<u64>,
    pub attributes: Option<u32>,
    /// CRC-32 of the uncompressed bytes, when the header recorded one.
    pub crc: Option<u32>,
    /// True when the entry owns a slice of the packed stream.
    pub has_stream: bool,
}

/// The single folder of the supported archive subset.
#[derive(Debug, Clone, Copy)]
pub struct ParsedFolder {
    pub coder: Coder,
    pub unpack_size: u64,
    /// Folder-level digest, present when SubStreamsInfo is absent.
    pub crc: Option<u32>,
}

/// In-memory form of a parsed Header Block.
#[derive(Debug, Clone, Default)]
pub struct ParsedArchive {
    pub pack_position: u64,
    pub pack_size: u64,
    pub folder: Option<ParsedFolder>,
    /// Per-substream sizes, one per streamed entry.
    pub substream_sizes: Vec<u64>,
    pub substream_crcs: Vec<Option<u32>>,
    pub entries: Vec<ArchiveEntry>,
}

impl ParsedArchive {
    /// Total bytes the folder decodes to.
    pub fn unpack_total(&self) -> u64 {
        self.folder.map(|f| f.unpack_size).unwrap_or(0)
    }
}

/// Parser state: a cursor over the header bytes plus the absolute file
/// offset the block starts at, so errors can name real positions.
struct HeaderParser<'a> {
    cursor: Cursor<&'a [u8]>,
    base_offset: u64,
}

impl<'a> HeaderParser<'a> {
    fn new(bytes: &'a [u8], base_offset: u64) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            base_offset,
        }
    }

    fn offset(&self) -> u64 {
        self.base_offset + self.cursor.position()
    }

    fn corrupt(&self, reason: impl Into<String>) -> SevenZipError {
        SevenZipError::corrupt(self.offset(), reason.into())
    }

    fn remaining(&self) -> u64 {
        self.cursor.get_ref().len() as u64 - self.cursor.position()
    }

    fn byte(&mut self) -> Result<u8> {
        read_u8(&mut self.cursor)
            .map_err(|_| SevenZipError::corrupt(self.offset(), "truncated header"))
    }

    fn number(&mut self) -> Result<u64> {
        read_number(&mut self.cursor)
            .map_err(|_| SevenZipError::corrupt(self.offset(), "truncated number"))
    }

    fn parse(mut self) -> Result<ParsedArchive> {
        match self.byte()? {
            K_HEADER => {}
            K_ENCODED_HEADER => {
                return Err(SevenZipError::Unsupported(
                    "encoded (compressed or encrypted) header".into(),
                ))
            }
            other => {
                return Err(self.corrupt(format!("expected header marker, got {other:#04x}")))
            }
        }

        let mut archive = ParsedArchive::default();

        loop {
            match self.byte()? {
                K_END => break,
                K_MAIN_STREAMS_INFO => self.parse_streams_info(&mut archive)?,
                K_FILES_INFO => self.parse_files_info(&mut archive)?,
                other => {
                    return Err(self.corrupt(format!("unexpected property {other:#04x} in header")))
                }
            }
        }

        self.finish_substreams(&mut archive)?;
        self.assign_entry_streams(&mut archive)?;
        Ok(archive)
    }

    fn parse_streams_info(&mut self, archive: &mut ParsedArchive) -> Result<()> {
        loop {
            match self.byte()? {
                K_END => return Ok(()),
                K_PACK_INFO => self.parse_pack_info(archive)?,
                K_UNPACK_INFO => self.parse_unpack_info(archive)?,
                K_SUB_STREAMS_INFO => self.parse_sub_streams_info(archive)?,
                other => {
                    return Err(
                        self.corrupt(format!("unexpected property {other:#04x} in streams info"))
                    )
                }
            }
        }
    }

    fn parse_pack_info(&mut self, archive: &mut ParsedArchive) -> Result<()> {
        archive.pack_position = self.number()?;
        let num_streams = self.number()?;
        if num_streams != 1 {
            return Err(SevenZipError::Unsupported(format!(
                "{num_streams} packed streams (expected 1)"
            )));
        }

        loop {
            match self.byte()? {
                K_END => return Ok(()),
                K_SIZE => archive.pack_size = self.number()?,
                K_CRC => {
                    // Pack-stream digests are legal but unused here.
                    let defined = read_all_or_bits(&mut self.cursor, 1)
                        .map_err(|_| self.corrupt("truncated pack digests"))?;
                    for &d in &defined {
                        if d {
                            read_u32_le(&mut self.cursor)
                                .map_err(|_| self.corrupt("truncated pack digests"))?;
                        }
                    }
                }
                other => {
                    return Err(
                        self.corrupt(format!("unexpected property {other:#04x} in pack info"))
                    )
                }
            }
        }
    }

    fn parse_unpack_info(&mut self, archive: &mut ParsedArchive) -> Result<()> {
        if self.byte()? != K_FOLDER {
            return Err(self.corrupt("unpack info does not start with the folder group"));
        }
        let num_folders = self.number()?;
        if num_folders != 1 {
            return Err(SevenZipError::Unsupported(format!(
                "{num_folders} folders (expected 1)"
            )));
        }
        if self.byte()? != 0 {
            return Err(SevenZipError::Unsupported("external folder data".into()));
        }

        let coder = self.parse_coder_spec()?;

        if self.byte()? != K_CODERS_UNPACK_SIZE {
            return Err(self.corrupt("missing coder unpack sizes"));
        }
        let unpack_size = self.number()?;

        let mut folder = ParsedFolder {
            coder,
            unpack_size,
            crc: None,
        };

        loop {
            match self.byte()? {
                K_END => break,
                K_CRC => {
                    let defined = read_all_or_bits(&mut self.cursor, 1)
                        .map_err(|_| self.corrupt("truncated folder digests"))?;
                    if defined[0] {
                        let crc = read_u32_le(&mut self.cursor)
                            .map_err(|_| self.corrupt("truncated folder digests"))?;
                        folder.crc = Some(crc);
                    }
                }
                other => {
                    return Err(
                        self.corrupt(format!("unexpected property {other:#04x} in unpack info"))
                    )
                }
            }
        }

        archive.folder = Some(folder);
        Ok(())
    }

    fn parse_coder_spec(&mut self) -> Result<Coder> {
        let num_coders = self.number()?;
        if num_coders != 1 {
            return Err(SevenZipError::Unsupported(format!(
                "{num_coders} coders in folder (expected 1)"
            )));
        }

        let flags = self.byte()?;
        let id_len = (flags & 0x0F) as usize;
        if flags & 0x10 != 0 {
            return Err(SevenZipError::Unsupported(
                "complex coder (multiple streams)".into(),
            ));
        }
        let has_attributes = flags & 0x20 != 0;

        let method_id = read_bytes(&mut self.cursor, id_len)
            .map_err(|_| self.corrupt("truncated coder id"))?;
        let properties = if has_attributes {
            let size = self.number()?;
            read_bytes(&mut self.cursor, size as usize)
                .map_err(|_| self.corrupt("truncated coder properties"))?
        } else {
            Vec::new()
        };

        match method_id.as_slice() {
            id if id == COPY_METHOD_ID => Ok(Coder::Copy),
            id if id == LZMA2_METHOD_ID => {
                let properties_byte = *properties
                    .first()
                    .ok_or_else(|| self.corrupt("LZMA2 coder without properties"))?;
                Ok(Coder::Lzma2 { properties_byte })
            }
            other => Err(SevenZipError::Unsupported(format!(
                "coder {:02x?}",
                other
            ))),
        }
    }

    fn parse_sub_streams_info(&mut self, archive: &mut ParsedArchive) -> Result<()> {
        let folder = archive
            .folder
            .ok_or_else(|| self.corrupt("substreams info without a folder"))?;

        let mut count = 1u64;
        let mut sizes: Option<Vec<u64>> = None;

        loop {
            match self.byte()? {
                K_END => break,
                K_NUM_UNPACK_STREAM => {
                    count = self.number()?;
                    if count > MAX_ENTRIES {
                        return Err(SevenZipError::OutOfMemory(format!(
                            "{count} substreams claimed"
                        )));
                    }
                    // Each further substream costs at least one header byte.
                    if count > self.remaining() + 1 {
                        return Err(self.corrupt("substream count exceeds header size"));
                    }
                }
                K_SIZE => {
                    let mut listed = Vec::with_capacity(count.saturating_sub(1) as usize);
                    let mut partial = 0u64;
                    for _ in 1..count {
                        let size = self.number()?;
                        partial = partial.checked_add(size).ok_or_else(|| {
                            self.corrupt("substream sizes overflow")
                        })?;
                        listed.push(size);
                    }
                    let last = folder.unpack_size.checked_sub(partial).ok_or_else(|| {
                        self.corrupt("substream sizes exceed the folder unpack size")
                    })?;
                    listed.push(last);
                    sizes = Some(listed);
                }
                K_CRC => {
                    // Digests cover only streams whose CRC is not already
                    // known from the folder digest.
                    let unknown = if count == 1 && folder.crc.is_some() {
                        0
                    } else {
                        count as usize
                    };
                    let defined = read_all_or_bits(&mut self.cursor, unknown)
                        .map_err(|_| self.corrupt("truncated substream digests"))?;
                    let mut crcs = Vec::with_capacity(count as usize);
                    if unknown == 0 {
                        crcs.push(folder.crc);
                    } else {
                        for &d in &defined {
                            if d {
                                let crc = read_u32_le(&mut self.cursor)
                                    .map_err(|_| self.corrupt("truncated substream digests"))?;
                                crcs.push(Some(crc));
                            } else {
                                crcs.push(None);
                            }
                        }
                    }
                    archive.substream_crcs = crcs;
                }
                other => {
                    return Err(self
                        .corrupt(format!("unexpected property {other:#04x} in substreams info")))
                }
            }
        }

        archive.substream_sizes = match sizes {
            Some(sizes) => sizes,
            None if count == 1 => vec![folder.unpack_size],
            None => {
                return Err(self.corrupt("substream sizes missing for multi-file folder"));
            }
        };

        Ok(())
    }

    /// Applies the defaults for archives whose header omits SubStreamsInfo.
    fn finish_substreams(&self, archive: &mut ParsedArchive) -> Result<()> {
        if let Some(folder) = archive.folder {
            if archive.substream_sizes.is_empty() {
                archive.substream_sizes = vec![folder.unpack_size];
            }
            if archive.substream_crcs.is_empty() {
                archive.substream_crcs = vec![folder.crc; archive.substream_sizes.len()];
            }
            if archive.substream_crcs.len() != archive.substream_sizes.len() {
                return Err(SevenZipError::corrupt(
                    None,
                    "substream digest count does not match stream count",
                ));
            }
        }
        Ok(())
    }

    fn parse_files_info(&mut self, archive: &mut ParsedArchive) -> Result<()> {
        let num_files = self.number()?;
        if num_files > MAX_ENTRIES {
            return Err(SevenZipError::OutOfMemory(format!(
                "{num_files} entries claimed"
            )));
        }
        // A real header spends at least two name bytes per entry; anything
        // claiming more entries than remaining bytes is hostile or damaged.
        if num_files > self.remaining() {
            return Err(self.corrupt("entry count exceeds header size"));
        }
        let num_files = num_files as usize;

        let mut entries = vec![ArchiveEntry::default(); num_files];
        let mut empty_stream = vec![false; num_files];
        let mut empty_file: Vec<bool> = Vec::new();

        loop {
            let prop_id = self.byte()?;
            if prop_id == K_END {
                break;
            }
            let body_size = self.number()?;
            let body_end = self
                .cursor
                .position()
                .checked_add(body_size)
                .filter(|&end| end <= self.cursor.get_ref().len() as u64)
                .ok_or_else(|| self.corrupt("property group exceeds header size"))?;

            match prop_id {
                K_NAME => {
                    if self.byte()? != 0 {
                        return Err(SevenZipError::Unsupported("external file names".into()));
                    }
                    for entry in &mut entries {
                        entry.name = read_utf16le_string(&mut self.cursor)
                            .map_err(|e| SevenZipError::corrupt(None, e.to_string()))?;
                    }
                }
                K_EMPTY_STREAM => {
                    empty_stream = read_bool_vector(&mut self.cursor, num_files)
                        .map_err(|_| self.corrupt("truncated empty-stream bits"))?;
                }
                K_EMPTY_FILE => {
                    let num_empty = empty_stream.iter().filter(|&&b| b).count();
                    empty_file = read_bool_vector(&mut self.cursor, num_empty)
                        .map_err(|_| self.corrupt("truncated empty-file bits"))?;
                }
                K_M_TIME => {
                    let defined = read_all_or_bits(&mut self.cursor, num_files)
                        .map_err(|_| self.corrupt("truncated time group"))?;
                    if self.byte()? != 0 {
                        return Err(SevenZipError::Unsupported("external timestamps".into()));
                    }
                    for (entry, &has_time) in entries.iter_mut().zip(defined.iter()) {
                        if has_time {
                            let time = read_u64_le(&mut self.cursor)
                                .map_err(|_| self.corrupt("truncated time group"))?;
                            entry.mtime = Some(time);
                        }
                    }
                }
                K_ATTRIBUTES => {
                    let defined = read_all_or_bits(&mut self.cursor, num_files)
                        .map_err(|_| self.corrupt("truncated attribute group"))?;
                    if self.byte()? != 0 {
                        return Err(SevenZipError::Unsupported("external attributes".into()));
                    }
                    for (entry, &has_attr) in entries.iter_mut().zip(defined.iter()) {
                        if has_attr {
                            let attr = read_u32_le(&mut self.cursor)
                                .map_err(|_| self.corrupt("truncated attribute group"))?;
                            entry.attributes = Some(attr);
                        }
                    }
                }
                _ => {
                    // Unknown optional group: its size field lets us skip it.
                    let mut sink = vec![0u8; body_size as usize];
                    self.cursor
                        .read_exact(&mut sink)
                        .map_err(|_| self.corrupt("truncated property group"))?;
                }
            }

            if self.cursor.position() > body_end {
                return Err(self.corrupt(format!(
                    "property group {prop_id:#04x} overran its declared size"
                )));
            }
            // Groups may carry trailing padding inside their declared size.
            self.cursor.set_position(body_end);
        }

        // An entry with the empty-stream bit set and no companion empty-file
        // bit is a directory.
        let mut empty_idx = 0;
        for (i, &is_empty) in empty_stream.iter().enumerate() {
            if is_empty {
                entries[i].has_stream = false;
                entries[i].is_directory = !empty_file.get(empty_idx).copied().unwrap_or(false);
                empty_idx += 1;
            } else {
                entries[i].has_stream = true;
            }
        }

        archive.entries = entries;
        Ok(())
    }

    /// Distributes substream sizes and CRCs over the streamed entries.
    fn assign_entry_streams(&self, archive: &mut ParsedArchive) -> Result<()> {
        let streamed = archive.entries.iter().filter(|e| e.has_stream).count();

        if archive.folder.is_none() {
            if streamed != 0 {
                return Err(SevenZipError::corrupt(
                    None,
                    "entries reference packed data but the archive has none",
                ));
            }
            return Ok(());
        }

        if streamed != archive.substream_sizes.len() {
            return Err(SevenZipError::corrupt(
                None,
                format!(
                    "{} streamed entries but {} substreams",
                    streamed,
                    archive.substream_sizes.len()
                ),
            ));
        }

        let mut stream_idx = 0;
        for entry in archive.entries.iter_mut().filter(|e| e.has_stream) {
            entry.size = archive.substream_sizes[stream_idx];
            entry.crc = archive.substream_crcs[stream_idx];
            stream_idx += 1;
        }
        Ok(())
    }
}

/// Decodes a Header Block. `base_offset` is the block's absolute position in
/// the archive, used for error reporting only.
pub fn parse_header_block(bytes: &[u8], base_offset: u64) -> Result<ParsedArchive> {
    HeaderParser::new(bytes, base_offset).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::header::ArchiveHeader;
    use crate::compression::pipeline::FolderRecord;
    use crate::scanner::FileEntry;
    use std::path::PathBuf;

    fn entry(name: &str, size: u64, is_dir: bool, crc: u32) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            path: PathBuf::from(name),
            is_directory: is_dir,
            size,
            mtime: Some(116_444_736_000_000_000 + size),
            attributes: if is_dir { 0x10 } else { 0x20 },
            crc,
        }
    }

    fn roundtrip(entries: &[FileEntry], folder: Option<FolderRecord>) -> ParsedArchive {
        let header = ArchiveHeader {
            entries,
            folder,
            pack_position: 0,
        };
        let bytes = header.serialize().unwrap();
        parse_header_block(&bytes, 32).unwrap()
    }

    #[test]
    fn test_roundtrip_single_file() {
        let entries = [entry("hello.txt", 48, false, 0xCAFEBABE)];
        let parsed = roundtrip(
            &entries,
            Some(FolderRecord {
                coder: Coder::Lzma2 {
                    properties_byte: 26,
                },
                unpack_size: 48,
                pack_size: 60,
            }),
        );

        assert_eq!(parsed.pack_size, 60);
        assert_eq!(parsed.unpack_total(), 48);
        assert_eq!(parsed.substream_sizes, vec![48]);
        assert_eq!(parsed.substream_crcs, vec![Some(0xCAFEBABE)]);

        assert_eq!(parsed.entries.len(), 1);
        let e = &parsed.entries[0];
        assert_eq!(e.name, "hello.txt");
        assert!(!e.is_directory);
        assert!(e.has_stream);
        assert_eq!(e.size, 48);
        assert_eq!(e.crc, Some(0xCAFEBABE));
        assert_eq!(e.attributes, Some(0x20));
        assert_eq!(e.mtime, Some(116_444_736_000_000_048));
    }

    #[test]
    fn test_roundtrip_mixed_tree() {
        let entries = [
            entry("dir", 0, true, 0),
            entry("dir/a.txt", 1024, false, 0x11111111),
            entry("dir/empty.txt", 0, false, 0),
            entry("dir/sub", 0, true, 0),
            entry("dir/sub/b.txt", 2048, false, 0x22222222),
        ];
        let parsed = roundtrip(
            &entries,
            Some(FolderRecord {
                coder: Coder::Lzma2 {
                    properties_byte: 26,
                },
                unpack_size: 3072,
                pack_size: 100,
            }),
        );

        assert_eq!(parsed.entries.len(), 5);
        assert!(parsed.entries[0].is_directory);
        assert!(!parsed.entries[2].is_directory, "empty file stays a file");
        assert!(!parsed.entries[2].has_stream);
        assert!(parsed.entries[3].is_directory);

        assert_eq!(parsed.entries[1].size, 1024);
        assert_eq!(parsed.entries[4].size, 2048);
        assert_eq!(parsed.entries[4].crc, Some(0x22222222));

        // Order is preserved end to end.
        let names: Vec<&str> = parsed.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["dir", "dir/a.txt", "dir/empty.txt", "dir/sub", "dir/sub/b.txt"]
        );
    }

    #[test]
    fn test_roundtrip_copy_coder() {
        let entries = [entry("noise.bin", 4096, false, 0x33333333)];
        let parsed = roundtrip(
            &entries,
            Some(FolderRecord {
                coder: Coder::Copy,
                unpack_size: 4096,
                pack_size: 4096,
            }),
        );
        assert_eq!(parsed.folder.unwrap().coder, Coder::Copy);
    }

    #[test]
    fn test_directories_only() {
        let entries = [entry("a", 0, true, 0), entry("a/b", 0, true, 0)];
        let parsed = roundtrip(&entries, None);
        assert!(parsed.folder.is_none());
        assert!(parsed.entries.iter().all(|e| e.is_directory));
    }

    #[test]
    fn test_encoded_header_unsupported() {
        let err = parse_header_block(&[K_ENCODED_HEADER], 32).unwrap_err();
        assert!(matches!(err, SevenZipError::Unsupported(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        let err = parse_header_block(&[0x42, 0x00], 32).unwrap_err();
        assert!(matches!(err, SevenZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let entries = [entry("a.txt", 10, false, 1)];
        let header = ArchiveHeader {
            entries: &entries,
            folder: Some(FolderRecord {
                coder: Coder::Copy,
                unpack_size: 10,
                pack_size: 10,
            }),
            pack_position: 0,
        };
        let bytes = header.serialize().unwrap();
        let err = parse_header_block(&bytes[..bytes.len() / 2], 32).unwrap_err();
        assert!(matches!(err, SevenZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_unknown_files_property_skipped() {
        // Hand-build: kHeader, kFilesInfo, 1 file, unknown group 0x19 with
        // two padding bytes, then a name group, then ends.
        let mut bytes = vec![K_HEADER, K_FILES_INFO, 0x01];
        bytes.extend_from_slice(&[0x19, 0x02, 0xAA, 0xBB]);
        bytes.push(K_NAME);
        let mut body = vec![0x00];
        body.extend_from_slice(&[b'x', 0x00, 0x00, 0x00]);
        bytes.push(body.len() as u8);
        bytes.extend_from_slice(&body);
        bytes.push(K_EMPTY_STREAM);
        bytes.extend_from_slice(&[0x01, 0b10000000]);
        bytes.push(K_END); // FilesInfo
        bytes.push(K_END); // Header

        let parsed = parse_header_block(&bytes, 32).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].name, "x");
        assert!(parsed.entries[0].is_directory);
    }
}
