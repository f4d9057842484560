use std::io::Write;

use crate::compression::pipeline::FolderRecord;
use crate::error::{Result, SevenZipError};
use crate::io::varint::write_number;
use crate::io::writer::{write_bool_vector, write_u32_le, write_u64_le, write_utf16le_string};
use crate::scanner::FileEntry;

// 7z property IDs
pub const K_END: u8 = 0x00;
pub const K_HEADER: u8 = 0x01;
pub const K_MAIN_STREAMS_INFO: u8 = 0x04;
pub const K_FILES_INFO: u8 = 0x05;
pub const K_PACK_INFO: u8 = 0x06;
pub const K_UNPACK_INFO: u8 = 0x07;
pub const K_SUB_STREAMS_INFO: u8 = 0x08;
pub const K_SIZE: u8 = 0x09;
pub const K_CRC: u8 = 0x0A;
pub const K_FOLDER: u8 = 0x0B;
pub const K_CODERS_UNPACK_SIZE: u8 = 0x0C;
pub const K_NUM_UNPACK_STREAM: u8 = 0x0D;
pub const K_EMPTY_STREAM: u8 = 0x0E;
pub const K_EMPTY_FILE: u8 = 0x0F;
pub const K_NAME: u8 = 0x11;
pub const K_M_TIME: u8 = 0x14;
pub const K_ATTRIBUTES: u8 = 0x15;
pub const K_ENCODED_HEADER: u8 = 0x17;

fn tag_err(e: std::io::Error) -> SevenZipError {
    SevenZipError::corrupt(None, format!("header serialization: {e}"))
}

/// Serializer for the Header Block placed at the archive's tail.
///
/// The supported shape is the one the pipeline produces: at most one solid
/// folder with one coder and one packed stream, plus the file metadata
/// properties.
pub struct ArchiveHeader<'a> {
    pub entries: &'a [FileEntry],
    /// `None` when no entry contributed packed bytes.
    pub folder: Option<FolderRecord>,
    /// Offset of the packed stream from the end of the Signature Header.
    pub pack_position: u64,
}

impl ArchiveHeader<'_> {
    /// Serializes the complete Header Block.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        buf.write_all(&[K_HEADER]).map_err(tag_err)?;

        if self.folder.is_some() {
            self.write_main_streams_info(&mut buf)?;
        }

        if !self.entries.is_empty() {
            self.write_files_info(&mut buf)?;
        }

        buf.write_all(&[K_END]).map_err(tag_err)?;
        Ok(buf)
    }

    fn streamed_entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| e.has_stream())
    }

    fn write_main_streams_info(&self, w: &mut Vec<u8>) -> Result<()> {
        w.write_all(&[K_MAIN_STREAMS_INFO]).map_err(tag_err)?;
        self.write_pack_info(w)?;
        self.write_unpack_info(w)?;
        self.write_sub_streams_info(w)?;
        w.write_all(&[K_END]).map_err(tag_err)?;
        Ok(())
    }

    fn write_pack_info(&self, w: &mut Vec<u8>) -> Result<()> {
        let folder = self.folder.as_ref().expect("pack info requires a folder");

        w.write_all(&[K_PACK_INFO]).map_err(tag_err)?;
        // PackPos, then the number of packed streams (always one folder here).
        write_number(w, self.pack_position).map_err(tag_err)?;
        write_number(w, 1).map_err(tag_err)?;

        w.write_all(&[K_SIZE]).map_err(tag_err)?;
        write_number(w, folder.pack_size).map_err(tag_err)?;

        w.write_all(&[K_END]).map_err(tag_err)?;
        Ok(())
    }

    fn write_unpack_info(&self, w: &mut Vec<u8>) -> Result<()> {
        let folder = self.folder.as_ref().expect("unpack info requires a folder");

        w.write_all(&[K_UNPACK_INFO]).map_err(tag_err)?;

        w.write_all(&[K_FOLDER]).map_err(tag_err)?;
        write_number(w, 1).map_err(tag_err)?; // NumFolders
        w.write_all(&[0x00]).map_err(tag_err)?; // External = 0 (inline)

        // Folder body: one simple coder.
        write_number(w, 1).map_err(tag_err)?; // NumCoders
        w.write_all(&[folder.coder.flags_byte()]).map_err(tag_err)?;
        w.write_all(folder.coder.method_id()).map_err(tag_err)?;
        if let Some(props) = folder.coder.properties() {
            write_number(w, props.len() as u64).map_err(tag_err)?;
            w.write_all(&props).map_err(tag_err)?;
        }

        w.write_all(&[K_CODERS_UNPACK_SIZE]).map_err(tag_err)?;
        write_number(w, folder.unpack_size).map_err(tag_err)?;

        w.write_all(&[K_END]).map_err(tag_err)?;
        Ok(())
    }

    fn write_sub_streams_info(&self, w: &mut Vec<u8>) -> Result<()> {
        let sizes: Vec<u64> = self.streamed_entries().map(|e| e.size).collect();
        let crcs: Vec<u32> = self.streamed_entries().map(|e| e.crc).collect();

        w.write_all(&[K_SUB_STREAMS_INFO]).map_err(tag_err)?;

        w.write_all(&[K_NUM_UNPACK_STREAM]).map_err(tag_err)?;
        write_number(w, sizes.len() as u64).map_err(tag_err)?;

        // All sizes except the last; the decoder derives it from the folder
        // unpack size.
        if sizes.len() > 1 {
            w.write_all(&[K_SIZE]).map_err(tag_err)?;
            for &size in &sizes[..sizes.len() - 1] {
                write_number(w, size).map_err(tag_err)?;
            }
        }

        w.write_all(&[K_CRC]).map_err(tag_err)?;
        w.write_all(&[0x01]).map_err(tag_err)?; // AllAreDefined
        for &crc in &crcs {
            write_u32_le(w, crc).map_err(tag_err)?;
        }

        w.write_all(&[K_END]).map_err(tag_err)?;
        Ok(())
    }

    fn write_files_info(&self, w: &mut Vec<u8>) -> Result<()> {
        w.write_all(&[K_FILES_INFO]).map_err(tag_err)?;
        write_number(w, self.entries.len() as u64).map_err(tag_err)?;

        self.write_sized_property(w, K_NAME, |body| {
            body.write_all(&[0x00])?; // External = 0
            for entry in self.entries {
                write_utf16le_string(body, &entry.name.replace('\\', "/"))?;
            }
            Ok(())
        })?;

        if self.entries.iter().any(|e| e.mtime.is_some()) {
            self.write_sized_property(w, K_M_TIME, |body| {
                let defined: Vec<bool> = self.entries.iter().map(|e| e.mtime.is_some()).collect();
                if defined.iter().all(|&b| b) {
                    body.write_all(&[0x01])?;
                } else {
                    body.write_all(&[0x00])?;
                    write_bool_vector(body, &defined)?;
                }
                body.write_all(&[0x00])?; // External = 0
                for entry in self.entries {
                    if let Some(mtime) = entry.mtime {
                        write_u64_le(body, mtime)?;
                    }
                }
                Ok(())
            })?;
        }

        self.write_sized_property(w, K_ATTRIBUTES, |body| {
            body.write_all(&[0x01])?; // AllAreDefined
            body.write_all(&[0x00])?; // External = 0
            for entry in self.entries {
                write_u32_le(body, entry.attributes)?;
            }
            Ok(())
        })?;

        let empty_stream: Vec<bool> = self.entries.iter().map(|e| !e.has_stream()).collect();
        if empty_stream.iter().any(|&b| b) {
            self.write_sized_property(w, K_EMPTY_STREAM, |body| {
                write_bool_vector(body, &empty_stream)
            })?;

            // Among empty-stream entries, flag the ones that are files so a
            // zero-byte file is not mistaken for a directory on read.
            let empty_file: Vec<bool> = self
                .entries
                .iter()
                .filter(|e| !e.has_stream())
                .map(|e| !e.is_directory)
                .collect();
            if empty_file.iter().any(|&b| b) {
                self.write_sized_property(w, K_EMPTY_FILE, |body| {
                    write_bool_vector(body, &empty_file)
                })?;
            }
        }

        w.write_all(&[K_END]).map_err(tag_err)?;
        Ok(())
    }

    /// Writes a FilesInfo property group: id, body size, body.
    fn write_sized_property(
        &self,
        w: &mut Vec<u8>,
        id: u8,
        fill: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
    ) -> Result<()> {
        let mut body = Vec::new();
        fill(&mut body).map_err(tag_err)?;

        w.write_all(&[id]).map_err(tag_err)?;
        write_number(w, body.len() as u64).map_err(tag_err)?;
        w.write_all(&body).map_err(tag_err)?;
        Ok(())
    }
}
