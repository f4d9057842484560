use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Cursor, Write};

use crate::error::{Result, SevenZipError};
use crate::io::reader::{read_u32_le, read_u64_le};

/// 7z file signature bytes.
pub const SIGNATURE: [u8; 6] = [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C];

/// 7z format version: major 0, minor 4.
const VERSION_MAJOR: u8 = 0;
const VERSION_MINOR: u8 = 4;

/// Size of the SignatureHeader in bytes.
pub const SIGNATURE_HEADER_SIZE: u64 = 32;

/// The patchable tail of the Signature Header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartHeader {
    /// Offset of the Header Block, measured from the end of the Signature
    /// Header (equals the packed-region size).
    pub next_header_offset: u64,
    pub next_header_size: u64,
    pub next_header_crc: u32,
}

/// Writes the 32-byte SignatureHeader.
///
/// Layout:
///   [0..6]   Signature: '7' 'z' 0xBC 0xAF 0x27 0x1C
///   [6..8]   ArchiveVersion major, minor
///   [8..12]  StartHeaderCRC (CRC32 of bytes 12..32)
///   [12..20] NextHeaderOffset (u64 LE)
///   [20..28] NextHeaderSize (u64 LE)
///   [28..32] NextHeaderCRC (u32 LE)
pub fn write_signature_header<W: Write>(w: &mut W, start: &StartHeader) -> io::Result<()> {
    let mut tail = Vec::with_capacity(20);
    tail.write_u64::<LittleEndian>(start.next_header_offset)?;
    tail.write_u64::<LittleEndian>(start.next_header_size)?;
    tail.write_u32::<LittleEndian>(start.next_header_crc)?;

    let start_header_crc = crc32fast::hash(&tail);

    w.write_all(&SIGNATURE)?;
    w.write_u8(VERSION_MAJOR)?;
    w.write_u8(VERSION_MINOR)?;
    w.write_u32::<LittleEndian>(start_header_crc)?;
    w.write_all(&tail)?;

    Ok(())
}

/// Verifies the 32 bytes at file offset 0 and extracts the tuple.
///
/// The minor version is informational; only the major version gates parsing.
pub fn parse_signature_header(bytes: &[u8; 32]) -> Result<StartHeader> {
    if bytes[..6] != SIGNATURE {
        return Err(SevenZipError::corrupt(0u64, "bad 7z signature"));
    }
    if bytes[6] != VERSION_MAJOR {
        return Err(SevenZipError::corrupt(
            6u64,
            format!("unsupported format version {}.{}", bytes[6], bytes[7]),
        ));
    }

    let mut cursor = Cursor::new(&bytes[8..]);
    let stored_crc = read_u32_le(&mut cursor).map_err(SevenZipError::IoRead)?;
    let computed_crc = crc32fast::hash(&bytes[12..32]);
    if stored_crc != computed_crc {
        return Err(SevenZipError::corrupt(
            8u64,
            format!("signature header CRC mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"),
        ));
    }

    let next_header_offset = read_u64_le(&mut cursor).map_err(SevenZipError::IoRead)?;
    let next_header_size = read_u64_le(&mut cursor).map_err(SevenZipError::IoRead)?;
    let next_header_crc = read_u32_le(&mut cursor).map_err(SevenZipError::IoRead)?;

    Ok(StartHeader {
        next_header_offset,
        next_header_size,
        next_header_crc,
    })
}
