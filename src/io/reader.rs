use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    r.read_u8()
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    r.read_u32::<LittleEndian>()
}

pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    r.read_u64::<LittleEndian>()
}

pub fn read_bytes<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a bit vector of `count` bits, MSB-first within each byte.
pub fn read_bool_vector<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<bool>> {
    let byte_count = count.div_ceil(8);
    let bytes = read_bytes(r, byte_count)?;

    let mut result = Vec::with_capacity(count);
    for i in 0..count {
        let bit = 7 - (i % 8);
        result.push((bytes[i / 8] >> bit) & 1 != 0);
    }
    Ok(result)
}

/// Reads an all-defined marker byte, then a bit vector only when it is zero.
pub fn read_all_or_bits<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<bool>> {
    if read_u8(r)? != 0 {
        Ok(vec![true; count])
    } else {
        read_bool_vector(r, count)
    }
}

/// Guard against absurd name lengths in hostile headers.
const MAX_NAME_CODE_UNITS: usize = 32 * 1024;

/// Reads a null-terminated UTF-16LE string.
///
/// Surrogate pairs are decoded properly; an unpaired surrogate falls back to
/// a lossy conversion rather than failing the whole listing.
pub fn read_utf16le_string<R: Read>(r: &mut R) -> io::Result<String> {
    let mut units = Vec::new();
    loop {
        let unit = r.read_u16::<LittleEndian>()?;
        if unit == 0 {
            break;
        }
        if units.len() >= MAX_NAME_CODE_UNITS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file name exceeds 32768 UTF-16 code units",
            ));
        }
        units.push(unit);
    }
    Ok(String::from_utf16(&units).unwrap_or_else(|_| String::from_utf16_lossy(&units)))
}
