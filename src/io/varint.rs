use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Writes a 7z variable-length encoded integer (NUMBER).
///
/// The first byte carries a prefix of k set bits followed by a zero bit,
/// where k is the number of additional bytes; the remaining bits of the
/// first byte are the most significant bits of the value, and the extra
/// bytes hold the low bits in little-endian order.
///
/// - 0xxxxxxx                             -> 1 byte,  value 0..127
/// - 10xxxxxx yyyyyyyy                    -> 2 bytes, value 0..16383
/// - 110xxxxx + 2 bytes                   -> 3 bytes
/// - ...up to...
/// - 11111111 + 8 bytes                   -> 9 bytes, full u64
///
/// Always emits the shortest form.
pub fn write_number<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    if value < 0x80 {
        w.write_u8(value as u8)?;
        return Ok(());
    }

    let extra = encoded_len(value) as u8 - 1;

    if extra >= 8 {
        // 9-byte encoding: first byte is 0xFF, then 8 bytes LE
        w.write_u8(0xFF)?;
        w.write_u64::<LittleEndian>(value)?;
        return Ok(());
    }

    // First byte: `extra` leading 1-bits, then the high bits of the value
    let mask: u8 = !((0xFFu16 >> extra) as u8);
    let first_byte = mask | (value >> (extra * 8)) as u8;
    w.write_u8(first_byte)?;

    for i in 0..extra {
        w.write_u8((value >> (i * 8)) as u8)?;
    }

    Ok(())
}

/// Number of bytes `write_number` emits for `value`.
pub fn encoded_len(value: u64) -> usize {
    for extra in 0u32..8 {
        // Value bits available: (7 - extra) in the first byte plus 8*extra.
        let bits = 7 + 7 * extra;
        if value < (1u64 << bits) {
            return extra as usize + 1;
        }
    }
    9
}

/// Reads a 7z NUMBER, consuming exactly the bytes its prefix announces.
pub fn read_number<R: Read>(r: &mut R) -> io::Result<u64> {
    let first = r.read_u8()? as u64;

    let mut mask = 0x80u64;
    let mut value = 0u64;

    for i in 0..8 {
        if first & mask == 0 {
            return Ok(value | ((first & (mask - 1)) << (8 * i)));
        }
        value |= (r.read_u8()? as u64) << (8 * i);
        mask >>= 1;
    }

    // 0xFF prefix: the eight bytes just read are the full value.
    Ok(value)
}

/// Decodes a NUMBER from the front of a slice, returning the value and the
/// number of bytes consumed. Fails on truncated input.
pub fn decode_number(buf: &[u8]) -> io::Result<(u64, usize)> {
    let mut cursor = io::Cursor::new(buf);
    let value = read_number(&mut cursor)?;
    Ok((value, cursor.position() as usize))
}
