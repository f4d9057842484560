use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

pub fn write_u32_le<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_u32::<LittleEndian>(value)
}

pub fn write_u64_le<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    w.write_u64::<LittleEndian>(value)
}

/// Writes a UTF-16LE encoded string with null terminator.
pub fn write_utf16le_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    for code_unit in s.encode_utf16() {
        w.write_u16::<LittleEndian>(code_unit)?;
    }
    // Null terminator
    w.write_u16::<LittleEndian>(0)?;
    Ok(())
}

/// Writes a bit vector. Each bool maps to one bit, packed into bytes MSB-first.
/// Padding bits in the last byte are 0.
pub fn write_bool_vector<W: Write>(w: &mut W, bools: &[bool]) -> io::Result<()> {
    let mut current_byte: u8 = 0;
    let mut bit_index: u8 = 0;

    for &b in bools {
        if b {
            current_byte |= 1 << (7 - bit_index);
        }
        bit_index += 1;
        if bit_index == 8 {
            w.write_u8(current_byte)?;
            current_byte = 0;
            bit_index = 0;
        }
    }

    if bit_index > 0 {
        w.write_u8(current_byte)?;
    }

    Ok(())
}
