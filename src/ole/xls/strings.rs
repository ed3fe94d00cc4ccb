//! BIFF8 string encodings
//!
//! Strings are stored either "compressed" (one byte per character, the low
//! byte of each UTF-16 code unit, i.e. ISO-8859-1) or uncompressed UTF-16LE.
//! The `fHighByte` bit of the option byte selects between the two.

use crate::common::binary;
use crate::ole::xls::error::{XlsError, XlsResult};

/// Option-byte bit: characters are two bytes wide
pub const FLAG_HIGH_BYTE: u8 = 0x01;
/// Option-byte bit: a phonetic (Far East) block follows the characters
pub const FLAG_PHONETIC: u8 = 0x04;
/// Option-byte bit: rich-text formatting runs follow the characters
pub const FLAG_RICH: u8 = 0x08;

/// Decode character bytes in either storage form
pub fn decode_chars(bytes: &[u8], high_byte: bool) -> String {
    if high_byte {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Whether every character fits in the compressed (one byte) form
pub fn is_compressible(value: &str) -> bool {
    value.chars().all(|c| (c as u32) <= 0xFF)
}

/// Number of characters as BIFF counts them (UTF-16 code units)
pub fn char_count(value: &str) -> usize {
    value.encode_utf16().count()
}

/// Encode character bytes, compressed when possible
///
/// # Returns
///
/// The option byte (`FLAG_HIGH_BYTE` or 0) and the character bytes
pub fn encode_chars(value: &str) -> (u8, Vec<u8>) {
    if is_compressible(value) {
        (0, value.chars().map(|c| c as u8).collect())
    } else {
        let mut bytes = Vec::with_capacity(value.len() * 2);
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        (FLAG_HIGH_BYTE, bytes)
    }
}

fn read_chars(data: &[u8], offset: usize, cch: usize) -> XlsResult<(String, usize)> {
    let flags = binary::read_u8(data, offset)?;
    let high_byte = flags & FLAG_HIGH_BYTE != 0;
    let byte_len = if high_byte { cch * 2 } else { cch };
    let start = offset + 1;
    if start + byte_len > data.len() {
        return Err(XlsError::InvalidLength {
            expected: start + byte_len,
            found: data.len(),
        });
    }
    Ok((
        decode_chars(&data[start..start + byte_len], high_byte),
        1 + byte_len,
    ))
}

/// Read an XLUnicodeString (16-bit character count)
///
/// # Returns
///
/// The string and the number of bytes consumed
pub fn read_unicode_string(data: &[u8], offset: usize) -> XlsResult<(String, usize)> {
    let cch = binary::read_u16_le(data, offset)? as usize;
    let (value, consumed) = read_chars(data, offset + 2, cch)?;
    Ok((value, 2 + consumed))
}

/// Read a ShortXLUnicodeString (8-bit character count)
pub fn read_short_unicode_string(data: &[u8], offset: usize) -> XlsResult<(String, usize)> {
    let cch = binary::read_u8(data, offset)? as usize;
    let (value, consumed) = read_chars(data, offset + 1, cch)?;
    Ok((value, 1 + consumed))
}

/// Append an XLUnicodeString
pub fn write_unicode_string(out: &mut Vec<u8>, value: &str) -> XlsResult<()> {
    let cch = char_count(value);
    let cch = u16::try_from(cch).map_err(|_| {
        XlsError::InvalidData(format!("string of {} characters is too long", cch))
    })?;
    let (flags, bytes) = encode_chars(value);
    out.extend_from_slice(&cch.to_le_bytes());
    out.push(flags);
    out.extend_from_slice(&bytes);
    Ok(())
}

/// Append a ShortXLUnicodeString
pub fn write_short_unicode_string(out: &mut Vec<u8>, value: &str) -> XlsResult<()> {
    let cch = char_count(value);
    let cch = u8::try_from(cch).map_err(|_| {
        XlsError::InvalidData(format!("name of {} characters is too long", cch))
    })?;
    let (flags, bytes) = encode_chars(value);
    out.push(cch);
    out.push(flags);
    out.extend_from_slice(&bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_is_latin1() {
        // 0xE9 is 'é' in ISO-8859-1
        let data = [0x03, 0x00, 0x00, b'c', b'a', 0xE9];
        let (value, consumed) = read_unicode_string(&data, 0).unwrap();
        assert_eq!(value, "caé");
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_uncompressed_round_trip() {
        let mut out = Vec::new();
        write_unicode_string(&mut out, "发票").unwrap();
        assert_eq!(out[2], FLAG_HIGH_BYTE);
        assert_eq!(out.len(), 3 + 4);
        assert_eq!(read_unicode_string(&out, 0).unwrap().0, "发票");
    }

    #[test]
    fn test_latin1_written_compressed() {
        let mut out = Vec::new();
        write_short_unicode_string(&mut out, "Données").unwrap();
        assert_eq!(out[0], 7);
        assert_eq!(out[1], 0);
        assert_eq!(out.len(), 2 + 7);
        assert_eq!(read_short_unicode_string(&out, 0).unwrap().0, "Données");
    }

    #[test]
    fn test_truncated_string_is_error() {
        let data = [0x05, 0x00, 0x00, b'a'];
        assert!(read_unicode_string(&data, 0).is_err());
    }

    #[test]
    fn test_short_string_length_limit() {
        let long = "x".repeat(256);
        assert!(write_short_unicode_string(&mut Vec::new(), &long).is_err());
    }
}
