//! Bounds-checked little-endian reads from record payloads and sector
//! buffers

use zerocopy::{F64, FromBytes, LE, U16, U32};

#[derive(Debug, Clone, thiserror::Error)]
pub enum BinaryError {
    /// The value would extend past the end of the buffer
    #[error("Insufficient data: expected {expected}, got {available}")]
    InsufficientData { expected: usize, available: usize },
    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type BinaryResult<T> = Result<T, BinaryError>;

/// Slice `width` bytes at `offset` and reinterpret them as `T`
fn read_at<T: FromBytes>(data: &[u8], offset: usize, width: usize) -> BinaryResult<T> {
    let end = offset.checked_add(width).unwrap_or(usize::MAX);
    let bytes = data.get(offset..end).ok_or(BinaryError::InsufficientData {
        expected: end,
        available: data.len(),
    })?;
    T::read_from_bytes(bytes).map_err(|_| {
        BinaryError::ParseError(format!("{} bytes at offset {} are misaligned", width, offset))
    })
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> BinaryResult<u8> {
    read_at(data, offset, 1)
}

/// Read a little-endian u16
///
/// # Examples
///
/// ```
/// use xlsplit::common::binary::read_u16_le;
/// let record = [0xFC, 0x00, 0x0A, 0x00];
/// assert_eq!(read_u16_le(&record, 0).unwrap(), 0x00FC);
/// assert!(read_u16_le(&record, 3).is_err());
/// ```
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> BinaryResult<u16> {
    read_at::<U16<LE>>(data, offset, 2).map(|v| v.get())
}

/// Read a little-endian u32
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> BinaryResult<u32> {
    read_at::<U32<LE>>(data, offset, 4).map(|v| v.get())
}

/// Read a little-endian IEEE 754 double, as stored by NUMBER and FORMULA
#[inline]
pub fn read_f64_le(data: &[u8], offset: usize) -> BinaryResult<f64> {
    read_at::<F64<LE>>(data, offset, 8).map(|v| v.get())
}
