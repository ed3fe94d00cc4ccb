//! BIFF record parsing for XLS files
//!
//! This module handles the framing of BIFF8 (Binary Interchange File Format)
//! records inside the `Workbook` stream, plus the fixed-layout records the
//! rest of the crate reads and rewrites: BOF, BOUNDSHEET, DIMENSIONS and ROW.

use std::io::Write;

use bitflags::bitflags;

use crate::common::binary;
use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::xls::strings;

pub const FORMULA: u16 = 0x0006;
pub const EOF: u16 = 0x000A;
pub const DATEMODE: u16 = 0x0022;
pub const FONT: u16 = 0x0031;
pub const CONTINUE: u16 = 0x003C;
pub const DEFCOLWIDTH: u16 = 0x0055;
pub const BOUNDSHEET: u16 = 0x0085;
pub const MULRK: u16 = 0x00BD;
pub const MULBLANK: u16 = 0x00BE;
pub const RSTRING: u16 = 0x00D6;
pub const DBCELL: u16 = 0x00D7;
pub const XF: u16 = 0x00E0;
pub const SST: u16 = 0x00FC;
pub const LABELSST: u16 = 0x00FD;
pub const EXTSST: u16 = 0x00FF;
pub const DIMENSIONS: u16 = 0x0200;
pub const BLANK: u16 = 0x0201;
pub const NUMBER: u16 = 0x0203;
pub const LABEL: u16 = 0x0204;
pub const BOOLERR: u16 = 0x0205;
pub const STRING: u16 = 0x0207;
pub const ROW: u16 = 0x0208;
pub const INDEX: u16 = 0x020B;
pub const ARRAY: u16 = 0x0221;
pub const TABLE: u16 = 0x0236;
pub const RK: u16 = 0x027E;
pub const FORMAT: u16 = 0x041E;
pub const SHRFMLA: u16 = 0x04BC;
pub const BOF: u16 = 0x0809;

/// Largest payload a single BIFF8 record may carry
pub const MAX_RECORD_DATA: usize = 8224;

/// BIFF8 grid limits
pub const MAX_ROWS: u32 = 65_536;
pub const MAX_COLUMNS: u32 = 256;

/// BOF substream types
pub const BOF_WORKBOOK_GLOBALS: u16 = 0x0005;
pub const BOF_WORKSHEET: u16 = 0x0010;

/// Whether a record type is a cell record (its payload starts with row and column)
pub fn is_cell_record(record_type: u16) -> bool {
    matches!(
        record_type,
        BLANK | NUMBER | LABEL | BOOLERR | FORMULA | RK | LABELSST | MULRK | MULBLANK | RSTRING
    )
}

/// Records that only make sense next to the cell record preceding them
pub fn is_cell_follower(record_type: u16) -> bool {
    matches!(record_type, STRING | SHRFMLA | ARRAY | TABLE | CONTINUE)
}

/// A BIFF record: type plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: u16,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(record_type: u16, data: Vec<u8>) -> Self {
        Self { record_type, data }
    }

    /// Write header and payload
    pub fn write_to<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        write_record_header(writer, self.record_type, self.data.len())?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Row index of a cell record
    pub fn cell_row(&self) -> XlsResult<u16> {
        Ok(binary::read_u16_le(&self.data, 0)?)
    }

    /// Column index of a cell record (first column for MULRK/MULBLANK)
    pub fn cell_col(&self) -> XlsResult<u16> {
        Ok(binary::read_u16_le(&self.data, 2)?)
    }
}

/// Write a BIFF record header
///
/// # Arguments
///
/// * `writer` - Output destination
/// * `record_type` - BIFF record type
/// * `data_len` - Payload length, which must fit in one record
pub fn write_record_header<W: Write>(
    writer: &mut W,
    record_type: u16,
    data_len: usize,
) -> XlsResult<()> {
    if data_len > MAX_RECORD_DATA {
        return Err(XlsError::InvalidRecord {
            record_type,
            message: format!("payload of {} bytes exceeds {}", data_len, MAX_RECORD_DATA),
        });
    }
    writer.write_all(&record_type.to_le_bytes())?;
    writer.write_all(&(data_len as u16).to_le_bytes())?;
    Ok(())
}

/// Iterator over the records of a `Workbook` stream
///
/// Yields each record together with the stream offset of its header.
pub struct RecordIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start iterating at an absolute stream offset
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }
}

impl Iterator for RecordIter<'_> {
    type Item = XlsResult<(usize, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Trailing padding shorter than a header, or zero-filled, ends the stream
        if self.pos + 4 > self.data.len() {
            return None;
        }
        let start = self.pos;
        let record_type = u16::from_le_bytes([self.data[start], self.data[start + 1]]);
        let len = u16::from_le_bytes([self.data[start + 2], self.data[start + 3]]) as usize;
        if record_type == 0 && len == 0 {
            return None;
        }

        let end = start + 4 + len;
        if end > self.data.len() {
            self.pos = self.data.len();
            return Some(Err(XlsError::InvalidRecord {
                record_type,
                message: format!("record at offset {} runs past end of stream", start),
            }));
        }
        self.pos = end;
        Some(Ok((
            start,
            Record::new(record_type, self.data[start + 4..end].to_vec()),
        )))
    }
}

/// BOF (Beginning of File) record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BofRecord {
    /// Substream type (workbook globals, worksheet, chart, ...)
    pub substream_type: u16,
}

impl BofRecord {
    /// Parse a BOF payload, rejecting anything older than BIFF8
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 4 {
            return Err(XlsError::InvalidLength {
                expected: 4,
                found: data.len(),
            });
        }
        let version = binary::read_u16_le(data, 0)?;
        if version != 0x0600 {
            return Err(XlsError::UnsupportedBiffVersion(version));
        }
        Ok(BofRecord {
            substream_type: binary::read_u16_le(data, 2)?,
        })
    }
}

/// DIMENSIONS record (used range of a worksheet)
///
/// Row and column upper bounds are exclusive; an empty sheet is all zeroes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionsRecord {
    pub first_row: u32,
    pub last_row_plus1: u32,
    pub first_col: u16,
    pub last_col_plus1: u16,
}

impl DimensionsRecord {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 12 {
            return Err(XlsError::InvalidLength {
                expected: 14,
                found: data.len(),
            });
        }
        Ok(DimensionsRecord {
            first_row: binary::read_u32_le(data, 0)?,
            last_row_plus1: binary::read_u32_le(data, 4)?,
            first_col: binary::read_u16_le(data, 8)?,
            last_col_plus1: binary::read_u16_le(data, 10)?,
        })
    }

    /// Compute the used range from cell coordinates
    pub fn from_cells(cells: impl IntoIterator<Item = (u32, u16)>) -> Self {
        let mut dims: Option<DimensionsRecord> = None;
        for (row, col) in cells {
            let d = dims.get_or_insert(DimensionsRecord {
                first_row: row,
                last_row_plus1: row + 1,
                first_col: col,
                last_col_plus1: col + 1,
            });
            d.first_row = d.first_row.min(row);
            d.last_row_plus1 = d.last_row_plus1.max(row + 1);
            d.first_col = d.first_col.min(col);
            d.last_col_plus1 = d.last_col_plus1.max(col + 1);
        }
        dims.unwrap_or_default()
    }

    pub fn to_record(&self) -> Record {
        let mut data = Vec::with_capacity(14);
        data.extend_from_slice(&self.first_row.to_le_bytes());
        data.extend_from_slice(&self.last_row_plus1.to_le_bytes());
        data.extend_from_slice(&self.first_col.to_le_bytes());
        data.extend_from_slice(&self.last_col_plus1.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        Record::new(DIMENSIONS, data)
    }
}

/// Sheet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetType {
    WorkSheet,
    MacroSheet,
    ChartSheet,
    VBModule,
    Other(u8),
}

impl SheetType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => SheetType::WorkSheet,
            0x01 => SheetType::MacroSheet,
            0x02 => SheetType::ChartSheet,
            0x06 => SheetType::VBModule,
            v => SheetType::Other(v),
        }
    }
}

/// BoundSheet8 record (worksheet metadata)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSheetRecord {
    /// Stream offset of the sheet's BOF record
    pub position: u32,
    /// Visibility byte (hidden state), kept as stored
    pub visibility: u8,
    pub sheet_type: SheetType,
    pub name: String,
}

impl BoundSheetRecord {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 8 {
            return Err(XlsError::InvalidLength {
                expected: 8,
                found: data.len(),
            });
        }

        let position = binary::read_u32_le(data, 0)?;
        let (name, _) = strings::read_short_unicode_string(data, 6)?;

        Ok(BoundSheetRecord {
            position,
            visibility: data[4],
            sheet_type: SheetType::from_u8(data[5]),
            name,
        })
    }
}

bitflags! {
    /// Option flags of a ROW record (first grbit word)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RowOptions: u16 {
        const OUTLINE_LEVEL = 0x0007;
        const COLLAPSED = 0x0010;
        const HIDDEN = 0x0020;
        /// Height was set explicitly rather than fitted to the font
        const CUSTOM_HEIGHT = 0x0040;
        /// Row carries a default cell format in `ixfe`
        const FORMATTED = 0x0080;
        /// Always set by Excel
        const RESERVED = 0x0100;
    }
}

/// Default cell format index used by rows without their own format
pub const DEFAULT_XF: u16 = 0x000F;

/// ROW record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRecord {
    pub row: u16,
    pub first_col: u16,
    pub last_col_plus1: u16,
    /// Height in twips; bit 15 set means default height
    pub height: u16,
    pub options: RowOptions,
    /// Low 12 bits: default XF; high bits: thick-border and phonetic flags
    pub xf_word: u16,
}

impl RowRecord {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 16 {
            return Err(XlsError::InvalidLength {
                expected: 16,
                found: data.len(),
            });
        }
        Ok(RowRecord {
            row: binary::read_u16_le(data, 0)?,
            first_col: binary::read_u16_le(data, 2)?,
            last_col_plus1: binary::read_u16_le(data, 4)?,
            height: binary::read_u16_le(data, 6)?,
            options: RowOptions::from_bits_retain(binary::read_u16_le(data, 12)?),
            xf_word: binary::read_u16_le(data, 14)?,
        })
    }

    /// A row with default height and no formatting
    pub fn new(row: u16) -> Self {
        RowRecord {
            row,
            first_col: 0,
            last_col_plus1: 0,
            height: 0x00FF,
            options: RowOptions::RESERVED,
            xf_word: DEFAULT_XF,
        }
    }

    pub fn to_record(&self) -> Record {
        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&self.row.to_le_bytes());
        data.extend_from_slice(&self.first_col.to_le_bytes());
        data.extend_from_slice(&self.last_col_plus1.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&self.options.bits().to_le_bytes());
        data.extend_from_slice(&self.xf_word.to_le_bytes());
        Record::new(ROW, data)
    }
}
