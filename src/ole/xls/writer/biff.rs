//! BIFF8 cell record encoders
//!
//! Each function produces the record(s) for one cell. Rows are 16-bit in
//! BIFF8; callers check the grid limits before encoding.
//!
//! # References
//!
//! Based on Microsoft's "[MS-XLS]: Excel Binary File Format (.xls) Structure" specification
//! and Apache POI's BIFF record generation.

use crate::ole::xls::XlsResult;
use crate::ole::xls::cell::{CachedValue, Formula};
use crate::ole::xls::records::{
    BLANK, BOOLERR, FORMULA, LABELSST, NUMBER, Record, RecordIter, STRING,
};
use crate::ole::xls::sst::ContinuedRecordWriter;
use crate::ole::xls::strings::{self, FLAG_HIGH_BYTE};
use crate::ole::xls::style::StyleId;

fn cell_data(row: u16, col: u16, xf: StyleId, capacity: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(capacity);
    data.extend_from_slice(&row.to_le_bytes());
    data.extend_from_slice(&col.to_le_bytes());
    data.extend_from_slice(&xf.0.to_le_bytes());
    data
}

/// NUMBER record (floating point cell)
///
/// Record type: 0x0203
///
/// # Arguments
///
/// * `row` - Row index (0-based)
/// * `col` - Column index (0-based)
/// * `xf` - Cell format
/// * `value` - Cell value
pub fn number(row: u16, col: u16, xf: StyleId, value: f64) -> Record {
    let mut data = cell_data(row, col, xf, 14);
    data.extend_from_slice(&value.to_le_bytes());
    Record::new(NUMBER, data)
}

/// LABELSST record (string cell referencing the shared string table)
///
/// Record type: 0x00FD
pub fn label_sst(row: u16, col: u16, xf: StyleId, sst_index: u32) -> Record {
    let mut data = cell_data(row, col, xf, 10);
    data.extend_from_slice(&sst_index.to_le_bytes());
    Record::new(LABELSST, data)
}

/// BOOLERR record holding a boolean
///
/// Record type: 0x0205
pub fn boolean(row: u16, col: u16, xf: StyleId, value: bool) -> Record {
    let mut data = cell_data(row, col, xf, 8);
    data.push(value as u8);
    data.push(0);
    Record::new(BOOLERR, data)
}

/// BOOLERR record holding an error code
pub fn error(row: u16, col: u16, xf: StyleId, code: u8) -> Record {
    let mut data = cell_data(row, col, xf, 8);
    data.push(code);
    data.push(1);
    Record::new(BOOLERR, data)
}

/// BLANK record (formatted empty cell)
///
/// Record type: 0x0201
pub fn blank(row: u16, col: u16, xf: StyleId) -> Record {
    Record::new(BLANK, cell_data(row, col, xf, 6))
}

/// FORMULA record, followed by a STRING record for a text result
///
/// Record type: 0x0006
///
/// The parsed expression is written as given. The shared-formula flag is
/// cleared since the output never carries SHRFMLA records of its own.
///
/// # Returns
///
/// The FORMULA record, plus STRING (and CONTINUE) records when the cached
/// result is non-empty text
pub fn formula(row: u16, col: u16, xf: StyleId, formula: &Formula) -> XlsResult<Vec<Record>> {
    let mut data = cell_data(row, col, xf, 20 + formula.parsed.len());

    let mut string_result = None;
    let value: [u8; 8] = match &formula.cached {
        CachedValue::Number(n) => n.to_le_bytes(),
        CachedValue::Text(s) if s.is_empty() => [0x03, 0, 0, 0, 0, 0, 0xFF, 0xFF],
        CachedValue::Text(s) => {
            string_result = Some(s.as_str());
            [0x00, 0, 0, 0, 0, 0, 0xFF, 0xFF]
        },
        CachedValue::Boolean(b) => [0x01, 0, *b as u8, 0, 0, 0, 0xFF, 0xFF],
        CachedValue::Error(code) => [0x02, 0, *code, 0, 0, 0, 0xFF, 0xFF],
        CachedValue::Empty => [0x03, 0, 0, 0, 0, 0, 0xFF, 0xFF],
    };
    data.extend_from_slice(&value);
    data.extend_from_slice(&(formula.options & !Formula::SHARED).to_le_bytes());
    // chn: reserved
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&formula.parsed);

    let mut records = vec![Record::new(FORMULA, data)];
    if let Some(text) = string_result {
        records.extend(string_records(text)?);
    }
    Ok(records)
}

/// STRING record (formula text result), continued as needed
///
/// Record type: 0x0207
fn string_records(value: &str) -> XlsResult<Vec<Record>> {
    let cch = u16::try_from(strings::char_count(value)).map_err(|_| {
        crate::ole::xls::XlsError::InvalidData("formula result is too long".to_string())
    })?;
    let (flags, bytes) = strings::encode_chars(value);
    let width = if flags & FLAG_HIGH_BYTE != 0 { 2 } else { 1 };

    let mut buffer = Vec::new();
    let mut writer = ContinuedRecordWriter::new(&mut buffer, STRING);
    writer.push(&cch.to_le_bytes());
    writer.push(&[flags]);
    writer.push_chars(flags, width, &bytes);
    writer.finish();

    RecordIter::new(&buffer)
        .map(|item| item.map(|(_, record)| record))
        .collect()
}
