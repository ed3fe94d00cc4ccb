//! Worksheet model for XLS files
//!
//! Cell records are decoded into rows of typed [`Cell`]s. MULRK and
//! MULBLANK expand to one cell per column, and a FORMULA whose result is a
//! string picks the text up from the STRING record that follows it.

use std::collections::BTreeMap;

use crate::common::binary;
use crate::ole::xls::cell::{CachedValue, Cell, CellValue, Formula, rk_to_f64};
use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::xls::formula;
use crate::ole::xls::records::{
    BLANK, BOF, BOOLERR, EOF, FORMULA, LABEL, LABELSST, MULBLANK, MULRK, NUMBER, RK, ROW,
    RSTRING, Record, RowOptions, RowRecord, STRING, is_cell_follower,
};
use crate::ole::xls::sst::SharedStrings;
use crate::ole::xls::strings;
use crate::ole::xls::style::StyleId;

/// Height of a row with no ROW record, in twips
const DEFAULT_ROW_HEIGHT: u16 = 0x00FF;

/// A worksheet row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: u32,
    /// Height in twips
    pub height: u16,
    pub options: RowOptions,
    /// Cells in column order
    pub cells: Vec<Cell>,
}

impl Row {
    fn empty(index: u32) -> Self {
        Row {
            index,
            height: DEFAULT_ROW_HEIGHT,
            options: RowOptions::RESERVED,
            cells: Vec::new(),
        }
    }

    /// Cell at a column, if present
    pub fn cell(&self, col: u16) -> Option<&Cell> {
        self.cells
            .binary_search_by_key(&col, |c| c.col)
            .ok()
            .map(|i| &self.cells[i])
    }

    /// Text of the cell at a column; `None` for a missing cell
    pub fn text(&self, col: u16) -> Option<String> {
        self.cell(col).map(|c| c.value.to_text())
    }
}

/// A worksheet: its name and rows in index order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    name: String,
    rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Sheet {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row 0, holding the column names
    pub fn header(&self) -> Option<&Row> {
        self.rows.first().filter(|r| r.index == 0)
    }

    /// Every row after the header
    pub fn data_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.index > 0)
    }

    /// Column whose header text equals `name`
    pub fn column_index(&self, name: &str) -> Option<u16> {
        self.header()?
            .cells
            .iter()
            .find(|c| c.value.to_text() == name)
            .map(|c| c.col)
    }

    /// Decode a worksheet substream
    ///
    /// # Arguments
    ///
    /// * `name` - Sheet name from its BOUNDSHEET record
    /// * `records` - The substream, BOF through EOF
    /// * `sst` - Shared strings referenced by LABELSST records
    pub fn parse(name: &str, records: &[Record], sst: &SharedStrings) -> XlsResult<Self> {
        let mut builder = SheetBuilder::default();
        let mut depth = 0usize;
        for record in records {
            match record.record_type {
                BOF => depth += 1,
                EOF => depth = depth.saturating_sub(1),
                // Records of embedded chart substreams are not cells
                _ if depth > 1 => {},
                _ => builder.record(record, sst)?,
            }
        }
        Ok(Sheet::new(name, builder.finish()))
    }
}

#[derive(Default)]
struct SheetBuilder {
    rows: BTreeMap<u32, Row>,
    cells: BTreeMap<u32, BTreeMap<u16, Cell>>,
    /// Formula waiting for its STRING record
    pending_string: Option<(u32, u16)>,
}

impl SheetBuilder {
    fn put(&mut self, row: u16, col: u16, xf: u16, value: CellValue) {
        self.cells.entry(row as u32).or_default().insert(
            col,
            Cell {
                col,
                value,
                style: StyleId(xf),
            },
        );
    }

    fn record(&mut self, record: &Record, sst: &SharedStrings) -> XlsResult<()> {
        let data = &record.data;
        // SHRFMLA, ARRAY or TABLE may sit between a FORMULA and its STRING
        if !is_cell_follower(record.record_type) {
            self.pending_string = None;
        }
        match record.record_type {
            ROW => {
                let row = RowRecord::parse(data)?;
                self.rows.insert(
                    row.row as u32,
                    Row {
                        index: row.row as u32,
                        height: row.height,
                        options: row.options,
                        cells: Vec::new(),
                    },
                );
            },
            NUMBER => {
                let (row, col, xf) = cell_header(record)?;
                self.put(row, col, xf, CellValue::Number(binary::read_f64_le(data, 6)?));
            },
            RK => {
                let (row, col, xf) = cell_header(record)?;
                let rk = binary::read_u32_le(data, 6)?;
                self.put(row, col, xf, CellValue::Number(rk_to_f64(rk)));
            },
            MULRK => {
                let row = binary::read_u16_le(data, 0)?;
                let first_col = binary::read_u16_le(data, 2)?;
                let count = data.len().saturating_sub(6) / 6;
                for i in 0..count {
                    let at = 4 + i * 6;
                    let xf = binary::read_u16_le(data, at)?;
                    let rk = binary::read_u32_le(data, at + 2)?;
                    self.put(row, first_col.saturating_add(i as u16), xf, CellValue::Number(rk_to_f64(rk)));
                }
            },
            BLANK => {
                let (row, col, xf) = cell_header(record)?;
                self.put(row, col, xf, CellValue::Blank);
            },
            MULBLANK => {
                let row = binary::read_u16_le(data, 0)?;
                let first_col = binary::read_u16_le(data, 2)?;
                let count = data.len().saturating_sub(6) / 2;
                for i in 0..count {
                    let xf = binary::read_u16_le(data, 4 + i * 2)?;
                    self.put(row, first_col.saturating_add(i as u16), xf, CellValue::Blank);
                }
            },
            LABEL | RSTRING => {
                let (row, col, xf) = cell_header(record)?;
                let (text, _) = strings::read_unicode_string(data, 6)?;
                self.put(row, col, xf, CellValue::Text(text));
            },
            LABELSST => {
                let (row, col, xf) = cell_header(record)?;
                let index = binary::read_u32_le(data, 6)?;
                let text = sst.get(index).ok_or_else(|| XlsError::InvalidRecord {
                    record_type: LABELSST,
                    message: format!("string index {} outside table of {}", index, sst.len()),
                })?;
                self.put(row, col, xf, CellValue::Text(text.to_string()));
            },
            BOOLERR => {
                let (row, col, xf) = cell_header(record)?;
                let value = binary::read_u8(data, 6)?;
                let is_error = binary::read_u8(data, 7)? != 0;
                let value = if is_error {
                    CellValue::Error(value)
                } else {
                    CellValue::Boolean(value != 0)
                };
                self.put(row, col, xf, value);
            },
            FORMULA => {
                let (row, col, xf) = cell_header(record)?;
                let formula = parse_formula(record)?;
                // Result type 0 is a string held by the next STRING record
                let awaits_string = data[6] == 0x00 && data[12] == 0xFF && data[13] == 0xFF;
                self.put(row, col, xf, CellValue::Formula(formula));
                if awaits_string {
                    self.pending_string = Some((row as u32, col));
                }
            },
            STRING => {
                if let Some((row, col)) = self.pending_string.take() {
                    let text = read_string_result(data)?;
                    if let Some(Cell {
                        value: CellValue::Formula(f),
                        ..
                    }) = self.cells.get_mut(&row).and_then(|r| r.get_mut(&col))
                    {
                        f.cached = CachedValue::Text(text);
                    }
                }
            },
            _ => {},
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Row> {
        for (index, cells) in std::mem::take(&mut self.cells) {
            self.rows
                .entry(index)
                .or_insert_with(|| Row::empty(index))
                .cells = cells.into_values().collect();
        }
        self.rows.into_values().collect()
    }
}

fn cell_header(record: &Record) -> XlsResult<(u16, u16, u16)> {
    Ok((
        binary::read_u16_le(&record.data, 0)?,
        binary::read_u16_le(&record.data, 2)?,
        binary::read_u16_le(&record.data, 4)?,
    ))
}

/// Text of a STRING record, tolerating a payload cut short by CONTINUE
fn read_string_result(data: &[u8]) -> XlsResult<String> {
    match strings::read_unicode_string(data, 0) {
        Ok((text, _)) => Ok(text),
        Err(_) => {
            let flags = binary::read_u8(data, 2)?;
            Ok(strings::decode_chars(&data[3..], flags & strings::FLAG_HIGH_BYTE != 0))
        },
    }
}

/// Decode a FORMULA record's cached result, flags and parsed expression
fn parse_formula(record: &Record) -> XlsResult<Formula> {
    let data = &record.data;
    if data.len() < 22 {
        return Err(XlsError::InvalidLength {
            expected: 22,
            found: data.len(),
        });
    }

    let cached = if data[12] == 0xFF && data[13] == 0xFF {
        match data[6] {
            // String: text arrives in the following STRING record
            0x00 | 0x03 => CachedValue::Text(String::new()),
            0x01 => CachedValue::Boolean(data[8] != 0),
            0x02 => CachedValue::Error(data[8]),
            _ => CachedValue::Empty,
        }
    } else {
        CachedValue::Number(binary::read_f64_le(data, 6)?)
    };

    let options = binary::read_u16_le(data, 14)?;
    let parsed = data[20..].to_vec();
    let cce = binary::read_u16_le(&parsed, 0)? as usize;
    let portable = if options & Formula::SHARED != 0 || 2 + cce > parsed.len() {
        false
    } else {
        match formula::first_dependency(&parsed[2..2 + cce]) {
            Ok(None) => true,
            Ok(Some(dependency)) => {
                tracing::trace!(?dependency, "formula is tied to its source workbook");
                false
            },
            Err(e) => {
                tracing::debug!(error = %e, "unreadable formula expression");
                false
            },
        }
    };

    Ok(Formula {
        parsed,
        cached,
        options,
        portable,
    })
}
