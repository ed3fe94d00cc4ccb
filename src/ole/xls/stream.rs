//! Record-level view of a `Workbook` stream
//!
//! A [`BookStream`] splits the stream into its globals substream and one
//! record list per BOUNDSHEET. Records are kept as stored so that anything
//! not explicitly rewritten survives a round trip byte for byte.
//!
//! Three kinds of records carry stream offsets and are rebuilt on every
//! serialization:
//!
//! - the SST and EXTSST (collapsed into a single slot while parsed, see
//!   [`SharedStrings`])
//! - BOUNDSHEET `lbPlyPos`
//! - INDEX and DBCELL in each worksheet

use std::collections::BTreeMap;

use crate::common::binary;
use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::xls::records::{
    BOF, BOF_WORKBOOK_GLOBALS, BOUNDSHEET, BofRecord, BoundSheetRecord, CONTINUE, DBCELL,
    DEFCOLWIDTH, DIMENSIONS, DimensionsRecord, EOF, EXTSST, INDEX, LABELSST, MULBLANK, MULRK,
    ROW, Record, RecordIter, RowRecord, SST, is_cell_follower, is_cell_record,
    write_record_header,
};
use crate::ole::xls::sst::SharedStrings;

/// Excel refuses `Workbook` streams shorter than this
const MIN_STREAM_SIZE: usize = 4096;

/// ROW records per cell block
pub const ROWS_PER_BLOCK: usize = 32;

/// Encoded size of a ROW record, header included
const ROW_RECORD_SIZE: usize = 20;

/// Parsed `Workbook` stream
#[derive(Debug, Clone)]
pub struct BookStream {
    /// Globals substream, BOF through EOF; the SST is an empty placeholder
    pub globals: Vec<Record>,
    /// One substream per BOUNDSHEET, in BOUNDSHEET order
    pub sheets: Vec<Vec<Record>>,
    pub shared_strings: SharedStrings,
}

impl BookStream {
    /// Split a `Workbook` stream into substreams
    pub fn parse(stream: &[u8]) -> XlsResult<Self> {
        let records: Vec<(usize, Record)> = RecordIter::new(stream).collect::<XlsResult<_>>()?;

        let (first_offset, first) = records
            .first()
            .ok_or_else(|| XlsError::InvalidData("empty Workbook stream".to_string()))?;
        if first.record_type != BOF || *first_offset != 0 {
            return Err(XlsError::InvalidRecord {
                record_type: first.record_type,
                message: "stream does not start with BOF".to_string(),
            });
        }
        let bof = BofRecord::parse(&first.data)?;
        if bof.substream_type != BOF_WORKBOOK_GLOBALS {
            return Err(XlsError::InvalidData(format!(
                "first substream has type 0x{:04X}, expected workbook globals",
                bof.substream_type
            )));
        }

        let (globals, shared_strings) = Self::collect_globals(&records)?;

        let mut sheets = Vec::new();
        for record in globals.iter().filter(|r| r.record_type == BOUNDSHEET) {
            let bound = BoundSheetRecord::parse(&record.data)?;
            let start = records
                .binary_search_by_key(&(bound.position as usize), |(offset, _)| *offset)
                .map_err(|_| {
                    XlsError::InvalidData(format!(
                        "sheet '{}' points at offset {} which is not a record",
                        bound.name, bound.position
                    ))
                })?;
            sheets.push(Self::collect_substream(&records[start..])?);
        }

        Ok(BookStream {
            globals,
            sheets,
            shared_strings,
        })
    }

    /// Globals records up to and including EOF, with SST collapsed
    fn collect_globals(records: &[(usize, Record)]) -> XlsResult<(Vec<Record>, SharedStrings)> {
        let mut globals = Vec::new();
        let mut shared_strings = None;
        let mut i = 0;
        while i < records.len() {
            let record = &records[i].1;
            match record.record_type {
                SST => {
                    let mut fragments: Vec<&[u8]> = vec![record.data.as_slice()];
                    while let Some((_, next)) = records.get(i + 1)
                        && next.record_type == CONTINUE
                    {
                        fragments.push(next.data.as_slice());
                        i += 1;
                    }
                    shared_strings = Some(SharedStrings::parse(&fragments)?);
                    globals.push(Record::new(SST, Vec::new()));
                },
                // Regenerated alongside the SST
                EXTSST => {},
                EOF => {
                    if shared_strings.is_none() {
                        globals.push(Record::new(SST, Vec::new()));
                    }
                    globals.push(record.clone());
                    return Ok((globals, shared_strings.unwrap_or_default()));
                },
                _ => globals.push(record.clone()),
            }
            i += 1;
        }
        Err(XlsError::InvalidData(
            "workbook globals have no EOF record".to_string(),
        ))
    }

    /// One substream from its BOF to the matching EOF
    fn collect_substream(records: &[(usize, Record)]) -> XlsResult<Vec<Record>> {
        let mut out = Vec::new();
        let mut depth = 0usize;
        for (_, record) in records {
            match record.record_type {
                BOF => depth += 1,
                EOF => depth = depth.saturating_sub(1),
                _ => {},
            }
            out.push(record.clone());
            if depth == 0 {
                return Ok(out);
            }
        }
        Err(XlsError::InvalidData(
            "sheet substream has no EOF record".to_string(),
        ))
    }

    /// BOUNDSHEET records in order
    pub fn bound_sheets(&self) -> XlsResult<Vec<BoundSheetRecord>> {
        self.globals
            .iter()
            .filter(|r| r.record_type == BOUNDSHEET)
            .map(|r| BoundSheetRecord::parse(&r.data))
            .collect()
    }

    /// Position of a sheet by name (case-insensitive, as Excel compares)
    pub fn sheet_index(&self, name: &str) -> XlsResult<Option<usize>> {
        let wanted = name.to_lowercase();
        Ok(self
            .bound_sheets()?
            .iter()
            .position(|b| b.name.to_lowercase() == wanted))
    }

    /// Serialize the stream, recomputing every stream offset
    pub fn to_bytes(&self) -> XlsResult<Vec<u8>> {
        let cst_total = self
            .sheets
            .iter()
            .flatten()
            .filter(|r| r.record_type == LABELSST)
            .count() as u32;

        let mut out = Vec::new();
        let mut bound_sheet_at = Vec::new();
        for record in &self.globals {
            match record.record_type {
                SST => self.shared_strings.write_to(&mut out, cst_total)?,
                BOUNDSHEET => {
                    bound_sheet_at.push(out.len());
                    record.write_to(&mut out)?;
                },
                _ => record.write_to(&mut out)?,
            }
        }

        if bound_sheet_at.len() != self.sheets.len() {
            return Err(XlsError::InvalidData(format!(
                "{} BOUNDSHEET records for {} sheets",
                bound_sheet_at.len(),
                self.sheets.len()
            )));
        }
        for (sheet, at) in self.sheets.iter().zip(bound_sheet_at) {
            let position = u32::try_from(out.len())
                .map_err(|_| XlsError::InvalidData("Workbook stream exceeds 4 GiB".to_string()))?;
            out[at + 4..at + 8].copy_from_slice(&position.to_le_bytes());
            write_sheet(sheet, &mut out)?;
        }

        if out.len() < MIN_STREAM_SIZE {
            out.resize(MIN_STREAM_SIZE, 0);
        }
        Ok(out)
    }
}

/// Tracks positions inside one cell block for its DBCELL
#[derive(Default)]
struct BlockOffsets {
    first_row_at: Option<usize>,
    row_records: usize,
    last_cell_row: Option<u16>,
    cell_starts: Vec<usize>,
}

impl BlockOffsets {
    fn row(&mut self, pos: usize) {
        self.first_row_at.get_or_insert(pos);
        self.row_records += 1;
    }

    fn cell(&mut self, pos: usize, row: u16) {
        if self.last_cell_row != Some(row) {
            self.cell_starts.push(pos);
            self.last_cell_row = Some(row);
        }
    }

    /// DBCELL payload for a DBCELL written at `pos`; resets the block
    fn finish(&mut self, pos: usize) -> Vec<u8> {
        let block = std::mem::take(self);
        let first_row = block.first_row_at.unwrap_or(pos);

        let mut data = Vec::with_capacity(4 + block.cell_starts.len() * 2);
        data.extend_from_slice(&((pos - first_row) as u32).to_le_bytes());

        // First offset is measured from the second ROW record
        let mut reference = if block.row_records > 0 {
            first_row + ROW_RECORD_SIZE
        } else {
            first_row
        };
        for start in block.cell_starts {
            let offset = start.saturating_sub(reference) as u16;
            data.extend_from_slice(&offset.to_le_bytes());
            reference = start;
        }
        data
    }
}

/// Write one sheet substream, regenerating INDEX and DBCELL
fn write_sheet(records: &[Record], out: &mut Vec<u8>) -> XlsResult<()> {
    let dbcell_count = records.iter().filter(|r| r.record_type == DBCELL).count();

    let mut index_at = None;
    let mut defcolwidth_at = 0usize;
    let mut dimensions: Option<DimensionsRecord> = None;
    let mut dbcells = Vec::with_capacity(dbcell_count);
    let mut block = BlockOffsets::default();

    for record in records {
        let pos = out.len();
        match record.record_type {
            INDEX if index_at.is_none() => {
                index_at = Some(pos);
                let len = 16 + dbcell_count * 4;
                write_record_header(out, INDEX, len)?;
                out.resize(out.len() + len, 0);
            },
            DEFCOLWIDTH => {
                defcolwidth_at = pos;
                record.write_to(out)?;
            },
            // Embedded chart substreams carry their own DIMENSIONS
            DIMENSIONS if dimensions.is_none() => {
                dimensions = Some(DimensionsRecord::parse(&record.data)?);
                record.write_to(out)?;
            },
            ROW => {
                block.row(pos);
                record.write_to(out)?;
            },
            DBCELL => {
                dbcells.push(pos);
                Record::new(DBCELL, block.finish(pos)).write_to(out)?;
            },
            t if is_cell_record(t) => {
                block.cell(pos, record.cell_row()?);
                record.write_to(out)?;
            },
            _ => record.write_to(out)?,
        }
    }

    if let Some(at) = index_at {
        let dimensions = dimensions.unwrap_or_default();
        let mut data = Vec::with_capacity(16 + dbcells.len() * 4);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&dimensions.first_row.to_le_bytes());
        data.extend_from_slice(&dimensions.last_row_plus1.to_le_bytes());
        data.extend_from_slice(&(defcolwidth_at as u32).to_le_bytes());
        for pos in dbcells {
            data.extend_from_slice(&(pos as u32).to_le_bytes());
        }
        out[at + 4..at + 4 + data.len()].copy_from_slice(&data);
    }
    Ok(())
}

/// One row of a cell table being assembled
#[derive(Debug, Clone)]
pub struct RowEntry {
    pub index: u16,
    pub row: Option<RowRecord>,
    /// Cell records in column order, each followed by its own STRING etc.
    pub cells: Vec<Record>,
}

/// Columns covered by a cell record
fn cell_columns(record: &Record) -> XlsResult<(u16, u16)> {
    let first = record.cell_col()?;
    let last = match record.record_type {
        MULRK | MULBLANK => binary::read_u16_le(&record.data, record.data.len().saturating_sub(2))?,
        _ => first,
    };
    Ok((first, last))
}

/// Replace a worksheet's cell table
///
/// Rows of the existing table for which `keep_row` holds are retained
/// together with their cells (and the records trailing those cells); all
/// other rows are dropped. The new rows are merged in, the table is laid
/// out in blocks of [`ROWS_PER_BLOCK`] rows, and DIMENSIONS is recomputed.
///
/// # Arguments
///
/// * `records` - The sheet substream
/// * `keep_row` - Selects existing rows to retain
/// * `new_rows` - Rows to add; indices must not collide with retained rows
pub fn replace_cell_table(
    records: &mut Vec<Record>,
    keep_row: impl Fn(u16) -> bool,
    new_rows: Vec<RowEntry>,
) -> XlsResult<()> {
    let dims_at = records
        .iter()
        .position(|r| r.record_type == DIMENSIONS)
        .ok_or_else(|| XlsError::InvalidData("sheet has no DIMENSIONS record".to_string()))?;
    let table_end = records[dims_at + 1..]
        .iter()
        .position(|r| {
            !(r.record_type == ROW
                || r.record_type == DBCELL
                || is_cell_record(r.record_type)
                || is_cell_follower(r.record_type))
        })
        .map_or(records.len(), |p| dims_at + 1 + p);

    let mut rows: BTreeMap<u16, RowEntry> = BTreeMap::new();
    let mut keeping_cell = false;
    let mut current_row = 0u16;
    for record in &records[dims_at + 1..table_end] {
        match record.record_type {
            ROW => {
                let row = RowRecord::parse(&record.data)?;
                if keep_row(row.row) {
                    entry(&mut rows, row.row).row = Some(row);
                }
            },
            DBCELL => {},
            t if is_cell_record(t) => {
                current_row = record.cell_row()?;
                keeping_cell = keep_row(current_row);
                if keeping_cell {
                    entry(&mut rows, current_row).cells.push(record.clone());
                }
            },
            _ => {
                if keeping_cell {
                    entry(&mut rows, current_row).cells.push(record.clone());
                }
            },
        }
    }

    for new_row in new_rows {
        if rows.contains_key(&new_row.index) {
            return Err(XlsError::InvalidData(format!(
                "row {} is both retained and rebuilt",
                new_row.index
            )));
        }
        rows.insert(new_row.index, new_row);
    }

    let mut coordinates = Vec::new();
    for entry in rows.values() {
        for cell in entry.cells.iter().filter(|c| is_cell_record(c.record_type)) {
            let (first, last) = cell_columns(cell)?;
            coordinates.push((entry.index as u32, first));
            coordinates.push((entry.index as u32, last));
        }
    }
    let dimensions = DimensionsRecord::from_cells(coordinates);

    let entries: Vec<RowEntry> = rows.into_values().collect();
    let mut table = Vec::new();
    for chunk in entries.chunks(ROWS_PER_BLOCK) {
        table.extend(chunk.iter().filter_map(|e| e.row.map(|r| r.to_record())));
        for entry in chunk {
            table.extend(entry.cells.iter().cloned());
        }
        table.push(Record::new(DBCELL, Vec::new()));
    }

    records[dims_at] = dimensions.to_record();
    records.splice(dims_at + 1..table_end, table);
    Ok(())
}

fn entry(rows: &mut BTreeMap<u16, RowEntry>, index: u16) -> &mut RowEntry {
    rows.entry(index).or_insert_with(|| RowEntry {
        index,
        row: None,
        cells: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::xls::testutil::{BookBuilder, label_cell, number_cell};

    #[test]
    fn test_parse_and_serialize_round_trip() {
        let stream = BookBuilder::new()
            .sheet("Invoices", |s| {
                s.header(&["IDINVC", "AMOUNT"]);
                s.row(&[label_cell("100"), number_cell(5.0)]);
            })
            .sheet("Invoice_Details", |s| {
                s.header(&["CNTITEM"]);
            })
            .stream();

        let book = BookStream::parse(&stream).unwrap();
        assert_eq!(book.sheets.len(), 2);
        assert_eq!(book.sheet_index("invoice_details").unwrap(), Some(1));
        assert!(book.shared_strings.len() >= 3);

        let again = book.to_bytes().unwrap();
        assert!(again.len() >= MIN_STREAM_SIZE);
        let reparsed = BookStream::parse(&again).unwrap();
        assert_eq!(reparsed.sheets, book.sheets);
        assert_eq!(reparsed.globals, book.globals);
    }

    #[test]
    fn test_boundsheet_offsets_point_at_bof() {
        let stream = BookBuilder::new()
            .sheet("A", |s| s.header(&["x"]))
            .sheet("B", |s| s.header(&["y"]))
            .stream();
        let mut book = BookStream::parse(&stream).unwrap();
        // Grow the globals so every offset moves
        for i in 0..500 {
            book.shared_strings.intern(&format!("padding {}", i));
        }
        let out = book.to_bytes().unwrap();
        let reparsed = BookStream::parse(&out).unwrap();
        for bound in reparsed.bound_sheets().unwrap() {
            let at = bound.position as usize;
            assert_eq!(&out[at..at + 2], &BOF.to_le_bytes());
        }
    }

    #[test]
    fn test_index_and_dbcell_regenerated() {
        let stream = BookBuilder::new()
            .sheet("Data", |s| {
                s.header(&["IDINVC"]);
                for i in 0..40 {
                    s.row(&[number_cell(i as f64)]);
                }
            })
            .stream();
        let book = BookStream::parse(&stream).unwrap();
        let out = book.to_bytes().unwrap();

        let records: Vec<(usize, Record)> =
            RecordIter::new(&out).collect::<XlsResult<_>>().unwrap();
        let index = records
            .iter()
            .find(|(_, r)| r.record_type == INDEX)
            .map(|(_, r)| r.clone())
            .unwrap();
        let dbcell_offsets: Vec<usize> = records
            .iter()
            .filter(|(_, r)| r.record_type == DBCELL)
            .map(|(o, _)| *o)
            .collect();
        // 41 rows in blocks of 32
        assert_eq!(dbcell_offsets.len(), 2);
        assert_eq!(index.data.len(), 16 + 2 * 4);
        assert_eq!(&index.data[8..12], &41u32.to_le_bytes());
        for (i, offset) in dbcell_offsets.iter().enumerate() {
            let at = 16 + i * 4;
            assert_eq!(&index.data[at..at + 4], &(*offset as u32).to_le_bytes());
        }

        // dbRtrw of each DBCELL points back at a ROW record
        for offset in dbcell_offsets {
            let dbcell = &records.iter().find(|(o, _)| *o == offset).unwrap().1;
            let back = u32::from_le_bytes(dbcell.data[0..4].try_into().unwrap()) as usize;
            let row_at = offset - back;
            assert_eq!(&out[row_at..row_at + 2], &ROW.to_le_bytes());
        }
    }

    #[test]
    fn test_replace_cell_table_keeps_header() {
        let stream = BookBuilder::new()
            .sheet("Data", |s| {
                s.header(&["IDINVC", "NAME"]);
                s.row(&[number_cell(1.0), label_cell("a")]);
                s.row(&[number_cell(2.0), label_cell("b")]);
            })
            .stream();
        let mut book = BookStream::parse(&stream).unwrap();

        let new_row = RowEntry {
            index: 1,
            row: Some(RowRecord::new(1)),
            cells: vec![crate::ole::xls::writer::biff::number(
                1,
                3,
                crate::ole::xls::style::StyleId(15),
                9.0,
            )],
        };
        replace_cell_table(&mut book.sheets[0], |r| r == 0, vec![new_row]).unwrap();

        let sheet = &book.sheets[0];
        let cell_rows: Vec<u16> = sheet
            .iter()
            .filter(|r| is_cell_record(r.record_type))
            .map(|r| r.cell_row().unwrap())
            .collect();
        assert_eq!(cell_rows, vec![0, 0, 1]);

        let dims = sheet
            .iter()
            .find(|r| r.record_type == DIMENSIONS)
            .map(|r| DimensionsRecord::parse(&r.data).unwrap())
            .unwrap();
        assert_eq!(dims.last_row_plus1, 2);
        assert_eq!(dims.last_col_plus1, 4);

        let collision = RowEntry {
            index: 0,
            row: None,
            cells: Vec::new(),
        };
        assert!(replace_cell_table(&mut book.sheets[0], |r| r == 0, vec![collision]).is_err());
    }

    #[test]
    fn test_missing_eof_is_error() {
        let mut stream = Vec::new();
        Record::new(BOF, vec![0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0])
            .write_to(&mut stream)
            .unwrap();
        assert!(BookStream::parse(&stream).is_err());
    }
}
