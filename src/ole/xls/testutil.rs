//! Workbook fixtures for tests
//!
//! Builds small but well-formed BIFF8 workbooks: default globals (four
//! fonts, fifteen style XFs and the default cell XF 15), one worksheet
//! substream per sheet and an SST holding every label.

use crate::ole::writer::OleWriter;
use crate::ole::xls::cell::{CellValue, Formula};
use crate::ole::xls::records::{
    BOF, BOUNDSHEET, DEFCOLWIDTH, DimensionsRecord, EOF, INDEX, Record, RowOptions, RowRecord,
    SST,
};
use crate::ole::xls::sst::SharedStrings;
use crate::ole::xls::stream::{self, BookStream, RowEntry};
use crate::ole::xls::strings;
use crate::ole::xls::style::{
    CellStyle, FIRST_CUSTOM_FORMAT, Font, FontId, NumberFormat, StyleId, XfProtection,
};
use crate::ole::xls::writer::biff;

const CODEPAGE: u16 = 0x0042;
const STYLE: u16 = 0x0293;
const WINDOW2: u16 = 0x023E;

/// Index of the default cell XF in every builder workbook
pub const DEFAULT_STYLE: StyleId = StyleId(15);

fn bof(substream_type: u16) -> Record {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(&0x0600u16.to_le_bytes());
    data.extend_from_slice(&substream_type.to_le_bytes());
    data.extend_from_slice(&0x0DBBu16.to_le_bytes());
    data.extend_from_slice(&0x07CCu16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0x0006u32.to_le_bytes());
    Record::new(BOF, data)
}

/// XF appearance bytes: bottom aligned, automatic fill colors
fn plain_attributes() -> [u8; 14] {
    let mut attributes = [0u8; 14];
    attributes[0] = 0x20;
    attributes[12] = 0xC0;
    attributes[13] = 0x20;
    attributes
}

/// A cell to place in a fixture row
#[derive(Debug, Clone)]
pub struct TestCell {
    value: CellValue,
    style: StyleId,
}

impl TestCell {
    pub fn styled(mut self, style: StyleId) -> Self {
        self.style = style;
        self
    }
}

fn test_cell(value: CellValue) -> TestCell {
    TestCell {
        value,
        style: DEFAULT_STYLE,
    }
}

pub fn label_cell(text: &str) -> TestCell {
    test_cell(CellValue::Text(text.to_string()))
}

pub fn number_cell(value: f64) -> TestCell {
    test_cell(CellValue::Number(value))
}

pub fn bool_cell(value: bool) -> TestCell {
    test_cell(CellValue::Boolean(value))
}

pub fn blank_cell() -> TestCell {
    test_cell(CellValue::Blank)
}

pub fn error_cell(code: u8) -> TestCell {
    test_cell(CellValue::Error(code))
}

pub fn formula_cell(formula: Formula) -> TestCell {
    test_cell(CellValue::Formula(formula))
}

struct TestRow {
    height: Option<u16>,
    cells: Vec<(u16, TestCell)>,
}

/// Rows of one fixture worksheet, indexed in the order they are added
#[derive(Default)]
pub struct TestSheet {
    rows: Vec<TestRow>,
}

impl TestSheet {
    /// Row of column names
    pub fn header(&mut self, names: &[&str]) {
        let cells: Vec<TestCell> = names.iter().map(|n| label_cell(n)).collect();
        self.row(&cells);
    }

    /// Row with cells in consecutive columns from 0
    pub fn row(&mut self, cells: &[TestCell]) {
        self.sparse_row(
            &cells
                .iter()
                .enumerate()
                .map(|(col, cell)| (col as u16, cell.clone()))
                .collect::<Vec<_>>(),
        );
    }

    /// Row with cells at the given columns
    pub fn sparse_row(&mut self, cells: &[(u16, TestCell)]) {
        self.rows.push(TestRow {
            height: None,
            cells: cells.to_vec(),
        });
    }

    /// Row with an explicit height in twips
    pub fn tall_row(&mut self, height: u16, cells: &[TestCell]) {
        self.row(cells);
        if let Some(last) = self.rows.last_mut() {
            last.height = Some(height);
        }
    }

    fn entries(&self, sst: &mut SharedStrings) -> Vec<RowEntry> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let index = index as u16;
                let mut record = RowRecord::new(index);
                if let Some(height) = row.height {
                    record.height = height;
                    record.options |= RowOptions::CUSTOM_HEIGHT;
                }
                if let (Some(first), Some(last)) = (row.cells.first(), row.cells.last()) {
                    record.first_col = first.0;
                    record.last_col_plus1 = last.0 + 1;
                }
                let cells = row
                    .cells
                    .iter()
                    .flat_map(|(col, cell)| encode_cell(index, *col, cell, sst))
                    .collect();
                RowEntry {
                    index,
                    row: Some(record),
                    cells,
                }
            })
            .collect()
    }
}

fn encode_cell(row: u16, col: u16, cell: &TestCell, sst: &mut SharedStrings) -> Vec<Record> {
    let xf = cell.style;
    match &cell.value {
        CellValue::Text(s) => vec![biff::label_sst(row, col, xf, sst.intern(s))],
        CellValue::Number(n) => vec![biff::number(row, col, xf, *n)],
        CellValue::Boolean(b) => vec![biff::boolean(row, col, xf, *b)],
        CellValue::Error(code) => vec![biff::error(row, col, xf, *code)],
        CellValue::Blank => vec![biff::blank(row, col, xf)],
        CellValue::Formula(f) => biff::formula(row, col, xf, f).unwrap(),
    }
}

/// Builder for fixture workbooks
pub struct BookBuilder {
    fonts: Vec<Font>,
    formats: Vec<NumberFormat>,
    styles: Vec<CellStyle>,
    sheets: Vec<(String, TestSheet)>,
}

impl BookBuilder {
    pub fn new() -> Self {
        let style_xf = CellStyle {
            font: FontId(0),
            format: 0,
            protection: XfProtection::LOCKED | XfProtection::STYLE,
            parent: 0x0FFF,
            attributes: plain_attributes(),
        };
        let mut styles = vec![style_xf; 15];
        styles.push(CellStyle {
            font: FontId(0),
            format: 0,
            protection: XfProtection::LOCKED,
            parent: 0,
            attributes: plain_attributes(),
        });

        BookBuilder {
            fonts: vec![Font::default(); 4],
            formats: Vec::new(),
            styles,
            sheets: Vec::new(),
        }
    }

    pub fn add_font(&mut self, font: Font) -> FontId {
        self.fonts.push(font);
        FontId::from_position(self.fonts.len() - 1)
    }

    pub fn add_format(&mut self, code: &str) -> u16 {
        let index = FIRST_CUSTOM_FORMAT + self.formats.len() as u16;
        self.formats.push(NumberFormat {
            index,
            code: code.to_string(),
        });
        index
    }

    /// Cell XF using a font and number format
    pub fn add_style(&mut self, font: FontId, format: u16) -> StyleId {
        self.styles.push(CellStyle {
            font,
            format,
            protection: XfProtection::LOCKED,
            parent: 0,
            attributes: plain_attributes(),
        });
        StyleId(self.styles.len() as u16 - 1)
    }

    pub fn sheet(mut self, name: &str, build: impl FnOnce(&mut TestSheet)) -> Self {
        let mut sheet = TestSheet::default();
        build(&mut sheet);
        self.sheets.push((name.to_string(), sheet));
        self
    }

    /// The `Workbook` stream
    pub fn stream(&self) -> Vec<u8> {
        let mut globals = vec![bof(0x0005), Record::new(CODEPAGE, 1200u16.to_le_bytes().to_vec())];
        globals.extend(self.fonts.iter().map(|f| f.to_record().unwrap()));
        globals.extend(self.formats.iter().map(|f| f.to_record().unwrap()));
        globals.extend(self.styles.iter().map(CellStyle::to_record));
        globals.push(Record::new(STYLE, vec![0x00, 0x80, 0x00, 0xFF]));
        for (name, _) in &self.sheets {
            let mut data = vec![0, 0, 0, 0, 0, 0];
            strings::write_short_unicode_string(&mut data, name).unwrap();
            globals.push(Record::new(BOUNDSHEET, data));
        }
        globals.push(Record::new(SST, Vec::new()));
        globals.push(Record::new(EOF, Vec::new()));

        let mut shared_strings = SharedStrings::new();
        let mut sheets = Vec::new();
        for (_, sheet) in &self.sheets {
            let mut records = vec![
                bof(0x0010),
                Record::new(INDEX, Vec::new()),
                Record::new(DEFCOLWIDTH, 8u16.to_le_bytes().to_vec()),
                DimensionsRecord::default().to_record(),
                Record::new(WINDOW2, {
                    let mut window = vec![0u8; 18];
                    window[0] = 0xB6;
                    window[1] = 0x06;
                    window[6] = 0x40;
                    window
                }),
                Record::new(EOF, Vec::new()),
            ];
            let entries = sheet.entries(&mut shared_strings);
            stream::replace_cell_table(&mut records, |_| false, entries).unwrap();
            sheets.push(records);
        }

        BookStream {
            globals,
            sheets,
            shared_strings,
        }
        .to_bytes()
        .unwrap()
    }

    /// A complete `.xls` file
    pub fn bytes(&self) -> Vec<u8> {
        let mut writer = OleWriter::new();
        writer.create_stream(&["Workbook"], &self.stream()).unwrap();
        writer
            .create_stream(&["\u{5}SummaryInformation"], &[0xFE, 0xFF, 0, 0])
            .unwrap();
        writer.to_bytes().unwrap()
    }
}
