//! Template-backed workbook for writing
//!
//! An [`XlsDocument`] starts as a parsed copy of an existing `.xls` file and
//! is edited in place: fonts, number formats and cell formats are appended
//! to the globals, strings are interned into the SST, and worksheet cell
//! tables are replaced. Every other stream of the compound file and every
//! record not touched by an edit is written back unchanged.

use std::collections::BTreeMap;
use std::io::Cursor;

use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::xls::records::{BOUNDSHEET, FONT, FORMAT, Record, XF};
use crate::ole::xls::stream::{self, BookStream, RowEntry};
use crate::ole::xls::style::{
    CellStyle, FIRST_CUSTOM_FORMAT, Font, FontId, MAX_FONT_INDEX, MAX_STYLES, NumberFormat,
    StyleId,
};
use crate::ole::xls::workbook::workbook_stream_name;
use crate::ole::{CompoundSnapshot, OleFile};

/// An editable `.xls` workbook
#[derive(Debug, Clone)]
pub struct XlsDocument {
    container: CompoundSnapshot,
    stream_name: String,
    book: BookStream,
    font_count: usize,
    style_count: usize,
    /// Custom format code to index
    format_codes: BTreeMap<String, u16>,
    next_format: u16,
}

impl XlsDocument {
    /// Open a workbook from the bytes of an `.xls` file
    pub fn from_bytes(data: &[u8]) -> XlsResult<Self> {
        let mut ole = OleFile::open(Cursor::new(data))?;
        let container = ole.snapshot()?;
        let stream_name = workbook_stream_name(&container)?;
        let workbook = container
            .stream(&stream_name)
            .ok_or(XlsError::MissingWorkbookStream)?;
        let book = BookStream::parse(workbook)?;

        let count = |record_type: u16| {
            book.globals
                .iter()
                .filter(|r| r.record_type == record_type)
                .count()
        };
        let font_count = count(FONT);
        let style_count = count(XF);

        let mut format_codes = BTreeMap::new();
        let mut next_format = FIRST_CUSTOM_FORMAT;
        for record in book.globals.iter().filter(|r| r.record_type == FORMAT) {
            let format = NumberFormat::parse(&record.data)?;
            if !NumberFormat::is_builtin(format.index) {
                next_format = next_format.max(format.index.saturating_add(1));
                format_codes.entry(format.code).or_insert(format.index);
            }
        }

        Ok(XlsDocument {
            container,
            stream_name,
            book,
            font_count,
            style_count,
            format_codes,
            next_format,
        })
    }

    /// Position of a sheet by name
    pub fn sheet_index(&self, name: &str) -> XlsResult<Option<usize>> {
        self.book.sheet_index(name)
    }

    pub fn font_count(&self) -> usize {
        self.font_count
    }

    pub fn style_count(&self) -> usize {
        self.style_count
    }

    /// Insert `record` after the last record of `record_type`, or before the
    /// first record of `fallback` when there is none
    fn insert_global(&mut self, record: Record, record_type: u16, fallback: u16) -> XlsResult<()> {
        let globals = &mut self.book.globals;
        let at = match globals.iter().rposition(|r| r.record_type == record_type) {
            Some(last) => last + 1,
            None => globals
                .iter()
                .position(|r| r.record_type == fallback)
                .ok_or_else(|| {
                    XlsError::InvalidData(format!(
                        "globals have neither 0x{:04X} nor 0x{:04X} records",
                        record_type, fallback
                    ))
                })?,
        };
        globals.insert(at, record);
        Ok(())
    }

    /// Append a FONT record
    ///
    /// # Returns
    ///
    /// The index cell formats use to refer to the new font
    pub fn add_font(&mut self, font: &Font) -> XlsResult<FontId> {
        let id = FontId::from_position(self.font_count);
        if id.0 as usize > MAX_FONT_INDEX {
            return Err(XlsError::LimitExceeded {
                what: "fonts",
                limit: MAX_FONT_INDEX,
            });
        }
        self.insert_global(font.to_record()?, FONT, XF)?;
        self.font_count += 1;
        Ok(id)
    }

    /// Index of a custom number format, adding a FORMAT record if the code
    /// is not yet present
    pub fn add_number_format(&mut self, code: &str) -> XlsResult<u16> {
        if let Some(&index) = self.format_codes.get(code) {
            return Ok(index);
        }
        let index = self.next_format;
        let format = NumberFormat {
            index,
            code: code.to_string(),
        };
        self.insert_global(format.to_record()?, FORMAT, XF)?;
        self.next_format = index.checked_add(1).ok_or(XlsError::LimitExceeded {
            what: "number formats",
            limit: u16::MAX as usize,
        })?;
        self.format_codes.insert(code.to_string(), index);
        Ok(index)
    }

    /// Append an XF record
    pub fn add_style(&mut self, style: &CellStyle) -> XlsResult<StyleId> {
        if self.style_count >= MAX_STYLES {
            return Err(XlsError::LimitExceeded {
                what: "cell styles",
                limit: MAX_STYLES,
            });
        }
        let id = StyleId(self.style_count as u16);
        self.insert_global(style.to_record(), XF, BOUNDSHEET)?;
        self.style_count += 1;
        Ok(id)
    }

    /// SST index of a string, adding it if needed
    pub fn intern_string(&mut self, value: &str) -> u32 {
        self.book.shared_strings.intern(value)
    }

    /// Replace every row of a sheet except the header (row 0)
    ///
    /// # Arguments
    ///
    /// * `sheet` - Sheet position
    /// * `rows` - New rows, indexed from 1
    pub fn replace_data_rows(&mut self, sheet: usize, rows: Vec<RowEntry>) -> XlsResult<()> {
        let records = self
            .book
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| XlsError::WorksheetNotFound(format!("#{}", sheet)))?;
        stream::replace_cell_table(records, |row| row == 0, rows)
    }

    /// Serialize the whole compound file
    pub fn to_bytes(&self) -> XlsResult<Vec<u8>> {
        let mut container = self.container.clone();
        container.replace_stream(&self.stream_name, self.book.to_bytes()?)?;
        Ok(container.to_writer()?.to_bytes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::xls::Workbook;
    use crate::ole::xls::records::RowRecord;
    use crate::ole::xls::testutil::{BookBuilder, label_cell, number_cell};
    use crate::ole::xls::writer::biff;

    fn template() -> Vec<u8> {
        BookBuilder::new()
            .sheet("Invoices", |s| {
                s.header(&["IDINVC", "AMOUNT"]);
                s.row(&[label_cell("OLD"), number_cell(1.0)]);
            })
            .bytes()
    }

    #[test]
    fn test_untouched_document_round_trips() {
        let doc = XlsDocument::from_bytes(&template()).unwrap();
        let again = XlsDocument::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(again.book.globals, doc.book.globals);
        assert_eq!(again.book.sheets, doc.book.sheets);
        assert_eq!(again.container.streams.len(), doc.container.streams.len());
    }

    #[test]
    fn test_font_ids_skip_four() {
        let mut doc = XlsDocument::from_bytes(&template()).unwrap();
        assert_eq!(doc.font_count(), 4);
        let first = doc.add_font(&Font::default()).unwrap();
        let second = doc.add_font(&Font::default()).unwrap();
        assert_eq!(first, FontId(5));
        assert_eq!(second, FontId(6));

        let fonts: Vec<usize> = doc
            .book
            .globals
            .iter()
            .enumerate()
            .filter(|(_, r)| r.record_type == FONT)
            .map(|(i, _)| i)
            .collect();
        // Appended fonts stay contiguous with the template's
        assert!(fonts.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_number_formats_deduplicate() {
        let mut doc = XlsDocument::from_bytes(&template()).unwrap();
        let a = doc.add_number_format("0.0000").unwrap();
        let b = doc.add_number_format("yyyy/mm/dd").unwrap();
        assert_eq!(doc.add_number_format("0.0000").unwrap(), a);
        assert_eq!(a, FIRST_CUSTOM_FORMAT);
        assert_eq!(b, FIRST_CUSTOM_FORMAT + 1);

        let last_format = doc.book.globals.iter().rposition(|r| r.record_type == FORMAT);
        let first_xf = doc.book.globals.iter().position(|r| r.record_type == XF);
        assert!(last_format < first_xf);
    }

    #[test]
    fn test_replace_rows_and_reload() {
        let mut doc = XlsDocument::from_bytes(&template()).unwrap();
        let style = doc.add_style(&CellStyle::parse(&[0u8; 20]).unwrap()).unwrap();
        assert_eq!(style, StyleId(16));

        let text = doc.intern_string("NEW");
        let rows = vec![RowEntry {
            index: 1,
            row: Some(RowRecord::new(1)),
            cells: vec![biff::label_sst(1, 0, style, text), biff::number(1, 1, style, 2.5)],
        }];
        doc.replace_data_rows(0, rows).unwrap();
        assert!(doc.replace_data_rows(3, Vec::new()).is_err());

        let workbook = Workbook::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        let sheet = workbook.sheet("Invoices").unwrap();
        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.rows()[1].text(0).as_deref(), Some("NEW"));
        assert_eq!(sheet.rows()[1].cell(1).map(|c| c.style), Some(style));
        assert_eq!(workbook.styles().len(), 17);
    }

    #[test]
    fn test_style_limit() {
        let mut doc = XlsDocument::from_bytes(&template()).unwrap();
        doc.style_count = MAX_STYLES;
        assert!(matches!(
            doc.add_style(&CellStyle::parse(&[0u8; 20]).unwrap()),
            Err(XlsError::LimitExceeded { .. })
        ));
    }
}
