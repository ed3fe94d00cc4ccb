//! Workbook implementation for XLS files
//!
//! A read-only, fully decoded view of a BIFF8 workbook: its sheets, fonts,
//! cell formats and number formats. Handles in the decoded cells
//! ([`StyleId`], and [`FontId`] inside each style) index the tables held
//! here.

use std::collections::BTreeMap;
use std::io::Cursor;

use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::xls::records::{FONT, FORMAT, SheetType, XF};
use crate::ole::xls::stream::BookStream;
use crate::ole::xls::style::{CellStyle, Font, FontId, NumberFormat, StyleId};
use crate::ole::xls::worksheet::Sheet;
use crate::ole::{CompoundSnapshot, OleFile};

/// Name of the BIFF stream inside the compound file
///
/// BIFF8 writes `Workbook`; BIFF5 wrote `Book`, which is picked up here so
/// the version check can report it.
pub(crate) fn workbook_stream_name(container: &CompoundSnapshot) -> XlsResult<String> {
    ["Workbook", "Book"]
        .iter()
        .find(|name| container.stream(name).is_some())
        .map(|name| name.to_string())
        .ok_or(XlsError::MissingWorkbookStream)
}

/// Decoded XLS workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    fonts: Vec<Font>,
    styles: Vec<CellStyle>,
    formats: BTreeMap<u16, String>,
}

impl Workbook {
    /// Decode a workbook from the bytes of an `.xls` file
    pub fn from_bytes(data: &[u8]) -> XlsResult<Self> {
        let mut ole = OleFile::open(Cursor::new(data))?;
        let name = if ole.exists(&["Workbook"]) {
            "Workbook"
        } else if ole.exists(&["Book"]) {
            "Book"
        } else {
            return Err(XlsError::MissingWorkbookStream);
        };
        let stream = ole.open_stream(&[name])?;
        Self::from_stream(&stream)
    }

    /// Decode a workbook from its `Workbook` stream
    pub fn from_stream(stream: &[u8]) -> XlsResult<Self> {
        let book = BookStream::parse(stream)?;

        let mut workbook = Workbook::default();
        for record in &book.globals {
            match record.record_type {
                FONT => workbook.fonts.push(Font::parse(&record.data)?),
                XF => workbook.styles.push(CellStyle::parse(&record.data)?),
                FORMAT => {
                    let format = NumberFormat::parse(&record.data)?;
                    workbook.formats.insert(format.index, format.code);
                },
                _ => {},
            }
        }

        for (bound, records) in book.bound_sheets()?.iter().zip(&book.sheets) {
            let sheet = match bound.sheet_type {
                SheetType::WorkSheet => Sheet::parse(&bound.name, records, &book.shared_strings)?,
                // Chart, macro and module sheets have no cells
                _ => Sheet::new(bound.name.clone(), Vec::new()),
            };
            workbook.sheets.push(sheet);
        }

        tracing::debug!(
            sheets = workbook.sheets.len(),
            fonts = workbook.fonts.len(),
            styles = workbook.styles.len(),
            strings = book.shared_strings.len(),
            "decoded workbook"
        );
        Ok(workbook)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Sheet by name, compared case-insensitively
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        let wanted = name.to_lowercase();
        self.sheets.iter().find(|s| s.name().to_lowercase() == wanted)
    }

    pub fn fonts(&self) -> &[Font] {
        &self.fonts
    }

    pub fn font(&self, id: FontId) -> Option<&Font> {
        self.fonts.get(id.position()?)
    }

    pub fn styles(&self) -> &[CellStyle] {
        &self.styles
    }

    pub fn style(&self, id: StyleId) -> Option<&CellStyle> {
        self.styles.get(id.0 as usize)
    }

    /// Format code of a workbook-defined number format
    pub fn format_code(&self, index: u16) -> Option<&str> {
        self.formats.get(&index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::xls::testutil::{BookBuilder, label_cell, number_cell};

    #[test]
    fn test_decode_builder_workbook() {
        let mut builder = BookBuilder::new();
        let font = builder.add_font(Font {
            weight: 700,
            ..Font::default()
        });
        let format = builder.add_format("0.00%");
        let style = builder.add_style(font, format);
        let data = builder
            .sheet("Invoices", |s| {
                s.header(&["IDINVC", "RATE"]);
                s.row(&[label_cell("1001"), number_cell(0.25).styled(style)]);
            })
            .sheet("Invoice_Details", |s| s.header(&["CNTITEM"]))
            .bytes();

        let workbook = Workbook::from_bytes(&data).unwrap();
        assert_eq!(workbook.sheets().len(), 2);
        assert!(workbook.sheet("INVOICES").is_some());
        assert!(workbook.sheet("Missing").is_none());

        let cell = workbook.sheet("Invoices").unwrap().rows()[1].cell(1).unwrap().clone();
        assert_eq!(cell.style, style);
        let xf = workbook.style(cell.style).unwrap();
        assert_eq!(xf.font, font);
        assert_eq!(workbook.font(xf.font).map(|f| f.weight), Some(700));
        assert_eq!(workbook.format_code(xf.format), Some("0.00%"));
    }

    #[test]
    fn test_not_an_xls_file() {
        assert!(Workbook::from_bytes(b"PK\x03\x04 definitely a zip").is_err());
    }
}
