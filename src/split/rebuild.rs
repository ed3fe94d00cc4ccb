//! Style-preserving rebuild of output workbooks
//!
//! A [`Rebuilder`] owns a fresh copy of the template and copies selected
//! source rows into it. Cell formats are cloned lazily: the first cell
//! using a source XF clones it (and its font and number format) into the
//! destination, later cells reuse that clone. The caches are keyed by the
//! source handles and live only as long as the rebuilder.

use std::collections::BTreeMap;

use crate::ole::xls::cell::CellKind;
use crate::ole::xls::records::{DEFAULT_XF, MAX_COLUMNS, MAX_ROWS, Record, RowOptions, RowRecord};
use crate::ole::xls::stream::RowEntry;
use crate::ole::xls::style::NumberFormat;
use crate::ole::xls::writer::biff;
use crate::ole::xls::{Cell, CellValue, FontId, Row, StyleId, Workbook, XlsDocument, XlsError};
use crate::split::error::{SplitError, SplitResult};

/// What one rebuild added to its destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Data rows written across all replaced sheets
    pub rows_written: usize,
    /// XF records added to the destination
    pub styles_cloned: usize,
    /// FONT records added to the destination
    pub fonts_cloned: usize,
    /// Custom number formats carried over from the source
    pub formats_cloned: usize,
    /// Cells written as their text because their value could not be copied
    pub lossy_cells: usize,
}

/// Copies rows from a source workbook into a template copy
pub struct Rebuilder<'a> {
    source: &'a Workbook,
    document: XlsDocument,
    styles: BTreeMap<StyleId, StyleId>,
    fonts: BTreeMap<FontId, FontId>,
    formats: BTreeMap<u16, u16>,
    report: RebuildReport,
}

impl<'a> Rebuilder<'a> {
    /// Start a rebuild from the bytes of the template workbook
    pub fn new(source: &'a Workbook, template: &[u8]) -> SplitResult<Self> {
        Ok(Rebuilder {
            source,
            document: XlsDocument::from_bytes(template)?,
            styles: BTreeMap::new(),
            fonts: BTreeMap::new(),
            formats: BTreeMap::new(),
            report: RebuildReport::default(),
        })
    }

    /// Replace the data rows of a template sheet
    ///
    /// The template's header row stays as it is; `rows[0]` (the source
    /// header) is skipped and the remaining rows are written at indices
    /// 1, 2, ... in order.
    ///
    /// # Arguments
    ///
    /// * `sheet` - Template sheet name
    /// * `rows` - Source header followed by the rows to copy
    pub fn replace_rows(&mut self, sheet: &str, rows: &[&Row]) -> SplitResult<()> {
        let position = self
            .document
            .sheet_index(sheet)?
            .ok_or_else(|| SplitError::missing_sheet(sheet))?;

        let mut entries = Vec::with_capacity(rows.len().saturating_sub(1));
        for (index, row) in rows.iter().enumerate().skip(1) {
            if index >= MAX_ROWS as usize {
                return Err(XlsError::LimitExceeded {
                    what: "rows",
                    limit: MAX_ROWS as usize,
                }
                .into());
            }
            entries.push(self.copy_row(index as u16, row)?);
        }

        self.report.rows_written += entries.len();
        tracing::debug!(sheet, rows = entries.len(), "replaced sheet rows");
        self.document.replace_data_rows(position, entries)?;
        Ok(())
    }

    /// Finish the rebuild
    pub fn finish(self) -> (XlsDocument, RebuildReport) {
        tracing::debug!(
            rows = self.report.rows_written,
            styles = self.report.styles_cloned,
            fonts = self.report.fonts_cloned,
            formats = self.report.formats_cloned,
            "rebuild finished"
        );
        (self.document, self.report)
    }

    fn copy_row(&mut self, index: u16, row: &Row) -> SplitResult<RowEntry> {
        let mut record = RowRecord::new(index);
        record.height = row.height;
        // The row-level default format belongs to the source's XF table
        record.options = row.options - RowOptions::FORMATTED;
        record.xf_word = DEFAULT_XF;
        if let (Some(first), Some(last)) = (row.cells.first(), row.cells.last()) {
            record.first_col = first.col;
            record.last_col_plus1 = last.col.saturating_add(1);
        }

        let mut cells = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            if cell.col as u32 >= MAX_COLUMNS {
                return Err(XlsError::LimitExceeded {
                    what: "columns",
                    limit: MAX_COLUMNS as usize,
                }
                .into());
            }
            let style = self.resolve_style(cell.style)?;
            cells.extend(self.copy_cell(index, cell, style)?);
        }

        Ok(RowEntry {
            index,
            row: Some(record),
            cells,
        })
    }

    fn copy_cell(&mut self, row: u16, cell: &Cell, xf: StyleId) -> SplitResult<Vec<Record>> {
        let col = cell.col;
        let records = match (&cell.value, cell.value.kind()) {
            (CellValue::Text(text), _) => {
                vec![biff::label_sst(row, col, xf, self.document.intern_string(text))]
            },
            (CellValue::Number(n), _) => vec![biff::number(row, col, xf, *n)],
            (CellValue::Boolean(b), _) => vec![biff::boolean(row, col, xf, *b)],
            (CellValue::Formula(formula), CellKind::Formula) => {
                biff::formula(row, col, xf, formula)?
            },
            (CellValue::Blank, _) => vec![biff::blank(row, col, xf)],
            (value, _) => {
                let text = value.to_text();
                tracing::warn!(row, col, text = %text, "cell copied as text");
                self.report.lossy_cells += 1;
                vec![biff::label_sst(row, col, xf, self.document.intern_string(&text))]
            },
        };
        Ok(records)
    }

    /// Destination XF for a source XF, cloning it on first use
    fn resolve_style(&mut self, source_id: StyleId) -> SplitResult<StyleId> {
        if let Some(&id) = self.styles.get(&source_id) {
            return Ok(id);
        }
        let source = self.source;
        let style = source.style(source_id).ok_or_else(|| {
            XlsError::InvalidData(format!("cell format {} is not defined", source_id.0))
        })?;
        let font = self.resolve_font(style.font)?;
        let format = self.resolve_format(style.format)?;
        let id = self.document.add_style(&style.rebased(font, format))?;
        self.styles.insert(source_id, id);
        self.report.styles_cloned += 1;
        Ok(id)
    }

    /// Destination font for a source font, cloning it on first use
    fn resolve_font(&mut self, source_id: FontId) -> SplitResult<FontId> {
        if let Some(&id) = self.fonts.get(&source_id) {
            return Ok(id);
        }
        let source = self.source;
        let font = source.font(source_id).ok_or_else(|| {
            XlsError::InvalidData(format!("font {} is not defined", source_id.0))
        })?;
        let id = self.document.add_font(&font.clone_visual())?;
        self.fonts.insert(source_id, id);
        self.report.fonts_cloned += 1;
        Ok(id)
    }

    /// Destination number format index; built-in formats keep theirs
    fn resolve_format(&mut self, index: u16) -> SplitResult<u16> {
        if NumberFormat::is_builtin(index) {
            return Ok(index);
        }
        if let Some(&id) = self.formats.get(&index) {
            return Ok(id);
        }
        let source = self.source;
        let id = match source.format_code(index) {
            Some(code) => {
                self.report.formats_cloned += 1;
                self.document.add_number_format(code)?
            },
            None => {
                tracing::debug!(index, "undefined number format, using General");
                0
            },
        };
        self.formats.insert(index, id);
        Ok(id)
    }
}

/// Rebuild one output from a template
///
/// # Arguments
///
/// * `template` - Template workbook bytes, copied for this rebuild only
/// * `source` - Workbook the rows come from
/// * `targets` - Sheet name and rows (header first) for every sheet to
///   replace; other template sheets are left untouched
pub fn rebuild(
    template: &[u8],
    source: &Workbook,
    targets: &[(&str, &[&Row])],
) -> SplitResult<(XlsDocument, RebuildReport)> {
    let mut rebuilder = Rebuilder::new(source, template)?;
    for (sheet, rows) in targets {
        rebuilder.replace_rows(sheet, rows)?;
    }
    Ok(rebuilder.finish())
}
