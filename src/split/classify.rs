//! Row classification and detail filtering
//!
//! Rows are selected by reference; the header (row 0) always leads the
//! selection so the rebuilder sees the same shape as the source sheet.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ole::xls::{Row, Sheet};
use crate::split::error::{SplitError, SplitResult};

// ASCII digits only; other Unicode digits do not count
static NUMERIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("Failed to build identifier pattern"));

/// Whether an identifier is one or more decimal digits and nothing else
pub fn is_numeric_id(value: &str) -> bool {
    NUMERIC_ID.is_match(value)
}

/// Rows kept for one group of the primary sheet
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    /// Header followed by the kept data rows, in sheet order
    pub rows: Vec<&'a Row>,
    /// Join-key text of every kept data row
    pub join_keys: BTreeSet<String>,
}

impl Selection<'_> {
    /// Number of kept data rows
    pub fn data_rows(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }
}

fn require_column(sheet: &Sheet, column: &str) -> SplitResult<u16> {
    sheet
        .column_index(column)
        .ok_or_else(|| SplitError::missing_column(sheet.name(), column))
}

fn header(sheet: &Sheet) -> SplitResult<&Row> {
    sheet
        .header()
        .ok_or_else(|| SplitError::missing_column(sheet.name(), "header row"))
}

/// Select the primary rows of one group
///
/// # Arguments
///
/// * `sheet` - Primary sheet
/// * `id_column` - Header text of the identifier column
/// * `join_column` - Header text of the join-key column
/// * `match_numeric` - `true` keeps digits-only identifiers, `false` keeps
///   everything else (including missing cells)
pub fn classify<'a>(
    sheet: &'a Sheet,
    id_column: &str,
    join_column: &str,
    match_numeric: bool,
) -> SplitResult<Selection<'a>> {
    let header = header(sheet)?;
    let id_col = require_column(sheet, id_column)?;
    let join_col = require_column(sheet, join_column)?;

    let mut rows = vec![header];
    let mut join_keys = BTreeSet::new();
    for row in sheet.data_rows() {
        let numeric = row.text(id_col).is_some_and(|id| is_numeric_id(&id));
        if numeric == match_numeric {
            join_keys.insert(row.text(join_col).unwrap_or_default());
            rows.push(row);
        }
    }
    Ok(Selection { rows, join_keys })
}

/// Detail rows whose join key is in `allowed`, header first, order kept
pub fn filter_details<'a>(
    sheet: &'a Sheet,
    join_column: &str,
    allowed: &BTreeSet<String>,
) -> SplitResult<Vec<&'a Row>> {
    let header = header(sheet)?;
    let join_col = require_column(sheet, join_column)?;

    let mut rows = vec![header];
    rows.extend(
        sheet
            .data_rows()
            .filter(|row| allowed.contains(&row.text(join_col).unwrap_or_default())),
    );
    Ok(rows)
}
