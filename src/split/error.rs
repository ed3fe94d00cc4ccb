use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ole::OleError;
use crate::ole::xls::XlsError;

/// Result type for splitting operations
pub type SplitResult<T> = Result<T, SplitError>;

/// Errors reported by [`Splitter::process`](super::Splitter::process)
///
/// The `Display` output is the message handed back to the caller.
#[derive(Error, Debug)]
pub enum SplitError {
    /// Neither an uploaded workbook nor the fallback file is available
    #[error("Source workbook not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A required sheet, or a required header column of a sheet, is absent
    #[error("Malformed input: {}", describe_missing(sheet, column.as_deref()))]
    MalformedInput {
        sheet: String,
        column: Option<String>,
    },

    /// The destination stayed locked or unwritable for every attempt
    #[error("Could not write {} after {attempts} attempts: {source}", path.display())]
    RetryExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("XLS error: {0}")]
    Xls(#[from] XlsError),

    #[error("OLE error: {0}")]
    Ole(#[from] OleError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn describe_missing(sheet: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("sheet '{}' has no '{}' column", sheet, column),
        None => format!("workbook has no '{}' sheet", sheet),
    }
}

impl SplitError {
    pub(crate) fn missing_sheet(sheet: &str) -> Self {
        SplitError::MalformedInput {
            sheet: sheet.to_string(),
            column: None,
        }
    }

    pub(crate) fn missing_column(sheet: &str, column: &str) -> Self {
        SplitError::MalformedInput {
            sheet: sheet.to_string(),
            column: Some(column.to_string()),
        }
    }
}
