//! Legacy Excel (.xls) workbook reading and rebuilding
//!
//! This module parses BIFF8 workbooks stored in OLE2 compound files into a
//! decoded [`Workbook`], and edits existing workbooks record by record
//! through [`XlsDocument`]. Records the edits do not touch are carried over
//! byte for byte.

/// Error types for XLS parsing
mod error;

/// BIFF record framing and fixed-layout records
pub mod records;

/// Unicode string encoding shared by several records
pub mod strings;

/// Shared string table
pub mod sst;

/// Formula token inspection
pub mod formula;

/// Fonts, number formats and cell formats (XF)
pub mod style;

/// Cell values
pub mod cell;

/// Worksheet decoding
pub mod worksheet;

/// Workbook decoding
pub mod workbook;

/// Record-level workbook stream model
pub mod stream;

/// Workbook editing
pub mod writer;

#[cfg(test)]
pub(crate) mod testutil;

pub use cell::{Cell, CellKind, CellValue};
pub use error::{XlsError, XlsResult};
pub use style::{CellStyle, Font, FontId, StyleId};
pub use workbook::Workbook;
pub use worksheet::{Row, Sheet};
pub use writer::XlsDocument;
