//! XLS workbook writing
//!
//! Output workbooks are always derived from a template file, so writing
//! means editing the template's record stream.

/// BIFF8 cell record encoders
pub mod biff;

/// Template-backed editable workbook
pub mod document;

pub use document::XlsDocument;
