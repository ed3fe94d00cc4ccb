//! xlsplit - Partition legacy Excel workbooks by invoice identifier
//!
//! This library splits a BIFF8 workbook (`.xls`) into two workbooks. Rows of
//! the primary sheet whose identifier is all digits go to the first output,
//! every other row to the second, and detail rows follow their invoice
//! through a join column. Both outputs are rebuilt from a template workbook
//! with the cell formatting of the copied rows cloned into it.
//!
//! # Features
//!
//! - **OLE2 reader and writer**: Compound files are read into memory and
//!   written back with every stream preserved
//! - **BIFF8 workbook model**: Cells, fonts, cell formats and shared strings
//! - **Record-level editing**: Template records are kept as stored; only the
//!   replaced cell tables and the appended formats change
//! - **Durable output**: Writes retry while another process holds the file
//!
//! # Example - Splitting a workbook
//!
//! ```no_run
//! use xlsplit::config::SplitConfig;
//! use xlsplit::split::Splitter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let upload = std::fs::read("Invoices.xls")?;
//! let mut splitter = Splitter::new(SplitConfig::default());
//! let report = splitter.process(Some(&upload), None)?;
//! println!("P1: {}", report.p1.path.display());
//! println!("P2: {}", report.p2.path.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Reading a workbook
//!
//! ```no_run
//! use xlsplit::ole::xls::Workbook;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let workbook = Workbook::from_bytes(&std::fs::read("Invoices.xls")?)?;
//! for sheet in workbook.sheets() {
//!     println!("{}: {} rows", sheet.name(), sheet.rows().len());
//! }
//! # Ok(())
//! # }
//! ```

/// Shared binary helpers
pub mod common;

/// OLE2 (Object Linking and Embedding) compound files and the XLS format
///
/// This module reads and writes OLE2 structured storage files. The `xls`
/// submodule parses and edits the BIFF8 workbook stream inside them.
pub mod ole;

/// Splitter configuration
pub mod config;

/// The split engine
pub mod split;

pub use config::{RetryPolicy, SplitConfig};
pub use split::{SplitError, SplitReport, SplitResult, Splitter};
