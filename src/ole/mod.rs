/// Constants for OLE file format
pub mod consts;

/// OLE compound file reader
mod file;

/// OLE compound file writer
pub mod writer;

/// Legacy Excel workbook (.xls) reading and rebuilding
///
/// BIFF8 records inside the `Workbook` stream of an OLE2 container.
pub mod xls;

pub use file::{CompoundSnapshot, DirectoryEntry, OleError, OleFile, is_ole_file};
