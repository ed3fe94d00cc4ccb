//! Error types for XLS reading and rebuilding

/// Result type alias for XLS operations
pub type XlsResult<T> = Result<T, XlsError>;

/// Errors that can occur while reading or writing BIFF8 workbooks
#[derive(Debug, thiserror::Error)]
pub enum XlsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// CFB (Compound File Binary) error
    #[error("CFB error: {0}")]
    Cfb(#[from] crate::ole::OleError),
    #[error("Invalid record 0x{record_type:04X}: {message}")]
    InvalidRecord { record_type: u16, message: String },
    /// Only BIFF8 (Excel 97-2003) is supported
    #[error("Unsupported BIFF version: 0x{0:04X}")]
    UnsupportedBiffVersion(u16),
    #[error("Invalid length: expected {expected}, found {found}")]
    InvalidLength { expected: usize, found: usize },
    #[error("No Workbook stream in compound file")]
    MissingWorkbookStream,
    #[error("Worksheet '{0}' not found")]
    WorksheetNotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// A BIFF8 table or grid limit was exceeded
    #[error("Too many {what}: limit is {limit}")]
    LimitExceeded { what: &'static str, limit: usize },
}

impl From<crate::common::binary::BinaryError> for XlsError {
    fn from(err: crate::common::binary::BinaryError) -> Self {
        XlsError::InvalidData(err.to_string())
    }
}
