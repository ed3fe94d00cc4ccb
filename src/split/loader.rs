//! Source and template workbook loading

use std::fs;
use std::io;
use std::path::Path;

use crate::ole::xls::Workbook;
use crate::ole::{OleError, is_ole_file};
use crate::split::error::{SplitError, SplitResult};

/// Load the source workbook
///
/// # Arguments
///
/// * `upload` - Workbook bytes supplied by the caller, if any
/// * `fallback` - File read when nothing was uploaded
///
/// # Returns
///
/// The decoded workbook, or [`SplitError::NotFound`] naming `fallback`
/// when there is neither an upload nor a fallback file
pub fn load_source(upload: Option<&[u8]>, fallback: &Path) -> SplitResult<Workbook> {
    match upload {
        Some(bytes) => {
            tracing::debug!(bytes = bytes.len(), "reading uploaded workbook");
            parse(bytes)
        },
        None => {
            let bytes = read_file(fallback)?;
            tracing::debug!(path = %fallback.display(), bytes = bytes.len(), "reading fallback workbook");
            parse(&bytes)
        },
    }
}

/// Read the template workbook, checking that it is an OLE2 file
pub fn load_template(path: &Path) -> SplitResult<Vec<u8>> {
    let bytes = read_file(path)?;
    if !is_ole_file(&bytes) {
        return Err(OleError::NotOleFile.into());
    }
    Ok(bytes)
}

fn read_file(path: &Path) -> SplitResult<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SplitError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn parse(bytes: &[u8]) -> SplitResult<Workbook> {
    if !is_ole_file(bytes) {
        return Err(OleError::NotOleFile.into());
    }
    Ok(Workbook::from_bytes(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::xls::testutil::BookBuilder;

    fn book() -> Vec<u8> {
        BookBuilder::new()
            .sheet("Invoices", |s| s.header(&["IDINVC", "CNTITEM"]))
            .bytes()
    }

    #[test]
    fn test_upload_wins_over_fallback() {
        let workbook = load_source(Some(&book()), Path::new("/nonexistent/source.xls")).unwrap();
        assert!(workbook.sheet("Invoices").is_some());
    }

    #[test]
    fn test_fallback_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Invoices.xls");
        fs::write(&path, book()).unwrap();
        let workbook = load_source(None, &path).unwrap();
        assert_eq!(workbook.sheets().len(), 1);
    }

    #[test]
    fn test_missing_fallback_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.xls");
        match load_source(None, &path) {
            Err(SplitError::NotFound { path: reported }) => assert_eq!(reported, path),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_rejects_non_ole_bytes() {
        assert!(matches!(
            load_source(Some(b"not a workbook"), Path::new("x")),
            Err(SplitError::Ole(OleError::NotOleFile))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.xls");
        fs::write(&path, b"plain text").unwrap();
        assert!(load_template(&path).is_err());
        assert!(matches!(
            load_template(&dir.path().join("none.xls")),
            Err(SplitError::NotFound { .. })
        ));
    }
}
