//! File intake checks run before any network call or parsing

use std::path::Path;

use thiserror::Error;

use crate::types::{UploadFile, MIME_CSV, MIME_XLS, MIME_XLSX};

/// Upload size limit (10 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const ALLOWED_CONTENT_TYPES: &[&str] = &[MIME_XLSX, MIME_XLS, MIME_CSV];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Invalid file type '{0}'. Please upload an Excel (.xlsx, .xls) or CSV file.")]
    UnsupportedType(String),
    #[error("File is too large ({size} bytes). Maximum size is {limit} bytes.")]
    TooLarge { size: u64, limit: u64 },
    #[error("File is empty")]
    Empty,
}

/// Accept or reject a picked file. `limit` is normally [`MAX_UPLOAD_BYTES`].
pub fn check_file(file: &UploadFile, limit: u64) -> Result<(), IntakeError> {
    if !ALLOWED_CONTENT_TYPES.contains(&file.content_type.as_str()) {
        return Err(IntakeError::UnsupportedType(file.content_type.clone()));
    }
    if file.size() > limit {
        return Err(IntakeError::TooLarge { size: file.size(), limit });
    }
    if file.bytes.is_empty() {
        return Err(IntakeError::Empty);
    }
    Ok(())
}

/// MIME type for a local spreadsheet path, by extension
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "xlsx" => Some(MIME_XLSX),
        "xls" => Some(MIME_XLS),
        "csv" => Some(MIME_CSV),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(content_type: &str, size: usize) -> UploadFile {
        UploadFile::new("orders", content_type, vec![b'x'; size])
    }

    #[test]
    fn accepts_all_allowed_types() {
        for ct in ALLOWED_CONTENT_TYPES {
            assert_eq!(check_file(&file(ct, 10), MAX_UPLOAD_BYTES), Ok(()));
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err = check_file(&file("application/pdf", 10), MAX_UPLOAD_BYTES).unwrap_err();
        assert_eq!(err, IntakeError::UnsupportedType("application/pdf".into()));
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(check_file(&file(MIME_CSV, 1024), 1024).is_ok());
        let err = check_file(&file(MIME_CSV, 1025), 1024).unwrap_err();
        assert_eq!(err, IntakeError::TooLarge { size: 1025, limit: 1024 });
    }

    #[test]
    fn type_and_size_errors_have_distinct_messages() {
        let type_msg = IntakeError::UnsupportedType("x".into()).to_string();
        let size_msg = IntakeError::TooLarge { size: 2, limit: 1 }.to_string();
        assert_ne!(type_msg, size_msg);
        assert!(size_msg.contains("too large"));
    }

    #[test]
    fn rejects_empty_file() {
        assert_eq!(check_file(&file(MIME_CSV, 0), MAX_UPLOAD_BYTES), Err(IntakeError::Empty));
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for_path(Path::new("a/b/Orders.XLSX")), Some(MIME_XLSX));
        assert_eq!(content_type_for_path(Path::new("orders.csv")), Some(MIME_CSV));
        assert_eq!(content_type_for_path(Path::new("orders.pdf")), None);
    }
}
