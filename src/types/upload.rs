//! Uploaded spreadsheet file

use anyhow::{Context, Result};
use base64::Engine;

use super::{FileInfo, UploadPayload};

pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_CSV: &str = "text/csv";

/// Raw bytes plus declared MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_csv(&self) -> bool {
        self.content_type == MIME_CSV || self.filename.to_lowercase().ends_with(".csv")
    }

    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            filename: self.filename.clone(),
            size: self.size(),
            content_type: self.content_type.clone(),
        }
    }

    pub fn to_payload(&self) -> UploadPayload {
        UploadPayload {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            file_base64: base64::engine::general_purpose::STANDARD.encode(&self.bytes),
        }
    }

    pub fn from_payload(payload: &UploadPayload) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&payload.file_base64)
            .context("file content is not valid base64")?;
        Ok(Self::new(payload.filename.clone(), payload.content_type.clone(), bytes))
    }
}
