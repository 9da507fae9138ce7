//! Client-side upload session
//!
//! Drives one admin's upload dialog: pick a file, preview it, commit it,
//! and show the outcome. Transport is behind [`ImportApi`] and user-facing
//! messages go through [`Notifier`], so the flow runs the same from the CLI
//! and from tests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_nats::Client;
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::services::intake::{check_file, IntakeError};
use crate::types::{
    subjects, ErrorCode, ErrorResponse, ImportEnvelope, ImportMode, ImportOptions, ImportResult,
    ImportUploadRequest, PreviewSummary, PreviewUploadRequest, Request, SuccessResponse,
    TemplateDownloadRequest, TemplateDownloadResponse, TemplateFormat, UploadFile,
};

/// Rows shown in the preview's invalid-row table
pub const PREVIEW_INVALID_ROWS: usize = 10;
/// Errors shown in the result before truncating
pub const RESULT_ERRORS_SHOWN: usize = 20;

// =============================================================================
// API
// =============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("{message}")]
    Server { code: String, message: String },
    #[error("Malformed reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Calls the import pipeline exposes to the client
#[async_trait]
pub trait ImportApi: Send + Sync {
    async fn download_template(
        &self,
        format: TemplateFormat,
        mode: ImportMode,
    ) -> Result<TemplateDownloadResponse, ApiError>;

    async fn preview(&self, file: &UploadFile, mode: ImportMode) -> Result<ImportEnvelope<PreviewSummary>, ApiError>;

    async fn import(&self, file: &UploadFile, options: ImportOptions) -> Result<ImportEnvelope<ImportResult>, ApiError>;
}

/// [`ImportApi`] over NATS request/reply
pub struct NatsImportApi {
    client: Client,
    token: String,
}

impl NatsImportApi {
    pub fn new(client: Client, token: String) -> Self {
        Self { client, token }
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, subject: &'static str, payload: P) -> Result<R, ApiError> {
        let request = Request::with_token(self.token.clone(), payload);
        let bytes = serde_json::to_vec(&request)?;
        let reply = self
            .client
            .request(subject, bytes.into())
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        decode_reply(&reply.payload)
    }
}

/// Unwrap a `SuccessResponse` or turn an `ErrorResponse` into [`ApiError::Server`]
pub fn decode_reply<R: DeserializeOwned>(bytes: &[u8]) -> Result<R, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if value.get("error").is_some() {
        let response: ErrorResponse = serde_json::from_value(value)?;
        return Err(ApiError::Server {
            code: response.error.code,
            message: response.error.message,
        });
    }
    let response: SuccessResponse<R> = serde_json::from_value(value)?;
    Ok(response.payload)
}

#[async_trait]
impl ImportApi for NatsImportApi {
    async fn download_template(
        &self,
        format: TemplateFormat,
        mode: ImportMode,
    ) -> Result<TemplateDownloadResponse, ApiError> {
        self.call(subjects::TEMPLATE, TemplateDownloadRequest { format, mode }).await
    }

    async fn preview(&self, file: &UploadFile, mode: ImportMode) -> Result<ImportEnvelope<PreviewSummary>, ApiError> {
        let payload = PreviewUploadRequest { file: file.to_payload(), import_mode: mode };
        self.call(subjects::PREVIEW, payload).await
    }

    async fn import(&self, file: &UploadFile, options: ImportOptions) -> Result<ImportEnvelope<ImportResult>, ApiError> {
        let payload = ImportUploadRequest { file: file.to_payload(), options };
        self.call(subjects::IMPORT, payload).await
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Destructive,
}

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, title: &str, message: &str);
}

/// Writes notifications to the log
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, title: &str, message: &str) {
        match level {
            NotifyLevel::Info => info!("{}: {}", title, message),
            NotifyLevel::Warning => warn!("{}: {}", title, message),
            NotifyLevel::Destructive => error!("{}: {}", title, message),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] IntakeError),
    #[error("No file selected")]
    NoFile,
    #[error("Another request is still in progress")]
    Busy,
    #[error("Nothing to import: preview the file and fix at least one row first")]
    ImportNotReady,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Failed(String),
    #[error("Could not save file: {0}")]
    Io(#[from] std::io::Error),
}

struct SessionState {
    file: Option<UploadFile>,
    mode: ImportMode,
    preview: Option<PreviewSummary>,
    result: Option<ImportResult>,
}

/// Clears the in-flight flag when dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UploadSession<A: ImportApi, N: Notifier> {
    api: A,
    notifier: N,
    max_upload_bytes: u64,
    helper_url: String,
    state: Mutex<SessionState>,
    in_flight: AtomicBool,
}

impl<A: ImportApi, N: Notifier> UploadSession<A, N> {
    pub fn new(api: A, notifier: N, mode: ImportMode, max_upload_bytes: u64, helper_url: impl Into<String>) -> Self {
        Self {
            api,
            notifier,
            max_upload_bytes,
            helper_url: helper_url.into(),
            state: Mutex::new(SessionState { file: None, mode, preview: None, result: None }),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> ImportMode {
        self.state.lock().mode
    }

    /// Switching mode invalidates the preview
    pub fn set_mode(&self, mode: ImportMode) {
        let mut state = self.state.lock();
        if state.mode != mode {
            state.mode = mode;
            state.preview = None;
            state.result = None;
        }
    }

    pub fn selected_file(&self) -> Option<String> {
        self.state.lock().file.as_ref().map(|f| f.filename.clone())
    }

    pub fn preview_summary(&self) -> Option<PreviewSummary> {
        self.state.lock().preview.clone()
    }

    pub fn import_result(&self) -> Option<ImportResult> {
        self.state.lock().result.clone()
    }

    /// Whether the commit action is enabled
    pub fn can_import(&self) -> bool {
        self.state.lock().preview.as_ref().is_some_and(|p| p.can_import)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run intake on a picked file. Never calls the API.
    pub fn select_file(&self, file: UploadFile) -> Result<(), SessionError> {
        let checked = check_file(&file, self.max_upload_bytes);

        let mut state = self.state.lock();
        state.preview = None;
        state.result = None;

        match checked {
            Ok(()) => {
                state.file = Some(file);
                Ok(())
            }
            Err(e) => {
                state.file = None;
                drop(state);
                self.notifier.notify(NotifyLevel::Destructive, "Invalid File", &e.to_string());
                Err(e.into())
            }
        }
    }

    fn current_file(&self) -> Result<(UploadFile, ImportMode), SessionError> {
        let state = self.state.lock();
        let file = state.file.clone().ok_or(SessionError::NoFile)?;
        Ok((file, state.mode))
    }

    /// Dry-run the selected file
    pub async fn preview(&self) -> Result<PreviewSummary, SessionError> {
        let (file, mode) = self.current_file()?;
        let _guard = InFlight::acquire(&self.in_flight)?;

        let envelope = match self.api.preview(&file, mode).await {
            Ok(envelope) => envelope,
            Err(e) => {
                self.notifier.notify(NotifyLevel::Destructive, "Preview Failed", &e.to_string());
                return Err(e.into());
            }
        };

        let Some(summary) = envelope.data else {
            self.notifier.notify(NotifyLevel::Destructive, "Preview Failed", &envelope.message);
            return Err(SessionError::Failed(envelope.message));
        };

        {
            let mut state = self.state.lock();
            state.preview = Some(summary.clone());
            state.result = None;
        }

        if summary.can_import {
            let message = format!("{} of {} rows are ready to import", summary.valid_rows, summary.total_rows);
            self.notifier.notify(NotifyLevel::Info, "Preview Ready", &message);
        } else {
            self.notifier.notify(NotifyLevel::Warning, "Nothing to Import", "No row passed validation");
        }
        Ok(summary)
    }

    /// Commit the selected file. Requires a preview with importable rows.
    pub async fn import(&self, options: ImportOptions) -> Result<ImportResult, SessionError> {
        if !self.can_import() {
            return Err(SessionError::ImportNotReady);
        }
        let (file, _) = self.current_file()?;
        let _guard = InFlight::acquire(&self.in_flight)?;

        let envelope = match self.api.import(&file, options).await {
            Ok(envelope) => envelope,
            Err(e) => {
                self.notifier.notify(NotifyLevel::Destructive, "Import Failed", &e.to_string());
                return Err(e.into());
            }
        };

        let Some(result) = envelope.data else {
            self.notifier.notify(NotifyLevel::Destructive, "Import Failed", &envelope.message);
            return Err(SessionError::Failed(envelope.message));
        };

        self.state.lock().result = Some(result.clone());

        if envelope.success {
            self.notifier.notify(NotifyLevel::Info, "Import Complete", &envelope.message);
        } else {
            self.notifier.notify(NotifyLevel::Warning, "Import Finished With Errors", &envelope.message);
        }
        Ok(result)
    }

    /// Fetch a template and write it into `dest_dir`. Session state is untouched.
    pub async fn download_template(
        &self,
        format: TemplateFormat,
        mode: ImportMode,
        dest_dir: &Path,
    ) -> Result<PathBuf, SessionError> {
        let response = match self.api.download_template(format, mode).await {
            Ok(response) => response,
            Err(e) => {
                self.notifier.notify(NotifyLevel::Destructive, "Download Failed", &e.to_string());
                return Err(e.into());
            }
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&response.file_base64)
            .map_err(|e| SessionError::Failed(format!("Template content is not valid base64: {}", e)))?;

        // Only the file name is trusted from the reply
        let filename = Path::new(&response.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| SessionError::Failed(format!("Invalid template filename '{}'", response.filename)))?;
        let path = dest_dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;

        self.notifier.notify(NotifyLevel::Info, "Template Downloaded", &response.filename);
        Ok(path)
    }

    pub fn render_preview(&self) -> Option<String> {
        self.state.lock().preview.as_ref().map(render_preview)
    }

    pub fn render_result(&self) -> Option<String> {
        self.state.lock().result.as_ref().map(|r| render_result(r, &self.helper_url))
    }
}

// =============================================================================
// RENDERING
// =============================================================================

/// Count cards plus the first invalid rows with their reasons
pub fn render_preview(summary: &PreviewSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "File: {} ({} bytes, mode {})\n",
        summary.file_info.filename, summary.file_info.size, summary.import_mode
    ));
    out.push_str(&format!(
        "Total rows: {} | Valid: {} | Invalid: {} | Errors: {} | Warnings: {}\n",
        summary.total_rows, summary.valid_rows, summary.invalid_rows, summary.total_errors, summary.total_warnings
    ));
    out.push_str(if summary.can_import {
        "Ready to import\n"
    } else {
        "Cannot import: no valid rows\n"
    });

    if summary.invalid_rows > 0 {
        out.push_str(&format!(
            "\nInvalid rows (showing {} of {}):\n",
            (summary.invalid_rows as usize).min(PREVIEW_INVALID_ROWS),
            summary.invalid_rows
        ));
        for row in summary.invalid_results().take(PREVIEW_INVALID_ROWS) {
            out.push_str(&format!("  Row {}: {}\n", row.row_index, row.errors.join("; ")));
        }
    }
    out
}

/// Remediation hint for an issue code
pub fn hint_for(code: ErrorCode, helper_url: &str) -> Option<String> {
    let hint = match code {
        ErrorCode::MissingField => "Fill in every required column; download the template to see them.".to_string(),
        ErrorCode::InvalidNumber => "Prices and IDs must be plain numbers, e.g. 2499 or 1499.50.".to_string(),
        ErrorCode::InvalidQuantity => "Quantity must be a whole number between 1 and 2147483647.".to_string(),
        ErrorCode::InvalidDate => "Write dates as YYYY-MM-DD.".to_string(),
        ErrorCode::InvalidPaymentStatus => {
            "Use one of: pending, paid, partial, failed, refunded.".to_string()
        }
        ErrorCode::InvalidCategory => format!(
            "Check category_id and subcategory_id against the Excel helper: {}",
            helper_url
        ),
        ErrorCode::UnknownCustomer => "Check the customer_id values against the customer list.".to_string(),
        ErrorCode::CustomerNotCreated => {
            "Enable customer creation or add the customers before importing.".to_string()
        }
        ErrorCode::PersistenceFailed => "Saving failed for some rows; retry those rows later.".to_string(),
        ErrorCode::InvalidEmail
        | ErrorCode::InvalidPhone
        | ErrorCode::DateInPast
        | ErrorCode::PriceNormalized
        | ErrorCode::ZeroPrice => {
            return None
        }
    };
    Some(hint)
}

/// Summary, truncated error list and remediation hints
pub fn render_result(result: &ImportResult, helper_url: &str) -> String {
    let mut out = format!(
        "Imported {} of {} rows | Failed: {} | Customers created: {}\n",
        result.successful_imports, result.total_rows, result.failed_imports, result.created_customers
    );

    if !result.imported_orders.is_empty() {
        out.push_str("\nOrders:\n");
        for order in &result.imported_orders {
            out.push_str(&format!(
                "  {}  {}  {}  {:.2}\n",
                order.order_number, order.customer_company, order.service_name, order.total_amount
            ));
        }
    }

    if !result.errors.is_empty() {
        out.push_str("\nErrors:\n");
        for err in result.errors.iter().take(RESULT_ERRORS_SHOWN) {
            out.push_str(&format!("  {}\n", err));
        }
        if result.errors.len() > RESULT_ERRORS_SHOWN {
            out.push_str(&format!("  ... and {} more\n", result.errors.len() - RESULT_ERRORS_SHOWN));
        }
    }

    let codes: BTreeSet<ErrorCode> = result.issues.iter().map(|i| i.code).collect();
    let hints: Vec<String> = codes.into_iter().filter_map(|c| hint_for(c, helper_url)).collect();
    if !hints.is_empty() {
        out.push_str("\nHow to fix:\n");
        for hint in hints {
            out.push_str(&format!("  - {}\n", hint));
        }
    }
    out
}
