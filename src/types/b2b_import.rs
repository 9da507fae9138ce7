//! B2B order bulk import types
//!
//! Field names on these payloads are snake_case: they are the contract the
//! admin UI's upload dialog reads (`can_import`, `row_index`, ...).

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Schema variant governing which columns are required
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Rows describe the customer inline; missing customers may be created
    CreateCustomers,
    /// Rows reference an existing customer by ID
    CustomerId,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::CreateCustomers => "create_customers",
            ImportMode::CustomerId => "customer_id",
        }
    }

    /// Columns that must be present and non-blank on every row
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            ImportMode::CreateCustomers => &[
                "company_name",
                "contact_person",
                "email",
                "phone",
                "service_name",
                "custom_price",
            ],
            ImportMode::CustomerId => &["customer_id", "service_name", "custom_price"],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "create_customers" | "create" => Some(ImportMode::CreateCustomers),
            "customer_id" | "existing" => Some(ImportMode::CustomerId),
            _ => None,
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns accepted in both modes but never required
pub const OPTIONAL_COLUMNS: &[&str] = &[
    "quantity",
    "category_id",
    "subcategory_id",
    "service_date",
    "booking_date",
    "payment_status",
    "service_address",
    "notes",
];

/// Largest accepted `quantity`; the orders table stores it as a 32-bit integer
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

/// Columns parsed as dates
pub const DATE_COLUMNS: &[&str] = &["service_date", "booking_date"];

/// One spreadsheet row keyed by normalised column header
pub type RawRow = BTreeMap<String, String>;

/// Payment status accepted in the `payment_status` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Partial,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Partial,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "pending" | "unpaid" => Some(PaymentStatus::Pending),
            "paid" | "completed" => Some(PaymentStatus::Paid),
            "partial" | "partially_paid" => Some(PaymentStatus::Partial),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Machine-readable classification of a row issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingField,
    InvalidNumber,
    InvalidQuantity,
    InvalidDate,
    InvalidEmail,
    InvalidPhone,
    InvalidPaymentStatus,
    InvalidCategory,
    UnknownCustomer,
    CustomerNotCreated,
    PersistenceFailed,
    DateInPast,
    PriceNormalized,
    ZeroPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Single row-scoped issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIssue {
    pub row_index: u32,
    pub field: String,
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
}

impl RowIssue {
    pub fn error(row_index: u32, field: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field: field.to_string(),
            code,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(row_index: u32, field: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field: field.to_string(),
            code,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// `Row N: message` form used in import results
    pub fn row_message(&self) -> String {
        format!("Row {}: {}", self.row_index, self.message)
    }
}

/// Validation outcome for one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 1-based data row number (first row under the header is 1)
    pub row_index: u32,
    pub data: RawRow,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub issues: Vec<RowIssue>,
    pub is_valid: bool,
}

impl ValidationResult {
    pub fn from_issues(row_index: u32, data: RawRow, issues: Vec<RowIssue>) -> Self {
        let errors: Vec<String> = issues
            .iter()
            .filter(|i| i.is_error())
            .map(|i| i.message.clone())
            .collect();
        let warnings = issues
            .iter()
            .filter(|i| !i.is_error())
            .map(|i| i.message.clone())
            .collect();
        let is_valid = errors.is_empty();
        Self { row_index, data, errors, warnings, issues, is_valid }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

/// Aggregate dry-run outcome. `results` holds every row, not just the invalid ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub total_rows: u32,
    pub valid_rows: u32,
    pub invalid_rows: u32,
    pub total_errors: u32,
    pub total_warnings: u32,
    pub can_import: bool,
    pub import_mode: ImportMode,
    pub file_info: FileInfo,
    pub results: Vec<ValidationResult>,
}

impl PreviewSummary {
    pub fn fold(import_mode: ImportMode, file_info: FileInfo, results: Vec<ValidationResult>) -> Self {
        let total_rows = results.len() as u32;
        let valid_rows = results.iter().filter(|r| r.is_valid).count() as u32;
        let total_errors = results.iter().map(|r| r.errors.len() as u32).sum();
        let total_warnings = results.iter().map(|r| r.warnings.len() as u32).sum();
        Self {
            total_rows,
            valid_rows,
            invalid_rows: total_rows - valid_rows,
            total_errors,
            total_warnings,
            can_import: valid_rows > 0,
            import_mode,
            file_info,
            results,
        }
    }

    pub fn invalid_results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.is_valid)
    }
}

/// Caller-selected commit policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub skip_invalid: bool,
    pub create_customers: bool,
    pub import_mode: ImportMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedOrder {
    pub order_number: String,
    pub customer_company: String,
    pub service_name: String,
    pub total_amount: f64,
}

/// Commit outcome
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub total_rows: u32,
    pub successful_imports: u32,
    pub failed_imports: u32,
    pub created_customers: u32,
    pub imported_orders: Vec<ImportedOrder>,
    /// `Row N: message` strings
    pub errors: Vec<String>,
    pub issues: Vec<RowIssue>,
}

impl ImportResult {
    /// Record every error-severity issue of a failed row
    pub fn record_failed_row(&mut self, issues: &[RowIssue]) {
        self.failed_imports += 1;
        for issue in issues.iter().filter(|i| i.is_error()) {
            self.errors.push(issue.row_message());
            self.issues.push(issue.clone());
        }
    }
}

// =============================================================================
// TYPED ROWS
// =============================================================================

/// Fields shared by both row schemas after validation
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub service_name: String,
    pub unit_price: f64,
    pub quantity: u32,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub service_date: Option<NaiveDate>,
    pub booking_date: Option<NaiveDate>,
    pub payment_status: PaymentStatus,
    pub service_address: Option<String>,
    pub notes: Option<String>,
}

impl OrderLine {
    pub fn total_amount(&self) -> f64 {
        ((self.unit_price * self.quantity as f64) * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerIdentity {
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
}

impl CustomerIdentity {
    /// Key used to match customers: company and email, case-insensitive
    pub fn key(&self) -> (String, String) {
        (
            self.company_name.trim().to_lowercase(),
            self.email.trim().to_lowercase(),
        )
    }
}

/// A row that passed shape validation, one variant per import mode
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedRow {
    NewCustomer { customer: CustomerIdentity, line: OrderLine },
    ExistingCustomer { customer_id: i64, line: OrderLine },
}

impl ValidatedRow {
    pub fn line(&self) -> &OrderLine {
        match self {
            ValidatedRow::NewCustomer { line, .. } => line,
            ValidatedRow::ExistingCustomer { line, .. } => line,
        }
    }
}

// =============================================================================
// TEMPLATE / HELPER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    Xlsx,
    Csv,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Xlsx => "xlsx",
            TemplateFormat::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "xlsx" | "excel" => Some(TemplateFormat::Xlsx),
            "csv" => Some(TemplateFormat::Csv),
            _ => None,
        }
    }
}

/// Request for `b2b.orders.excel.template`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDownloadRequest {
    pub format: TemplateFormat,
    pub mode: ImportMode,
}

/// Downloadable file returned over NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDownloadResponse {
    pub filename: String,
    pub content_type: String,
    pub file_base64: String,
    pub size_bytes: u64,
}

/// Uploaded spreadsheet as sent over NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub filename: String,
    pub content_type: String,
    pub file_base64: String,
}

/// Request for `b2b.orders.excel.preview`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewUploadRequest {
    pub file: UploadPayload,
    pub import_mode: ImportMode,
}

/// Request for `b2b.orders.excel.import`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportUploadRequest {
    pub file: UploadPayload,
    pub options: ImportOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperSubcategory {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperCategory {
    pub id: i64,
    pub name: String,
    pub subcategories: Vec<HelperSubcategory>,
}

/// Reference data listing valid IDs and formats for filling in the template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcelHelper {
    pub categories: Vec<HelperCategory>,
    pub payment_statuses: Vec<String>,
    pub date_formats: Vec<String>,
    pub required_columns: BTreeMap<String, Vec<String>>,
    pub optional_columns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_info() -> FileInfo {
        FileInfo { filename: "a.csv".into(), size: 10, content_type: "text/csv".into() }
    }

    #[test]
    fn import_mode_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ImportMode::CreateCustomers).unwrap(), "\"create_customers\"");
        assert_eq!(serde_json::to_string(&ImportMode::CustomerId).unwrap(), "\"customer_id\"");
    }

    #[test]
    fn validation_result_is_valid_iff_no_errors() {
        let warn_only = ValidationResult::from_issues(
            1,
            RawRow::new(),
            vec![RowIssue::warning(1, "email", ErrorCode::InvalidEmail, "odd email")],
        );
        assert!(warn_only.is_valid);
        assert_eq!(warn_only.warnings.len(), 1);

        let with_error = ValidationResult::from_issues(
            2,
            RawRow::new(),
            vec![RowIssue::error(2, "email", ErrorCode::MissingField, "Missing required field: email")],
        );
        assert!(!with_error.is_valid);
        assert_eq!(with_error.errors, vec!["Missing required field: email".to_string()]);
    }

    #[test]
    fn preview_fold_counts_are_consistent() {
        let results = vec![
            ValidationResult::from_issues(1, RawRow::new(), vec![]),
            ValidationResult::from_issues(
                2,
                RawRow::new(),
                vec![
                    RowIssue::error(2, "email", ErrorCode::MissingField, "a"),
                    RowIssue::error(2, "phone", ErrorCode::MissingField, "b"),
                    RowIssue::warning(2, "service_date", ErrorCode::DateInPast, "c"),
                ],
            ),
        ];
        let summary = PreviewSummary::fold(ImportMode::CreateCustomers, file_info(), results);
        assert_eq!(summary.total_rows, 2);
        assert_eq!(summary.valid_rows + summary.invalid_rows, summary.total_rows);
        assert_eq!(summary.total_errors, 2);
        assert_eq!(summary.total_warnings, 1);
        assert!(summary.can_import);
    }

    #[test]
    fn preview_fold_of_all_invalid_rows_cannot_import() {
        let results = vec![ValidationResult::from_issues(
            1,
            RawRow::new(),
            vec![RowIssue::error(1, "custom_price", ErrorCode::InvalidNumber, "bad")],
        )];
        let summary = PreviewSummary::fold(ImportMode::CustomerId, file_info(), results);
        assert!(!summary.can_import);
        assert_eq!(summary.invalid_results().count(), 1);
    }

    #[test]
    fn payment_status_parses_aliases() {
        assert_eq!(PaymentStatus::parse("Partially Paid"), Some(PaymentStatus::Partial));
        assert_eq!(PaymentStatus::parse(" PAID "), Some(PaymentStatus::Paid));
        assert_eq!(PaymentStatus::parse("maybe"), None);
    }

    #[test]
    fn total_amount_rounds_to_cents() {
        let line = OrderLine {
            service_name: "AC service".into(),
            unit_price: 199.999,
            quantity: 2,
            category_id: None,
            subcategory_id: None,
            service_date: None,
            booking_date: None,
            payment_status: PaymentStatus::Pending,
            service_address: None,
            notes: None,
        };
        assert_eq!(line.total_amount(), 400.0);
    }

    #[test]
    fn record_failed_row_formats_row_prefix() {
        let mut result = ImportResult::default();
        result.record_failed_row(&[
            RowIssue::error(2, "email", ErrorCode::MissingField, "Missing required field: email"),
            RowIssue::warning(2, "phone", ErrorCode::InvalidPhone, "short phone"),
        ]);
        assert_eq!(result.failed_imports, 1);
        assert_eq!(result.errors, vec!["Row 2: Missing required field: email".to_string()]);
    }
}
