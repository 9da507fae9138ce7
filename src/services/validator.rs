//! Row validation for B2B order uploads
//!
//! Validation runs in two phases:
//! 1. shape: required columns per import mode and field formats (pure)
//! 2. references: customer and category IDs against the store (read-only)
//!
//! Every violation of a row is collected; nothing short-circuits at the
//! first failure. Rows that pass become a typed [`ValidatedRow`].

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::services::order_store::OrderStore;
use crate::services::sheet::{self, SheetError, SheetRow};
use crate::types::{
    Category, CustomerIdentity, ErrorCode, ImportMode, OrderLine, PaymentStatus, PreviewSummary,
    RawRow, RowIssue, UploadFile, ValidatedRow, ValidationResult, DATE_COLUMNS, MAX_QUANTITY,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Validation outcome plus the typed row when valid
#[derive(Debug, Clone)]
pub struct CheckedRow {
    pub result: ValidationResult,
    pub row: Option<ValidatedRow>,
}

// =============================================================================
// FIELD PARSING
// =============================================================================

fn value<'a>(raw: &'a RawRow, column: &str) -> Option<&'a str> {
    raw.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
}

/// Parse a price, tolerating currency markers and thousands separators.
/// Returns the amount and whether anything had to be stripped.
fn parse_price(s: &str) -> Option<(f64, bool)> {
    let mut cleaned = s.trim().to_string();
    for marker in ["₹", "Rs.", "Rs", "INR", "$"] {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned = cleaned.replace([',', ' '], "");
    let normalized = cleaned != s.trim();
    let amount: f64 = cleaned.parse().ok()?;
    amount.is_finite().then_some((amount, normalized))
}

/// Parse a date. The flag is true when the value was in ISO form.
pub fn parse_date(s: &str) -> Option<(NaiveDate, bool)> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some((date, true));
    }
    for format in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some((date, false));
        }
    }
    // Excel serial day number
    if let Ok(serial) = s.parse::<i64>() {
        if (20_000..=80_000).contains(&serial) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            return Some((epoch + Duration::days(serial), false));
        }
    }
    None
}

fn parse_id(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().filter(|id| *id > 0)
}

// =============================================================================
// SHAPE VALIDATION
// =============================================================================

/// Check one row against the mode's schema and field formats
pub fn validate_shape(
    row_index: u32,
    raw: &RawRow,
    mode: ImportMode,
    today: NaiveDate,
) -> (Vec<RowIssue>, Option<ValidatedRow>) {
    let mut issues = Vec::new();

    for column in mode.required_columns() {
        if value(raw, column).is_none() {
            issues.push(RowIssue::error(
                row_index,
                column,
                ErrorCode::MissingField,
                format!("Missing required field: {}", column),
            ));
        }
    }

    if mode == ImportMode::CreateCustomers {
        if let Some(email) = value(raw, "email") {
            if !looks_like_email(email) {
                issues.push(RowIssue::warning(
                    row_index,
                    "email",
                    ErrorCode::InvalidEmail,
                    format!("email '{}' does not look like a valid address", email),
                ));
            }
        }
        if let Some(phone) = value(raw, "phone") {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            if digits < 10 {
                issues.push(RowIssue::warning(
                    row_index,
                    "phone",
                    ErrorCode::InvalidPhone,
                    format!("phone '{}' has fewer than 10 digits", phone),
                ));
            }
        }
    }

    let customer_id = match (mode, value(raw, "customer_id")) {
        (ImportMode::CustomerId, Some(v)) => {
            let parsed = parse_id(v);
            if parsed.is_none() {
                issues.push(RowIssue::error(
                    row_index,
                    "customer_id",
                    ErrorCode::InvalidNumber,
                    format!("customer_id '{}' is not a valid ID", v),
                ));
            }
            parsed
        }
        _ => None,
    };

    let unit_price = value(raw, "custom_price").and_then(|v| match parse_price(v) {
        None => {
            issues.push(RowIssue::error(
                row_index,
                "custom_price",
                ErrorCode::InvalidNumber,
                format!("custom_price '{}' is not a valid number", v),
            ));
            None
        }
        Some((amount, _)) if amount < 0.0 => {
            issues.push(RowIssue::error(
                row_index,
                "custom_price",
                ErrorCode::InvalidNumber,
                format!("custom_price must not be negative (got {})", v),
            ));
            None
        }
        Some((amount, normalized)) => {
            if normalized {
                issues.push(RowIssue::warning(
                    row_index,
                    "custom_price",
                    ErrorCode::PriceNormalized,
                    format!("custom_price '{}' was read as {}", v, amount),
                ));
            }
            if amount == 0.0 {
                issues.push(RowIssue::warning(
                    row_index,
                    "custom_price",
                    ErrorCode::ZeroPrice,
                    "custom_price is 0",
                ));
            }
            Some(amount)
        }
    });

    let quantity = match value(raw, "quantity") {
        None => 1,
        Some(v) => match v.parse::<u32>() {
            Ok(q) if (1..=MAX_QUANTITY).contains(&q) => q,
            _ => {
                issues.push(RowIssue::error(
                    row_index,
                    "quantity",
                    ErrorCode::InvalidQuantity,
                    format!("quantity '{}' must be a whole number from 1 to {}", v, MAX_QUANTITY),
                ));
                1
            }
        },
    };

    let mut dates: HashMap<&str, NaiveDate> = HashMap::new();
    for &column in DATE_COLUMNS {
        let Some(v) = value(raw, column) else { continue };
        match parse_date(v) {
            Some((date, iso)) => {
                if !iso {
                    issues.push(RowIssue::warning(
                        row_index,
                        column,
                        ErrorCode::InvalidDate,
                        format!("{} '{}' was read as {}; prefer YYYY-MM-DD", column, v, date),
                    ));
                }
                dates.insert(column, date);
            }
            None => issues.push(RowIssue::error(
                row_index,
                column,
                ErrorCode::InvalidDate,
                format!("Invalid date format for {}: '{}' (use YYYY-MM-DD)", column, v),
            )),
        }
    }
    if let Some(service_date) = dates.get("service_date") {
        if *service_date < today {
            issues.push(RowIssue::warning(
                row_index,
                "service_date",
                ErrorCode::DateInPast,
                format!("service_date {} is in the past", service_date),
            ));
        }
    }

    let payment_status = match value(raw, "payment_status") {
        None => PaymentStatus::default(),
        Some(v) => PaymentStatus::parse(v).unwrap_or_else(|| {
            let allowed: Vec<&str> = PaymentStatus::ALL.iter().map(|s| s.as_str()).collect();
            issues.push(RowIssue::error(
                row_index,
                "payment_status",
                ErrorCode::InvalidPaymentStatus,
                format!("Invalid payment_status '{}'. Allowed: {}", v, allowed.join(", ")),
            ));
            PaymentStatus::default()
        }),
    };

    let mut parse_category = |column: &str, label: &str| {
        value(raw, column).and_then(|v| {
            let parsed = parse_id(v);
            if parsed.is_none() {
                issues.push(RowIssue::error(
                    row_index,
                    column,
                    ErrorCode::InvalidCategory,
                    format!("{} ID '{}' is not a valid number", label, v),
                ));
            }
            parsed
        })
    };
    let category_id = parse_category("category_id", "Category");
    let subcategory_id = parse_category("subcategory_id", "Subcategory");
    if subcategory_id.is_some() && value(raw, "category_id").is_none() {
        issues.push(RowIssue::error(
            row_index,
            "subcategory_id",
            ErrorCode::InvalidCategory,
            "Subcategory ID given without a Category ID",
        ));
    }

    if issues.iter().any(RowIssue::is_error) {
        return (issues, None);
    }

    // No errors, so every required column is present
    let (Some(service_name), Some(unit_price)) = (value(raw, "service_name"), unit_price) else {
        return (issues, None);
    };
    let line = OrderLine {
        service_name: service_name.to_string(),
        unit_price,
        quantity,
        category_id,
        subcategory_id,
        service_date: dates.get("service_date").copied(),
        booking_date: dates.get("booking_date").copied(),
        payment_status,
        service_address: value(raw, "service_address").map(str::to_string),
        notes: value(raw, "notes").map(str::to_string),
    };

    let row = match mode {
        ImportMode::CreateCustomers => ValidatedRow::NewCustomer {
            customer: CustomerIdentity {
                company_name: value(raw, "company_name").unwrap_or_default().to_string(),
                contact_person: value(raw, "contact_person").unwrap_or_default().to_string(),
                email: value(raw, "email").unwrap_or_default().to_lowercase(),
                phone: value(raw, "phone").unwrap_or_default().to_string(),
            },
            line,
        },
        ImportMode::CustomerId => match customer_id {
            Some(customer_id) => ValidatedRow::ExistingCustomer { customer_id, line },
            None => return (issues, None),
        },
    };

    (issues, Some(row))
}

// =============================================================================
// REFERENCE VALIDATION
// =============================================================================

/// Read-only lookups shared by all rows of one file
pub struct ReferenceChecker<'a> {
    store: &'a dyn OrderStore,
    categories: HashMap<i64, Category>,
    known_customers: HashMap<i64, bool>,
}

impl<'a> ReferenceChecker<'a> {
    pub async fn load(store: &'a dyn OrderStore) -> anyhow::Result<Self> {
        let categories = store
            .list_categories()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        Ok(Self { store, categories, known_customers: HashMap::new() })
    }

    pub async fn check(&mut self, row_index: u32, row: &ValidatedRow) -> anyhow::Result<Vec<RowIssue>> {
        let mut issues = Vec::new();
        let line = row.line();

        if let Some(category_id) = line.category_id {
            match self.categories.get(&category_id) {
                None => issues.push(RowIssue::error(
                    row_index,
                    "category_id",
                    ErrorCode::InvalidCategory,
                    format!("Category ID {} does not exist", category_id),
                )),
                Some(category) => {
                    if let Some(sub_id) = line.subcategory_id {
                        if !category.has_subcategory(sub_id) {
                            issues.push(RowIssue::error(
                                row_index,
                                "subcategory_id",
                                ErrorCode::InvalidCategory,
                                format!(
                                    "Subcategory ID {} does not belong to Category ID {}",
                                    sub_id, category_id
                                ),
                            ));
                        }
                    }
                }
            }
        }

        if let ValidatedRow::ExistingCustomer { customer_id, .. } = row {
            let exists = match self.known_customers.get(customer_id) {
                Some(exists) => *exists,
                None => {
                    let exists = self.store.find_customer_by_id(*customer_id).await?.is_some();
                    self.known_customers.insert(*customer_id, exists);
                    exists
                }
            };
            if !exists {
                issues.push(RowIssue::error(
                    row_index,
                    "customer_id",
                    ErrorCode::UnknownCustomer,
                    format!("Customer ID {} not found", customer_id),
                ));
            }
        }

        Ok(issues)
    }
}

/// Validate every row of a parsed file, keeping each row's sheet position
pub async fn validate_rows(
    store: &dyn OrderStore,
    rows: Vec<SheetRow>,
    mode: ImportMode,
    today: NaiveDate,
) -> Result<Vec<CheckedRow>, PipelineError> {
    let mut checker = ReferenceChecker::load(store).await?;
    let mut checked = Vec::with_capacity(rows.len());

    for SheetRow { row_index, values: raw } in rows {
        let (mut issues, typed) = validate_shape(row_index, &raw, mode, today);

        let typed = match typed {
            Some(row) => {
                let reference_issues = checker.check(row_index, &row).await?;
                let ok = reference_issues.is_empty();
                issues.extend(reference_issues);
                ok.then_some(row)
            }
            None => None,
        };

        checked.push(CheckedRow {
            result: ValidationResult::from_issues(row_index, raw, issues),
            row: typed,
        });
    }

    Ok(checked)
}

/// Dry run: parse and validate the whole file without writing anything
pub async fn preview_upload(
    store: &dyn OrderStore,
    file: &UploadFile,
    mode: ImportMode,
    today: NaiveDate,
) -> Result<PreviewSummary, PipelineError> {
    let rows = sheet::parse_upload(file)?;
    let checked = validate_rows(store, rows, mode, today).await?;
    let results = checked.into_iter().map(|c| c.result).collect();
    Ok(PreviewSummary::fold(mode, file.file_info(), results))
}
