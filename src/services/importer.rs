//! Commit importer
//!
//! Re-parses and re-validates the uploaded file, then persists the valid rows.
//! Nothing from an earlier preview is trusted. Rows are committed one by one:
//! a failure on one row is recorded against that row and the rest go on.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::order_store::OrderStore;
use crate::services::sheet;
use crate::services::validator::{validate_rows, PipelineError};
use crate::types::{
    B2bCustomer, CreateB2bCustomerRequest, CreateB2bOrderRequest, CustomerIdentity, ErrorCode,
    ImportEnvelope, ImportOptions, ImportResult, ImportedOrder, RowIssue, UploadFile, ValidatedRow,
};

/// `B2B-YYYYMMDD-NNNNN`
pub fn order_number(date: NaiveDate, sequence: i64) -> String {
    format!("B2B-{}-{:05}", date.format("%Y%m%d"), sequence)
}

/// Per-commit state: customers resolved so far and the creation counter
struct Committer<'a> {
    store: &'a dyn OrderStore,
    options: ImportOptions,
    created_by: Uuid,
    today: NaiveDate,
    customers: HashMap<(String, String), B2bCustomer>,
    created_customers: u32,
}

impl<'a> Committer<'a> {
    fn persistence_issue(row_index: u32, field: &str, what: &str, err: anyhow::Error) -> RowIssue {
        warn!("Row {}: {} failed: {}", row_index, what, err);
        RowIssue::error(
            row_index,
            field,
            ErrorCode::PersistenceFailed,
            format!("Failed to {}: {}", what, err),
        )
    }

    async fn resolve_new_customer(
        &mut self,
        row_index: u32,
        identity: &CustomerIdentity,
    ) -> Result<B2bCustomer, RowIssue> {
        let key = identity.key();
        if let Some(customer) = self.customers.get(&key) {
            return Ok(customer.clone());
        }

        let existing = self
            .store
            .find_customer_by_identity(&identity.company_name, &identity.email)
            .await
            .map_err(|e| Self::persistence_issue(row_index, "company_name", "look up customer", e))?;

        let customer = match existing {
            Some(customer) => customer,
            None if self.options.create_customers => {
                let req = CreateB2bCustomerRequest {
                    company_name: identity.company_name.clone(),
                    contact_person: identity.contact_person.clone(),
                    email: identity.email.clone(),
                    phone: identity.phone.clone(),
                };
                let customer = self
                    .store
                    .create_customer(&req)
                    .await
                    .map_err(|e| Self::persistence_issue(row_index, "company_name", "create customer", e))?;
                debug!("Row {}: created customer {} ({})", row_index, customer.id, customer.company_name);
                self.created_customers += 1;
                customer
            }
            None => {
                return Err(RowIssue::error(
                    row_index,
                    "company_name",
                    ErrorCode::CustomerNotCreated,
                    format!(
                        "Customer '{}' <{}> does not exist and customer creation is disabled",
                        identity.company_name, identity.email
                    ),
                ))
            }
        };

        self.customers.insert(key, customer.clone());
        Ok(customer)
    }

    async fn resolve_existing_customer(&self, row_index: u32, customer_id: i64) -> Result<B2bCustomer, RowIssue> {
        self.store
            .find_customer_by_id(customer_id)
            .await
            .map_err(|e| Self::persistence_issue(row_index, "customer_id", "look up customer", e))?
            .ok_or_else(|| {
                RowIssue::error(
                    row_index,
                    "customer_id",
                    ErrorCode::UnknownCustomer,
                    format!("Customer ID {} not found", customer_id),
                )
            })
    }

    async fn commit_row(&mut self, row_index: u32, row: &ValidatedRow) -> Result<ImportedOrder, RowIssue> {
        let customer = match row {
            ValidatedRow::NewCustomer { customer, .. } => self.resolve_new_customer(row_index, customer).await?,
            ValidatedRow::ExistingCustomer { customer_id, .. } => {
                self.resolve_existing_customer(row_index, *customer_id).await?
            }
        };

        let line = row.line();
        let sequence = self
            .store
            .next_order_sequence()
            .await
            .map_err(|e| Self::persistence_issue(row_index, "service_name", "allocate order number", e))?;

        let req = CreateB2bOrderRequest {
            order_number: order_number(self.today, sequence),
            created_by: self.created_by,
            customer_id: customer.id,
            service_name: line.service_name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            total_amount: line.total_amount(),
            category_id: line.category_id,
            subcategory_id: line.subcategory_id,
            service_date: line.service_date,
            booking_date: line.booking_date,
            payment_status: line.payment_status,
            service_address: line.service_address.clone(),
            notes: line.notes.clone(),
        };

        let order = self
            .store
            .create_order(&req)
            .await
            .map_err(|e| Self::persistence_issue(row_index, "service_name", "save order", e))?;

        Ok(ImportedOrder {
            order_number: order.order_number,
            customer_company: customer.company_name,
            service_name: order.service_name,
            total_amount: order.total_amount,
        })
    }
}

/// Commit an uploaded file.
///
/// The envelope always carries the [`ImportResult`]; `success` is true only
/// when every row was imported. An unreadable file is returned as
/// [`PipelineError::Sheet`].
pub async fn import_data(
    store: &dyn OrderStore,
    file: &UploadFile,
    options: ImportOptions,
    created_by: Uuid,
    today: NaiveDate,
) -> Result<ImportEnvelope<ImportResult>, PipelineError> {
    let rows = sheet::parse_upload(file)?;
    let checked = validate_rows(store, rows, options.import_mode, today).await?;

    let mut result = ImportResult {
        total_rows: checked.len() as u32,
        ..Default::default()
    };

    if result.total_rows == 0 {
        return Ok(ImportEnvelope::partial("The file contains no data rows", result));
    }

    if !options.skip_invalid && checked.iter().any(|c| c.row.is_none()) {
        for c in checked.iter().filter(|c| c.row.is_none()) {
            result.record_failed_row(&c.result.issues);
        }
        info!(
            "Import of '{}' rejected: {} of {} rows invalid",
            file.filename, result.failed_imports, result.total_rows
        );
        let message = format!(
            "{} of {} rows are invalid; nothing was imported",
            result.failed_imports, result.total_rows
        );
        return Ok(ImportEnvelope::partial(message, result));
    }

    let mut committer = Committer {
        store,
        options,
        created_by,
        today,
        customers: HashMap::new(),
        created_customers: 0,
    };

    for c in checked {
        let row_index = c.result.row_index;
        let Some(row) = c.row else {
            result.record_failed_row(&c.result.issues);
            continue;
        };
        match committer.commit_row(row_index, &row).await {
            Ok(order) => {
                result.successful_imports += 1;
                result.imported_orders.push(order);
            }
            Err(issue) => result.record_failed_row(&[issue]),
        }
    }
    result.created_customers = committer.created_customers;

    info!(
        "Import of '{}' via {}: {} imported, {} failed, {} customers created",
        file.filename,
        store.name(),
        result.successful_imports,
        result.failed_imports,
        result.created_customers
    );

    if result.failed_imports == 0 {
        let message = format!("Imported {} orders", result.successful_imports);
        Ok(ImportEnvelope::ok(message, result))
    } else {
        let message = format!(
            "Imported {} of {} rows; {} failed",
            result.successful_imports, result.total_rows, result.failed_imports
        );
        Ok(ImportEnvelope::partial(message, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::order_store::MemoryOrderStore;
    use crate::types::{
        B2bOrder, Category, ImportMode, MIME_CSV,
    };
    use anyhow::anyhow;
    use async_trait::async_trait;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn csv(body: &str) -> UploadFile {
        UploadFile::new("orders.csv", MIME_CSV, body.as_bytes().to_vec())
    }

    const CREATE_HEADER: &str = "company_name,contact_person,email,phone,service_name,custom_price,quantity\n";

    fn three_rows_missing_email() -> UploadFile {
        csv(&format!(
            "{}Acme,Priya,ops@acme.in,9876543210,Deep cleaning,2499,1\n\
             Beta,Rahul,,9876543211,Sofa cleaning,999,1\n\
             Gamma,Anita,anita@gamma.in,9876543212,AC service,650,2\n",
            CREATE_HEADER
        ))
    }

    fn options(skip_invalid: bool, create_customers: bool, import_mode: ImportMode) -> ImportOptions {
        ImportOptions { skip_invalid, create_customers, import_mode }
    }

    fn assert_counts_bounded(result: &ImportResult) {
        assert!(result.successful_imports + result.failed_imports <= result.total_rows);
    }

    #[test]
    fn order_number_format() {
        assert_eq!(order_number(today(), 42), "B2B-20260301-00042");
    }

    #[tokio::test]
    async fn skip_invalid_imports_valid_rows_and_reports_the_rest() {
        let store = MemoryOrderStore::with_demo_catalog();
        let envelope = import_data(
            &store,
            &three_rows_missing_email(),
            options(true, true, ImportMode::CreateCustomers),
            Uuid::nil(),
            today(),
        )
        .await
        .unwrap();

        assert!(!envelope.success);
        let result = envelope.data.unwrap();
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.successful_imports, 2);
        assert_eq!(result.failed_imports, 1);
        assert_eq!(result.created_customers, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Row 2: "));
        assert!(result.errors[0].contains("email"));
        assert_counts_bounded(&result);

        assert_eq!(result.imported_orders[1].customer_company, "Gamma");
        assert_eq!(result.imported_orders[1].total_amount, 1300.0);
        assert_eq!(result.imported_orders[0].order_number, "B2B-20260301-00001");
        assert_eq!(store.orders().len(), 2);
    }

    #[tokio::test]
    async fn invalid_rows_gate_the_batch_without_skip_invalid() {
        let store = MemoryOrderStore::with_demo_catalog();
        let envelope = import_data(
            &store,
            &three_rows_missing_email(),
            options(false, true, ImportMode::CreateCustomers),
            Uuid::nil(),
            today(),
        )
        .await
        .unwrap();

        assert!(!envelope.success);
        let result = envelope.data.unwrap();
        assert_eq!(result.successful_imports, 0);
        assert_eq!(result.failed_imports, 1);
        assert_counts_bounded(&result);
        assert!(store.orders().is_empty());
        assert!(store.customers().is_empty());
    }

    #[tokio::test]
    async fn clean_file_is_a_full_success() {
        let store = MemoryOrderStore::with_demo_catalog();
        let file = csv(&format!(
            "{}Acme,Priya,ops@acme.in,9876543210,Deep cleaning,2499,1\n",
            CREATE_HEADER
        ));
        let envelope = import_data(&store, &file, options(false, true, ImportMode::CreateCustomers), Uuid::nil(), today())
            .await
            .unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap().successful_imports, 1);
    }

    #[tokio::test]
    async fn customers_are_deduplicated_within_a_batch() {
        let store = MemoryOrderStore::with_demo_catalog();
        let file = csv(&format!(
            "{}Acme,Priya,ops@acme.in,9876543210,Deep cleaning,2499,1\n\
             ACME,Priya,OPS@acme.in,9876543210,Sofa cleaning,999,1\n",
            CREATE_HEADER
        ));
        let envelope = import_data(&store, &file, options(true, true, ImportMode::CreateCustomers), Uuid::nil(), today())
            .await
            .unwrap();

        let result = envelope.data.unwrap();
        assert_eq!(result.successful_imports, 2);
        assert_eq!(result.created_customers, 1);
        let orders = store.orders();
        assert_eq!(orders[0].customer_id, orders[1].customer_id);
    }

    #[tokio::test]
    async fn existing_customer_is_reused_and_creation_can_be_disabled() {
        let store = MemoryOrderStore::with_demo_catalog();
        store.seed_customer("Acme", "ops@acme.in");
        let file = csv(&format!(
            "{}Acme,Priya,ops@acme.in,9876543210,Deep cleaning,2499,1\n\
             Newco,Ravi,ravi@newco.in,9876543219,AC service,650,1\n",
            CREATE_HEADER
        ));
        let envelope = import_data(&store, &file, options(true, false, ImportMode::CreateCustomers), Uuid::nil(), today())
            .await
            .unwrap();

        let result = envelope.data.unwrap();
        assert_eq!(result.successful_imports, 1);
        assert_eq!(result.created_customers, 0);
        assert_eq!(result.issues[0].code, ErrorCode::CustomerNotCreated);
        assert!(result.errors[0].starts_with("Row 2: "));
        assert_eq!(store.customers().len(), 1);
    }

    #[tokio::test]
    async fn customer_id_mode_uses_quantity_and_catalog() {
        let store = MemoryOrderStore::with_demo_catalog();
        let customer = store.seed_customer("Acme", "ops@acme.in");
        let file = csv(&format!(
            "customer_id,service_name,custom_price,quantity,category_id,subcategory_id,payment_status\n\
             {id},AC service,649.99,3,2,201,paid\n\
             {id},AC service,649.99,1,2,999,paid\n",
            id = customer.id
        ));
        let envelope = import_data(&store, &file, options(true, false, ImportMode::CustomerId), Uuid::nil(), today())
            .await
            .unwrap();

        let result = envelope.data.unwrap();
        assert_eq!(result.successful_imports, 1);
        assert_eq!(result.failed_imports, 1);
        assert_eq!(result.imported_orders[0].total_amount, 1949.97);
        assert_eq!(store.orders()[0].payment_status, crate::types::PaymentStatus::Paid);
        assert_eq!(result.issues[0].code, ErrorCode::InvalidCategory);
    }

    #[tokio::test]
    async fn header_only_file_is_not_a_success() {
        let store = MemoryOrderStore::new();
        let envelope = import_data(&store, &csv(CREATE_HEADER), options(true, true, ImportMode::CreateCustomers), Uuid::nil(), today())
            .await
            .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.data.unwrap().total_rows, 0);
    }

    /// Delegates to a memory store but refuses orders for one service
    struct FlakyStore {
        inner: MemoryOrderStore,
        failing_service: &'static str,
    }

    #[async_trait]
    impl OrderStore for FlakyStore {
        async fn find_customer_by_id(&self, customer_id: i64) -> anyhow::Result<Option<B2bCustomer>> {
            self.inner.find_customer_by_id(customer_id).await
        }

        async fn find_customer_by_identity(&self, company_name: &str, email: &str) -> anyhow::Result<Option<B2bCustomer>> {
            self.inner.find_customer_by_identity(company_name, email).await
        }

        async fn create_customer(&self, req: &CreateB2bCustomerRequest) -> anyhow::Result<B2bCustomer> {
            self.inner.create_customer(req).await
        }

        async fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
            self.inner.list_categories().await
        }

        async fn next_order_sequence(&self) -> anyhow::Result<i64> {
            self.inner.next_order_sequence().await
        }

        async fn create_order(&self, req: &CreateB2bOrderRequest) -> anyhow::Result<B2bOrder> {
            if req.service_name == self.failing_service {
                return Err(anyhow!("connection reset"));
            }
            self.inner.create_order(req).await
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[test]
    fn persistence_failure_only_fails_its_row() {
        let store = FlakyStore {
            inner: MemoryOrderStore::with_demo_catalog(),
            failing_service: "Sofa cleaning",
        };
        let file = csv(&format!(
            "{}Acme,Priya,ops@acme.in,9876543210,Deep cleaning,2499,1\n\
             Beta,Rahul,rahul@beta.in,9876543211,Sofa cleaning,999,1\n\
             Gamma,Anita,anita@gamma.in,9876543212,AC service,650,2\n",
            CREATE_HEADER
        ));

        let envelope = tokio_test::block_on(import_data(
            &store,
            &file,
            options(true, true, ImportMode::CreateCustomers),
            Uuid::nil(),
            today(),
        ))
        .unwrap();

        assert!(!envelope.success);
        let result = envelope.data.unwrap();
        assert_eq!(result.successful_imports, 2);
        assert_eq!(result.failed_imports, 1);
        assert_eq!(result.issues[0].code, ErrorCode::PersistenceFailed);
        assert!(result.errors[0].starts_with("Row 2: Failed to save order"));
        assert_counts_bounded(&result);
        assert_eq!(store.inner.orders().len(), 2);
    }
}
