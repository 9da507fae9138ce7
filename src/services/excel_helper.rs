//! Reference sheet for filling in the import template

use std::collections::BTreeMap;

use anyhow::Result;

use crate::services::order_store::OrderStore;
use crate::types::{ExcelHelper, HelperCategory, HelperSubcategory, ImportMode, PaymentStatus, OPTIONAL_COLUMNS};

/// Date formats the validator accepts, preferred first
pub const DATE_FORMATS: &[&str] = &["YYYY-MM-DD", "DD/MM/YYYY", "DD-MM-YYYY", "DD.MM.YYYY", "YYYY/MM/DD"];

/// Valid category/subcategory IDs, payment statuses, date formats and columns
pub async fn build_excel_helper(store: &dyn OrderStore) -> Result<ExcelHelper> {
    let categories = store
        .list_categories()
        .await?
        .into_iter()
        .map(|c| HelperCategory {
            id: c.id,
            name: c.name,
            subcategories: c
                .subcategories
                .into_iter()
                .map(|s| HelperSubcategory { id: s.id, name: s.name })
                .collect(),
        })
        .collect();

    let required_columns = [ImportMode::CreateCustomers, ImportMode::CustomerId]
        .into_iter()
        .map(|mode| {
            let columns = mode.required_columns().iter().map(|c| c.to_string()).collect();
            (mode.as_str().to_string(), columns)
        })
        .collect::<BTreeMap<_, _>>();

    Ok(ExcelHelper {
        categories,
        payment_statuses: PaymentStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
        date_formats: DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
        required_columns,
        optional_columns: OPTIONAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::order_store::MemoryOrderStore;

    #[tokio::test]
    async fn helper_lists_catalog_and_columns() {
        let store = MemoryOrderStore::with_demo_catalog();
        let helper = build_excel_helper(&store).await.unwrap();

        assert_eq!(helper.categories.len(), 3);
        assert_eq!(helper.categories[1].subcategories[0].id, 201);
        assert_eq!(helper.payment_statuses[0], "pending");
        assert_eq!(helper.required_columns["customer_id"], vec!["customer_id", "service_name", "custom_price"]);
        assert!(helper.optional_columns.contains(&"notes".to_string()));
    }
}
