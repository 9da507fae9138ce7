//! Order store abstraction
//!
//! The import pipeline only needs a handful of reads and writes against the
//! customer/order tables, so it talks to them through [`OrderStore`]:
//! - `PgOrderStore` for production (PostgreSQL via sqlx)
//! - `MemoryOrderStore` for development and tests (in-process, no database)
//!
//! Configuration via STORE_BACKEND env variable:
//! - "postgres" → PgOrderStore (default)
//! - "memory" → MemoryOrderStore seeded with a demo catalog

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::PgPool;

use crate::db::queries;
use crate::types::{
    B2bCustomer, B2bOrder, Category, CreateB2bCustomerRequest, CreateB2bOrderRequest, Subcategory,
};

/// System-of-record operations used by preview and import
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<B2bCustomer>>;

    /// Match on company name and email, both case-insensitive
    async fn find_customer_by_identity(&self, company_name: &str, email: &str) -> Result<Option<B2bCustomer>>;

    async fn create_customer(&self, req: &CreateB2bCustomerRequest) -> Result<B2bCustomer>;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn next_order_sequence(&self) -> Result<i64>;

    async fn create_order(&self, req: &CreateB2bOrderRequest) -> Result<B2bOrder>;

    /// Get the name of this store implementation
    fn name(&self) -> &'static str;
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<B2bCustomer>> {
        queries::b2b::find_customer_by_id(&self.pool, customer_id).await
    }

    async fn find_customer_by_identity(&self, company_name: &str, email: &str) -> Result<Option<B2bCustomer>> {
        queries::b2b::find_customer_by_identity(&self.pool, company_name, email).await
    }

    async fn create_customer(&self, req: &CreateB2bCustomerRequest) -> Result<B2bCustomer> {
        queries::b2b::create_customer(&self.pool, req).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        queries::b2b::list_categories(&self.pool).await
    }

    async fn next_order_sequence(&self) -> Result<i64> {
        queries::b2b::next_order_sequence(&self.pool).await
    }

    async fn create_order(&self, req: &CreateB2bOrderRequest) -> Result<B2bOrder> {
        queries::b2b::create_order(&self.pool, req).await
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Default)]
struct MemoryState {
    customers: Vec<B2bCustomer>,
    orders: Vec<(CreateB2bOrderRequest, B2bOrder)>,
    categories: Vec<Category>,
    order_sequence: i64,
}

/// In-process store. Holds everything behind one mutex; fine for the
/// volumes a single upload produces.
#[derive(Default)]
pub struct MemoryOrderStore {
    state: Mutex<MemoryState>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(categories: Vec<Category>) -> Self {
        let store = Self::default();
        store.state.lock().categories = categories;
        store
    }

    /// Small home-services catalog for local runs
    pub fn with_demo_catalog() -> Self {
        let sub = |id: i64, name: &str| Subcategory { id, name: name.to_string() };
        Self::with_categories(vec![
            Category {
                id: 1,
                name: "Cleaning".to_string(),
                subcategories: vec![sub(101, "Deep cleaning"), sub(102, "Sofa cleaning")],
            },
            Category {
                id: 2,
                name: "Appliance repair".to_string(),
                subcategories: vec![sub(201, "AC service"), sub(202, "Washing machine repair")],
            },
            Category {
                id: 3,
                name: "Pest control".to_string(),
                subcategories: vec![sub(301, "General pest control")],
            },
        ])
    }

    /// Insert an existing customer directly
    pub fn seed_customer(&self, company_name: &str, email: &str) -> B2bCustomer {
        let mut state = self.state.lock();
        let customer = B2bCustomer {
            id: state.customers.len() as i64 + 1,
            company_name: company_name.to_string(),
            contact_person: None,
            email: Some(email.to_string()),
            phone: None,
            created_at: Utc::now(),
        };
        state.customers.push(customer.clone());
        customer
    }

    pub fn customers(&self) -> Vec<B2bCustomer> {
        self.state.lock().customers.clone()
    }

    pub fn orders(&self) -> Vec<CreateB2bOrderRequest> {
        self.state.lock().orders.iter().map(|(req, _)| req.clone()).collect()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<B2bCustomer>> {
        Ok(self.state.lock().customers.iter().find(|c| c.id == customer_id).cloned())
    }

    async fn find_customer_by_identity(&self, company_name: &str, email: &str) -> Result<Option<B2bCustomer>> {
        let company = company_name.trim().to_lowercase();
        let email = email.trim().to_lowercase();
        Ok(self
            .state
            .lock()
            .customers
            .iter()
            .find(|c| {
                c.company_name.to_lowercase() == company
                    && c.email.as_deref().map(str::to_lowercase).as_deref() == Some(email.as_str())
            })
            .cloned())
    }

    async fn create_customer(&self, req: &CreateB2bCustomerRequest) -> Result<B2bCustomer> {
        let mut state = self.state.lock();
        let customer = B2bCustomer {
            id: state.customers.len() as i64 + 1,
            company_name: req.company_name.trim().to_string(),
            contact_person: Some(req.contact_person.trim().to_string()),
            email: Some(req.email.trim().to_lowercase()),
            phone: Some(req.phone.trim().to_string()),
            created_at: Utc::now(),
        };
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.state.lock().categories.clone())
    }

    async fn next_order_sequence(&self) -> Result<i64> {
        let mut state = self.state.lock();
        state.order_sequence += 1;
        Ok(state.order_sequence)
    }

    async fn create_order(&self, req: &CreateB2bOrderRequest) -> Result<B2bOrder> {
        let mut state = self.state.lock();
        if state.orders.iter().any(|(r, _)| r.order_number == req.order_number) {
            return Err(anyhow!("duplicate order number {}", req.order_number));
        }
        if !state.customers.iter().any(|c| c.id == req.customer_id) {
            return Err(anyhow!("customer {} does not exist", req.customer_id));
        }
        let order = B2bOrder {
            id: state.orders.len() as i64 + 1,
            order_number: req.order_number.clone(),
            customer_id: req.customer_id,
            service_name: req.service_name.clone(),
            total_amount: req.total_amount,
        };
        state.orders.push((req.clone(), order.clone()));
        Ok(order)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Pick a store from STORE_BACKEND. `pool` is required for "postgres".
pub fn create_order_store(backend: &str, pool: Option<PgPool>) -> Result<Box<dyn OrderStore>> {
    match backend {
        "memory" => Ok(Box::new(MemoryOrderStore::with_demo_catalog())),
        "postgres" => {
            let pool = pool.ok_or_else(|| anyhow!("postgres store requires a database pool"))?;
            Ok(Box::new(PgOrderStore::new(pool)))
        }
        other => Err(anyhow!("Unknown STORE_BACKEND '{}', expected 'postgres' or 'memory'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;
    use uuid::Uuid;

    fn order_request(order_number: &str, customer_id: i64) -> CreateB2bOrderRequest {
        CreateB2bOrderRequest {
            order_number: order_number.to_string(),
            created_by: Uuid::nil(),
            customer_id,
            service_name: "Deep cleaning".to_string(),
            unit_price: 1500.0,
            quantity: 1,
            total_amount: 1500.0,
            category_id: None,
            subcategory_id: None,
            service_date: None,
            booking_date: None,
            payment_status: PaymentStatus::Pending,
            service_address: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn identity_lookup_is_case_insensitive() {
        let store = MemoryOrderStore::new();
        let seeded = store.seed_customer("Acme Facilities", "ops@acme.in");

        let found = store.find_customer_by_identity(" acme facilities ", "OPS@ACME.IN").await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(seeded.id));

        let missing = store.find_customer_by_identity("Acme Facilities", "other@acme.in").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn order_sequence_increments() {
        let store = MemoryOrderStore::new();
        assert_eq!(store.next_order_sequence().await.unwrap(), 1);
        assert_eq!(store.next_order_sequence().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn create_order_requires_existing_customer() {
        let store = MemoryOrderStore::new();
        assert!(store.create_order(&order_request("B2B-1", 99)).await.is_err());

        let customer = store.seed_customer("Acme", "a@acme.in");
        let order = store.create_order(&order_request("B2B-1", customer.id)).await.unwrap();
        assert_eq!(order.order_number, "B2B-1");
        assert!(store.create_order(&order_request("B2B-1", customer.id)).await.is_err());
        assert_eq!(store.orders().len(), 1);
    }

    #[tokio::test]
    async fn demo_catalog_has_subcategories() {
        let store = MemoryOrderStore::with_demo_catalog();
        let categories = store.list_categories().await.unwrap();
        assert!(categories.iter().any(|c| c.id == 2 && c.has_subcategory(201)));
    }

    #[test]
    fn factory_selects_backend() {
        assert_eq!(create_order_store("memory", None).unwrap().name(), "memory");
        assert!(create_order_store("postgres", None).is_err());
        assert!(create_order_store("redis", None).is_err());
    }
}
