//! B2B customer, order and catalog types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::PaymentStatus;

/// B2B customer entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct B2bCustomer {
    pub id: i64,
    pub company_name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a customer during import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateB2bCustomerRequest {
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
}

/// Request to create an order during import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateB2bOrderRequest {
    pub order_number: String,
    /// Admin user who ran the import
    pub created_by: Uuid,
    pub customer_id: i64,
    pub service_name: String,
    pub unit_price: f64,
    pub quantity: u32,
    pub total_amount: f64,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub service_date: Option<NaiveDate>,
    pub booking_date: Option<NaiveDate>,
    pub payment_status: PaymentStatus,
    pub service_address: Option<String>,
    pub notes: Option<String>,
}

/// Persisted order, as much as the import result needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct B2bOrder {
    pub id: i64,
    pub order_number: String,
    pub customer_id: i64,
    pub service_name: String,
    pub total_amount: f64,
}

/// Service category with its subcategories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subcategory {
    pub id: i64,
    pub name: String,
}

impl Category {
    pub fn has_subcategory(&self, subcategory_id: i64) -> bool {
        self.subcategories.iter().any(|s| s.id == subcategory_id)
    }
}
