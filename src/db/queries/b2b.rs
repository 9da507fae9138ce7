//! B2B customer, catalog and order queries

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::types::{
    B2bCustomer, B2bOrder, Category, CreateB2bCustomerRequest, CreateB2bOrderRequest, Subcategory,
};

// =============================================================================
// CUSTOMERS
// =============================================================================

/// Get customer by ID
pub async fn find_customer_by_id(pool: &PgPool, customer_id: i64) -> Result<Option<B2bCustomer>> {
    let customer = sqlx::query_as::<_, B2bCustomer>(
        r#"
        SELECT id, company_name, contact_person, email, phone, created_at
        FROM b2b_customers
        WHERE id = $1
        "#,
    )
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(customer)
}

/// Find customer by company name and email (case-insensitive)
pub async fn find_customer_by_identity(
    pool: &PgPool,
    company_name: &str,
    email: &str,
) -> Result<Option<B2bCustomer>> {
    let customer = sqlx::query_as::<_, B2bCustomer>(
        r#"
        SELECT id, company_name, contact_person, email, phone, created_at
        FROM b2b_customers
        WHERE LOWER(company_name) = LOWER($1) AND LOWER(email) = LOWER($2)
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(company_name.trim())
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;

    Ok(customer)
}

/// Create a customer
pub async fn create_customer(pool: &PgPool, req: &CreateB2bCustomerRequest) -> Result<B2bCustomer> {
    let customer = sqlx::query_as::<_, B2bCustomer>(
        r#"
        INSERT INTO b2b_customers (company_name, contact_person, email, phone, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING id, company_name, contact_person, email, phone, created_at
        "#,
    )
    .bind(req.company_name.trim())
    .bind(req.contact_person.trim())
    .bind(req.email.trim().to_lowercase())
    .bind(req.phone.trim())
    .fetch_one(pool)
    .await?;

    Ok(customer)
}

// =============================================================================
// CATALOG
// =============================================================================

/// List active categories with their active subcategories
pub async fn list_categories(pool: &PgPool) -> Result<Vec<Category>> {
    let rows: Vec<(i64, String, Option<i64>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT c.id, c.name, s.id, s.name
        FROM service_categories c
        LEFT JOIN service_subcategories s ON s.category_id = c.id AND s.is_active
        WHERE c.is_active
        ORDER BY c.id, s.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut categories: Vec<Category> = Vec::new();
    for (category_id, category_name, sub_id, sub_name) in rows {
        if categories.last().map(|c| c.id) != Some(category_id) {
            categories.push(Category {
                id: category_id,
                name: category_name,
                subcategories: Vec::new(),
            });
        }
        if let (Some(id), Some(name), Some(category)) = (sub_id, sub_name, categories.last_mut()) {
            category.subcategories.push(Subcategory { id, name });
        }
    }

    Ok(categories)
}

// =============================================================================
// ORDERS
// =============================================================================

/// Next value of the order number sequence
pub async fn next_order_sequence(pool: &PgPool) -> Result<i64> {
    let value: i64 = sqlx::query_scalar("SELECT nextval('b2b_order_number_seq')")
        .fetch_one(pool)
        .await?;
    Ok(value)
}

/// Create an order
pub async fn create_order(pool: &PgPool, req: &CreateB2bOrderRequest) -> Result<B2bOrder> {
    let quantity = i32::try_from(req.quantity)
        .with_context(|| format!("quantity {} is out of range", req.quantity))?;

    let order = sqlx::query_as::<_, B2bOrder>(
        r#"
        INSERT INTO b2b_orders (
            order_number, customer_id, service_name, unit_price, quantity, total_amount,
            category_id, subcategory_id, service_date, booking_date,
            payment_status, service_address, notes, source, created_by, created_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6,
            $7, $8, $9, $10,
            $11, $12, $13, 'excel_import', $14, NOW()
        )
        RETURNING id, order_number, customer_id, service_name, total_amount
        "#,
    )
    .bind(&req.order_number)
    .bind(req.customer_id)
    .bind(&req.service_name)
    .bind(req.unit_price)
    .bind(quantity)
    .bind(req.total_amount)
    .bind(req.category_id)
    .bind(req.subcategory_id)
    .bind(req.service_date)
    .bind(req.booking_date)
    .bind(req.payment_status.as_str())
    .bind(&req.service_address)
    .bind(&req.notes)
    .bind(req.created_by)
    .fetch_one(pool)
    .await?;

    Ok(order)
}
