//! Database models for paid invoices.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub stripe_invoice_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub billingo_document_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InvoiceCreateDBRequest {
    pub user_id: Option<UserId>,
    pub stripe_invoice_id: String,
    pub amount: Decimal,
    pub currency: String,
}
