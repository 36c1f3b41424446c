//! Database repository for paid invoices.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::invoices::{Invoice, InvoiceCreateDBRequest},
};

const INVOICE_COLUMNS: &str = "id, user_id, stripe_invoice_id, amount, currency, status, billingo_document_id, created_at";

pub struct Invoices<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Invoices<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record a paid Stripe invoice. Returns None when the invoice was already recorded, which
    /// happens when Stripe redelivers a webhook.
    #[instrument(skip(self, request), fields(stripe_invoice_id = %request.stripe_invoice_id), err)]
    pub async fn create_if_absent(&mut self, request: &InvoiceCreateDBRequest) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (user_id, stripe_invoice_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, 'paid')
            ON CONFLICT (stripe_invoice_id) DO NOTHING
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(request.user_id)
        .bind(&request.stripe_invoice_id)
        .bind(request.amount)
        .bind(&request.currency)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(invoice)
    }

    #[instrument(skip(self), err)]
    pub async fn set_billingo_document(&mut self, id: i64, document_id: i64) -> Result<()> {
        sqlx::query("UPDATE invoices SET billingo_document_id = $2 WHERE id = $1")
            .bind(id)
            .bind(document_id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_stripe_id(&mut self, stripe_invoice_id: &str) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE stripe_invoice_id = $1"
        ))
        .bind(stripe_invoice_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_is_idempotent(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Invoices::new(&mut conn);

        let request = InvoiceCreateDBRequest {
            user_id: None,
            stripe_invoice_id: "in_123".to_string(),
            amount: Decimal::new(499, 2),
            currency: "EUR".to_string(),
        };

        let invoice = repo.create_if_absent(&request).await.unwrap().unwrap();
        assert_eq!(invoice.amount, Decimal::new(499, 2));
        assert_eq!(invoice.status, "paid");
        assert!(invoice.billingo_document_id.is_none());

        assert!(repo.create_if_absent(&request).await.unwrap().is_none());

        repo.set_billingo_document(invoice.id, 987).await.unwrap();
        let fetched = repo.get_by_stripe_id("in_123").await.unwrap().unwrap();
        assert_eq!(fetched.billingo_document_id, Some(987));
    }
}
