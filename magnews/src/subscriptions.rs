//! Reconciles payment provider events with the local subscription state.
//!
//! The user row carries the state the rest of the API reads (`subscription_status` and
//! `subscription_end_date`); the `subscriptions` table mirrors the provider's view of each
//! subscription so that later events, which only carry a subscription id, can be traced back to a
//! user. Transitions:
//!
//! | Event                           | User status afterwards                  |
//! |---------------------------------|-----------------------------------------|
//! | checkout completed              | `active`, end = current period end      |
//! | subscription created / updated  | `active` if provider says so, else `expired` |
//! | subscription deleted            | `cancelled`, end cleared                |
//! | invoice paid                    | as for updated, plus an invoice record  |
//! | invoice payment failed          | unchanged                               |

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use crate::{
    billingo::{BillingoClient, build_subscription_invoice},
    db::{
        handlers::{Invoices, Repository, Subscriptions, Users},
        models::{invoices::InvoiceCreateDBRequest, subscriptions::SubscriptionUpsertDBRequest},
    },
    errors::{Error, Result},
    payment_providers::{PaidInvoice, PaymentProvider, SubscriptionInfo, WebhookEvent, WebhookEventKind},
    types::{SubscriptionStatus, UserId, abbrev_uuid},
};

/// Whether the user currently has a paid subscription.
///
/// An `active` user whose end date has passed is moved to `expired` on the way.
#[instrument(skip(conn, end_date), fields(user_id = %abbrev_uuid(&user_id)), err)]
pub async fn is_subscribed(
    conn: &mut PgConnection,
    user_id: UserId,
    status: SubscriptionStatus,
    end_date: Option<DateTime<Utc>>,
) -> Result<bool> {
    if status != SubscriptionStatus::Active {
        return Ok(false);
    }

    match end_date {
        Some(end) if end < Utc::now() => {
            info!("Subscription lapsed, marking user expired");
            Users::new(conn).set_subscription(user_id, SubscriptionStatus::Expired, Some(end)).await?;
            Ok(false)
        }
        _ => Ok(true),
    }
}

/// Collaborators needed to act on a webhook event.
pub struct Reconciler<'a> {
    pub db: &'a PgPool,
    pub provider: &'a dyn PaymentProvider,
    pub billingo: Option<&'a BillingoClient>,
}

impl Reconciler<'_> {
    /// Apply one verified webhook event.
    #[instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type), err)]
    pub async fn apply(&self, event: &WebhookEvent) -> Result<()> {
        metrics::counter!("magnews_webhook_events_total", "type" => event.event_type.clone()).increment(1);

        match &event.kind {
            WebhookEventKind::CheckoutCompleted { user_id, subscription_id } => {
                let (Some(user_id), Some(subscription_id)) = (user_id, subscription_id) else {
                    warn!("Checkout session without user or subscription reference, ignoring");
                    return Ok(());
                };
                self.checkout_completed(*user_id, subscription_id).await
            }
            WebhookEventKind::SubscriptionChanged(info) => {
                self.subscription_changed(info).await?;
                Ok(())
            }
            WebhookEventKind::SubscriptionDeleted { subscription_id } => self.subscription_deleted(subscription_id).await,
            WebhookEventKind::PaymentSucceeded(invoice) => self.payment_succeeded(invoice).await,
            WebhookEventKind::PaymentFailed { subscription_id } => {
                warn!(subscription_id = ?subscription_id, "Invoice payment failed");
                Ok(())
            }
            WebhookEventKind::Ignored => Ok(()),
        }
    }

    async fn checkout_completed(&self, user_id: UserId, subscription_id: &str) -> Result<()> {
        let info = self.provider.retrieve_subscription(subscription_id).await?;

        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;
        Subscriptions::new(&mut tx)
            .upsert_for_user(&SubscriptionUpsertDBRequest {
                user_id,
                stripe_subscription_id: info.id.clone(),
                status: info.status.clone(),
                current_period_end: info.current_period_end,
            })
            .await?;

        let updated = Users::new(&mut tx)
            .set_subscription(user_id, SubscriptionStatus::Active, info.current_period_end)
            .await?;
        if !updated {
            return Err(Error::NotFound {
                resource: "User".to_string(),
                id: user_id.to_string(),
            });
        }
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        info!(user_id = %abbrev_uuid(&user_id), "Subscription activated");
        Ok(())
    }

    /// Mirror the provider's status. Returns the owning user when the subscription is known.
    async fn subscription_changed(&self, info: &SubscriptionInfo) -> Result<Option<UserId>> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let Some(record) = Subscriptions::new(&mut tx)
            .update_status(&info.id, &info.status, info.current_period_end)
            .await?
        else {
            warn!(subscription_id = %info.id, "Update for unknown subscription, ignoring");
            return Ok(None);
        };

        let status = if info.is_active() {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Expired
        };
        Users::new(&mut tx)
            .set_subscription(record.user_id, status, record.current_period_end)
            .await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        info!(user_id = %abbrev_uuid(&record.user_id), %status, "Subscription state updated");
        Ok(Some(record.user_id))
    }

    async fn subscription_deleted(&self, subscription_id: &str) -> Result<()> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let Some(record) = Subscriptions::new(&mut tx)
            .update_status(subscription_id, "canceled", None)
            .await?
        else {
            warn!(subscription_id, "Deletion of unknown subscription, ignoring");
            return Ok(());
        };

        Users::new(&mut tx)
            .set_subscription(record.user_id, SubscriptionStatus::Cancelled, None)
            .await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        info!(user_id = %abbrev_uuid(&record.user_id), "Subscription cancelled");
        Ok(())
    }

    async fn payment_succeeded(&self, invoice: &PaidInvoice) -> Result<()> {
        let user_id = match &invoice.subscription_id {
            Some(subscription_id) => {
                let info = self.provider.retrieve_subscription(subscription_id).await?;
                self.subscription_changed(&info).await?
            }
            None => None,
        };

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let Some(record) = Invoices::new(&mut conn)
            .create_if_absent(&InvoiceCreateDBRequest {
                user_id,
                stripe_invoice_id: invoice.invoice_id.clone(),
                amount: invoice.amount_paid,
                currency: invoice.currency.clone(),
            })
            .await?
        else {
            info!(invoice_id = %invoice.invoice_id, "Invoice already recorded");
            return Ok(());
        };

        let Some(billingo) = self.billingo else {
            return Ok(());
        };

        let mut customer = invoice.customer.clone();
        if let Some(user_id) = user_id
            && let Some(user) = Users::new(&mut conn).get_by_id(user_id).await?
            && let Some(billing_name) = user.billing_name.filter(|name| !name.trim().is_empty())
        {
            customer.name = billing_name;
        }

        let document = build_subscription_invoice(
            billingo.config(),
            &customer,
            invoice.amount_paid,
            invoice.tax,
            &invoice.currency,
            &invoice.invoice_id,
            Utc::now().date_naive(),
        );

        // The payment has been taken either way; a failed invoice is retried by hand
        match billingo.create_invoice(&document).await {
            Ok(response) => {
                if let Some(document_id) = response.get("id").and_then(serde_json::Value::as_i64) {
                    Invoices::new(&mut conn).set_billingo_document(record.id, document_id).await?;
                }
                info!(invoice_id = %invoice.invoice_id, "Billingo invoice issued");
            }
            Err(e) => {
                warn!(invoice_id = %invoice.invoice_id, error = %e, "Failed to issue Billingo invoice");
            }
        }

        Ok(())
    }
}
