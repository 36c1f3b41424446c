//! Billingo v3 client for issuing invoices for paid subscription periods.

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::{config::BillingoConfig, errors::Error};

pub const SUBSCRIPTION_ITEM_NAME: &str = "Magicians News - Monthly Subscription";

#[derive(Debug, Error)]
pub enum BillingoError {
    #[error("Failed to create Billingo invoice: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to create Billingo invoice: Billingo returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to create Billingo invoice: invalid API base URL")]
    InvalidUrl,
}

impl From<BillingoError> for Error {
    fn from(err: BillingoError) -> Self {
        Error::Upstream {
            service: "Billingo".to_string(),
            message: err.to_string(),
        }
    }
}

/// Who the invoice is made out to.
#[derive(Debug, Clone, Default)]
pub struct BillingCustomer {
    pub name: String,
    pub email: String,
    /// ISO 3166-1 alpha-2
    pub country: String,
    pub postal_code: String,
    pub city: String,
    pub line1: String,
    pub vat_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRequest {
    pub vendor_id: String,
    pub partner: Partner,
    pub block_id: String,
    pub bank_account_id: String,
    #[serde(rename = "type")]
    pub document_type: String,
    pub fulfillment_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_method: String,
    pub language: String,
    pub currency: String,
    pub comment: String,
    pub items: Vec<DocumentItem>,
    pub settings: DocumentSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct Partner {
    pub name: String,
    pub address: PartnerAddress,
    pub emails: Vec<String>,
    pub taxcode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerAddress {
    pub country_code: String,
    pub post_code: String,
    pub city: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentItem {
    pub name: String,
    pub unit_price: f64,
    pub unit_price_type: String,
    pub quantity: u32,
    pub unit: String,
    pub vat: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSettings {
    pub should_send_email: bool,
}

/// Billingo accepts a fixed set of currencies; anything else is invoiced in EUR.
pub fn billingo_currency(currency: &str) -> &'static str {
    match currency.to_ascii_uppercase().as_str() {
        "USD" => "USD",
        "HUF" => "HUF",
        "GBP" => "GBP",
        _ => "EUR",
    }
}

/// Billingo VAT key for an effective rate in percent.
pub fn vat_name(vat_rate: Decimal) -> String {
    let in_range = |low: i64, high: i64| vat_rate >= Decimal::from(low) && vat_rate <= Decimal::from(high);

    if vat_rate.is_zero() {
        // Tax exempt: outside the EU or reverse charge
        "TAM".to_string()
    } else if in_range(26, 28) {
        // Hungarian standard 27%
        "AAM".to_string()
    } else if in_range(19, 21) {
        "20%".to_string()
    } else if in_range(22, 26) {
        "25%".to_string()
    } else {
        format!("{}%", vat_rate.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    }
}

pub fn language_for_country(country_code: &str) -> &'static str {
    match country_code {
        "HU" => "hu",
        "DE" | "AT" | "CH" => "de",
        "FR" => "fr",
        "IT" => "it",
        "ES" => "es",
        "RO" => "ro",
        "SK" => "sk",
        "HR" => "hr",
        "SL" => "sl",
        _ => "en",
    }
}

/// Build the invoice for one paid subscription month.
///
/// `amount` is the gross amount and `tax` the VAT included in it, both in major currency units.
pub fn build_subscription_invoice(
    config: &BillingoConfig,
    customer: &BillingCustomer,
    amount: Decimal,
    tax: Decimal,
    currency: &str,
    payment_id: &str,
    today: NaiveDate,
) -> DocumentRequest {
    let net = amount - tax;
    let vat_rate = if tax.is_zero() {
        Decimal::ZERO
    } else {
        tax.checked_div(net).map(|ratio| ratio * Decimal::ONE_HUNDRED).unwrap_or(Decimal::ZERO)
    };
    let unit_price = net
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default();

    DocumentRequest {
        vendor_id: config.vendor_id.clone(),
        partner: Partner {
            name: customer.name.clone(),
            address: PartnerAddress {
                country_code: customer.country.clone(),
                post_code: customer.postal_code.clone(),
                city: customer.city.clone(),
                address: customer.line1.clone(),
            },
            emails: vec![customer.email.clone()],
            taxcode: customer.vat_number.clone().unwrap_or_default(),
        },
        block_id: config.block_id.clone(),
        bank_account_id: config.bank_account_id.clone(),
        document_type: "invoice".to_string(),
        fulfillment_date: today,
        due_date: today,
        payment_method: "online_bankcard".to_string(),
        language: language_for_country(&customer.country).to_string(),
        currency: billingo_currency(currency).to_string(),
        comment: format!("Stripe Payment ID: {payment_id}"),
        items: vec![DocumentItem {
            name: SUBSCRIPTION_ITEM_NAME.to_string(),
            unit_price,
            unit_price_type: "net".to_string(),
            quantity: 1,
            unit: "month".to_string(),
            vat: vat_name(vat_rate),
            comment: today.format("%B %Y").to_string(),
        }],
        settings: DocumentSettings { should_send_email: true },
    }
}

pub struct BillingoClient {
    client: Client,
    config: BillingoConfig,
}

impl BillingoClient {
    pub fn new(config: &BillingoConfig) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| Error::Internal {
            operation: format!("create Billingo HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &BillingoConfig {
        &self.config
    }

    fn documents_url(&self) -> Result<Url, BillingoError> {
        let mut base = self.config.api_base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("documents").map_err(|_| BillingoError::InvalidUrl)
    }

    /// Create a document and return Billingo's JSON response.
    #[instrument(skip_all, fields(payment = %document.comment), err)]
    pub async fn create_invoice(&self, document: &DocumentRequest) -> Result<Value, BillingoError> {
        let response = self
            .client
            .post(self.documents_url()?)
            .header("X-API-KEY", &self.config.api_key)
            .header("Accept", "application/json")
            .json(document)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingoError::Status { status, body });
        }

        Ok(response.json::<Value>().await?)
    }
}
