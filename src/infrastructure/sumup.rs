//! SumUp card reader checkout and transaction lookup over HTTPS.

use crate::config::KioskConfig;
use crate::domain::payment::{StatusReport, TransactionStatus};
use crate::domain::ports::PaymentGateway;
use crate::error::{KioskError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct CheckoutRequest<'a> {
    total_amount: TotalAmount<'a>,
}

#[derive(Debug, Serialize)]
struct TotalAmount<'a> {
    currency: &'a str,
    minor_unit: u32,
    value: i64,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    data: Option<CheckoutData>,
}

#[derive(Debug, Deserialize)]
struct CheckoutData {
    client_transaction_id: Option<String>,
}

/// The lookup answers either with the transaction itself or with a page of matches.
#[derive(Debug, Deserialize)]
struct TransactionLookup {
    status: Option<String>,
    client_transaction_id: Option<String>,
    transaction_code: Option<String>,
    #[serde(default)]
    items: Vec<TransactionItem>,
}

#[derive(Debug, Deserialize)]
struct TransactionItem {
    status: String,
    transaction_code: Option<String>,
}

/// Payment gateway backed by the SumUp REST API and a paired card reader.
pub struct SumUpGateway {
    client: Client,
    api_base: String,
    merchant_code: String,
    reader_id: String,
    bearer_token: String,
    currency: String,
    minor_unit: u32,
    value: i64,
}

impl SumUpGateway {
    pub fn from_config(config: &KioskConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            merchant_code: config.merchant_code.clone(),
            reader_id: config.reader_id.clone(),
            bearer_token: config.bearer_token.clone(),
            currency: config.payment.currency.clone(),
            minor_unit: config.payment.minor_unit,
            value: config.payment.amount.minor_units(config.payment.minor_unit)?,
        })
    }

    fn checkout_url(&self) -> String {
        format!(
            "{}/v0.1/merchants/{}/readers/{}/checkout",
            self.api_base, self.merchant_code, self.reader_id
        )
    }

    fn transactions_url(&self) -> String {
        format!(
            "{}/v2.1/merchants/{}/transactions",
            self.api_base, self.merchant_code
        )
    }
}

#[async_trait]
impl PaymentGateway for SumUpGateway {
    async fn create_checkout(&self) -> Result<String> {
        let body = CheckoutRequest {
            total_amount: TotalAmount {
                currency: &self.currency,
                minor_unit: self.minor_unit,
                value: self.value,
            },
        };
        let response = self
            .client
            .post(self.checkout_url())
            .bearer_auth(&self.bearer_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
            return Err(KioskError::PaymentError(format!(
                "checkout rejected with status {status}"
            )));
        }

        let parsed: CheckoutResponse = response.json().await?;
        let id = parsed
            .data
            .and_then(|data| data.client_transaction_id)
            .ok_or_else(|| {
                KioskError::PaymentError("checkout response has no transaction id".to_string())
            })?;
        info!(
            transaction_id = %id,
            amount = self.value,
            currency = %self.currency,
            "checkout sent to reader"
        );
        Ok(id)
    }

    async fn transaction_status(&self, transaction_id: &str) -> Result<StatusReport> {
        if transaction_id.trim().is_empty() {
            return Err(KioskError::ValidationError(
                "client transaction id cannot be empty".to_string(),
            ));
        }

        let response = self
            .client
            .get(self.transactions_url())
            .bearer_auth(&self.bearer_token)
            .query(&[("client_transaction_id", transaction_id)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(KioskError::PaymentError(format!(
                    "transaction {transaction_id} not found"
                )));
            }
            other => {
                return Err(KioskError::PaymentError(format!(
                    "unexpected response status {other}"
                )));
            }
        }

        let lookup: TransactionLookup = response.json().await?;
        let report = report_from(lookup, transaction_id)?;
        debug!(transaction_id, status = %report.status, "transaction status");
        Ok(report)
    }
}

fn report_from(lookup: TransactionLookup, transaction_id: &str) -> Result<StatusReport> {
    if let Some(status) = lookup.status
        && lookup.client_transaction_id.as_deref() == Some(transaction_id)
    {
        return Ok(StatusReport {
            status: TransactionStatus::from(status.as_str()),
            label: lookup.transaction_code,
        });
    }

    match lookup.items.into_iter().next() {
        Some(item) => Ok(StatusReport {
            status: TransactionStatus::from(item.status.as_str()),
            label: item.transaction_code,
        }),
        None => Err(KioskError::PaymentError(format!(
            "no transaction found with client transaction id {transaction_id}"
        ))),
    }
}
