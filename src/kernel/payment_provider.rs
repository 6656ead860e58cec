//! The payment provider boundary: models the YooKassa redirect-payment API
//! surface the payment pipeline depends on.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned an unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPaymentStatus {
    Pending,
    Succeeded,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct ProviderPayment {
    pub external_id: String,
    pub status: ProviderPaymentStatus,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub external_id: String,
    pub confirmation_url: String,
}

/// Models the subset of the YooKassa SDK the payment pipeline calls:
/// create a redirect-based payment, and re-verify one server-side before
/// trusting a webhook.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(
        &self,
        amount: Decimal,
        currency: &str,
        description: &str,
        idempotency_key: &str,
    ) -> Result<CreatedPayment, ProviderError>;

    async fn get_payment(&self, external_id: &str) -> Result<ProviderPayment, ProviderError>;
}

/// Thin `reqwest`-based YooKassa client. The wire contract (redirect-based
/// payment, Decimal amount, RUB currency) is specified; provider-specific
/// extra fields are out of scope.
pub struct YooKassaClient {
    http: reqwest::Client,
    shop_id: String,
    secret_key: String,
    base_url: String,
}

impl YooKassaClient {
    pub fn new(shop_id: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            shop_id,
            secret_key,
            base_url: "https://api.yookassa.ru/v3".to_string(),
        }
    }
}

#[derive(serde::Serialize)]
struct CreatePaymentRequest<'a> {
    amount: AmountWire<'a>,
    confirmation: ConfirmationWire,
    description: &'a str,
    capture: bool,
}

#[derive(serde::Serialize)]
struct AmountWire<'a> {
    value: String,
    currency: &'a str,
}

#[derive(serde::Serialize)]
struct ConfirmationWire {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(serde::Deserialize)]
struct PaymentWire {
    id: String,
    status: String,
    amount: AmountWireResponse,
    confirmation: Option<ConfirmationWireResponse>,
}

#[derive(serde::Deserialize)]
struct AmountWireResponse {
    value: String,
    currency: String,
}

#[derive(serde::Deserialize)]
struct ConfirmationWireResponse {
    confirmation_url: Option<String>,
}

#[async_trait]
impl PaymentProvider for YooKassaClient {
    async fn create_payment(
        &self,
        amount: Decimal,
        currency: &str,
        description: &str,
        idempotency_key: &str,
    ) -> Result<CreatedPayment, ProviderError> {
        let body = CreatePaymentRequest {
            amount: AmountWire {
                value: format!("{amount:.2}"),
                currency,
            },
            confirmation: ConfirmationWire { kind: "redirect" },
            description,
            capture: true,
        };

        let resp = self
            .http
            .post(format!("{}/payments", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", idempotency_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<PaymentWire>()
            .await?;

        let confirmation_url = resp
            .confirmation
            .and_then(|c| c.confirmation_url)
            .ok_or_else(|| {
                ProviderError::UnexpectedResponse("missing confirmation_url".to_string())
            })?;

        Ok(CreatedPayment {
            external_id: resp.id,
            confirmation_url,
        })
    }

    async fn get_payment(&self, external_id: &str) -> Result<ProviderPayment, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/payments/{external_id}", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?
            .error_for_status()?
            .json::<PaymentWire>()
            .await?;

        let status = match resp.status.as_str() {
            "succeeded" => ProviderPaymentStatus::Succeeded,
            "canceled" => ProviderPaymentStatus::Canceled,
            _ => ProviderPaymentStatus::Pending,
        };

        let amount = resp
            .amount
            .value
            .parse::<Decimal>()
            .map_err(|e| ProviderError::UnexpectedResponse(format!("bad amount: {e}")))?;

        Ok(ProviderPayment {
            external_id: resp.id,
            status,
            amount,
            currency: resp.amount.currency.to_uppercase(),
        })
    }
}
