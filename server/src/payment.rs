//! HTTP client for the payment provider.
//!
//! Two calls: `GET /v1/payments/{id}` for the authoritative status and
//! `POST /checkout/preferences` to open a checkout. Amounts travel as decimal
//! currency units on the wire and are converted to cents at this boundary.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ticket_ledger_core::providers::{
    PaymentProvider, Preference, PreferenceRequest, ProviderPayment, ProviderPaymentStatus,
};
use ticket_ledger_core::store::BoxFuture;
use ticket_ledger_core::{ExternalPaymentId, LedgerError, Money, Result};

use crate::config::PaymentConfig;

/// `reqwest`-backed [`PaymentProvider`].
#[derive(Clone)]
pub struct HttpPaymentProvider {
    client: Client,
    api_url: String,
    access_token: String,
    notification_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    #[serde(deserialize_with = "ticket_ledger_core::wire::string_or_number")]
    id: String,
    status: String,
    transaction_amount: f64,
    external_reference: Option<String>,
    payer: Option<Payer>,
}

#[derive(Debug, Deserialize)]
struct Payer {
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct PreferenceItem<'a> {
    title: &'a str,
    quantity: u32,
    unit_price: f64,
}

#[derive(Debug, Serialize)]
struct PreferenceBody<'a> {
    items: [PreferenceItem<'a>; 1],
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

fn transport_error(action: &str, err: &reqwest::Error) -> LedgerError {
    if err.is_timeout() {
        LedgerError::ProviderTimeout
    } else {
        LedgerError::Provider(format!("{action} failed: {err}"))
    }
}

impl HttpPaymentProvider {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Provider`] if the HTTP client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self> {
        Self::with_timeout(
            &config.api_base_url,
            &config.access_token,
            config.notification_url.clone(),
            config.timeout(),
        )
    }

    /// Build a client against an explicit base URL.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Provider`] if the HTTP client cannot be built.
    pub fn with_timeout(
        api_url: &str,
        access_token: &str,
        notification_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Provider(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            notification_url,
        })
    }

    async fn get_payment(&self, payment_id: &ExternalPaymentId) -> Result<ProviderPayment> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.api_url, payment_id.as_str()))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| transport_error("Payment lookup", &e))?;

        match response.status() {
            StatusCode::OK => {
                let body = response.json::<PaymentResponse>().await.map_err(|e| {
                    if e.is_timeout() {
                        LedgerError::ProviderTimeout
                    } else {
                        LedgerError::Provider(format!("Unreadable payment response: {e}"))
                    }
                })?;
                let amount = Money::from_decimal(body.transaction_amount).ok_or_else(|| {
                    LedgerError::Provider(format!(
                        "Invalid transaction amount: {}",
                        body.transaction_amount
                    ))
                })?;
                Ok(ProviderPayment {
                    id: ExternalPaymentId::new(body.id),
                    status: ProviderPaymentStatus::parse(&body.status),
                    amount,
                    external_reference: body.external_reference,
                    payer_email: body.payer.and_then(|p| p.email),
                })
            }
            StatusCode::NOT_FOUND => Err(LedgerError::not_found("payment", payment_id)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(LedgerError::Provider(format!(
                    "Payment lookup returned {}: {body}",
                    status.as_u16()
                )))
            }
        }
    }

    async fn post_preference(&self, request: &PreferenceRequest) -> Result<Preference> {
        let body = PreferenceBody {
            items: [PreferenceItem {
                title: &request.title,
                quantity: 1,
                unit_price: request.amount.as_decimal(),
            }],
            external_reference: &request.external_reference,
            notification_url: self.notification_url.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Preference request", &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Provider(format!(
                "Preference request returned {}: {body}",
                status.as_u16()
            )));
        }

        let created = response
            .json::<PreferenceResponse>()
            .await
            .map_err(|e| LedgerError::Provider(format!("Unreadable preference response: {e}")))?;
        Ok(Preference {
            id: created.id,
            checkout_url: created.init_point,
        })
    }
}

impl PaymentProvider for HttpPaymentProvider {
    fn fetch_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<ProviderPayment>> {
        Box::pin(self.get_payment(payment_id))
    }

    fn create_preference<'a>(
        &'a self,
        request: &'a PreferenceRequest,
    ) -> BoxFuture<'a, Result<Preference>> {
        Box::pin(self.post_preference(request))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
    };
    use serde_json::{Value, json};

    async fn fake_payment(
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> (AxumStatus, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer secret");
        if !authorized {
            return (AxumStatus::UNAUTHORIZED, Json(json!({})));
        }
        match id.as_str() {
            "slow" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                (AxumStatus::OK, Json(json!({})))
            }
            "777" => (
                AxumStatus::OK,
                Json(json!({
                    "id": 777,
                    "status": "approved",
                    "transaction_amount": 25.5,
                    "external_reference": "{\"envelope\":true}",
                    "payer": { "email": "buyer@example.com" }
                })),
            ),
            _ => (AxumStatus::NOT_FOUND, Json(json!({}))),
        }
    }

    async fn fake_preference(Json(body): Json<Value>) -> Json<Value> {
        let price = body["items"][0]["unit_price"].as_f64().unwrap_or_default();
        Json(json!({
            "id": format!("pref-{price}"),
            "init_point": "https://checkout.example/pref"
        }))
    }

    async fn spawn_fake_provider() -> String {
        let app = Router::new()
            .route("/v1/payments/:id", get(fake_payment))
            .route("/checkout/preferences", post(fake_preference));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider(base: &str, token: &str) -> HttpPaymentProvider {
        HttpPaymentProvider::with_timeout(base, token, None, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_payment_converts_amount_to_cents() {
        let base = spawn_fake_provider().await;
        let payment = provider(&base, "secret")
            .fetch_payment(&ExternalPaymentId::new("777"))
            .await
            .unwrap();

        assert_eq!(payment.id.as_str(), "777");
        assert!(payment.status.is_approved());
        assert_eq!(payment.amount, Money::from_cents(2_550));
        assert_eq!(payment.payer_email.as_deref(), Some("buyer@example.com"));
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found() {
        let base = spawn_fake_provider().await;
        let result = provider(&base, "secret")
            .fetch_payment(&ExternalPaymentId::new("missing"))
            .await;
        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_provider_errors() {
        let base = spawn_fake_provider().await;
        let result = provider(&base, "wrong")
            .fetch_payment(&ExternalPaymentId::new("777"))
            .await;
        let Err(LedgerError::Provider(message)) = result else {
            unreachable!("expected a provider error");
        };
        assert!(message.contains("401"));
    }

    #[tokio::test]
    async fn test_client_timeout_is_a_provider_timeout() {
        let base = spawn_fake_provider().await;
        let impatient =
            HttpPaymentProvider::with_timeout(&base, "secret", None, Duration::from_millis(100))
                .unwrap();
        let result = impatient.fetch_payment(&ExternalPaymentId::new("slow")).await;
        assert!(matches!(result, Err(LedgerError::ProviderTimeout)));
    }

    #[tokio::test]
    async fn test_create_preference_sends_decimal_amount() {
        let base = spawn_fake_provider().await;
        let preference = provider(&base, "secret")
            .create_preference(&PreferenceRequest {
                title: "Friday Night - General x2".to_string(),
                amount: Money::from_cents(5_000),
                external_reference: "{}".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(preference.id, "pref-50");
        assert_eq!(preference.checkout_url, "https://checkout.example/pref");
    }
}
