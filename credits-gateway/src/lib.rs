//! # Credits Gateway
//!
//! HTTP adapter for the external card processor. Implements the
//! [`PaymentGateway`] port with a `reqwest` client speaking the
//! processor's form-encoded REST API, plus webhook signature
//! verification for inbound deliveries.

pub mod signature;

use std::time::Duration;

use credits_types::{
    Account, GatewayCheckout, GatewayError, GatewayIntent, GatewayIntentStatus, MethodDetails,
    Money, PaymentGateway, PaymentIntentId,
};
use reqwest::Client;
use serde::Deserialize;

/// Connection settings for the gateway adapter.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API origin, e.g. `https://api.stripe.com`
    pub base_url: String,
    /// Secret API key used as a bearer token
    pub secret_key: String,
    /// Shared secret for webhook signature verification
    pub webhook_secret: String,
    /// Where hosted checkout redirects on completion
    pub success_url: String,
    /// Where hosted checkout redirects on abandonment
    pub cancel_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Webhook replay tolerance in seconds
    pub signature_tolerance_secs: i64,
}

impl GatewayConfig {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            success_url: "https://example.invalid/checkout/success".into(),
            cancel_url: "https://example.invalid/checkout/cancel".into(),
            timeout: Duration::from_secs(10),
            signature_tolerance_secs: signature::DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_redirects(
        mut self,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        self.success_url = success_url.into();
        self.cancel_url = cancel_url.into();
        self
    }
}

/// `reqwest`-backed implementation of the [`PaymentGateway`] port.
pub struct HttpGateway {
    config: GatewayConfig,
    http: Client,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireIntent {
    id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireIntentState {
    status: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct WireCheckout {
    id: String,
    url: String,
    payment_intent: String,
}

#[derive(Debug, Deserialize)]
struct WireCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireCard {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<i32>,
    exp_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct WireMethod {
    #[serde(rename = "type")]
    method_type: String,
    card: Option<WireCard>,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

impl From<WireMethod> for MethodDetails {
    fn from(w: WireMethod) -> Self {
        let card = w.card;
        MethodDetails {
            method_type: w.method_type,
            brand: card.as_ref().and_then(|c| c.brand.clone()),
            last4: card.as_ref().and_then(|c| c.last4.clone()),
            exp_month: card.as_ref().and_then(|c| c.exp_month),
            exp_year: card.as_ref().and_then(|c| c.exp_year),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        Ok(Self { config, http })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        let resp = self
            .http
            .post(format!("{}{}", self.config.base_url, path))
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<WireErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .map(|e| match (e.code, e.message) {
                    (Some(code), Some(msg)) => format!("{}: {}", code, msg),
                    (Some(code), None) => code,
                    (None, Some(msg)) => msg,
                    (None, None) => "unspecified error".to_string(),
                })
                .unwrap_or(body);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let resp = self
            .http
            .get(format!("{}{}", self.config.base_url, path))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<WireErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    /// Like `post_form`, but treats a 4xx whose error code matches
    /// `tolerated_code` as success. Used for best-effort cancels.
    async fn post_form_tolerant(
        &self,
        path: &str,
        form: &[(String, String)],
        tolerated_code: &str,
    ) -> Result<(), GatewayError> {
        match self.post_form::<serde_json::Value>(path, form).await {
            Ok(_) => Ok(()),
            Err(GatewayError::Rejected { status, message })
                if status < 500 && message.contains(tolerated_code) =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_intent(
        &self,
        amount: &Money,
        local_id: PaymentIntentId,
        customer: Option<&str>,
    ) -> Result<GatewayIntent, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), amount.amount().to_string()),
            (
                "currency".to_string(),
                amount.currency().gateway_code().to_string(),
            ),
            ("metadata[intent_id]".to_string(), local_id.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(customer) = customer {
            form.push(("customer".to_string(), customer.to_string()));
        }

        let wire: WireIntent = self.post_form("/v1/payment_intents", &form).await?;
        tracing::debug!(reference = %wire.id, intent_id = %local_id, "Created gateway intent");

        Ok(GatewayIntent {
            reference: wire.id,
            client_secret: wire.client_secret,
        })
    }

    async fn create_checkout(
        &self,
        amount: &Money,
        local_id: PaymentIntentId,
        customer: Option<&str>,
    ) -> Result<GatewayCheckout, GatewayError> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
            (
                "line_items[0][price_data][currency]".to_string(),
                amount.currency().gateway_code().to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                amount.amount().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                "Credit top-up".to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "payment_intent_data[metadata][intent_id]".to_string(),
                local_id.to_string(),
            ),
        ];
        if let Some(customer) = customer {
            form.push(("customer".to_string(), customer.to_string()));
        }

        let wire: WireCheckout = self.post_form("/v1/checkout/sessions", &form).await?;
        tracing::debug!(session = %wire.id, intent_id = %local_id, "Created checkout session");

        Ok(GatewayCheckout {
            reference: wire.payment_intent,
            session_id: wire.id,
            url: wire.url,
        })
    }

    async fn fetch_intent(&self, reference: &str) -> Result<GatewayIntentStatus, GatewayError> {
        let wire: WireIntentState = self
            .get_json(&format!("/v1/payment_intents/{}", reference))
            .await?;
        Ok(GatewayIntentStatus {
            status: wire.status,
            amount: wire.amount,
        })
    }

    async fn cancel_intent(&self, reference: &str) -> Result<(), GatewayError> {
        // An intent that already reached a terminal state upstream is
        // not worth surfacing; the webhook will tell us what happened.
        self.post_form_tolerant(
            &format!("/v1/payment_intents/{}/cancel", reference),
            &[],
            "payment_intent_unexpected_state",
        )
        .await
    }

    async fn ensure_customer(&self, account: &Account) -> Result<String, GatewayError> {
        if let Some(existing) = &account.gateway_customer {
            return Ok(existing.clone());
        }

        let form = vec![
            ("name".to_string(), account.name.clone()),
            ("metadata[account_id]".to_string(), account.id.to_string()),
        ];
        let wire: WireCustomer = self.post_form("/v1/customers", &form).await?;
        tracing::info!(account_id = %account.id, customer = %wire.id, "Created gateway customer");
        Ok(wire.id)
    }

    async fn attach_method(
        &self,
        customer: &str,
        token: &str,
    ) -> Result<MethodDetails, GatewayError> {
        let form = vec![("customer".to_string(), customer.to_string())];
        let wire: WireMethod = self
            .post_form(&format!("/v1/payment_methods/{}/attach", token), &form)
            .await?;
        Ok(wire.into())
    }

    async fn detach_method(&self, token: &str) -> Result<(), GatewayError> {
        self.post_form::<serde_json::Value>(&format!("/v1/payment_methods/{}/detach", token), &[])
            .await
            .map(|_| ())
    }

    fn verify_signature(&self, body: &[u8], header: &str) -> Result<(), GatewayError> {
        let now = chrono::Utc::now().timestamp();
        signature::verify(
            &self.config.webhook_secret,
            body,
            header,
            now,
            self.config.signature_tolerance_secs,
        )
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))
    }
}
