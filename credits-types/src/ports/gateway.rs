//! Payment gateway port.
//!
//! This trait defines the interface to the external card processor.
//! Implementations can be HTTP clients, mock gateways, etc.

use crate::domain::{Account, Money, PaymentIntentId};

/// Error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),

    #[error("Webhook signature verification failed: {0}")]
    InvalidSignature(String),
}

/// Intent handle returned by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayIntent {
    /// Gateway-assigned reference, e.g. `pi_...`
    pub reference: String,
    pub client_secret: Option<String>,
}

/// Snapshot of an intent's state as reported by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayIntentStatus {
    /// Status string in the gateway's vocabulary, e.g. `succeeded`
    pub status: String,
    /// Amount in smallest currency unit
    pub amount: i64,
}

/// Hosted checkout session returned by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayCheckout {
    /// Reference of the intent backing the session
    pub reference: String,
    pub session_id: String,
    pub url: String,
}

/// Display metadata of a tokenized payment method.
#[derive(Debug, Clone)]
pub struct MethodDetails {
    pub method_type: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
}

/// Port trait for the external payment gateway.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Creates a payment intent at the gateway. The local intent id is
    /// attached as metadata so webhooks can be correlated.
    async fn create_intent(
        &self,
        amount: &Money,
        local_id: PaymentIntentId,
        customer: Option<&str>,
    ) -> Result<GatewayIntent, GatewayError>;

    /// Creates a hosted checkout session wrapping a payment intent.
    async fn create_checkout(
        &self,
        amount: &Money,
        local_id: PaymentIntentId,
        customer: Option<&str>,
    ) -> Result<GatewayCheckout, GatewayError>;

    /// Fetches the gateway's current view of an intent. Used to refresh
    /// still-pending intents on status reads; webhooks stay the
    /// authoritative settlement path.
    async fn fetch_intent(&self, reference: &str) -> Result<GatewayIntentStatus, GatewayError>;

    /// Cancels an open intent at the gateway. Best effort; already
    /// terminal intents are not an error.
    async fn cancel_intent(&self, reference: &str) -> Result<(), GatewayError>;

    /// Returns the gateway customer for an account, creating one on
    /// first use.
    async fn ensure_customer(&self, account: &Account) -> Result<String, GatewayError>;

    /// Attaches a tokenized method to a gateway customer and returns
    /// its display metadata.
    async fn attach_method(
        &self,
        customer: &str,
        token: &str,
    ) -> Result<MethodDetails, GatewayError>;

    /// Detaches a tokenized method at the gateway.
    async fn detach_method(&self, token: &str) -> Result<(), GatewayError>;

    /// Verifies a webhook delivery's signature header against the raw
    /// body. Must run before the body is parsed or acted on.
    fn verify_signature(&self, body: &[u8], header: &str) -> Result<(), GatewayError>;
}
