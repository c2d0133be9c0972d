//! Gateway webhook events.
//!
//! The gateway delivers loosely-typed JSON envelopes. Rather than passing
//! `serde_json::Value` bags around, recognized event types decode into a
//! tagged union; everything else is preserved as an opaque `Unknown`
//! variant so new gateway event types never break the reconciler.

use serde_json::Value;

/// Parse failure for a *recognized* event type.
///
/// Unrecognized types never produce this error - they become
/// [`GatewayEvent::Unknown`] and are acknowledged without mutation.
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("Event envelope missing '{0}' field")]
    MissingEnvelopeField(&'static str),

    #[error("Malformed '{event_type}' payload: missing or invalid '{field}'")]
    MalformedPayload {
        event_type: String,
        field: &'static str,
    },
}

/// A decoded asynchronous notification from the payment gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// `payment_intent.succeeded`
    IntentSucceeded {
        /// Gateway reference of the intent
        reference: String,
        /// Amount the gateway claims was paid, in smallest currency unit
        amount_received: i64,
        /// Status string as reported by the gateway
        reported_status: String,
        raw: Value,
    },
    /// `payment_intent.payment_failed`
    IntentFailed {
        reference: String,
        reason: Option<String>,
        raw: Value,
    },
    /// `checkout.session.completed`
    CheckoutCompleted {
        session_id: String,
        /// Gateway reference of the underlying intent
        reference: String,
        amount_received: i64,
        /// Whether the session reports the payment as collected
        paid: bool,
        raw: Value,
    },
    /// Any event type the reconciler does not act on.
    Unknown { event_type: String, raw: Value },
}

impl GatewayEvent {
    /// Decodes a verified webhook envelope.
    ///
    /// Recognized event types with a malformed payload are an error so the
    /// caller can refuse acknowledgement and let the gateway retry.
    pub fn parse(envelope: &Value) -> Result<GatewayEvent, EventParseError> {
        let event_type = envelope
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventParseError::MissingEnvelopeField("type"))?;

        let object = envelope
            .get("data")
            .and_then(|d| d.get("object"))
            .cloned()
            .unwrap_or(Value::Null);

        match event_type {
            "payment_intent.succeeded" => {
                let reference = require_str(&object, event_type, "id")?;
                let amount_received = require_i64(&object, event_type, "amount")?;
                let reported_status = require_str(&object, event_type, "status")?;
                Ok(GatewayEvent::IntentSucceeded {
                    reference,
                    amount_received,
                    reported_status,
                    raw: object,
                })
            }
            "payment_intent.payment_failed" => {
                let reference = require_str(&object, event_type, "id")?;
                let reason = object
                    .get("last_payment_error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(String::from);
                Ok(GatewayEvent::IntentFailed {
                    reference,
                    reason,
                    raw: object,
                })
            }
            "checkout.session.completed" => {
                let session_id = require_str(&object, event_type, "id")?;
                let reference = require_str(&object, event_type, "payment_intent")?;
                let amount_received = require_i64(&object, event_type, "amount_total")?;
                let paid = object
                    .get("payment_status")
                    .and_then(Value::as_str)
                    .map(|s| s == "paid")
                    .unwrap_or(false);
                Ok(GatewayEvent::CheckoutCompleted {
                    session_id,
                    reference,
                    amount_received,
                    paid,
                    raw: object,
                })
            }
            other => Ok(GatewayEvent::Unknown {
                event_type: other.to_string(),
                raw: envelope.clone(),
            }),
        }
    }
}

fn require_str(object: &Value, event_type: &str, field: &'static str) -> Result<String, EventParseError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| EventParseError::MalformedPayload {
            event_type: event_type.to_string(),
            field,
        })
}

fn require_i64(object: &Value, event_type: &str, field: &'static str) -> Result<i64, EventParseError> {
    object
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| EventParseError::MalformedPayload {
            event_type: event_type.to_string(),
            field,
        })
}
