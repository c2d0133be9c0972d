//! Payment lifecycle manager and webhook reconciler.
//!
//! Owns the intent state machine `pending → {succeeded|failed|expired}`.
//! All settlement funnels through [`PaymentService::apply_succeeded`] /
//! [`PaymentService::apply_failed`], which are idempotent so webhook
//! deliveries can arrive more than once and out of order.

use std::sync::Arc;

use chrono::{Duration, Utc};

use credits_types::{
    Account, AccountId, AppError, AttachMethodRequest, CreateIntentRequest, GatewayEvent,
    IntentResponse, LedgerStore, MethodResponse, Money, Page, PaymentGateway, PaymentIntent,
    PaymentIntentId, PaymentMethod, PaymentStatus, RepoError, SettleOutcome, WebhookAck,
};

/// Tunables for the intent lifecycle.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// How long a created intent stays payable
    pub intent_ttl: Duration,
    /// Smallest accepted top-up, in smallest currency unit
    pub min_amount: i64,
    /// Largest accepted top-up, in smallest currency unit
    pub max_amount: i64,
    /// Open intents allowed per account inside the window
    pub max_active_intents: i64,
    /// Window the active-intent cap is measured over
    pub active_window: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            intent_ttl: Duration::minutes(30),
            min_amount: 2_000,
            max_amount: 10_000_000,
            max_active_intents: 1,
            active_window: Duration::minutes(5),
        }
    }
}

/// Application service for top-up payments and stored payment methods.
pub struct PaymentService<S: LedgerStore, G: PaymentGateway> {
    store: Arc<S>,
    gateway: Arc<G>,
    config: PaymentConfig,
}

impl<S: LedgerStore, G: PaymentGateway> PaymentService<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>, config: PaymentConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    async fn require_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {}", id)))
    }

    async fn require_intent(&self, id: PaymentIntentId) -> Result<PaymentIntent, AppError> {
        self.store
            .get_intent(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment intent {}", id)))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Intent lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Starts a new top-up: persists a pending intent, then opens the
    /// matching intent (or hosted checkout session) at the gateway.
    #[tracing::instrument(skip(self), fields(account_id = %req.account_id, amount = req.amount))]
    pub async fn create_intent(&self, req: CreateIntentRequest) -> Result<IntentResponse, AppError> {
        if req.amount < self.config.min_amount || req.amount > self.config.max_amount {
            return Err(AppError::BadRequest(format!(
                "Amount must be between {} and {}",
                self.config.min_amount, self.config.max_amount
            )));
        }

        let account = self.require_account(req.account_id).await?;
        if account.currency() != req.currency {
            return Err(AppError::BadRequest(format!(
                "Account is denominated in {}, not {}",
                account.currency(),
                req.currency
            )));
        }

        // Stale intents decay before the cap is measured, so abandoned
        // checkouts never lock an account out of topping up.
        let now = Utc::now();
        self.store.expire_stale_intents(now).await?;

        let cutoff = now - self.config.active_window;
        let active = self
            .store
            .count_active_intents_since(req.account_id, cutoff)
            .await?;
        if active >= self.config.max_active_intents {
            return Err(AppError::Conflict(
                "Too many open top-up attempts; finish or let them expire".into(),
            ));
        }

        let amount = Money::new(req.amount, req.currency)?;
        let intent = PaymentIntent::new(req.account_id, amount, self.config.intent_ttl);
        self.store.insert_intent(&intent).await?;

        let customer = account.gateway_customer.as_deref();
        let gateway_result = if req.hosted_checkout {
            self.gateway
                .create_checkout(&amount, intent.id, customer)
                .await
                .map(|c| (c.reference, None, Some(c.url)))
        } else {
            self.gateway
                .create_intent(&amount, intent.id, customer)
                .await
                .map(|i| (i.reference, i.client_secret, None))
        };

        let (reference, client_secret, checkout_url) = match gateway_result {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(intent_id = %intent.id, error = %e, "Gateway refused to open intent");
                self.store
                    .fail_intent(intent.id, "gateway_error", &serde_json::Value::Null)
                    .await?;
                return Err(AppError::ExternalService(e.to_string()));
            }
        };

        self.store
            .attach_gateway_ref(
                intent.id,
                &reference,
                client_secret.as_deref(),
                checkout_url.as_deref(),
            )
            .await?;

        tracing::info!(intent_id = %intent.id, reference, "Top-up intent created");
        Ok(intent_response(self.require_intent(intent.id).await?))
    }

    /// Returns the current state of an intent, lazily expiring it when
    /// its TTL elapsed and otherwise refreshing still-pending intents
    /// from the gateway.
    #[tracing::instrument(skip(self), fields(intent_id = %id))]
    pub async fn get_status(&self, id: PaymentIntentId) -> Result<IntentResponse, AppError> {
        let intent = self.require_intent(id).await?;

        if intent.is_expired(Utc::now()) {
            self.store.mark_intent_expired(id).await?;
            return Ok(intent_response(self.require_intent(id).await?));
        }

        if intent.status == PaymentStatus::Pending {
            if let Some(reference) = intent.gateway_ref.clone() {
                self.refresh_from_gateway(&intent, &reference).await;
                return Ok(intent_response(self.require_intent(id).await?));
            }
        }

        Ok(intent_response(intent))
    }

    /// Best-effort poll of the gateway. Webhooks stay the authoritative
    /// settlement path, so any error here leaves the intent untouched.
    async fn refresh_from_gateway(&self, intent: &PaymentIntent, reference: &str) {
        let state = match self.gateway.fetch_intent(reference).await {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(intent_id = %intent.id, error = %e, "Status refresh failed");
                return;
            }
        };

        let result = match state.status.as_str() {
            "succeeded" => self
                .apply_succeeded(reference, state.amount, "succeeded", serde_json::Value::Null)
                .await
                .map(|_| ()),
            "canceled" => self
                .apply_failed(
                    reference,
                    Some("canceled at gateway".into()),
                    serde_json::Value::Null,
                )
                .await
                .map(|_| ()),
            _ => Ok(()),
        };

        if let Err(e) = result {
            tracing::warn!(intent_id = %intent.id, error = %e, "Could not apply polled gateway state");
        }
    }

    /// Lists an account's intents, newest first.
    pub async fn list_intents(
        &self,
        account_id: AccountId,
        status: Option<PaymentStatus>,
        page: Page,
    ) -> Result<Vec<IntentResponse>, AppError> {
        let _ = self.require_account(account_id).await?;
        let intents = self.store.list_intents(account_id, status, page).await?;
        Ok(intents.into_iter().map(intent_response).collect())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Webhook reconciliation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Handles one webhook delivery: verifies the signature over the
    /// raw body, decodes the event and applies it.
    ///
    /// Malformed payloads of recognized event types are internal errors
    /// (non-2xx) so the gateway redelivers; unknown event types are
    /// acknowledged without mutation.
    pub async fn process_event(&self, body: &[u8], header: &str) -> Result<WebhookAck, AppError> {
        self.gateway
            .verify_signature(body, header)
            .map_err(|e| AppError::Security(e.to_string()))?;

        let envelope: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Internal(format!("Undecodable webhook body: {}", e)))?;
        let event = GatewayEvent::parse(&envelope).map_err(|e| AppError::Internal(e.to_string()))?;

        match event {
            GatewayEvent::IntentSucceeded {
                reference,
                amount_received,
                reported_status,
                raw,
            } => {
                self.apply_succeeded(&reference, amount_received, &reported_status, raw)
                    .await
            }
            GatewayEvent::CheckoutCompleted {
                reference,
                amount_received,
                paid,
                raw,
                ..
            } => {
                if !paid {
                    tracing::info!(reference, "Checkout completed without collected payment");
                    return Ok(WebhookAck {
                        outcome: "ignored".into(),
                    });
                }
                self.apply_succeeded(&reference, amount_received, "succeeded", raw)
                    .await
            }
            GatewayEvent::IntentFailed {
                reference,
                reason,
                raw,
            } => self.apply_failed(&reference, reason, raw).await,
            GatewayEvent::Unknown { event_type, .. } => {
                tracing::debug!(event_type, "Ignoring unhandled gateway event");
                Ok(WebhookAck {
                    outcome: "ignored".into(),
                })
            }
        }
    }

    /// Settles the intent behind `reference` and credits its account.
    ///
    /// Idempotent: a repeated delivery reports `duplicate` and writes
    /// nothing. A mismatch between the reported amount and the stored
    /// intent is a security violation and never credits.
    pub async fn apply_succeeded(
        &self,
        reference: &str,
        amount_received: i64,
        reported_status: &str,
        raw: serde_json::Value,
    ) -> Result<WebhookAck, AppError> {
        let intent = self
            .store
            .find_intent_by_gateway_ref(reference)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No intent with gateway reference {}", reference))
            })?;

        if reported_status != "succeeded" {
            tracing::warn!(
                intent_id = %intent.id,
                reference,
                reported_status,
                "Success event carries non-success status"
            );
            return Err(AppError::Security(format!(
                "Success event reported status '{}'",
                reported_status
            )));
        }

        if amount_received != intent.amount.amount() {
            tracing::warn!(
                intent_id = %intent.id,
                reference,
                expected = intent.amount.amount(),
                received = amount_received,
                "Webhook amount disagrees with stored intent"
            );
            return Err(AppError::Security(format!(
                "Amount mismatch: intent expects {}, gateway reported {}",
                intent.amount.amount(),
                amount_received
            )));
        }

        match self.store.settle_intent(intent.id, &raw).await? {
            SettleOutcome::Applied(entry) => {
                tracing::info!(
                    intent_id = %intent.id,
                    account_id = %intent.account_id,
                    amount = entry.amount,
                    "Top-up settled"
                );
                Ok(WebhookAck {
                    outcome: "applied".into(),
                })
            }
            SettleOutcome::AlreadySettled => {
                tracing::info!(intent_id = %intent.id, "Duplicate settlement delivery");
                Ok(WebhookAck {
                    outcome: "duplicate".into(),
                })
            }
        }
    }

    /// Marks the intent behind `reference` failed. A failure event that
    /// arrives after settlement is ignored; the credit stands.
    pub async fn apply_failed(
        &self,
        reference: &str,
        reason: Option<String>,
        raw: serde_json::Value,
    ) -> Result<WebhookAck, AppError> {
        let intent = self
            .store
            .find_intent_by_gateway_ref(reference)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No intent with gateway reference {}", reference))
            })?;

        let reason = reason.unwrap_or_else(|| "payment_failed".to_string());
        match self.store.fail_intent(intent.id, &reason, &raw).await {
            Ok(()) => {
                tracing::info!(intent_id = %intent.id, reason, "Top-up failed");
                Ok(WebhookAck {
                    outcome: "applied".into(),
                })
            }
            Err(RepoError::Conflict(_)) => {
                tracing::warn!(
                    intent_id = %intent.id,
                    "Failure event for an already-settled intent; keeping the credit"
                );
                Ok(WebhookAck {
                    outcome: "ignored".into(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Stored payment methods
    // ─────────────────────────────────────────────────────────────────────────────

    /// Attaches a tokenized method at the gateway and stores its
    /// display metadata. The account's first method becomes the default.
    #[tracing::instrument(skip(self), fields(account_id = %req.account_id))]
    pub async fn attach_method(&self, req: AttachMethodRequest) -> Result<MethodResponse, AppError> {
        let account = self.require_account(req.account_id).await?;

        let customer = self
            .gateway
            .ensure_customer(&account)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;
        if account.gateway_customer.is_none() {
            self.store.set_gateway_customer(account.id, &customer).await?;
        }

        let details = self
            .gateway
            .attach_method(&customer, &req.token)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let first = self.store.list_methods(account.id).await?.is_empty();
        let method = PaymentMethod {
            token: req.token,
            account_id: account.id,
            method_type: details.method_type,
            brand: details.brand,
            last4: details.last4,
            exp_month: details.exp_month,
            exp_year: details.exp_year,
            is_default: req.set_default || first,
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.upsert_method(&method).await?;
        if method.is_default {
            self.store
                .set_default_method(account.id, &method.token)
                .await?;
        }

        Ok(method_response(method))
    }

    /// Lists an account's active methods, default first.
    pub async fn list_methods(&self, account_id: AccountId) -> Result<Vec<MethodResponse>, AppError> {
        let _ = self.require_account(account_id).await?;
        let methods = self.store.list_methods(account_id).await?;
        Ok(methods.into_iter().map(method_response).collect())
    }

    /// Detaches a stored method, promoting the most recent remaining
    /// one to default when the default was removed.
    #[tracing::instrument(skip(self), fields(account_id = %account_id))]
    pub async fn detach_method(&self, account_id: AccountId, token: &str) -> Result<(), AppError> {
        // Local removal proceeds even when the gateway call fails; the
        // token is useless to us either way.
        if let Err(e) = self.gateway.detach_method(token).await {
            tracing::warn!(token, error = %e, "Gateway detach failed; removing locally anyway");
        }

        self.store.detach_method(account_id, token).await?;

        let remaining = self.store.list_methods(account_id).await?;
        if let Some(candidate) = remaining.first() {
            if !remaining.iter().any(|m| m.is_default) {
                self.store
                    .set_default_method(account_id, &candidate.token)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn set_default_method(
        &self,
        account_id: AccountId,
        token: &str,
    ) -> Result<(), AppError> {
        self.store
            .set_default_method(account_id, token)
            .await
            .map_err(Into::into)
    }
}

fn intent_response(intent: PaymentIntent) -> IntentResponse {
    IntentResponse {
        id: intent.id,
        account_id: intent.account_id,
        amount: intent.amount.amount(),
        currency: intent.amount.currency(),
        status: intent.status,
        client_secret: intent.client_secret,
        checkout_url: intent.checkout_url,
        failure_reason: intent.failure_reason,
        created_at: intent.created_at,
        expires_at: intent.expires_at,
    }
}

fn method_response(method: PaymentMethod) -> MethodResponse {
    MethodResponse {
        token: method.token,
        method_type: method.method_type,
        brand: method.brand,
        last4: method.last4,
        exp_month: method.exp_month,
        exp_year: method.exp_year,
        is_default: method.is_default,
    }
}
