//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use credits_types::{
    AccountId, AdjustRequest, AppError, AttachMethodRequest, CreateAccountRequest,
    CreateIntentRequest, Destination, EntryType, ErrorResponse, Fulfillment, Item, LedgerStore,
    Page, PaymentGateway, PaymentIntentId, PaymentStatus, PurchaseRequest, RewardRequest,
    TransferRequest,
};

use crate::{CreditsService, PaymentService, StoreService};

/// Application state shared across handlers.
pub struct AppState<S: LedgerStore, G: PaymentGateway, F: Fulfillment> {
    pub credits: CreditsService<S>,
    pub payments: PaymentService<S, G>,
    pub store: StoreService<S, F>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Security(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

fn parse_account_id(id: &str) -> Result<AccountId, ApiError> {
    id.parse()
        .map_err(|_| ApiError(AppError::BadRequest("Invalid account ID".into())))
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounts & ledger
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req))]
pub async fn create_account<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.credits.create_account(req).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn list_accounts<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.credits.list_accounts().await?))
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn get_account<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    Ok(Json(state.credits.get_account(account_id).await?))
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn balance<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    Ok(Json(state.credits.balance(account_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub entry_type: Option<EntryType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn history<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    let defaults = Page::default();
    let page = Page {
        limit: query.limit.unwrap_or(defaults.limit),
        offset: query.offset.unwrap_or(defaults.offset),
    };
    Ok(Json(
        state
            .credits
            .history(account_id, query.entry_type, page)
            .await?,
    ))
}

#[tracing::instrument(skip(state, req), fields(account_id = %req.account_id))]
pub async fn adjust<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(req): Json<AdjustRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.credits.adjust(req).await?))
}

#[tracing::instrument(skip(state, req), fields(account_id = %req.account_id))]
pub async fn reward<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(req): Json<RewardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.credits.reward(req).await?))
}

#[tracing::instrument(skip(state, req), fields(from = %req.from_account_id, to = %req.to_account_id))]
pub async fn transfer<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.credits.transfer(req).await?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payments
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(account_id = %req.account_id))]
pub async fn create_intent<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(req): Json<CreateIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let intent = state.payments.create_intent(req).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

#[tracing::instrument(skip(state), fields(intent_id = %id))]
pub async fn intent_status<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let intent_id: PaymentIntentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid intent ID".into()))?;
    Ok(Json(state.payments.get_status(intent_id).await?))
}

// Page is not flattened in here: serde_urlencoded cannot deserialize
// numeric fields through #[serde(flatten)].
#[derive(Debug, Deserialize)]
pub struct IntentListQuery {
    pub status: Option<PaymentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl IntentListQuery {
    fn page(&self) -> Page {
        let defaults = Page::default();
        Page {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        }
    }
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn list_intents<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path(id): Path<String>,
    Query(query): Query<IntentListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    let intents = state
        .payments
        .list_intents(account_id, query.status, query.page())
        .await?;
    Ok(Json(intents))
}

/// Webhook receiver. The signature is checked over the raw body before
/// anything is parsed.
pub async fn webhook<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("Gateway-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Security("Missing Gateway-Signature header".into()))?;

    let ack = state.payments.process_event(&body, signature).await?;
    Ok(Json(ack))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment methods
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(account_id = %req.account_id))]
pub async fn attach_method<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(req): Json<AttachMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let method = state.payments.attach_method(req).await?;
    Ok((StatusCode::CREATED, Json(method)))
}

pub async fn list_methods<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    Ok(Json(state.payments.list_methods(account_id).await?))
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn detach_method<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path((id, token)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    state.payments.detach_method(account_id, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn set_default_method<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path((id, token)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    state.payments.set_default_method(account_id, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Shop
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_items<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_items().await?))
}

#[tracing::instrument(skip(state, item), fields(code = %item.code))]
pub async fn create_item<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(item): Json<Item>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.store.create_item(item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[tracing::instrument(skip(state, dest), fields(name = %dest.name))]
pub async fn create_destination<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(dest): Json<Destination>,
) -> Result<impl IntoResponse, ApiError> {
    let dest = state.store.create_destination(dest).await?;
    Ok((StatusCode::CREATED, Json(dest)))
}

#[tracing::instrument(skip(state, req), fields(account_id = %req.account_id))]
pub async fn purchase<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.store.purchase(req).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn list_orders<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path(id): Path<String>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    Ok(Json(state.store.list_orders(account_id, page).await?))
}

#[tracing::instrument(skip(state), fields(account_id = %id, order_id = %order_id))]
pub async fn get_order<S: LedgerStore, G: PaymentGateway, F: Fulfillment>(
    State(state): State<Arc<AppState<S, G, F>>>,
    Path((id, order_id)): Path<(String, uuid::Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = parse_account_id(&id)?;
    Ok(Json(state.store.get_order(account_id, order_id).await?))
}
