//! Purchase orchestration and fulfillment dispatch.
//!
//! The money side of a purchase commits in one store transaction; the
//! delivery side runs on a spawned task so a slow or dead game server
//! never blocks the request path. A failed delivery marks the order
//! failed and leaves the debit in place for offline reconciliation.

use std::sync::Arc;

use uuid::Uuid;

use credits_types::{
    AccountId, AppError, Destination, DestinationId, Fulfillment, Item, ItemId, LedgerStore,
    OrderResponse, Page, PurchaseLine, PurchaseOrder, PurchaseRequest, PurchaseResponse,
};

/// Application service for the item shop.
pub struct StoreService<S: LedgerStore, F: Fulfillment> {
    store: Arc<S>,
    fulfillment: Arc<F>,
}

// Arc fields only, so dispatch tasks can carry their own handle.
impl<S: LedgerStore, F: Fulfillment> Clone for StoreService<S, F> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            fulfillment: self.fulfillment.clone(),
        }
    }
}

impl<S: LedgerStore, F: Fulfillment> StoreService<S, F> {
    pub fn new(store: Arc<S>, fulfillment: Arc<F>) -> Self {
        Self { store, fulfillment }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn list_items(&self) -> Result<Vec<Item>, AppError> {
        self.store.list_items().await.map_err(Into::into)
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Item, AppError> {
        self.store
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {}", id)))
    }

    /// Adds a shop item. The id on the input is ignored; the store
    /// assigns one.
    pub async fn create_item(&self, item: Item) -> Result<Item, AppError> {
        if item.code.trim().is_empty() || item.name.trim().is_empty() {
            return Err(AppError::BadRequest("Item needs a name and a code".into()));
        }
        if item.price.amount() <= 0 {
            return Err(AppError::BadRequest("Item price must be positive".into()));
        }
        if item.command.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Item needs a fulfillment command".into(),
            ));
        }
        self.store.create_item(item).await.map_err(Into::into)
    }

    /// Registers a fulfillment destination.
    pub async fn create_destination(&self, dest: Destination) -> Result<Destination, AppError> {
        if dest.host.trim().is_empty() {
            return Err(AppError::BadRequest("Destination needs a host".into()));
        }
        self.store.create_destination(dest).await.map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Purchases
    // ─────────────────────────────────────────────────────────────────────────────

    /// Buys a basket of items in one atomic charge, then dispatches
    /// delivery in the background.
    #[tracing::instrument(
        skip(self, req),
        fields(account_id = %req.account_id, destination_id = %req.destination_id, lines = req.lines.len())
    )]
    pub async fn purchase(&self, req: PurchaseRequest) -> Result<PurchaseResponse, AppError> {
        if req.lines.is_empty() {
            return Err(AppError::BadRequest("Purchase needs at least one item".into()));
        }

        let recipient = match req.recipient {
            Some(raw) => {
                let trimmed = raw.trim().to_string();
                if trimmed.is_empty() {
                    return Err(AppError::BadRequest("Gift recipient cannot be empty".into()));
                }
                Some(trimmed)
            }
            None => None,
        };

        let destination = self
            .store
            .get_destination(req.destination_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Destination {}", req.destination_id)))?;

        let receipt = self
            .store
            .purchase(req.account_id, req.destination_id, &req.lines, recipient)
            .await?;

        tracing::info!(
            account_id = %req.account_id,
            total = receipt.total,
            orders = receipt.orders.len(),
            "Purchase committed"
        );

        let response = PurchaseResponse {
            order_ids: receipt.orders.iter().map(|o| o.id).collect(),
            total: receipt.total,
            new_balance: receipt.new_balance,
        };

        // Fire-and-forget: the charge is already committed.
        let service = self.clone();
        tokio::spawn(async move {
            service.dispatch_orders(destination, receipt.orders).await;
        });

        Ok(response)
    }

    /// Single-item purchase for the caller's own character.
    pub async fn buy_item(
        &self,
        account_id: AccountId,
        destination_id: DestinationId,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<PurchaseResponse, AppError> {
        self.purchase(PurchaseRequest {
            account_id,
            destination_id,
            lines: vec![PurchaseLine { item_id, quantity }],
            recipient: None,
        })
        .await
    }

    /// Single-item purchase delivered to another player. The recipient
    /// is not checked for existence before the debit; a bad identifier
    /// surfaces as a failed order.
    pub async fn gift_item(
        &self,
        account_id: AccountId,
        destination_id: DestinationId,
        item_id: ItemId,
        quantity: i64,
        recipient: impl Into<String>,
    ) -> Result<PurchaseResponse, AppError> {
        self.purchase(PurchaseRequest {
            account_id,
            destination_id,
            lines: vec![PurchaseLine { item_id, quantity }],
            recipient: Some(recipient.into()),
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Orders
    // ─────────────────────────────────────────────────────────────────────────────

    /// Order lookup, scoped to the owning account.
    pub async fn get_order(
        &self,
        account_id: AccountId,
        order_id: Uuid,
    ) -> Result<OrderResponse, AppError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| o.account_id == account_id)
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;
        Ok(order_response(order))
    }

    pub async fn list_orders(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<OrderResponse>, AppError> {
        let orders = self.store.list_orders(account_id, page).await?;
        Ok(orders.into_iter().map(order_response).collect())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────────

    pub(crate) async fn dispatch_orders(
        &self,
        destination: Destination,
        orders: Vec<PurchaseOrder>,
    ) {
        for order in orders {
            if let Err(e) = self.dispatch_one(&destination, &order).await {
                tracing::error!(order_id = %order.id, error = %e, "Order dispatch aborted");
            }
        }
    }

    async fn dispatch_one(
        &self,
        destination: &Destination,
        order: &PurchaseOrder,
    ) -> Result<(), AppError> {
        let item = self
            .store
            .get_item(order.item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {}", order.item_id)))?;

        let command = render_command(&item.command, order);
        self.store.mark_order_processing(order.id, &command).await?;

        let outcome = self.fulfillment.execute(destination, &command).await;
        if outcome.success {
            self.store.complete_order(order.id, &outcome.response).await?;
            tracing::info!(order_id = %order.id, "Order delivered");
        } else {
            let reason = outcome
                .error
                .unwrap_or_else(|| "command failed".to_string());
            self.store.fail_order(order.id, &reason).await?;
            tracing::warn!(order_id = %order.id, reason, "Order delivery failed");
        }
        Ok(())
    }
}

/// Builds the console command for one order from the item template:
/// recipient appended for gifts, quantity suffixed when above one.
fn render_command(template: &str, order: &PurchaseOrder) -> String {
    let mut command = template.to_string();
    if let Some(recipient) = &order.recipient {
        command.push(' ');
        command.push_str(recipient);
    }
    if order.quantity > 1 {
        command.push(' ');
        command.push_str(&order.quantity.to_string());
    }
    command
}

fn order_response(order: PurchaseOrder) -> OrderResponse {
    OrderResponse {
        id: order.id,
        account_id: order.account_id,
        item_id: order.item_id,
        destination_id: order.destination_id,
        quantity: order.quantity,
        amount: order.amount,
        status: order.status,
        recipient: order.recipient,
        failure_reason: order.failure_reason,
        created_at: order.created_at,
        completed_at: order.completed_at,
    }
}
