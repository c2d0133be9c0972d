//! Service-layer unit tests against in-memory port implementations.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use credits_types::{
        Account, AccountId, AdjustRequest, AppError, AttachMethodRequest, CommandOutcome,
        CreateAccountRequest, CreateIntentRequest, Currency, Destination, DestinationId,
        DomainError, EntryType, Fulfillment, GatewayCheckout, GatewayError, GatewayIntent,
        GatewayIntentStatus, Item, ItemId, LedgerEntry, LedgerEntryId, LedgerOp, LedgerStore,
        MethodDetails, Money, OrderStatus, Page, PaymentGateway, PaymentIntent, PaymentIntentId,
        PaymentMethod, PaymentStatus, PurchaseLine, PurchaseOrder, PurchaseReceipt, RepoError,
        RewardRequest, TransferRequest,
    };

    use crate::{CreditsService, PaymentConfig, PaymentService, StoreService};

    // ─────────────────────────────────────────────────────────────────────────
    // Mock ports
    // ─────────────────────────────────────────────────────────────────────────

    /// In-memory store mirroring the SQLite adapter's semantics.
    pub struct MockStore {
        accounts: Mutex<HashMap<AccountId, Account>>,
        entries: Mutex<Vec<LedgerEntry>>,
        intents: Mutex<Vec<PaymentIntent>>,
        methods: Mutex<Vec<PaymentMethod>>,
        items: Mutex<HashMap<i64, Item>>,
        destinations: Mutex<HashMap<i64, Destination>>,
        orders: Mutex<Vec<PurchaseOrder>>,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self {
                accounts: Mutex::new(HashMap::new()),
                entries: Mutex::new(Vec::new()),
                intents: Mutex::new(Vec::new()),
                methods: Mutex::new(Vec::new()),
                items: Mutex::new(HashMap::new()),
                destinations: Mutex::new(HashMap::new()),
                orders: Mutex::new(Vec::new()),
            }
        }

        fn apply(
            &self,
            op: &LedgerOp,
            signed: i64,
            related: Option<LedgerEntryId>,
        ) -> Result<LedgerEntry, RepoError> {
            if op.amount <= 0 {
                return Err(RepoError::Domain(DomainError::NonPositiveAmount));
            }
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(&op.account_id)
                .ok_or(RepoError::Domain(DomainError::AccountNotFound(op.account_id)))?;

            let before = account.balance.amount();
            let after = before + signed;
            if signed < 0 && op.entry_type.requires_funds() && after < 0 {
                return Err(RepoError::Domain(DomainError::InsufficientFunds {
                    available: before,
                    requested: signed.abs(),
                }));
            }
            account.balance = Money::balance(after, account.currency());

            let entry = LedgerEntry {
                id: LedgerEntryId::new(),
                account_id: op.account_id,
                amount: signed,
                entry_type: op.entry_type,
                description: op.description.clone(),
                balance_before: before,
                balance_after: after,
                payment_id: op.payment_id,
                order_id: op.order_id,
                related_entry_id: related,
                created_at: Utc::now(),
            };
            self.entries.lock().unwrap().push(entry.clone());
            Ok(entry)
        }

        pub fn balance_of(&self, id: AccountId) -> i64 {
            self.accounts.lock().unwrap()[&id].balance.amount()
        }
    }

    #[async_trait]
    impl LedgerStore for MockStore {
        async fn create_account(&self, req: CreateAccountRequest) -> Result<Account, RepoError> {
            let account = Account::new(req.name, req.currency).map_err(RepoError::Domain)?;
            self.accounts
                .lock()
                .unwrap()
                .insert(account.id, account.clone());
            Ok(account)
        }

        async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
            Ok(self.accounts.lock().unwrap().get(&id).cloned())
        }

        async fn list_accounts(&self) -> Result<Vec<Account>, RepoError> {
            Ok(self.accounts.lock().unwrap().values().cloned().collect())
        }

        async fn set_gateway_customer(
            &self,
            id: AccountId,
            customer: &str,
        ) -> Result<(), RepoError> {
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts.get_mut(&id).ok_or(RepoError::NotFound)?;
            account.gateway_customer = Some(customer.to_string());
            Ok(())
        }

        async fn credit(&self, op: LedgerOp) -> Result<LedgerEntry, RepoError> {
            let signed = op.amount;
            self.apply(&op, signed, None)
        }

        async fn debit(&self, op: LedgerOp) -> Result<LedgerEntry, RepoError> {
            let signed = -op.amount;
            self.apply(&op, signed, None)
        }

        async fn transfer(
            &self,
            from: AccountId,
            to: AccountId,
            amount: i64,
            note: Option<String>,
        ) -> Result<(LedgerEntry, LedgerEntry), RepoError> {
            if from == to {
                return Err(RepoError::Domain(DomainError::SelfTransfer));
            }
            {
                let accounts = self.accounts.lock().unwrap();
                let from_acc = accounts
                    .get(&from)
                    .ok_or(RepoError::Domain(DomainError::AccountNotFound(from)))?;
                let to_acc = accounts
                    .get(&to)
                    .ok_or(RepoError::Domain(DomainError::AccountNotFound(to)))?;
                if from_acc.currency() != to_acc.currency() {
                    return Err(RepoError::Domain(DomainError::CrossCurrencyTransfer));
                }
            }

            let out_op = LedgerOp {
                account_id: from,
                amount,
                entry_type: EntryType::TransferOut,
                description: note.clone(),
                payment_id: None,
                order_id: None,
            };
            let in_op = LedgerOp {
                account_id: to,
                amount,
                entry_type: EntryType::TransferIn,
                description: note,
                payment_id: None,
                order_id: None,
            };
            let out_entry = self.apply(&out_op, -amount, None)?;
            let in_entry = self.apply(&in_op, amount, Some(out_entry.id))?;

            let mut entries = self.entries.lock().unwrap();
            let out_entry = {
                let stored = entries
                    .iter_mut()
                    .find(|e| e.id == out_entry.id)
                    .ok_or(RepoError::NotFound)?;
                stored.related_entry_id = Some(in_entry.id);
                stored.clone()
            };
            Ok((out_entry, in_entry))
        }

        async fn list_entries(
            &self,
            account_id: AccountId,
            entry_type: Option<EntryType>,
            page: Page,
        ) -> Result<Vec<LedgerEntry>, RepoError> {
            let page = page.clamped();
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|e| e.account_id == account_id)
                .filter(|e| entry_type.is_none_or(|t| e.entry_type == t))
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .cloned()
                .collect())
        }

        async fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), RepoError> {
            self.intents.lock().unwrap().push(intent.clone());
            Ok(())
        }

        async fn attach_gateway_ref(
            &self,
            id: PaymentIntentId,
            gateway_ref: &str,
            client_secret: Option<&str>,
            checkout_url: Option<&str>,
        ) -> Result<(), RepoError> {
            let mut intents = self.intents.lock().unwrap();
            let intent = intents
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or(RepoError::NotFound)?;
            intent.gateway_ref = Some(gateway_ref.to_string());
            intent.client_secret = client_secret.map(String::from);
            intent.checkout_url = checkout_url.map(String::from);
            Ok(())
        }

        async fn get_intent(
            &self,
            id: PaymentIntentId,
        ) -> Result<Option<PaymentIntent>, RepoError> {
            Ok(self
                .intents
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.id == id)
                .cloned())
        }

        async fn find_intent_by_gateway_ref(
            &self,
            gateway_ref: &str,
        ) -> Result<Option<PaymentIntent>, RepoError> {
            Ok(self
                .intents
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.gateway_ref.as_deref() == Some(gateway_ref))
                .cloned())
        }

        async fn count_active_intents_since(
            &self,
            account_id: AccountId,
            cutoff: DateTime<Utc>,
        ) -> Result<i64, RepoError> {
            Ok(self
                .intents
                .lock()
                .unwrap()
                .iter()
                .filter(|i| {
                    i.account_id == account_id
                        && !i.status.is_terminal()
                        && i.created_at > cutoff
                })
                .count() as i64)
        }

        async fn pending_intent_total(&self, account_id: AccountId) -> Result<i64, RepoError> {
            Ok(self
                .intents
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.account_id == account_id && !i.status.is_terminal())
                .map(|i| i.amount.amount())
                .sum())
        }

        async fn settle_intent(
            &self,
            id: PaymentIntentId,
            event: &serde_json::Value,
        ) -> Result<credits_types::SettleOutcome, RepoError> {
            use credits_types::SettleOutcome;

            let (account_id, amount) = {
                let mut intents = self.intents.lock().unwrap();
                let intent = intents
                    .iter_mut()
                    .find(|i| i.id == id)
                    .ok_or(RepoError::NotFound)?;
                match intent.status {
                    PaymentStatus::Succeeded => return Ok(SettleOutcome::AlreadySettled),
                    PaymentStatus::Failed | PaymentStatus::Expired => {
                        return Err(RepoError::Conflict(format!(
                            "Intent is already {}",
                            intent.status
                        )));
                    }
                    _ => {}
                }
                intent.status = PaymentStatus::Succeeded;
                intent.confirmed_at = Some(Utc::now());
                intent.last_event = Some(event.clone());
                (intent.account_id, intent.amount.amount())
            };

            let entry = self.apply(
                &LedgerOp {
                    account_id,
                    amount,
                    entry_type: EntryType::Deposit,
                    description: Some("Credit top-up".into()),
                    payment_id: Some(id),
                    order_id: None,
                },
                amount,
                None,
            )?;
            Ok(SettleOutcome::Applied(entry))
        }

        async fn fail_intent(
            &self,
            id: PaymentIntentId,
            reason: &str,
            event: &serde_json::Value,
        ) -> Result<(), RepoError> {
            let mut intents = self.intents.lock().unwrap();
            let intent = intents
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or(RepoError::NotFound)?;
            match intent.status {
                PaymentStatus::Failed | PaymentStatus::Expired => Ok(()),
                PaymentStatus::Succeeded => {
                    Err(RepoError::Conflict("Intent already succeeded".into()))
                }
                _ => {
                    intent.status = PaymentStatus::Failed;
                    intent.failure_reason = Some(reason.to_string());
                    intent.last_event = Some(event.clone());
                    Ok(())
                }
            }
        }

        async fn mark_intent_expired(&self, id: PaymentIntentId) -> Result<(), RepoError> {
            let mut intents = self.intents.lock().unwrap();
            if let Some(intent) = intents.iter_mut().find(|i| i.id == id) {
                if intent.status == PaymentStatus::Pending {
                    intent.status = PaymentStatus::Expired;
                    intent.failure_reason = Some("expired".into());
                }
            }
            Ok(())
        }

        async fn expire_stale_intents(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
            let mut intents = self.intents.lock().unwrap();
            let mut expired = 0;
            for intent in intents.iter_mut() {
                if intent.status == PaymentStatus::Pending && intent.expires_at < now {
                    intent.status = PaymentStatus::Expired;
                    intent.failure_reason = Some("expired".into());
                    expired += 1;
                }
            }
            Ok(expired)
        }

        async fn list_intents(
            &self,
            account_id: AccountId,
            status: Option<PaymentStatus>,
            page: Page,
        ) -> Result<Vec<PaymentIntent>, RepoError> {
            let page = page.clamped();
            Ok(self
                .intents
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|i| i.account_id == account_id)
                .filter(|i| status.is_none_or(|s| i.status == s))
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .cloned()
                .collect())
        }

        async fn upsert_method(&self, method: &PaymentMethod) -> Result<(), RepoError> {
            let mut methods = self.methods.lock().unwrap();
            methods.retain(|m| m.token != method.token);
            methods.push(method.clone());
            Ok(())
        }

        async fn list_methods(
            &self,
            account_id: AccountId,
        ) -> Result<Vec<PaymentMethod>, RepoError> {
            let mut active: Vec<_> = self
                .methods
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.account_id == account_id && m.is_active)
                .cloned()
                .collect();
            active.sort_by_key(|m| (!m.is_default, std::cmp::Reverse(m.created_at)));
            Ok(active)
        }

        async fn detach_method(&self, account_id: AccountId, token: &str) -> Result<(), RepoError> {
            let mut methods = self.methods.lock().unwrap();
            let method = methods
                .iter_mut()
                .find(|m| m.account_id == account_id && m.token == token && m.is_active)
                .ok_or(RepoError::NotFound)?;
            method.is_active = false;
            method.is_default = false;
            Ok(())
        }

        async fn set_default_method(
            &self,
            account_id: AccountId,
            token: &str,
        ) -> Result<(), RepoError> {
            let mut methods = self.methods.lock().unwrap();
            for m in methods.iter_mut().filter(|m| m.account_id == account_id) {
                m.is_default = false;
            }
            let method = methods
                .iter_mut()
                .find(|m| m.account_id == account_id && m.token == token && m.is_active)
                .ok_or(RepoError::NotFound)?;
            method.is_default = true;
            Ok(())
        }

        async fn get_item(&self, id: ItemId) -> Result<Option<Item>, RepoError> {
            Ok(self.items.lock().unwrap().get(&id.0).cloned())
        }

        async fn list_items(&self) -> Result<Vec<Item>, RepoError> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.is_active)
                .cloned()
                .collect())
        }

        async fn create_item(&self, mut item: Item) -> Result<Item, RepoError> {
            let mut items = self.items.lock().unwrap();
            item.id = ItemId(items.len() as i64 + 1);
            items.insert(item.id.0, item.clone());
            Ok(item)
        }

        async fn get_destination(
            &self,
            id: DestinationId,
        ) -> Result<Option<Destination>, RepoError> {
            Ok(self.destinations.lock().unwrap().get(&id.0).cloned())
        }

        async fn create_destination(
            &self,
            mut dest: Destination,
        ) -> Result<Destination, RepoError> {
            let mut destinations = self.destinations.lock().unwrap();
            dest.id = DestinationId(destinations.len() as i64 + 1);
            destinations.insert(dest.id.0, dest.clone());
            Ok(dest)
        }

        async fn purchase(
            &self,
            account_id: AccountId,
            destination_id: DestinationId,
            lines: &[PurchaseLine],
            recipient: Option<String>,
        ) -> Result<PurchaseReceipt, RepoError> {
            if lines.is_empty() {
                return Err(RepoError::Domain(DomainError::ValidationError(
                    "Purchase needs at least one line".into(),
                )));
            }

            let mut priced = Vec::new();
            let mut total = 0i64;
            {
                let items = self.items.lock().unwrap();
                for line in lines {
                    let item = items.get(&line.item_id.0).ok_or(RepoError::NotFound)?;
                    if !item.is_active {
                        return Err(RepoError::Domain(DomainError::ValidationError(format!(
                            "Item {} is not for sale",
                            item.code
                        ))));
                    }
                    if !item.has_stock(line.quantity) {
                        return Err(RepoError::Conflict(format!("Out of stock: {}", item.code)));
                    }
                    let line_total = item.price.amount() * line.quantity;
                    total += line_total;
                    priced.push((line.item_id, line.quantity, line_total));
                }
            }

            let debit = self.apply(
                &LedgerOp {
                    account_id,
                    amount: total,
                    entry_type: EntryType::Purchase,
                    description: Some("Shop purchase".into()),
                    payment_id: None,
                    order_id: None,
                },
                -total,
                None,
            )?;

            {
                let mut items = self.items.lock().unwrap();
                for (item_id, quantity, _) in &priced {
                    let item = items.get_mut(&item_id.0).ok_or(RepoError::NotFound)?;
                    if item.stock != -1 {
                        item.stock -= quantity;
                    }
                }
            }

            let mut orders = Vec::new();
            for (item_id, quantity, line_total) in priced {
                let order = PurchaseOrder {
                    id: Uuid::new_v4(),
                    account_id,
                    item_id,
                    destination_id,
                    quantity,
                    amount: line_total,
                    recipient: recipient.clone(),
                    status: OrderStatus::Pending,
                    command_sent: None,
                    command_response: None,
                    failure_reason: None,
                    created_at: Utc::now(),
                    completed_at: None,
                };
                self.orders.lock().unwrap().push(order.clone());
                orders.push(order);
            }

            let new_balance = debit.balance_after;
            Ok(PurchaseReceipt {
                orders,
                debit,
                total,
                new_balance,
            })
        }

        async fn get_order(&self, id: Uuid) -> Result<Option<PurchaseOrder>, RepoError> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .find(|o| o.id == id)
                .cloned())
        }

        async fn list_orders(
            &self,
            account_id: AccountId,
            page: Page,
        ) -> Result<Vec<PurchaseOrder>, RepoError> {
            let page = page.clamped();
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|o| o.account_id == account_id)
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .cloned()
                .collect())
        }

        async fn mark_order_processing(&self, id: Uuid, command: &str) -> Result<(), RepoError> {
            let mut orders = self.orders.lock().unwrap();
            let order = orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or(RepoError::NotFound)?;
            order.status = OrderStatus::Processing;
            order.command_sent = Some(command.to_string());
            Ok(())
        }

        async fn complete_order(&self, id: Uuid, response: &str) -> Result<(), RepoError> {
            let mut orders = self.orders.lock().unwrap();
            let order = orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or(RepoError::NotFound)?;
            order.status = OrderStatus::Completed;
            order.command_response = Some(response.to_string());
            order.completed_at = Some(Utc::now());
            Ok(())
        }

        async fn fail_order(&self, id: Uuid, reason: &str) -> Result<(), RepoError> {
            let mut orders = self.orders.lock().unwrap();
            let order = orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or(RepoError::NotFound)?;
            order.status = OrderStatus::Failed;
            order.failure_reason = Some(reason.to_string());
            order.completed_at = Some(Utc::now());
            Ok(())
        }
    }

    /// Gateway stub. The signature header `"valid"` passes verification.
    pub struct MockGateway {
        pub polled_state: Mutex<Option<GatewayIntentStatus>>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self {
                polled_state: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create_intent(
            &self,
            _amount: &Money,
            local_id: PaymentIntentId,
            _customer: Option<&str>,
        ) -> Result<GatewayIntent, GatewayError> {
            Ok(GatewayIntent {
                reference: format!("pi_{}", local_id),
                client_secret: Some("cs_test".into()),
            })
        }

        async fn create_checkout(
            &self,
            _amount: &Money,
            local_id: PaymentIntentId,
            _customer: Option<&str>,
        ) -> Result<GatewayCheckout, GatewayError> {
            Ok(GatewayCheckout {
                reference: format!("pi_{}", local_id),
                session_id: format!("cs_{}", local_id),
                url: "https://checkout.example.invalid/session".into(),
            })
        }

        async fn fetch_intent(
            &self,
            _reference: &str,
        ) -> Result<GatewayIntentStatus, GatewayError> {
            self.polled_state
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| GatewayError::Unreachable("no polled state".into()))
        }

        async fn cancel_intent(&self, _reference: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn ensure_customer(&self, _account: &Account) -> Result<String, GatewayError> {
            Ok("cus_mock".into())
        }

        async fn attach_method(
            &self,
            _customer: &str,
            _token: &str,
        ) -> Result<MethodDetails, GatewayError> {
            Ok(MethodDetails {
                method_type: "card".into(),
                brand: Some("visa".into()),
                last4: Some("4242".into()),
                exp_month: Some(12),
                exp_year: Some(2030),
            })
        }

        async fn detach_method(&self, _token: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        fn verify_signature(&self, _body: &[u8], header: &str) -> Result<(), GatewayError> {
            if header == "valid" {
                Ok(())
            } else {
                Err(GatewayError::InvalidSignature("signature mismatch".into()))
            }
        }
    }

    /// Fulfillment stub recording every executed command.
    pub struct MockFulfillment {
        pub outcome: Mutex<CommandOutcome>,
        pub commands: Mutex<Vec<String>>,
    }

    impl MockFulfillment {
        pub fn succeeding() -> Self {
            Self {
                outcome: Mutex::new(CommandOutcome::ok("done")),
                commands: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(reason: &str) -> Self {
            Self {
                outcome: Mutex::new(CommandOutcome::failed(reason)),
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fulfillment for MockFulfillment {
        async fn execute(&self, _destination: &Destination, command: &str) -> CommandOutcome {
            self.commands.lock().unwrap().push(command.to_string());
            self.outcome.lock().unwrap().clone()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Harness
    // ─────────────────────────────────────────────────────────────────────────

    struct Harness {
        store: Arc<MockStore>,
        gateway: Arc<MockGateway>,
        fulfillment: Arc<MockFulfillment>,
        payments: PaymentService<MockStore, MockGateway>,
        credits: CreditsService<MockStore>,
        shop: StoreService<MockStore, MockFulfillment>,
    }

    fn harness_with(fulfillment: MockFulfillment) -> Harness {
        let store = Arc::new(MockStore::new());
        let gateway = Arc::new(MockGateway::new());
        let fulfillment = Arc::new(fulfillment);
        Harness {
            store: store.clone(),
            gateway: gateway.clone(),
            fulfillment: fulfillment.clone(),
            payments: PaymentService::new(store.clone(), gateway, PaymentConfig::default()),
            credits: CreditsService::new(store.clone()),
            shop: StoreService::new(store, fulfillment),
        }
    }

    fn harness() -> Harness {
        harness_with(MockFulfillment::succeeding())
    }

    async fn account_with_balance(h: &Harness, amount: i64) -> AccountId {
        let account = h
            .credits
            .create_account(CreateAccountRequest {
                name: "Test".into(),
                currency: Currency::THB,
            })
            .await
            .unwrap();
        if amount > 0 {
            h.store
                .credit(LedgerOp {
                    account_id: account.id,
                    amount,
                    entry_type: EntryType::AdminAdjust,
                    description: None,
                    payment_id: None,
                    order_id: None,
                })
                .await
                .unwrap();
        }
        account.id
    }

    async fn seed_shop(h: &Harness, price: i64, stock: i64) -> (ItemId, DestinationId) {
        let item = h
            .shop
            .create_item(Item {
                id: ItemId(0),
                name: "Starter Kit".into(),
                code: "starter_kit".into(),
                price: Money::new(price, Currency::THB).unwrap(),
                command: "give starter_kit".into(),
                stock,
                is_active: true,
            })
            .await
            .unwrap();
        let dest = h
            .shop
            .create_destination(Destination {
                id: DestinationId(0),
                name: "main".into(),
                host: "127.0.0.1".into(),
                port: 27015,
                password: "rcon".into(),
            })
            .await
            .unwrap();
        (item.id, dest.id)
    }

    fn success_envelope(reference: &str, amount: i64) -> Vec<u8> {
        serde_json::json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": reference, "amount": amount, "status": "succeeded" } }
        })
        .to_string()
        .into_bytes()
    }

    fn failure_envelope(reference: &str, message: &str) -> Vec<u8> {
        serde_json::json!({
            "type": "payment_intent.payment_failed",
            "data": { "object": {
                "id": reference,
                "last_payment_error": { "message": message }
            } }
        })
        .to_string()
        .into_bytes()
    }

    async fn gateway_ref_of(h: &Harness, id: PaymentIntentId) -> String {
        h.store
            .get_intent(id)
            .await
            .unwrap()
            .unwrap()
            .gateway_ref
            .unwrap()
    }

    async fn wait_for_order(h: &Harness, id: Uuid, status: OrderStatus) -> PurchaseOrder {
        for _ in 0..100 {
            if let Some(order) = h.store.get_order(id).await.unwrap() {
                if order.status == status {
                    return order;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("order never reached {:?}", status);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Intent lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_intent_outside_band_fails() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        for amount in [100, 999_999_999] {
            let result = h
                .payments
                .create_intent(CreateIntentRequest {
                    account_id: account,
                    amount,
                    currency: Currency::THB,
                    hosted_checkout: false,
                })
                .await;
            assert!(matches!(result, Err(AppError::BadRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_create_intent_attaches_gateway_ref() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let resp = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();

        assert_eq!(resp.status, PaymentStatus::Pending);
        assert_eq!(resp.client_secret.as_deref(), Some("cs_test"));
        let stored = h.store.get_intent(resp.id).await.unwrap().unwrap();
        assert!(stored.gateway_ref.unwrap().starts_with("pi_"));
    }

    #[tokio::test]
    async fn test_hosted_checkout_carries_url() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let resp = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: true,
            })
            .await
            .unwrap();

        assert!(resp.checkout_url.is_some());
        assert!(resp.client_secret.is_none());
    }

    #[tokio::test]
    async fn test_open_intent_blocks_second_until_resolved() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let first = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();

        // One unresolved intent is the cap.
        let result = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // Once the open intent resolves, the account can top up again.
        h.store.mark_intent_expired(first.id).await.unwrap();
        let retry = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_status_read_expires_stale_intent() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let mut intent = PaymentIntent::new(
            account,
            Money::new(5000, Currency::THB).unwrap(),
            Duration::minutes(30),
        );
        intent.expires_at = Utc::now() - Duration::minutes(1);
        h.store.insert_intent(&intent).await.unwrap();

        let resp = h.payments.get_status(intent.id).await.unwrap();
        assert_eq!(resp.status, PaymentStatus::Expired);
    }

    #[tokio::test]
    async fn test_status_poll_settles_from_gateway() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let resp = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();

        *h.gateway.polled_state.lock().unwrap() = Some(GatewayIntentStatus {
            status: "succeeded".into(),
            amount: 5000,
        });

        let refreshed = h.payments.get_status(resp.id).await.unwrap();
        assert_eq!(refreshed.status, PaymentStatus::Succeeded);
        assert_eq!(h.store.balance_of(account), 5000);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhook reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_webhook_bad_signature_rejected() {
        let h = harness();
        let result = h.payments.process_event(b"{}", "t=0,v1=bogus").await;
        assert!(matches!(result, Err(AppError::Security(_))));
    }

    #[tokio::test]
    async fn test_settlement_credits_once() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let resp = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();
        let reference = gateway_ref_of(&h, resp.id).await;
        let body = success_envelope(&reference, 5000);

        let first = h.payments.process_event(&body, "valid").await.unwrap();
        assert_eq!(first.outcome, "applied");

        let second = h.payments.process_event(&body, "valid").await.unwrap();
        assert_eq!(second.outcome, "duplicate");

        assert_eq!(h.store.balance_of(account), 5000);
    }

    #[tokio::test]
    async fn test_amount_mismatch_never_credits() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let resp = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();
        let reference = gateway_ref_of(&h, resp.id).await;

        let body = success_envelope(&reference, 4999);
        let result = h.payments.process_event(&body, "valid").await;
        assert!(matches!(result, Err(AppError::Security(_))));

        assert_eq!(h.store.balance_of(account), 0);
        let stored = h.store.get_intent(resp.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_failure_event_marks_intent_failed() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let resp = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();
        let reference = gateway_ref_of(&h, resp.id).await;

        let ack = h
            .payments
            .process_event(&failure_envelope(&reference, "card_declined"), "valid")
            .await
            .unwrap();
        assert_eq!(ack.outcome, "applied");

        let stored = h.store.get_intent(resp.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("card_declined"));
    }

    #[tokio::test]
    async fn test_failure_after_settlement_keeps_credit() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let resp = h
            .payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();
        let reference = gateway_ref_of(&h, resp.id).await;

        h.payments
            .process_event(&success_envelope(&reference, 5000), "valid")
            .await
            .unwrap();
        let ack = h
            .payments
            .process_event(&failure_envelope(&reference, "late decline"), "valid")
            .await
            .unwrap();
        assert_eq!(ack.outcome, "ignored");

        assert_eq!(h.store.balance_of(account), 5000);
        let stored = h.store.get_intent(resp.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_unknown_event_is_acknowledged() {
        let h = harness();
        let body = serde_json::json!({
            "type": "customer.subscription.updated",
            "data": { "object": {} }
        })
        .to_string()
        .into_bytes();

        let ack = h.payments.process_event(&body, "valid").await.unwrap();
        assert_eq!(ack.outcome, "ignored");
    }

    #[tokio::test]
    async fn test_malformed_recognized_event_is_processing_error() {
        let h = harness();
        // succeeded event without an amount
        let body = serde_json::json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_x", "status": "succeeded" } }
        })
        .to_string()
        .into_bytes();

        let result = h.payments.process_event(&body, "valid").await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credits service
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_account_empty_name_fails() {
        let h = harness();
        let result = h
            .credits
            .create_account(CreateAccountRequest {
                name: "   ".into(),
                currency: Currency::THB,
            })
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_balance_reports_pending_intents() {
        let h = harness();
        let account = account_with_balance(&h, 1000).await;

        h.payments
            .create_intent(CreateIntentRequest {
                account_id: account,
                amount: 5000,
                currency: Currency::THB,
                hosted_checkout: false,
            })
            .await
            .unwrap();

        let balance = h.credits.balance(account).await.unwrap();
        assert_eq!(balance.balance, 1000);
        assert_eq!(balance.pending, 5000);
    }

    #[tokio::test]
    async fn test_adjust_signed_amounts() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let credit = h
            .credits
            .adjust(AdjustRequest {
                account_id: account,
                amount: 500,
                reason: "goodwill".into(),
            })
            .await
            .unwrap();
        assert_eq!(credit.amount, 500);
        assert_eq!(credit.entry_type, EntryType::AdminAdjust);

        let debit = h
            .credits
            .adjust(AdjustRequest {
                account_id: account,
                amount: -200,
                reason: "chargeback".into(),
            })
            .await
            .unwrap();
        assert_eq!(debit.amount, -200);
        assert_eq!(h.store.balance_of(account), 300);
    }

    #[tokio::test]
    async fn test_reward_credits_account() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let entry = h
            .credits
            .reward(RewardRequest {
                account_id: account,
                amount: 150,
                reason: "daily_login".into(),
            })
            .await
            .unwrap();
        assert_eq!(entry.entry_type, EntryType::Reward);
        assert_eq!(h.store.balance_of(account), 150);
    }

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let h = harness();
        let alice = account_with_balance(&h, 1000).await;
        let bob = account_with_balance(&h, 0).await;

        let resp = h
            .credits
            .transfer(TransferRequest {
                from_account_id: alice,
                to_account_id: bob,
                amount: 400,
                note: None,
            })
            .await
            .unwrap();

        assert_eq!(resp.from_balance, 600);
        assert_eq!(resp.to_balance, 400);
        assert_ne!(resp.out_entry_id, resp.in_entry_id);
    }

    #[tokio::test]
    async fn test_transfer_to_self_conflicts() {
        let h = harness();
        let account = account_with_balance(&h, 1000).await;

        let result = h
            .credits
            .transfer(TransferRequest {
                from_account_id: account,
                to_account_id: account,
                amount: 100,
                note: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(h.store.balance_of(account), 1000);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Purchase orchestration
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_purchase_dispatches_delivery() {
        let h = harness();
        let account = account_with_balance(&h, 10_000).await;
        let (item, dest) = seed_shop(&h, 2000, -1).await;

        let resp = h.shop.buy_item(account, dest, item, 1).await.unwrap();
        assert_eq!(resp.total, 2000);
        assert_eq!(resp.new_balance, 8000);

        let order = wait_for_order(&h, resp.order_ids[0], OrderStatus::Completed).await;
        assert_eq!(order.command_sent.as_deref(), Some("give starter_kit"));
        assert_eq!(order.command_response.as_deref(), Some("done"));

        let commands = h.fulfillment.commands.lock().unwrap();
        assert_eq!(commands.as_slice(), ["give starter_kit"]);
    }

    #[tokio::test]
    async fn test_gift_appends_recipient_and_quantity() {
        let h = harness();
        let account = account_with_balance(&h, 10_000).await;
        let (item, dest) = seed_shop(&h, 1000, -1).await;

        let resp = h
            .shop
            .gift_item(account, dest, item, 2, "  steve  ")
            .await
            .unwrap();

        let order = wait_for_order(&h, resp.order_ids[0], OrderStatus::Completed).await;
        assert_eq!(order.command_sent.as_deref(), Some("give starter_kit steve 2"));
        assert_eq!(order.recipient.as_deref(), Some("steve"));
    }

    #[tokio::test]
    async fn test_gift_requires_recipient() {
        let h = harness();
        let account = account_with_balance(&h, 10_000).await;
        let (item, dest) = seed_shop(&h, 1000, -1).await;

        let result = h.shop.gift_item(account, dest, item, 1, "   ").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(h.store.balance_of(account), 10_000);
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_debit() {
        let h = harness_with(MockFulfillment::failing("server unreachable"));
        let account = account_with_balance(&h, 10_000).await;
        let (item, dest) = seed_shop(&h, 2000, -1).await;

        let resp = h.shop.buy_item(account, dest, item, 1).await.unwrap();
        let order = wait_for_order(&h, resp.order_ids[0], OrderStatus::Failed).await;

        assert_eq!(order.failure_reason.as_deref(), Some("server unreachable"));
        assert_eq!(h.store.balance_of(account), 8000);
    }

    #[tokio::test]
    async fn test_purchase_insufficient_funds_aborts() {
        let h = harness();
        let account = account_with_balance(&h, 1000).await;
        let (item, dest) = seed_shop(&h, 2000, 5).await;

        let result = h.shop.buy_item(account, dest, item, 1).await;
        assert!(matches!(result, Err(AppError::InsufficientFunds { .. })));

        assert_eq!(h.store.balance_of(account), 1000);
        let stored = h.store.get_item(item).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
    }

    #[tokio::test]
    async fn test_order_lookup_scoped_to_owner() {
        let h = harness();
        let buyer = account_with_balance(&h, 10_000).await;
        let other = account_with_balance(&h, 0).await;
        let (item, dest) = seed_shop(&h, 1000, -1).await;

        let resp = h.shop.buy_item(buyer, dest, item, 1).await.unwrap();
        let order_id = resp.order_ids[0];

        assert!(h.shop.get_order(buyer, order_id).await.is_ok());
        let result = h.shop.get_order(other, order_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payment methods
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_first_method_becomes_default() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        let method = h
            .payments
            .attach_method(AttachMethodRequest {
                account_id: account,
                token: "pm_1".into(),
                set_default: false,
            })
            .await
            .unwrap();
        assert!(method.is_default);
        assert_eq!(method.brand.as_deref(), Some("visa"));

        // Gateway customer persisted on first attach
        let stored = h.store.get_account(account).await.unwrap().unwrap();
        assert_eq!(stored.gateway_customer.as_deref(), Some("cus_mock"));
    }

    #[tokio::test]
    async fn test_detach_promotes_remaining_method() {
        let h = harness();
        let account = account_with_balance(&h, 0).await;

        for token in ["pm_1", "pm_2"] {
            h.payments
                .attach_method(AttachMethodRequest {
                    account_id: account,
                    token: token.into(),
                    set_default: false,
                })
                .await
                .unwrap();
        }

        // pm_1 attached first, so it is the default
        h.payments.detach_method(account, "pm_1").await.unwrap();

        let remaining = h.payments.list_methods(account).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, "pm_2");
        assert!(remaining[0].is_default);
    }
}
