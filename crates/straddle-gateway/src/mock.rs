//! Scriptable in-memory gateway for tests.
//!
//! Records every call, keeps a rule table that honours create/cancel/modify,
//! and lets tests inject per-operation failures and broker-side events
//! (fills, executions, quote changes).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use straddle_core::{LegStatus, Price, Quantity, RuleId};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{BoxFuture, ConditionalOrderGateway};
use crate::types::{
    ModifyRequest, OrderBookEntry, PendingCounts, RuleDetails, RuleRequest, DEFAULT_ORDER_ID_PREFIX,
};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Create(RuleRequest),
    Cancel(RuleId),
    Modify(ModifyRequest),
    Status(RuleId),
    OrderBook,
    Ltp(String),
    PendingCounts,
}

/// A rule as the mock broker currently holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRule {
    pub request: RuleRequest,
    pub status: Option<LegStatus>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<GatewayCall>,
    next_id: u64,
    creates: usize,
    rules: HashMap<RuleId, MockRule>,
    created: Vec<RuleId>,
    prices: HashMap<String, Price>,
    order_book: Vec<OrderBookEntry>,
    plain_pending: u32,
    pending_override: Option<PendingCounts>,
    create_failures: HashMap<usize, GatewayError>,
    failures: HashMap<&'static str, VecDeque<GatewayError>>,
    modify_failures: HashMap<RuleId, VecDeque<GatewayError>>,
}

impl MockState {
    fn take_failure(&mut self, op: &'static str) -> Option<GatewayError> {
        self.failures.get_mut(op).and_then(VecDeque::pop_front)
    }
}

/// Mock conditional-order gateway.
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 1_000_001,
                ..MockState::default()
            }),
        }
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    pub fn set_ltp(&self, token: &str, price: Price) {
        self.state.lock().prices.insert(token.to_string(), price);
    }

    /// Plain (non-rule) orders reported as pending.
    pub fn set_plain_pending(&self, count: u32) {
        self.state.lock().plain_pending = count;
    }

    /// Report fixed pending counts instead of deriving them from the rule table.
    pub fn set_pending_counts(&self, counts: Option<PendingCounts>) {
        self.state.lock().pending_override = counts;
    }

    /// Fail the `n`-th create call (1-based, counted over the mock's lifetime).
    pub fn fail_nth_create(&self, n: usize, error: GatewayError) {
        self.state.lock().create_failures.insert(n, error);
    }

    pub fn fail_next_create(&self, error: GatewayError) {
        let mut state = self.state.lock();
        let n = state.creates + 1;
        state.create_failures.insert(n, error);
    }

    pub fn fail_next_cancel(&self, error: GatewayError) {
        self.push_failure("cancel", error);
    }

    pub fn fail_next_modify(&self, error: GatewayError) {
        self.push_failure("modify", error);
    }

    /// Fail the next modify that targets `rule_id`; other rules modify normally.
    pub fn fail_next_modify_of(&self, rule_id: &RuleId, error: GatewayError) {
        self.state
            .lock()
            .modify_failures
            .entry(rule_id.clone())
            .or_default()
            .push_back(error);
    }

    pub fn fail_next_status(&self, error: GatewayError) {
        self.push_failure("status", error);
    }

    pub fn fail_next_order_book(&self, error: GatewayError) {
        self.push_failure("order_book", error);
    }

    pub fn fail_next_ltp(&self, error: GatewayError) {
        self.push_failure("ltp", error);
    }

    pub fn fail_next_pending_counts(&self, error: GatewayError) {
        self.push_failure("pending_counts", error);
    }

    fn push_failure(&self, op: &'static str, error: GatewayError) {
        self.state.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Overwrite a rule's remote status. `None` = executed and dropped.
    pub fn set_rule_status(&self, rule_id: &RuleId, status: Option<LegStatus>) {
        if let Some(rule) = self.state.lock().rules.get_mut(rule_id) {
            rule.status = status;
        }
    }

    /// Rule fires: it leaves the rule book and its order appears as
    /// `complete` in the order book at `average_price`.
    pub fn fill_rule(&self, rule_id: &RuleId, average_price: Price, update_time: &str) {
        let mut state = self.state.lock();
        let Some(rule) = state.rules.get_mut(rule_id) else {
            return;
        };
        rule.status = None;
        let entry = OrderBookEntry {
            unique_order_id: rule_id.unique_order_id(DEFAULT_ORDER_ID_PREFIX),
            status: "complete".to_string(),
            average_price,
            symbol: rule.request.symbol.clone(),
            token: rule.request.token.clone(),
            update_time: update_time.to_string(),
        };
        state.order_book.push(entry);
    }

    pub fn push_order_book(&self, entry: OrderBookEntry) {
        self.state.lock().order_book.push(entry);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Ids of successfully created rules, in creation order.
    pub fn created_ids(&self) -> Vec<RuleId> {
        self.state.lock().created.clone()
    }

    pub fn rule(&self, rule_id: &RuleId) -> Option<MockRule> {
        self.state.lock().rules.get(rule_id).cloned()
    }

    /// Rules still NEW/ACTIVE.
    pub fn live_rule_count(&self) -> usize {
        self.state
            .lock()
            .rules
            .values()
            .filter(|r| r.status.is_some_and(|s| s.is_active()))
            .count()
    }
}

impl ConditionalOrderGateway for MockGateway {
    fn create_rule<'a>(&'a self, request: &'a RuleRequest) -> BoxFuture<'a, GatewayResult<RuleId>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::Create(request.clone()));
            state.creates += 1;
            let n = state.creates;
            if let Some(err) = state.create_failures.remove(&n) {
                return Err(err);
            }
            let rule_id = RuleId::new(state.next_id.to_string());
            state.next_id += 1;
            state.rules.insert(
                rule_id.clone(),
                MockRule {
                    request: request.clone(),
                    status: Some(LegStatus::New),
                },
            );
            state.created.push(rule_id.clone());
            Ok(rule_id)
        })
    }

    fn cancel_rule<'a>(&'a self, rule_id: &'a RuleId, _token: &'a str) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::Cancel(rule_id.clone()));
            if let Some(err) = state.take_failure("cancel") {
                return Err(err);
            }
            let rule = state
                .rules
                .get_mut(rule_id)
                .ok_or_else(|| GatewayError::NotFound(rule_id.to_string()))?;
            if rule.status.is_some_and(|s| s.is_active()) {
                rule.status = Some(LegStatus::Cancelled);
            }
            Ok(())
        })
    }

    fn modify_rule<'a>(&'a self, request: &'a ModifyRequest) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::Modify(request.clone()));
            if let Some(err) = state.take_failure("modify") {
                return Err(err);
            }
            if let Some(err) = state
                .modify_failures
                .get_mut(&request.rule_id)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
            let rule = state
                .rules
                .get_mut(&request.rule_id)
                .ok_or_else(|| GatewayError::NotFound(request.rule_id.to_string()))?;
            if !rule.status.is_some_and(|s| s.is_active()) {
                return Err(GatewayError::Modify(format!("rule {} is not active", request.rule_id)));
            }
            rule.request.trigger_price = request.trigger_price;
            rule.request.limit_price = request.limit_price;
            rule.request.quantity = request.quantity;
            Ok(())
        })
    }

    fn rule_status<'a>(&'a self, rule_id: &'a RuleId) -> BoxFuture<'a, GatewayResult<RuleDetails>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::Status(rule_id.clone()));
            if let Some(err) = state.take_failure("status") {
                return Err(err);
            }
            state
                .rules
                .get(rule_id)
                .map(|r| RuleDetails {
                    status: r.status,
                    quantity: r.request.quantity,
                })
                .ok_or_else(|| GatewayError::NotFound(rule_id.to_string()))
        })
    }

    fn order_book(&self) -> BoxFuture<'_, GatewayResult<Vec<OrderBookEntry>>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::OrderBook);
            if let Some(err) = state.take_failure("order_book") {
                return Err(err);
            }
            Ok(state.order_book.clone())
        })
    }

    fn last_traded_price<'a>(
        &'a self,
        _exchange: &'a str,
        symbol: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Price>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::Ltp(token.to_string()));
            if let Some(err) = state.take_failure("ltp") {
                return Err(err);
            }
            state
                .prices
                .get(token)
                .copied()
                .ok_or_else(|| GatewayError::Quote(format!("no quote for {symbol} ({token})")))
        })
    }

    fn pending_order_counts(&self) -> BoxFuture<'_, GatewayResult<PendingCounts>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::PendingCounts);
            if let Some(err) = state.take_failure("pending_counts") {
                return Err(err);
            }
            if let Some(counts) = state.pending_override {
                return Ok(counts);
            }
            let conditional = state
                .rules
                .values()
                .filter(|r| r.status.is_some_and(|s| s.is_active()))
                .count() as u32;
            Ok(PendingCounts {
                plain: state.plain_pending,
                conditional,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use straddle_core::{LegName, OrderSide};

    fn request() -> RuleRequest {
        RuleRequest {
            order_name: LegName::StopLoss2,
            symbol: "NIFTY28OCT2625000CE".into(),
            token: "40001".into(),
            trigger_price: Price::new(dec!(95)),
            limit_price: Price::new(dec!(94.2)),
            side: OrderSide::Sell,
            quantity: Quantity::new(20),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let mock = MockGateway::new();
        let a = mock.create_rule(&request()).await.unwrap();
        let b = mock.create_rule(&request()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(mock.created_ids(), vec![a.clone(), b]);
        assert_eq!(mock.rule(&a).unwrap().status, Some(LegStatus::New));
    }

    #[tokio::test]
    async fn test_fail_nth_create() {
        let mock = MockGateway::new();
        mock.fail_nth_create(2, GatewayError::Creation("margin".into()));
        assert!(mock.create_rule(&request()).await.is_ok());
        assert!(matches!(mock.create_rule(&request()).await, Err(GatewayError::Creation(_))));
        assert!(mock.create_rule(&request()).await.is_ok());
        assert_eq!(mock.created_ids().len(), 2);
    }

    #[test]
    fn test_cancel_unknown_rule_is_not_found() {
        let mock = MockGateway::new();
        let err = tokio_test::block_on(mock.cancel_rule(&RuleId::new("nope"), "1")).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
        assert_eq!(mock.calls(), vec![GatewayCall::Cancel(RuleId::new("nope"))]);
    }

    #[tokio::test]
    async fn test_modify_updates_rule_and_requires_active() {
        let mock = MockGateway::new();
        let id = mock.create_rule(&request()).await.unwrap();
        let modify = ModifyRequest {
            rule_id: id.clone(),
            token: "40001".into(),
            trigger_price: Price::new(dec!(100)),
            limit_price: Price::new(dec!(99.5)),
            quantity: Quantity::new(20),
        };
        mock.modify_rule(&modify).await.unwrap();
        assert_eq!(mock.rule(&id).unwrap().request.trigger_price, Price::new(dec!(100)));

        mock.set_rule_status(&id, None);
        assert!(matches!(mock.modify_rule(&modify).await, Err(GatewayError::Modify(_))));
    }

    #[tokio::test]
    async fn test_modify_failure_targets_one_rule() {
        let mock = MockGateway::new();
        let a = mock.create_rule(&request()).await.unwrap();
        let b = mock.create_rule(&request()).await.unwrap();
        mock.fail_next_modify_of(&b, GatewayError::Modify("rejected".into()));
        let modify = |rule_id: &RuleId| ModifyRequest {
            rule_id: rule_id.clone(),
            token: "40001".into(),
            trigger_price: Price::new(dec!(100)),
            limit_price: Price::new(dec!(99.5)),
            quantity: Quantity::new(20),
        };

        assert!(mock.modify_rule(&modify(&a)).await.is_ok());
        assert!(matches!(mock.modify_rule(&modify(&b)).await, Err(GatewayError::Modify(_))));
        assert!(mock.modify_rule(&modify(&b)).await.is_ok());
        assert_eq!(mock.rule(&b).unwrap().request.trigger_price, Price::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_pending_counts_track_live_rules() {
        let mock = MockGateway::new();
        let id = mock.create_rule(&request()).await.unwrap();
        mock.create_rule(&request()).await.unwrap();
        assert_eq!(mock.pending_order_counts().await.unwrap().conditional, 2);

        mock.cancel_rule(&id, "40001").await.unwrap();
        assert_eq!(mock.pending_order_counts().await.unwrap().conditional, 1);
    }

    #[tokio::test]
    async fn test_fill_rule_adds_order_book_entry() {
        let mock = MockGateway::new();
        let id = mock.create_rule(&request()).await.unwrap();
        mock.fill_rule(&id, Price::new(dec!(96.5)), "16-Oct-2026 10:15:00");

        let book = mock.order_book().await.unwrap();
        assert_eq!(book.len(), 1);
        assert_eq!(book[0].unique_order_id, format!("GTTV3_prod_{id}"));
        assert!(book[0].is_filled());
        assert_eq!(mock.rule_status(&id).await.unwrap().status, None);
    }
}
