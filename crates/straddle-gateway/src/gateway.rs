//! Conditional-order gateway trait.
//!
//! Abstracts the broker's rule service so controllers can be exercised
//! against:
//! - A live broker client
//! - The in-memory paper broker
//! - A scripted mock in tests

use std::pin::Pin;
use std::sync::Arc;

use straddle_core::{Price, RuleId};

use crate::error::GatewayResult;
use crate::types::{ModifyRequest, OrderBookEntry, PendingCounts, RuleDetails, RuleRequest};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Request/response access to the broker's conditional orders.
///
/// Every call may fail; callers decide whether a failure is fatal for the
/// current step. Implementations must not retry `create_rule` internally,
/// since a repeated create can leave a duplicate rule at the broker.
pub trait ConditionalOrderGateway: Send + Sync {
    /// Create a rule and return the broker-assigned id.
    fn create_rule<'a>(&'a self, request: &'a RuleRequest) -> BoxFuture<'a, GatewayResult<RuleId>>;

    /// Cancel a rule. `NotFound` means the rule is already gone.
    fn cancel_rule<'a>(&'a self, rule_id: &'a RuleId, token: &'a str) -> BoxFuture<'a, GatewayResult<()>>;

    /// Move a rule's trigger/limit/quantity.
    fn modify_rule<'a>(&'a self, request: &'a ModifyRequest) -> BoxFuture<'a, GatewayResult<()>>;

    /// Current status and quantity of a rule.
    fn rule_status<'a>(&'a self, rule_id: &'a RuleId) -> BoxFuture<'a, GatewayResult<RuleDetails>>;

    /// Every order currently in the broker's order book.
    fn order_book(&self) -> BoxFuture<'_, GatewayResult<Vec<OrderBookEntry>>>;

    /// Last traded price of a contract.
    fn last_traded_price<'a>(
        &'a self,
        exchange: &'a str,
        symbol: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Price>>;

    /// Plain orders and rules that are still open.
    fn pending_order_counts(&self) -> BoxFuture<'_, GatewayResult<PendingCounts>>;
}

/// Arc wrapper for gateway trait objects.
pub type DynGateway = Arc<dyn ConditionalOrderGateway>;

impl<G: ConditionalOrderGateway + ?Sized> ConditionalOrderGateway for Arc<G> {
    fn create_rule<'a>(&'a self, request: &'a RuleRequest) -> BoxFuture<'a, GatewayResult<RuleId>> {
        (**self).create_rule(request)
    }

    fn cancel_rule<'a>(&'a self, rule_id: &'a RuleId, token: &'a str) -> BoxFuture<'a, GatewayResult<()>> {
        (**self).cancel_rule(rule_id, token)
    }

    fn modify_rule<'a>(&'a self, request: &'a ModifyRequest) -> BoxFuture<'a, GatewayResult<()>> {
        (**self).modify_rule(request)
    }

    fn rule_status<'a>(&'a self, rule_id: &'a RuleId) -> BoxFuture<'a, GatewayResult<RuleDetails>> {
        (**self).rule_status(rule_id)
    }

    fn order_book(&self) -> BoxFuture<'_, GatewayResult<Vec<OrderBookEntry>>> {
        (**self).order_book()
    }

    fn last_traded_price<'a>(
        &'a self,
        exchange: &'a str,
        symbol: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Price>> {
        (**self).last_traded_price(exchange, symbol, token)
    }

    fn pending_order_counts(&self) -> BoxFuture<'_, GatewayResult<PendingCounts>> {
        (**self).pending_order_counts()
    }
}
