//! Request and response shapes of the conditional-order service.

use serde::{Deserialize, Serialize};
use straddle_core::{LegName, LegStatus, OrderSide, Price, Quantity, RuleId};

/// Create-rule payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRequest {
    /// Leg role, for logs only; not sent to the broker.
    pub order_name: LegName,
    pub symbol: String,
    pub token: String,
    pub trigger_price: Price,
    pub limit_price: Price,
    pub side: OrderSide,
    pub quantity: Quantity,
}

/// Modify-rule payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub rule_id: RuleId,
    pub token: String,
    pub trigger_price: Price,
    pub limit_price: Price,
    pub quantity: Quantity,
}

/// Rule details as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDetails {
    /// `None` once the broker has dropped the rule (its order went out).
    pub status: Option<LegStatus>,
    pub quantity: Quantity,
}

/// One row of the broker's order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    /// e.g. `GTTV3_prod_5123456` for orders spawned by a rule.
    pub unique_order_id: String,
    /// Free-form broker status (`complete`, `triggered`, `open`, ...).
    pub status: String,
    pub average_price: Price,
    pub symbol: String,
    pub token: String,
    /// `dd-Mon-YYYY HH:MM:SS` in market-local time.
    pub update_time: String,
}

impl OrderBookEntry {
    /// Status is `triggered` or `complete` (case-insensitive).
    #[must_use]
    pub fn is_filled(&self) -> bool {
        let s = self.status.trim();
        s.eq_ignore_ascii_case("triggered") || s.eq_ignore_ascii_case("complete")
    }
}

/// Open orders at the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    /// Plain orders in `open` / `trigger pending`.
    pub plain: u32,
    /// Conditional rules in NEW / ACTIVE.
    pub conditional: u32,
}

impl PendingCounts {
    pub fn is_clear(&self) -> bool {
        self.plain == 0 && self.conditional == 0
    }
}

/// Prefix the broker puts in front of a rule id to form the unique order id
/// of the order it spawns.
pub const DEFAULT_ORDER_ID_PREFIX: &str = "GTTV3_prod_";
