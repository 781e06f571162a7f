//! Conditional order legs and their identifiers.
//!
//! Provides order side, leg naming, remote rule status and the `OrderLeg`
//! record that every controller reads and updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Price, Quantity};

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Gateway-assigned identifier of a conditional order (rule).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier under which the broker files the order once the rule fires.
    ///
    /// Format: `{prefix}{rule_id}`, e.g. `GTTV3_prod_5123456`.
    pub fn unique_order_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role of a leg within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegName {
    /// Call-side entry BUY.
    CeEntry,
    /// Put-side entry BUY.
    PeEntry,
    /// Profit target SELL.
    Target,
    /// Stop-loss slice cancelled once the target executes.
    StopLoss1,
    /// Stop-loss slice trailed on the `step1` ladder.
    StopLoss2,
    /// Stop-loss slice trailed on the `step2` ladder.
    StopLoss3,
}

impl LegName {
    /// Order name used in broker payloads and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CeEntry => "ce_order1",
            Self::PeEntry => "pe_order1",
            Self::Target => "gtt_order1",
            Self::StopLoss1 => "gtt_sl_order1",
            Self::StopLoss2 => "gtt_sl_order2",
            Self::StopLoss3 => "gtt_sl_order3",
        }
    }
}

impl fmt::Display for LegName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote status of a conditional order.
///
/// A missing (null) status is represented as `Option::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LegStatus {
    New,
    Active,
    SentToExchange,
    Triggered,
    Cancelled,
    Unknown,
}

impl From<String> for LegStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<LegStatus> for String {
    fn from(status: LegStatus) -> Self {
        status.to_string()
    }
}

impl LegStatus {
    /// Parse a broker status string (case-insensitive).
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Self::New,
            "ACTIVE" => Self::Active,
            "SENTTOEXCHANGE" | "SENT_TO_EXCHANGE" => Self::SentToExchange,
            "TRIGGERED" => Self::Triggered,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Rule is still resting at the broker and can be modified.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::New | Self::Active)
    }
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Active => write!(f, "ACTIVE"),
            Self::SentToExchange => write!(f, "SENTTOEXCHANGE"),
            Self::Triggered => write!(f, "TRIGGERED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Rule has left the broker's book: status null or sent to the exchange.
///
/// The broker drops the rule (null status) once its order executes, so both
/// cases are read as "executed".
pub fn is_executed(status: Option<LegStatus>) -> bool {
    matches!(status, None | Some(LegStatus::SentToExchange))
}

/// Rule is still NEW/ACTIVE at the broker.
pub fn is_live(status: Option<LegStatus>) -> bool {
    status.is_some_and(|s| s.is_active())
}

/// One conditional order placed at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLeg {
    pub order_name: LegName,
    pub symbol: String,
    pub token: String,
    pub rule_id: RuleId,
    pub trigger_price: Price,
    pub limit_price: Price,
    pub side: OrderSide,
    pub quantity: Quantity,
    /// Last status observed by polling. `None` means null / not yet polled.
    pub status: Option<LegStatus>,
    pub placed_at: DateTime<Utc>,
}

impl OrderLeg {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_name: LegName,
        symbol: impl Into<String>,
        token: impl Into<String>,
        rule_id: RuleId,
        trigger_price: Price,
        limit_price: Price,
        side: OrderSide,
        quantity: Quantity,
    ) -> Self {
        Self {
            order_name,
            symbol: symbol.into(),
            token: token.into(),
            rule_id,
            trigger_price,
            limit_price,
            side,
            quantity,
            status: Some(LegStatus::New),
            placed_at: Utc::now(),
        }
    }

    /// Record a new trigger/limit after a successful modify.
    pub fn rebase(&mut self, trigger_price: Price, limit_price: Price, quantity: Quantity) {
        self.trigger_price = trigger_price;
        self.limit_price = limit_price;
        self.quantity = quantity;
    }
}
