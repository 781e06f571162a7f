//! Entry side of a cycle: the externally supplied plan, the two placed
//! entry legs and the single fill that wins.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Price, Quantity};
use crate::error::{CoreError, Result};
use crate::order::{LegName, OrderLeg};

/// Option type of a straddle leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKind {
    /// Call (CE).
    Call,
    /// Put (PE).
    Put,
}

impl OptionKind {
    pub fn entry_leg_name(&self) -> LegName {
        match self {
            Self::Call => LegName::CeEntry,
            Self::Put => LegName::PeEntry,
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "CE"),
            Self::Put => write!(f, "PE"),
        }
    }
}

/// Contracts and price bands for one cycle's entry orders.
///
/// Produced upstream from reference data (strike/expiry resolution) and
/// immutable for the lifetime of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPlan {
    pub ce_symbol: String,
    pub ce_token: String,
    /// Trigger price of the CE entry rule.
    pub ce_entry_price: Price,
    /// Limit price of the CE entry rule; also the max LTP at which we enter.
    pub ce_entry_limit: Price,
    pub pe_symbol: String,
    pub pe_token: String,
    pub pe_entry_price: Price,
    pub pe_entry_limit: Price,
    /// Contracts per lot.
    pub lot_size: u32,
}

/// One side of the plan, flattened for order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLegSpec<'a> {
    pub kind: OptionKind,
    pub symbol: &'a str,
    pub token: &'a str,
    pub trigger_price: Price,
    pub limit_price: Price,
}

impl EntryPlan {
    /// View one side of the plan.
    pub fn leg(&self, kind: OptionKind) -> EntryLegSpec<'_> {
        match kind {
            OptionKind::Call => EntryLegSpec {
                kind,
                symbol: &self.ce_symbol,
                token: &self.ce_token,
                trigger_price: self.ce_entry_price,
                limit_price: self.ce_entry_limit,
            },
            OptionKind::Put => EntryLegSpec {
                kind,
                symbol: &self.pe_symbol,
                token: &self.pe_token,
                trigger_price: self.pe_entry_price,
                limit_price: self.pe_entry_limit,
            },
        }
    }

    /// Total contracts for `lots` lots.
    pub fn total_quantity(&self, lots: u32) -> Quantity {
        Quantity::from_lots(lots, self.lot_size)
    }

    /// Reject plans that could never place a sane order.
    pub fn validate(&self) -> Result<()> {
        if self.lot_size == 0 {
            return Err(CoreError::InvalidPlan("lot_size must be positive".into()));
        }
        for kind in [OptionKind::Call, OptionKind::Put] {
            let leg = self.leg(kind);
            if leg.symbol.is_empty() || leg.token.is_empty() {
                return Err(CoreError::InvalidPlan(format!("{kind} symbol/token missing")));
            }
            if !leg.trigger_price.is_positive() || !leg.limit_price.is_positive() {
                return Err(CoreError::InvalidPrice(format!(
                    "{kind} entry prices must be positive (trigger={}, limit={})",
                    leg.trigger_price, leg.limit_price
                )));
            }
        }
        Ok(())
    }
}

/// Both entry rules as placed at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLegs {
    pub ce: OrderLeg,
    pub pe: OrderLeg,
}

impl EntryLegs {
    pub fn get(&self, kind: OptionKind) -> &OrderLeg {
        match kind {
            OptionKind::Call => &self.ce,
            OptionKind::Put => &self.pe,
        }
    }

    /// The leg that did not fill.
    pub fn sibling_of(&self, kind: OptionKind) -> &OrderLeg {
        match kind {
            OptionKind::Call => &self.pe,
            OptionKind::Put => &self.ce,
        }
    }
}

/// The single entry leg that filled in this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstFill {
    pub order_name: LegName,
    pub symbol: String,
    pub token: String,
    /// Average executed price; every exit and trailing level is derived from it.
    pub entered_price: Price,
}

impl FirstFill {
    /// `entered_price * multiplier`, unrounded.
    pub fn level(&self, multiplier: Decimal) -> Price {
        self.entered_price * multiplier
    }
}
