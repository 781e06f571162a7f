//! Core domain types for the straddle order-lifecycle engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Quantity`: Precision-safe numeric types and tick rounding
//! - `OrderLeg`, `LegName`, `LegStatus`, `RuleId`: Conditional order legs
//! - `EntryPlan`, `EntryLegs`, `FirstFill`: Entry side of a cycle
//! - `ExitPricing`, `QuantitySplit`, `ExitLegSet`: Target/stop-loss exit set
//! - `market_time`: Cutoff and trading-day helpers in the market's timezone

pub mod decimal;
pub mod error;
pub mod exit;
pub mod market_time;
pub mod order;
pub mod plan;

pub use decimal::{round_to_0_05, round_to_cent, Price, Quantity};
pub use error::{CoreError, Result};
pub use exit::{
    stop_limit_for, ExitLegSet, ExitParams, ExitPricing, QuantitySplit, STOP_LIMIT_FACTOR,
};
pub use market_time::{parse_hhmm, MarketTime, IST_OFFSET_MINUTES, ORDER_BOOK_DATE_FORMAT};
pub use order::{is_executed, is_live, LegName, LegStatus, OrderLeg, OrderSide, RuleId};
pub use plan::{EntryLegSpec, EntryLegs, EntryPlan, FirstFill, OptionKind};
