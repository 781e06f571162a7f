//! Exit side of a cycle: target/stop-loss pricing, the 40/40/20 quantity
//! split and the four-leg exit set.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Price, Quantity};
use crate::error::{CoreError, Result};
use crate::order::{LegName, OrderLeg};

/// Limit = trigger × this factor (rounded to tick) whenever a stop-loss
/// trigger is moved.
pub const STOP_LIMIT_FACTOR: Decimal = dec!(0.995);

/// Multipliers applied to the entered price when building the exit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitParams {
    /// Target trigger = entered × this. Default 1.05.
    pub target_trigger_mult: Decimal,
    /// Target limit = target trigger × this. Default 0.99.
    pub target_limit_mult: Decimal,
    /// Stop-loss trigger = entered × this. Default 0.95.
    pub sl_trigger_mult: Decimal,
    /// Stop-loss limit = entered × this. Default 0.942.
    pub sl_limit_mult: Decimal,
}

impl Default for ExitParams {
    fn default() -> Self {
        Self {
            target_trigger_mult: dec!(1.05),
            target_limit_mult: dec!(0.99),
            sl_trigger_mult: dec!(0.95),
            sl_limit_mult: dec!(0.942),
        }
    }
}

/// Tick-rounded prices of the exit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitPricing {
    pub target_trigger: Price,
    pub target_limit: Price,
    pub sl_trigger: Price,
    pub sl_limit: Price,
}

impl ExitPricing {
    pub fn from_entry(entered_price: Price, params: &ExitParams) -> Self {
        let target_trigger = entered_price.scaled_to_tick(params.target_trigger_mult);
        Self {
            target_trigger,
            target_limit: target_trigger.scaled_to_tick(params.target_limit_mult),
            sl_trigger: entered_price.scaled_to_tick(params.sl_trigger_mult),
            sl_limit: entered_price.scaled_to_tick(params.sl_limit_mult),
        }
    }
}

/// Stop-loss limit that accompanies a moved trigger.
pub fn stop_limit_for(trigger: Price) -> Price {
    trigger.scaled_to_tick(STOP_LIMIT_FACTOR)
}

/// 40/40/20 split of the filled quantity.
///
/// Each slice is floored independently, so the slices may sum to less than
/// the total. The remainder is left unhedged on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantitySplit {
    pub first: Quantity,
    pub second: Quantity,
    pub third: Quantity,
}

impl QuantitySplit {
    pub fn new(lots: u32, lot_size: u32) -> Self {
        let total = Quantity::from_lots(lots, lot_size);
        Self {
            first: total.floor_percent(40),
            second: total.floor_percent(40),
            third: total.floor_percent(20),
        }
    }

    pub fn total(&self) -> Quantity {
        self.first + self.second + self.third
    }
}

/// The four exit rules of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitLegSet {
    pub target: OrderLeg,
    pub sl1: OrderLeg,
    pub sl2: OrderLeg,
    pub sl3: OrderLeg,
}

impl ExitLegSet {
    /// Build from legs in placement order (target, SL-1, SL-2, SL-3).
    pub fn from_placed(legs: Vec<OrderLeg>) -> Result<Self> {
        let [target, sl1, sl2, sl3]: [OrderLeg; 4] = legs
            .try_into()
            .map_err(|v: Vec<OrderLeg>| CoreError::InvalidLegSet(format!("expected 4 legs, got {}", v.len())))?;

        let expected = [LegName::Target, LegName::StopLoss1, LegName::StopLoss2, LegName::StopLoss3];
        for (leg, name) in [&target, &sl1, &sl2, &sl3].into_iter().zip(expected) {
            if leg.order_name != name {
                return Err(CoreError::InvalidLegSet(format!(
                    "expected {name} at this position, got {}",
                    leg.order_name
                )));
            }
        }
        Ok(Self { target, sl1, sl2, sl3 })
    }

    pub fn legs(&self) -> [&OrderLeg; 4] {
        [&self.target, &self.sl1, &self.sl2, &self.sl3]
    }
}
