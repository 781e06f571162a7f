//! Exit leg controller: places the target and the three stop-loss slices.
//!
//! All-or-nothing: if any creation fails, every leg already created in this
//! set is cancelled in reverse order before the failure is reported.

use straddle_core::{
    ExitLegSet, ExitParams, ExitPricing, FirstFill, LegName, OrderLeg, OrderSide, Price, Quantity,
    QuantitySplit,
};
use straddle_gateway::{DynGateway, GatewayError, RuleRequest};
use straddle_telemetry::Metrics;
use tracing::{info, warn};

use crate::error::{LifecycleError, LifecycleResult};

pub struct ExitController {
    gateway: DynGateway,
    params: ExitParams,
}

impl ExitController {
    pub fn new(gateway: DynGateway, params: ExitParams) -> Self {
        Self { gateway, params }
    }

    /// Place target, SL-1, SL-2 and SL-3 (in that order) for `fill`.
    pub async fn place(&self, fill: &FirstFill, lots: u32, lot_size: u32) -> LifecycleResult<ExitLegSet> {
        let pricing = ExitPricing::from_entry(fill.entered_price, &self.params);
        let split = QuantitySplit::new(lots, lot_size);

        let plan: [(LegName, Price, Price, Quantity); 4] = [
            (LegName::Target, pricing.target_trigger, pricing.target_limit, split.first),
            (LegName::StopLoss1, pricing.sl_trigger, pricing.sl_limit, split.first),
            (LegName::StopLoss2, pricing.sl_trigger, pricing.sl_limit, split.second),
            (LegName::StopLoss3, pricing.sl_trigger, pricing.sl_limit, split.third),
        ];

        let mut placed: Vec<OrderLeg> = Vec::with_capacity(plan.len());
        for (order_name, trigger_price, limit_price, quantity) in plan {
            let request = RuleRequest {
                order_name,
                symbol: fill.symbol.clone(),
                token: fill.token.clone(),
                trigger_price,
                limit_price,
                side: OrderSide::Sell,
                quantity,
            };
            match self.gateway.create_rule(&request).await {
                Ok(rule_id) => {
                    Metrics::leg_placed(order_name.as_str());
                    placed.push(OrderLeg::new(
                        order_name,
                        request.symbol,
                        request.token,
                        rule_id,
                        trigger_price,
                        limit_price,
                        OrderSide::Sell,
                        quantity,
                    ));
                }
                Err(source) => {
                    warn!(%order_name, error = %source, created = placed.len(), "Exit leg creation failed, rolling back");
                    let compensated = self.roll_back(&placed).await;
                    return Err(LifecycleError::Creation {
                        order_name,
                        source,
                        compensated,
                    });
                }
            }
        }

        let set = ExitLegSet::from_placed(placed)?;
        info!(
            entered_price = %fill.entered_price,
            target_trigger = %pricing.target_trigger,
            target_limit = %pricing.target_limit,
            sl_trigger = %pricing.sl_trigger,
            sl_limit = %pricing.sl_limit,
            qty1 = %split.first,
            qty2 = %split.second,
            qty3 = %split.third,
            "Exit legs placed"
        );
        Ok(set)
    }

    /// Cancel `placed` newest-first; returns how many cancels were issued.
    async fn roll_back(&self, placed: &[OrderLeg]) -> usize {
        for leg in placed.iter().rev() {
            Metrics::compensating_cancel("exit");
            match self.gateway.cancel_rule(&leg.rule_id, &leg.token).await {
                Ok(()) | Err(GatewayError::NotFound(_)) => {}
                Err(error) => {
                    warn!(order_name = %leg.order_name, rule_id = %leg.rule_id, %error, "Compensating cancel failed");
                }
            }
        }
        placed.len()
    }
}
