//! Entry leg controller: places the CE/PE BUY rules of a cycle.
//!
//! Both legs go in or neither does. If the second creation fails the first
//! leg is cancelled before the failure is reported.

use straddle_core::{EntryLegs, EntryPlan, OptionKind, OrderLeg, OrderSide, Price, Quantity};
use straddle_gateway::{DynGateway, GatewayError, RuleRequest};
use straddle_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, LifecycleResult};

/// Why entry was not attempted this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferReason {
    /// A leg's live price is above its entry limit.
    PriceAboveLimit {
        kind: OptionKind,
        ltp: Price,
        limit: Price,
    },
    /// A live price could not be fetched.
    QuoteUnavailable { kind: OptionKind, error: GatewayError },
}

/// Result of one entry attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Both BUY rules are resting at the broker.
    Placed(EntryLegs),
    /// Nothing placed; retry next tick.
    Deferred(DeferReason),
}

/// Places the two entry legs of a straddle.
pub struct EntryController {
    gateway: DynGateway,
    exchange: String,
}

impl EntryController {
    pub fn new(gateway: DynGateway, exchange: impl Into<String>) -> Self {
        Self {
            gateway,
            exchange: exchange.into(),
        }
    }

    /// Check preconditions, fetch both prices and place both BUY rules.
    ///
    /// `lots` is the number of lots per leg.
    pub async fn place(&self, plan: &EntryPlan, lots: u32) -> LifecycleResult<EntryOutcome> {
        let pending = self.gateway.pending_order_counts().await?;
        if pending.conditional == 2 {
            return Err(LifecycleError::ManualRemediation {
                plain: pending.plain,
                conditional: pending.conditional,
            });
        }
        if !pending.is_clear() {
            return Err(LifecycleError::Precondition {
                plain: pending.plain,
                conditional: pending.conditional,
            });
        }

        for kind in [OptionKind::Call, OptionKind::Put] {
            let leg = plan.leg(kind);
            let ltp = match self
                .gateway
                .last_traded_price(&self.exchange, leg.symbol, leg.token)
                .await
            {
                Ok(ltp) => ltp,
                Err(e) if e.is_rate_limited() => return Err(e.into()),
                Err(error) => {
                    warn!(%kind, symbol = leg.symbol, %error, "Live price unavailable, deferring entry");
                    return Ok(EntryOutcome::Deferred(DeferReason::QuoteUnavailable { kind, error }));
                }
            };
            if ltp > leg.limit_price {
                debug!(%kind, %ltp, limit = %leg.limit_price, "Live price above entry limit");
                return Ok(EntryOutcome::Deferred(DeferReason::PriceAboveLimit {
                    kind,
                    ltp,
                    limit: leg.limit_price,
                }));
            }
        }

        let quantity = plan.total_quantity(lots);
        let ce = self
            .create_leg(plan, OptionKind::Call, quantity)
            .await
            .map_err(|source| {
                warn!(error = %source, "CE entry creation failed, nothing placed");
                LifecycleError::Creation {
                    order_name: OptionKind::Call.entry_leg_name(),
                    source,
                    compensated: 0,
                }
            })?;

        let pe = match self.create_leg(plan, OptionKind::Put, quantity).await {
            Ok(pe) => pe,
            Err(source) => {
                warn!(
                    rule_id = %ce.rule_id,
                    error = %source,
                    "PE entry creation failed, cancelling CE entry"
                );
                Metrics::compensating_cancel("entry");
                match self.gateway.cancel_rule(&ce.rule_id, &ce.token).await {
                    Ok(()) | Err(GatewayError::NotFound(_)) => {}
                    Err(cancel_err) => {
                        warn!(rule_id = %ce.rule_id, error = %cancel_err, "Compensating cancel of CE entry failed");
                    }
                }
                return Err(LifecycleError::Creation {
                    order_name: OptionKind::Put.entry_leg_name(),
                    source,
                    compensated: 1,
                });
            }
        };

        info!(
            ce_rule_id = %ce.rule_id,
            pe_rule_id = %pe.rule_id,
            %quantity,
            "Entry legs placed"
        );
        Ok(EntryOutcome::Placed(EntryLegs { ce, pe }))
    }

    async fn create_leg(
        &self,
        plan: &EntryPlan,
        kind: OptionKind,
        quantity: Quantity,
    ) -> Result<OrderLeg, GatewayError> {
        let spec = plan.leg(kind);
        let request = RuleRequest {
            order_name: kind.entry_leg_name(),
            symbol: spec.symbol.to_string(),
            token: spec.token.to_string(),
            trigger_price: spec.trigger_price,
            limit_price: spec.limit_price,
            side: OrderSide::Buy,
            quantity,
        };
        let rule_id = self.gateway.create_rule(&request).await?;
        Metrics::leg_placed(request.order_name.as_str());
        Ok(OrderLeg::new(
            request.order_name,
            request.symbol,
            request.token,
            rule_id,
            request.trigger_price,
            request.limit_price,
            OrderSide::Buy,
            quantity,
        ))
    }
}
