//! Trailing controller: ratchets SL-2 and SL-3 up as the price clears
//! stepped thresholds.
//!
//! Two thresholds, expressed as multiples of the entered price, advance
//! independently: `step1` (SL-2 ladder, +0.10 per raise) and `step2`
//! (SL-3 ladder, +0.20 per raise). A raised trigger sits one increment below
//! the threshold that was crossed, rounded to 0.01. The controller only
//! modifies the two existing legs; it never creates orders.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use straddle_core::{
    is_executed, is_live, stop_limit_for, ExitLegSet, FirstFill, LegName, OrderLeg,
    Price, Quantity,
};
use straddle_gateway::{DynGateway, ModifyRequest};
use straddle_telemetry::Metrics;
use tracing::{debug, info};

use crate::error::LifecycleResult;

/// Threshold ladder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingParams {
    /// First SL-2 threshold, as a multiple of the entered price.
    #[serde(default = "default_step1")]
    pub step1: Decimal,
    /// First SL-3 threshold.
    #[serde(default = "default_step2")]
    pub step2: Decimal,
    #[serde(default = "default_step1_increment")]
    pub step1_increment: Decimal,
    #[serde(default = "default_step2_increment")]
    pub step2_increment: Decimal,
}

fn default_step1() -> Decimal {
    dec!(1.15)
}

fn default_step2() -> Decimal {
    dec!(1.35)
}

fn default_step1_increment() -> Decimal {
    dec!(0.10)
}

fn default_step2_increment() -> Decimal {
    dec!(0.20)
}

impl Default for TrailingParams {
    fn default() -> Self {
        Self {
            step1: default_step1(),
            step2: default_step2(),
            step1_increment: default_step1_increment(),
            step2_increment: default_step2_increment(),
        }
    }
}

/// Ladder position of a trailing session; persisted with the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingThresholds {
    pub step1: Decimal,
    pub step2: Decimal,
    pub step1_increment: Decimal,
    pub step2_increment: Decimal,
    /// Last trigger set on SL-2 (starts at the entered price).
    pub sl2_baseline: Price,
    /// Last trigger set on SL-3.
    pub sl3_baseline: Price,
    /// SL-2 left the book; no longer polled.
    pub sl2_executed: bool,
    pub sl3_executed: bool,
}

impl TrailingThresholds {
    pub fn new(params: &TrailingParams, entered_price: Price) -> Self {
        Self {
            step1: params.step1,
            step2: params.step2,
            step1_increment: params.step1_increment,
            step2_increment: params.step2_increment,
            sl2_baseline: entered_price,
            sl3_baseline: entered_price,
            sl2_executed: false,
            sl3_executed: false,
        }
    }

    /// New SL-2 trigger after crossing `step1`.
    pub fn sl2_target(&self, entered_price: Price) -> Price {
        (entered_price * (self.step1 - self.step1_increment)).round_to_cent()
    }

    /// New SL-3 trigger after crossing `step2`.
    pub fn sl3_target(&self, entered_price: Price) -> Price {
        (entered_price * (self.step2 - self.step2_increment)).round_to_cent()
    }

    /// Record an SL-2 raise to `to` and move to the next SL-2 threshold.
    pub fn advance_sl2(&mut self, to: Price) {
        self.sl2_baseline = to;
        self.step1 += self.step1_increment;
    }

    /// Record an SL-3 raise to `to` and move to the next SL-3 threshold.
    pub fn advance_sl3(&mut self, to: Price) {
        self.sl3_baseline = to;
        self.step2 += self.step2_increment;
    }
}

/// What one evaluation of the ladder calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailDecision {
    Hold,
    RaiseBoth,
    RaiseSl2,
    RaiseSl3,
    Complete,
}

/// Pick the action for `ltp` given which stop-losses are still live.
///
/// Rules in priority order; a rule whose price condition holds but has no
/// live leg to act on falls through to the next.
/// 1. `step1 == step2` and price ≥ e·step1: raise both legs, or SL-3 alone
///    if SL-2 is gone, or complete if neither is live.
/// 2. price ≥ e·step2, SL-2 not live, SL-3 live: raise SL-3.
/// 3. price ≥ e·step1, SL-2 live: raise SL-2.
/// 4. Neither leg live: complete.
///
/// With equal thresholds and only SL-2 live, rule 1 falls through to rule 3.
pub fn decide(
    th: &TrailingThresholds,
    entered_price: Price,
    ltp: Price,
    sl2_live: bool,
    sl3_live: bool,
) -> TrailDecision {
    let e = entered_price.inner();
    let ltp = ltp.inner();
    let crossed1 = ltp >= e * th.step1;
    let crossed2 = ltp >= e * th.step2;

    if th.step1 == th.step2 && crossed1 {
        match (sl2_live, sl3_live) {
            (true, true) => return TrailDecision::RaiseBoth,
            (false, true) => return TrailDecision::RaiseSl3,
            (false, false) => return TrailDecision::Complete,
            (true, false) => {}
        }
    }
    if crossed2 && !sl2_live && sl3_live {
        return TrailDecision::RaiseSl3;
    }
    if crossed1 && sl2_live {
        return TrailDecision::RaiseSl2;
    }
    if !sl2_live && !sl3_live {
        return TrailDecision::Complete;
    }
    TrailDecision::Hold
}

/// One trigger move made by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailRaise {
    pub order_name: LegName,
    pub from: Price,
    pub to: Price,
    pub limit: Price,
}

/// Result of one trailing poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailingOutcome {
    Pending,
    Raised(Vec<TrailRaise>),
    /// Both trailed legs have left the book.
    Completed,
}

pub struct TrailingController {
    gateway: DynGateway,
    exchange: String,
}

impl TrailingController {
    pub fn new(gateway: DynGateway, exchange: impl Into<String>) -> Self {
        Self {
            gateway,
            exchange: exchange.into(),
        }
    }

    /// Fetch price and SL-2/SL-3 status, then apply at most one ladder step.
    pub async fn poll(
        &self,
        fill: &FirstFill,
        legs: &mut ExitLegSet,
        th: &mut TrailingThresholds,
    ) -> LifecycleResult<TrailingOutcome> {
        let ltp = self
            .gateway
            .last_traded_price(&self.exchange, &fill.symbol, &fill.token)
            .await?;

        let sl2_qty = self.refresh(&mut legs.sl2, &mut th.sl2_executed).await?;
        let sl3_qty = self.refresh(&mut legs.sl3, &mut th.sl3_executed).await?;
        let sl2_live = !th.sl2_executed && is_live(legs.sl2.status);
        let sl3_live = !th.sl3_executed && is_live(legs.sl3.status);

        let e = fill.entered_price;
        let decision = decide(th, e, ltp, sl2_live, sl3_live);
        debug!(
            %ltp,
            step1 = %th.step1,
            step2 = %th.step2,
            sl2_status = ?legs.sl2.status,
            sl3_status = ?legs.sl3.status,
            ?decision,
            "Trailing tick"
        );

        let mut raises = Vec::new();
        match decision {
            TrailDecision::Hold => return Ok(TrailingOutcome::Pending),
            TrailDecision::Complete => {
                info!("Both trailed stop-losses have left the book");
                return Ok(TrailingOutcome::Completed);
            }
            TrailDecision::RaiseSl2 => {
                let sl2 = self.modify(&mut legs.sl2, th.sl2_target(e), sl2_qty).await?;
                th.advance_sl2(sl2.to);
                raises.push(sl2);
            }
            TrailDecision::RaiseSl3 => {
                let sl3 = self.modify(&mut legs.sl3, th.sl3_target(e), sl3_qty).await?;
                th.advance_sl3(sl3.to);
                raises.push(sl3);
            }
            TrailDecision::RaiseBoth => {
                // Thresholds move together only once both legs are modified,
                // so a failed SL-3 modify leaves step1 == step2 for the retry.
                let sl2 = self.modify(&mut legs.sl2, th.sl2_target(e), sl2_qty).await?;
                let sl3 = self.modify(&mut legs.sl3, th.sl3_target(e), sl3_qty).await?;
                th.advance_sl2(sl2.to);
                th.advance_sl3(sl3.to);
                raises.extend([sl2, sl3]);
            }
        }
        info!(
            raised = raises.len(),
            next_step1 = %th.step1,
            next_step2 = %th.step2,
            "Stop-losses trailed"
        );
        Ok(TrailingOutcome::Raised(raises))
    }

    /// Poll a leg unless it already executed; returns the broker quantity.
    async fn refresh(&self, leg: &mut OrderLeg, executed: &mut bool) -> LifecycleResult<Quantity> {
        if *executed {
            return Ok(leg.quantity);
        }
        let details = self.gateway.rule_status(&leg.rule_id).await?;
        leg.status = details.status;
        if is_executed(details.status) {
            info!(order_name = %leg.order_name, "Trailed stop-loss executed");
            *executed = true;
        }
        Ok(details.quantity)
    }

    async fn modify(&self, leg: &mut OrderLeg, trigger: Price, quantity: Quantity) -> LifecycleResult<TrailRaise> {
        let limit = stop_limit_for(trigger);
        self.gateway
            .modify_rule(&ModifyRequest {
                rule_id: leg.rule_id.clone(),
                token: leg.token.clone(),
                trigger_price: trigger,
                limit_price: limit,
                quantity,
            })
            .await?;
        let raise = TrailRaise {
            order_name: leg.order_name,
            from: leg.trigger_price,
            to: trigger,
            limit,
        };
        leg.rebase(trigger, limit, quantity);
        Metrics::stop_loss_trailed(leg.order_name.as_str());
        info!(order_name = %raise.order_name, from = %raise.from, to = %raise.to, "Stop-loss trailed");
        Ok(raise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ce_fill, placed_exit_legs};
    use std::sync::Arc;
    use straddle_core::LegStatus;
    use straddle_gateway::{GatewayCall, GatewayError, MockGateway};

    fn thresholds() -> TrailingThresholds {
        TrailingThresholds::new(&TrailingParams::default(), Price::new(dec!(100)))
    }

    fn p(d: Decimal) -> Price {
        Price::new(d)
    }

    // ------------------------------------------------------------------------
    // decide()
    // ------------------------------------------------------------------------

    #[test]
    fn test_decide_holds_below_step1() {
        assert_eq!(decide(&thresholds(), p(dec!(100)), p(dec!(114.99)), true, true), TrailDecision::Hold);
    }

    #[test]
    fn test_decide_raises_sl2_at_step1() {
        assert_eq!(decide(&thresholds(), p(dec!(100)), p(dec!(115)), true, true), TrailDecision::RaiseSl2);
    }

    #[test]
    fn test_decide_raises_sl3_when_sl2_gone() {
        let th = thresholds();
        assert_eq!(decide(&th, p(dec!(100)), p(dec!(135)), false, true), TrailDecision::RaiseSl3);
        // Between step1 and step2 with SL-2 gone: nothing to do.
        assert_eq!(decide(&th, p(dec!(100)), p(dec!(120)), false, true), TrailDecision::Hold);
    }

    #[test]
    fn test_decide_step2_with_sl2_live_uses_sl2_rule() {
        assert_eq!(decide(&thresholds(), p(dec!(100)), p(dec!(140)), true, true), TrailDecision::RaiseSl2);
    }

    #[test]
    fn test_decide_equal_steps() {
        let mut th = thresholds();
        th.step1 = dec!(1.35);
        th.step2 = dec!(1.35);
        let e = p(dec!(100));
        assert_eq!(decide(&th, e, p(dec!(135)), true, true), TrailDecision::RaiseBoth);
        assert_eq!(decide(&th, e, p(dec!(135)), false, true), TrailDecision::RaiseSl3);
        assert_eq!(decide(&th, e, p(dec!(135)), true, false), TrailDecision::RaiseSl2);
        assert_eq!(decide(&th, e, p(dec!(135)), false, false), TrailDecision::Complete);
        assert_eq!(decide(&th, e, p(dec!(134)), true, true), TrailDecision::Hold);
    }

    #[test]
    fn test_decide_completes_even_above_thresholds() {
        assert_eq!(decide(&thresholds(), p(dec!(100)), p(dec!(200)), false, false), TrailDecision::Complete);
        assert_eq!(decide(&thresholds(), p(dec!(100)), p(dec!(90)), false, false), TrailDecision::Complete);
    }

    #[test]
    fn test_raised_trigger_rounds_to_cent() {
        let th = TrailingThresholds::new(&TrailingParams::default(), p(dec!(37.35)));
        // 37.35 * 1.05 = 39.2175 -> 39.22
        assert_eq!(th.sl2_target(p(dec!(37.35))), p(dec!(39.22)));
        // 37.35 * 1.15 = 42.9525 -> 42.95
        assert_eq!(th.sl3_target(p(dec!(37.35))), p(dec!(42.95)));
    }

    // ------------------------------------------------------------------------
    // poll()
    // ------------------------------------------------------------------------

    async fn setup() -> (Arc<MockGateway>, TrailingController, FirstFill, ExitLegSet) {
        let mock = Arc::new(MockGateway::new());
        let fill = ce_fill(dec!(100));
        let legs = placed_exit_legs(&mock, &fill).await;
        mock.set_rule_status(&legs.target.rule_id, None);
        mock.set_rule_status(&legs.sl1.rule_id, Some(LegStatus::Cancelled));
        (mock.clone(), TrailingController::new(mock, "NFO"), fill, legs)
    }

    #[tokio::test]
    async fn test_poll_raises_sl2_and_advances_step1() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(116)));
        let mut th = thresholds();

        let outcome = ctl.poll(&fill, &mut legs, &mut th).await.unwrap();
        let TrailingOutcome::Raised(raises) = outcome else {
            panic!("expected raise");
        };
        assert_eq!(raises.len(), 1);
        assert_eq!(raises[0].order_name, LegName::StopLoss2);
        assert_eq!(raises[0].to, p(dec!(105)));
        // 105 * 0.995 = 104.475 -> 104.50 (tie to even tick)
        assert_eq!(raises[0].limit, p(dec!(104.5)));
        assert_eq!(th.step1, dec!(1.25));
        assert_eq!(th.step2, dec!(1.35));
        assert_eq!(mock.rule(&legs.sl2.rule_id).unwrap().request.trigger_price, p(dec!(105)));

        // Same price again: step1 is now 1.25, nothing to do.
        assert_eq!(ctl.poll(&fill, &mut legs, &mut th).await.unwrap(), TrailingOutcome::Pending);
    }

    #[tokio::test]
    async fn test_poll_equal_steps_raise_both_then_diverge() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(115)));
        let params = TrailingParams {
            step1: dec!(1.15),
            step2: dec!(1.15),
            ..TrailingParams::default()
        };
        let mut th = TrailingThresholds::new(&params, fill.entered_price);

        let outcome = ctl.poll(&fill, &mut legs, &mut th).await.unwrap();
        let TrailingOutcome::Raised(raises) = outcome else {
            panic!("expected raise");
        };
        assert_eq!(raises.len(), 2);
        assert_eq!(legs.sl2.trigger_price, p(dec!(105)));
        assert_eq!(legs.sl3.trigger_price, p(dec!(95)));
        assert_eq!(th.step1, dec!(1.25));
        assert_eq!(th.step2, dec!(1.35));
        assert_ne!(th.step1, th.step2);
    }

    #[tokio::test]
    async fn test_poll_completes_when_both_executed() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(101)));
        mock.set_rule_status(&legs.sl2.rule_id, None);
        mock.set_rule_status(&legs.sl3.rule_id, Some(LegStatus::SentToExchange));
        let mut th = thresholds();

        assert_eq!(ctl.poll(&fill, &mut legs, &mut th).await.unwrap(), TrailingOutcome::Completed);
        assert!(th.sl2_executed && th.sl3_executed);
        assert_eq!(mock.count_calls(|c| matches!(c, GatewayCall::Modify(_))), 0);
    }

    #[tokio::test]
    async fn test_executed_leg_no_longer_polled() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(101)));
        mock.set_rule_status(&legs.sl2.rule_id, None);
        let mut th = thresholds();
        ctl.poll(&fill, &mut legs, &mut th).await.unwrap();

        mock.clear_calls();
        ctl.poll(&fill, &mut legs, &mut th).await.unwrap();
        assert_eq!(
            mock.count_calls(|c| matches!(c, GatewayCall::Status(id) if *id == legs.sl2.rule_id)),
            0
        );
        assert_eq!(
            mock.count_calls(|c| matches!(c, GatewayCall::Status(id) if *id == legs.sl3.rule_id)),
            1
        );
    }

    #[tokio::test]
    async fn test_modify_failure_leaves_threshold() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(120)));
        mock.fail_next_modify(GatewayError::Modify("rejected".into()));
        let mut th = thresholds();

        assert!(ctl.poll(&fill, &mut legs, &mut th).await.is_err());
        assert_eq!(th.step1, dec!(1.15));
        assert_eq!(legs.sl2.trigger_price, p(dec!(95)));
    }

    fn equal_steps(step: Decimal) -> TrailingThresholds {
        let params = TrailingParams {
            step1: step,
            step2: step,
            ..TrailingParams::default()
        };
        TrailingThresholds::new(&params, p(dec!(100)))
    }

    #[tokio::test]
    async fn test_raise_both_sl3_failure_keeps_steps_equal() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(135)));
        mock.fail_next_modify_of(&legs.sl3.rule_id, GatewayError::Modify("rejected".into()));
        let mut th = equal_steps(dec!(1.35));

        assert!(ctl.poll(&fill, &mut legs, &mut th).await.is_err());
        assert_eq!(th.step1, dec!(1.35));
        assert_eq!(th.step2, dec!(1.35));
        assert_eq!(legs.sl3.trigger_price, p(dec!(95)));

        // Next tick retries both legs at the same thresholds.
        let TrailingOutcome::Raised(raises) = ctl.poll(&fill, &mut legs, &mut th).await.unwrap() else {
            panic!("expected raise");
        };
        assert_eq!(raises.len(), 2);
        assert_eq!(mock.rule(&legs.sl2.rule_id).unwrap().request.trigger_price, p(dec!(125)));
        assert_eq!(mock.rule(&legs.sl3.rule_id).unwrap().request.trigger_price, p(dec!(115)));
        assert_eq!(th.step1, dec!(1.45));
        assert_eq!(th.step2, dec!(1.55));
        assert_eq!(th.sl3_baseline, p(dec!(115)));

        // Ladders have diverged; 145 only moves SL-2.
        mock.set_ltp(&fill.token, p(dec!(145)));
        let TrailingOutcome::Raised(raises) = ctl.poll(&fill, &mut legs, &mut th).await.unwrap() else {
            panic!("expected raise");
        };
        assert_eq!(raises.len(), 1);
        assert_eq!(raises[0].order_name, LegName::StopLoss2);
        assert_eq!(legs.sl2.trigger_price, p(dec!(135)));
        assert_eq!(legs.sl3.trigger_price, p(dec!(115)));
    }

    #[tokio::test]
    async fn test_equal_steps_only_sl3_live_raises_sl3() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(135)));
        mock.set_rule_status(&legs.sl2.rule_id, None);
        let mut th = equal_steps(dec!(1.35));

        let TrailingOutcome::Raised(raises) = ctl.poll(&fill, &mut legs, &mut th).await.unwrap() else {
            panic!("expected raise");
        };
        assert_eq!(raises.len(), 1);
        assert_eq!(raises[0].order_name, LegName::StopLoss3);
        assert_eq!(raises[0].to, p(dec!(115)));
        assert_eq!(th.step1, dec!(1.35));
        assert_eq!(th.step2, dec!(1.55));
        assert_eq!(
            mock.count_calls(|c| matches!(c, GatewayCall::Modify(m) if m.rule_id == legs.sl2.rule_id)),
            0
        );
    }

    #[tokio::test]
    async fn test_equal_steps_only_sl2_live_falls_through_to_sl2() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(135)));
        mock.set_rule_status(&legs.sl3.rule_id, Some(LegStatus::SentToExchange));
        let mut th = equal_steps(dec!(1.35));

        let TrailingOutcome::Raised(raises) = ctl.poll(&fill, &mut legs, &mut th).await.unwrap() else {
            panic!("expected raise");
        };
        assert_eq!(raises.len(), 1);
        assert_eq!(raises[0].order_name, LegName::StopLoss2);
        assert_eq!(raises[0].to, p(dec!(125)));
        assert_eq!(th.step1, dec!(1.45));
        assert_eq!(th.step2, dec!(1.35));
    }

    #[tokio::test]
    async fn test_both_gone_above_step2_completes() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.set_ltp(&fill.token, p(dec!(150)));
        mock.set_rule_status(&legs.sl2.rule_id, None);
        mock.set_rule_status(&legs.sl3.rule_id, None);
        let mut th = thresholds();

        assert_eq!(ctl.poll(&fill, &mut legs, &mut th).await.unwrap(), TrailingOutcome::Completed);
    }

    #[tokio::test]
    async fn test_quote_failure_is_skippable() {
        let (mock, ctl, fill, mut legs) = setup().await;
        mock.fail_next_ltp(GatewayError::Quote("no ltp".into()));
        let mut th = thresholds();
        assert!(ctl.poll(&fill, &mut legs, &mut th).await.unwrap_err().is_skippable());
    }
}
