//! Stop-loss monitor: decides whether the target or SL-1 executes first.
//!
//! - Target executed: cancel SL-1, move SL-2/SL-3 to break-even
//!   (trigger = entered price), report `Progressed`.
//! - SL-1 executed: cancel the target, report `Aborted`.
//!
//! The target is checked before SL-1 on every tick, and once an outcome has
//! been reported both trackers are off, so a session yields one outcome.

use serde::{Deserialize, Serialize};
use straddle_core::{is_executed, is_live, stop_limit_for, ExitLegSet, FirstFill, LegStatus, OrderLeg};
use straddle_gateway::{DynGateway, GatewayError, ModifyRequest};
use straddle_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::error::LifecycleResult;

/// Which legs are still being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorTracking {
    pub target: bool,
    pub sl1: bool,
}

impl Default for MonitorTracking {
    fn default() -> Self {
        Self { target: true, sl1: true }
    }
}

impl MonitorTracking {
    fn stop(&mut self) {
        self.target = false;
        self.sl1 = false;
    }

    pub fn is_done(&self) -> bool {
        !self.target && !self.sl1
    }
}

/// Result of one monitor poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Neither leg executed yet.
    Pending,
    /// Target executed; stop-losses are at break-even.
    Progressed,
    /// SL-1 executed before the target.
    Aborted,
}

pub struct StopLossMonitor {
    gateway: DynGateway,
}

impl StopLossMonitor {
    pub fn new(gateway: DynGateway) -> Self {
        Self { gateway }
    }

    /// Poll the target and SL-1 once.
    ///
    /// Gateway errors leave `tracking` untouched so the same step repeats on
    /// the next tick; work already done (SL-1 cancelled) is not repeated.
    pub async fn poll(
        &self,
        fill: &FirstFill,
        legs: &mut ExitLegSet,
        tracking: &mut MonitorTracking,
    ) -> LifecycleResult<MonitorOutcome> {
        if tracking.target {
            let target = self.gateway.rule_status(&legs.target.rule_id).await?;
            legs.target.status = target.status;
            debug!(status = ?target.status, rule_id = %legs.target.rule_id, "Target status");

            if is_executed(target.status) {
                info!(entered_price = %fill.entered_price, "Target executed, moving stop-losses to break-even");
                self.cancel_once(&mut legs.sl1).await?;
                self.rebase(&mut legs.sl2, fill).await?;
                self.rebase(&mut legs.sl3, fill).await?;
                tracking.stop();
                return Ok(MonitorOutcome::Progressed);
            }
        }

        if tracking.sl1 {
            let sl1 = self.gateway.rule_status(&legs.sl1.rule_id).await?;
            legs.sl1.status = sl1.status;
            debug!(status = ?sl1.status, rule_id = %legs.sl1.rule_id, "SL-1 status");

            if is_executed(sl1.status) {
                info!("SL-1 executed before target, cancelling target");
                self.cancel_once(&mut legs.target).await?;
                tracking.stop();
                return Ok(MonitorOutcome::Aborted);
            }
        }

        Ok(MonitorOutcome::Pending)
    }

    async fn cancel_once(&self, leg: &mut OrderLeg) -> LifecycleResult<()> {
        if leg.status == Some(LegStatus::Cancelled) {
            return Ok(());
        }
        match self.gateway.cancel_rule(&leg.rule_id, &leg.token).await {
            Ok(()) => {}
            Err(GatewayError::NotFound(_)) => {
                debug!(order_name = %leg.order_name, rule_id = %leg.rule_id, "Cancel: rule already gone");
            }
            Err(e) => return Err(e.into()),
        }
        leg.status = Some(LegStatus::Cancelled);
        Ok(())
    }

    /// Move a stop-loss trigger to the entered price, keeping the broker's
    /// quantity. Legs that already left the book are skipped.
    async fn rebase(&self, leg: &mut OrderLeg, fill: &FirstFill) -> LifecycleResult<()> {
        let trigger = fill.entered_price;
        if leg.trigger_price == trigger && is_live(leg.status) {
            return Ok(());
        }
        let details = self.gateway.rule_status(&leg.rule_id).await?;
        leg.status = details.status;
        if !is_live(details.status) {
            warn!(order_name = %leg.order_name, status = ?details.status, "Stop-loss not live, skipping break-even move");
            return Ok(());
        }
        let limit = stop_limit_for(trigger);
        self.gateway
            .modify_rule(&ModifyRequest {
                rule_id: leg.rule_id.clone(),
                token: leg.token.clone(),
                trigger_price: trigger,
                limit_price: limit,
                quantity: details.quantity,
            })
            .await?;
        info!(
            order_name = %leg.order_name,
            from = %leg.trigger_price,
            to = %trigger,
            %limit,
            quantity = %details.quantity,
            "Stop-loss moved to break-even"
        );
        Metrics::stop_loss_breakeven(leg.order_name.as_str());
        leg.rebase(trigger, limit, details.quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ce_fill, placed_exit_legs};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use straddle_core::Price;
    use straddle_gateway::{GatewayCall, MockGateway};

    async fn setup() -> (Arc<MockGateway>, StopLossMonitor, FirstFill, ExitLegSet) {
        let mock = Arc::new(MockGateway::new());
        let fill = ce_fill(dec!(100));
        let legs = placed_exit_legs(&mock, &fill).await;
        (mock.clone(), StopLossMonitor::new(mock), fill, legs)
    }

    #[tokio::test]
    async fn test_pending_while_both_resting() {
        let (_mock, mon, fill, mut legs) = setup().await;
        let mut tracking = MonitorTracking::default();
        assert_eq!(mon.poll(&fill, &mut legs, &mut tracking).await.unwrap(), MonitorOutcome::Pending);
        assert!(!tracking.is_done());
    }

    #[tokio::test]
    async fn test_target_executed_progresses() {
        let (mock, mon, fill, mut legs) = setup().await;
        mock.set_rule_status(&legs.target.rule_id, None);
        let mut tracking = MonitorTracking::default();

        let outcome = mon.poll(&fill, &mut legs, &mut tracking).await.unwrap();
        assert_eq!(outcome, MonitorOutcome::Progressed);
        assert!(tracking.is_done());

        assert_eq!(mock.rule(&legs.sl1.rule_id).unwrap().status, Some(LegStatus::Cancelled));
        for leg in [&legs.sl2, &legs.sl3] {
            let remote = mock.rule(&leg.rule_id).unwrap();
            assert_eq!(remote.request.trigger_price, Price::new(dec!(100)));
            assert_eq!(remote.request.limit_price, Price::new(dec!(99.5)));
            assert_eq!(leg.trigger_price, Price::new(dec!(100)));
        }
        // Quantities preserved.
        assert_eq!(mock.rule(&legs.sl3.rule_id).unwrap().request.quantity, legs.sl3.quantity);
    }

    #[tokio::test]
    async fn test_sent_to_exchange_counts_as_executed() {
        let (mock, mon, fill, mut legs) = setup().await;
        mock.set_rule_status(&legs.target.rule_id, Some(LegStatus::SentToExchange));
        let mut tracking = MonitorTracking::default();
        assert_eq!(mon.poll(&fill, &mut legs, &mut tracking).await.unwrap(), MonitorOutcome::Progressed);
    }

    #[tokio::test]
    async fn test_sl1_executed_aborts() {
        let (mock, mon, fill, mut legs) = setup().await;
        mock.set_rule_status(&legs.sl1.rule_id, None);
        let mut tracking = MonitorTracking::default();

        assert_eq!(mon.poll(&fill, &mut legs, &mut tracking).await.unwrap(), MonitorOutcome::Aborted);
        assert_eq!(mock.rule(&legs.target.rule_id).unwrap().status, Some(LegStatus::Cancelled));
        assert_eq!(mock.count_calls(|c| matches!(c, GatewayCall::Modify(_))), 0);
    }

    #[tokio::test]
    async fn test_target_wins_when_both_executed() {
        let (mock, mon, fill, mut legs) = setup().await;
        mock.set_rule_status(&legs.target.rule_id, None);
        mock.set_rule_status(&legs.sl1.rule_id, None);
        let mut tracking = MonitorTracking::default();
        assert_eq!(mon.poll(&fill, &mut legs, &mut tracking).await.unwrap(), MonitorOutcome::Progressed);
        // A second poll after the outcome does nothing.
        mock.clear_calls();
        assert_eq!(mon.poll(&fill, &mut legs, &mut tracking).await.unwrap(), MonitorOutcome::Pending);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_keeps_tracking() {
        let (mock, mon, fill, mut legs) = setup().await;
        mock.fail_next_status(GatewayError::Lookup("timeout".into()));
        let mut tracking = MonitorTracking::default();
        assert!(mon.poll(&fill, &mut legs, &mut tracking).await.unwrap_err().is_skippable());
        assert_eq!(tracking, MonitorTracking::default());
    }

    #[tokio::test]
    async fn test_modify_failure_retries_without_second_cancel() {
        let (mock, mon, fill, mut legs) = setup().await;
        mock.set_rule_status(&legs.target.rule_id, None);
        mock.fail_next_modify(GatewayError::Modify("busy".into()));
        let mut tracking = MonitorTracking::default();

        assert!(mon.poll(&fill, &mut legs, &mut tracking).await.is_err());
        assert!(tracking.target);

        assert_eq!(mon.poll(&fill, &mut legs, &mut tracking).await.unwrap(), MonitorOutcome::Progressed);
        assert_eq!(mock.count_calls(|c| matches!(c, GatewayCall::Cancel(_))), 1);
        assert_eq!(mock.rule(&legs.sl2.rule_id).unwrap().request.trigger_price, Price::new(dec!(100)));
    }
}
