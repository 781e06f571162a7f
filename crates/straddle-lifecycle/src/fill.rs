//! Fill detector: finds which entry leg filled and cancels the other.
//!
//! The order book is scanned in the order the broker returns it. The first
//! entry that belongs to today, matches one of the two legs' unique order
//! ids and carries a filled status wins; scanning stops there. If both legs
//! show as filled in the same book, the earlier row is taken and the later
//! one is left to the sibling cancel.

use chrono::{DateTime, Utc};
use straddle_core::{EntryLegs, FirstFill, MarketTime, OptionKind};
use straddle_gateway::{DynGateway, GatewayError, OrderBookEntry};
use straddle_telemetry::Metrics;
use tracing::{info, warn};

use crate::error::LifecycleResult;

/// Result of one fill check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    Filled {
        fill: FirstFill,
        /// Sibling cancel was acknowledged (or the rule was already gone).
        sibling_cancelled: bool,
    },
    Pending,
}

pub struct FillDetector {
    gateway: DynGateway,
    order_id_prefix: String,
    market_time: MarketTime,
}

impl FillDetector {
    pub fn new(gateway: DynGateway, order_id_prefix: impl Into<String>, market_time: MarketTime) -> Self {
        Self {
            gateway,
            order_id_prefix: order_id_prefix.into(),
            market_time,
        }
    }

    /// Scan today's order book for the first filled entry leg.
    pub async fn detect(&self, legs: &EntryLegs, now: DateTime<Utc>) -> LifecycleResult<FillOutcome> {
        let book = self.gateway.order_book().await?;
        let today = self.market_time.order_book_day(now);

        let Some((kind, row)) = self.first_fill(&book, legs, &today) else {
            return Ok(FillOutcome::Pending);
        };

        let filled = legs.get(kind);
        let sibling = legs.sibling_of(kind);
        let sibling_cancelled = match self.gateway.cancel_rule(&sibling.rule_id, &sibling.token).await {
            Ok(()) => true,
            Err(GatewayError::NotFound(_)) => true,
            Err(error) => {
                warn!(rule_id = %sibling.rule_id, %error, "Sibling cancel failed, continuing");
                false
            }
        };

        let fill = FirstFill {
            order_name: filled.order_name,
            symbol: row.symbol.clone(),
            token: row.token.clone(),
            entered_price: row.average_price,
        };
        info!(
            order_name = %fill.order_name,
            symbol = %fill.symbol,
            entered_price = %fill.entered_price,
            sibling = %sibling.order_name,
            sibling_cancelled,
            "Entry filled"
        );
        Metrics::fill_detected(fill.order_name.as_str());
        Ok(FillOutcome::Filled { fill, sibling_cancelled })
    }

    fn first_fill<'b>(
        &self,
        book: &'b [OrderBookEntry],
        legs: &EntryLegs,
        today: &str,
    ) -> Option<(OptionKind, &'b OrderBookEntry)> {
        let ce_id = legs.ce.rule_id.unique_order_id(&self.order_id_prefix);
        let pe_id = legs.pe.rule_id.unique_order_id(&self.order_id_prefix);

        book.iter()
            .filter(|row| row.update_time.starts_with(today) && row.is_filled())
            .find_map(|row| {
                if row.unique_order_id == ce_id {
                    Some((OptionKind::Call, row))
                } else if row.unique_order_id == pe_id {
                    Some((OptionKind::Put, row))
                } else {
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{now_ist_morning, placed_entry_legs, TODAY};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use straddle_core::{LegName, LegStatus, Price};
    use straddle_gateway::{GatewayCall, MockGateway, DEFAULT_ORDER_ID_PREFIX};

    async fn setup() -> (Arc<MockGateway>, FillDetector, EntryLegs) {
        let mock = Arc::new(MockGateway::new());
        let legs = placed_entry_legs(&mock).await;
        let detector = FillDetector::new(mock.clone(), DEFAULT_ORDER_ID_PREFIX, MarketTime::default());
        (mock, detector, legs)
    }

    fn row(id: &str, status: &str, update_time: &str) -> OrderBookEntry {
        OrderBookEntry {
            unique_order_id: id.to_string(),
            status: status.to_string(),
            average_price: Price::new(dec!(97.5)),
            symbol: "SYM".into(),
            token: "T".into(),
            update_time: update_time.to_string(),
        }
    }

    #[tokio::test]
    async fn test_pending_when_book_empty() {
        let (_mock, det, legs) = setup().await;
        assert_eq!(det.detect(&legs, now_ist_morning()).await.unwrap(), FillOutcome::Pending);
    }

    #[tokio::test]
    async fn test_ce_fill_cancels_pe() {
        let (mock, det, legs) = setup().await;
        mock.fill_rule(&legs.ce.rule_id, Price::new(dec!(98.4)), &format!("{TODAY} 09:41:07"));

        let outcome = det.detect(&legs, now_ist_morning()).await.unwrap();
        let FillOutcome::Filled { fill, sibling_cancelled } = outcome else {
            panic!("expected fill");
        };
        assert_eq!(fill.order_name, LegName::CeEntry);
        assert_eq!(fill.entered_price, Price::new(dec!(98.4)));
        assert_eq!(fill.token, "40001");
        assert!(sibling_cancelled);
        assert_eq!(mock.rule(&legs.pe.rule_id).unwrap().status, Some(LegStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_status_match_is_case_insensitive() {
        let (mock, det, legs) = setup().await;
        let id = legs.pe.rule_id.unique_order_id(DEFAULT_ORDER_ID_PREFIX);
        mock.push_order_book(row(&id, "TRIGGERED", &format!("{TODAY} 10:00:00")));
        let outcome = det.detect(&legs, now_ist_morning()).await.unwrap();
        assert!(matches!(outcome, FillOutcome::Filled { ref fill, .. } if fill.order_name == LegName::PeEntry));
    }

    #[tokio::test]
    async fn test_ignores_other_days_and_unfilled_rows() {
        let (mock, det, legs) = setup().await;
        let ce = legs.ce.rule_id.unique_order_id(DEFAULT_ORDER_ID_PREFIX);
        mock.push_order_book(row(&ce, "complete", "15-Oct-2026 15:10:00"));
        mock.push_order_book(row(&ce, "open", &format!("{TODAY} 10:00:00")));
        mock.push_order_book(row("GTTV3_prod_999", "complete", &format!("{TODAY} 10:00:00")));
        assert_eq!(det.detect(&legs, now_ist_morning()).await.unwrap(), FillOutcome::Pending);
        assert_eq!(mock.count_calls(|c| matches!(c, GatewayCall::Cancel(_))), 0);
    }

    #[tokio::test]
    async fn test_first_row_wins_when_both_filled() {
        let (mock, det, legs) = setup().await;
        let ce = legs.ce.rule_id.unique_order_id(DEFAULT_ORDER_ID_PREFIX);
        let pe = legs.pe.rule_id.unique_order_id(DEFAULT_ORDER_ID_PREFIX);
        mock.push_order_book(row(&pe, "triggered", &format!("{TODAY} 10:00:01")));
        mock.push_order_book(row(&ce, "triggered", &format!("{TODAY} 10:00:00")));

        let outcome = det.detect(&legs, now_ist_morning()).await.unwrap();
        let FillOutcome::Filled { fill, .. } = outcome else {
            panic!("expected fill");
        };
        assert_eq!(fill.order_name, LegName::PeEntry);
        // Only the sibling (CE) is cancelled, once.
        assert_eq!(
            mock.calls()
                .into_iter()
                .filter(|c| matches!(c, GatewayCall::Cancel(_)))
                .collect::<Vec<_>>(),
            vec![GatewayCall::Cancel(legs.ce.rule_id.clone())]
        );
    }

    #[tokio::test]
    async fn test_sibling_cancel_failure_does_not_block() {
        let (mock, det, legs) = setup().await;
        mock.fill_rule(&legs.ce.rule_id, Price::new(dec!(98)), &format!("{TODAY} 09:30:00"));
        mock.fail_next_cancel(GatewayError::Network("reset".into()));

        let outcome = det.detect(&legs, now_ist_morning()).await.unwrap();
        assert!(matches!(outcome, FillOutcome::Filled { sibling_cancelled: false, .. }));
    }

    #[tokio::test]
    async fn test_order_book_failure_is_skippable() {
        let (mock, det, legs) = setup().await;
        mock.fill_rule(&legs.ce.rule_id, Price::new(dec!(98)), &format!("{TODAY} 09:30:00"));
        mock.fail_next_order_book(GatewayError::OrderBook("timeout".into()));

        assert!(det.detect(&legs, now_ist_morning()).await.unwrap_err().is_skippable());
        assert_eq!(mock.count_calls(|c| matches!(c, GatewayCall::Cancel(_))), 0);

        let outcome = det.detect(&legs, now_ist_morning()).await.unwrap();
        assert!(matches!(outcome, FillOutcome::Filled { sibling_cancelled: true, .. }));
    }
}
