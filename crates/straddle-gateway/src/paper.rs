//! Paper broker: an in-memory conditional-order service with simulated
//! prices.
//!
//! Each quote request advances a seeded random walk for that contract and
//! then evaluates the contract's live rules against the new price:
//! - BUY rules fire when the price reaches the trigger from below
//! - SELL rules created above the market (targets) fire on the way up
//! - SELL rules created at or below the market (stops) fire on the way down
//!
//! A fired rule drops out of the rule book (status null) and its order is
//! appended to the order book as `complete`.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use straddle_core::{LegStatus, MarketTime, OrderSide, Price, RuleId, ORDER_BOOK_DATE_FORMAT};
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{BoxFuture, ConditionalOrderGateway};
use crate::types::{
    ModifyRequest, OrderBookEntry, PendingCounts, RuleDetails, RuleRequest, DEFAULT_ORDER_ID_PREFIX,
};

/// Paper broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Random walk seed; equal seeds replay equal price paths.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Largest single-step move, in basis points of the current price.
    #[serde(default = "default_step_bps")]
    pub step_bps: u32,
}

fn default_seed() -> u64 {
    0x5EED_CAFE
}

fn default_step_bps() -> u32 {
    150
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            step_bps: default_step_bps(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Fires when price >= trigger.
    Up,
    /// Fires when price <= trigger.
    Down,
}

#[derive(Debug, Clone)]
struct PaperRule {
    request: RuleRequest,
    status: Option<LegStatus>,
    direction: Direction,
}

#[derive(Debug)]
struct PaperState {
    rng: u64,
    next_id: u64,
    prices: HashMap<String, Price>,
    rules: Vec<(RuleId, PaperRule)>,
    order_book: Vec<OrderBookEntry>,
}

impl PaperState {
    /// xorshift64*
    fn next_u64(&mut self) -> u64 {
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform step in `[-max_bps, +max_bps]` basis points.
    fn next_step_bps(&mut self, max_bps: u32) -> i64 {
        let span = u64::from(max_bps) * 2 + 1;
        (self.next_u64() % span) as i64 - i64::from(max_bps)
    }

    fn direction_for(&self, request: &RuleRequest) -> Direction {
        match request.side {
            OrderSide::Buy => Direction::Up,
            OrderSide::Sell => match self.prices.get(&request.token) {
                Some(ltp) if request.trigger_price > *ltp => Direction::Up,
                _ => Direction::Down,
            },
        }
    }
}

/// Simulated broker for dry runs.
#[derive(Debug)]
pub struct PaperGateway {
    config: PaperConfig,
    market_time: MarketTime,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(config: PaperConfig, market_time: MarketTime) -> Self {
        let seed = if config.seed == 0 { default_seed() } else { config.seed };
        Self {
            config,
            market_time,
            state: Mutex::new(PaperState {
                rng: seed,
                next_id: 7_000_001,
                prices: HashMap::new(),
                rules: Vec::new(),
                order_book: Vec::new(),
            }),
        }
    }

    /// Set the starting price of a contract.
    pub fn seed_price(&self, token: &str, price: Price) {
        self.state.lock().prices.insert(token.to_string(), price);
    }

    fn update_time(&self) -> String {
        let now = Utc::now();
        let local = now.with_timezone(&self.market_time.offset());
        format!("{} {}", local.format(ORDER_BOOK_DATE_FORMAT), local.format("%H:%M:%S"))
    }

    /// Advance one contract's price and fire any rules it crosses.
    fn tick(&self, state: &mut PaperState, token: &str) -> Option<Price> {
        let current = *state.prices.get(token)?;
        let step = state.next_step_bps(self.config.step_bps);
        let moved = current * (Decimal::ONE + Decimal::new(step, 4));
        let tick = Price::new(Decimal::new(5, 2));
        let next = moved.round_to_tick().max(tick);
        state.prices.insert(token.to_string(), next);

        let update_time = self.update_time();
        let mut fired = Vec::new();
        for (rule_id, rule) in state.rules.iter_mut() {
            if rule.request.token != token || !rule.status.is_some_and(|s| s.is_active()) {
                continue;
            }
            let crossed = match rule.direction {
                Direction::Up => next >= rule.request.trigger_price,
                Direction::Down => next <= rule.request.trigger_price,
            };
            if crossed {
                rule.status = None;
                info!(
                    rule_id = %rule_id,
                    order_name = %rule.request.order_name,
                    trigger = %rule.request.trigger_price,
                    price = %next,
                    "Paper rule fired"
                );
                fired.push(OrderBookEntry {
                    unique_order_id: rule_id.unique_order_id(DEFAULT_ORDER_ID_PREFIX),
                    status: "complete".to_string(),
                    average_price: next,
                    symbol: rule.request.symbol.clone(),
                    token: rule.request.token.clone(),
                    update_time: update_time.clone(),
                });
            }
        }
        state.order_book.extend(fired);
        Some(next)
    }

    fn find<'s>(state: &'s mut PaperState, rule_id: &RuleId) -> GatewayResult<&'s mut PaperRule> {
        state
            .rules
            .iter_mut()
            .find(|(id, _)| id == rule_id)
            .map(|(_, rule)| rule)
            .ok_or_else(|| GatewayError::NotFound(rule_id.to_string()))
    }
}

impl ConditionalOrderGateway for PaperGateway {
    fn create_rule<'a>(&'a self, request: &'a RuleRequest) -> BoxFuture<'a, GatewayResult<RuleId>> {
        Box::pin(async move {
            if request.quantity.is_zero() {
                return Err(GatewayError::Creation(format!("{} quantity is zero", request.order_name)));
            }
            let mut state = self.state.lock();
            let rule_id = RuleId::new(state.next_id.to_string());
            state.next_id += 1;
            let direction = state.direction_for(request);
            debug!(rule_id = %rule_id, order_name = %request.order_name, ?direction, "Paper rule created");
            state.rules.push((
                rule_id.clone(),
                PaperRule {
                    request: request.clone(),
                    status: Some(LegStatus::New),
                    direction,
                },
            ));
            Ok(rule_id)
        })
    }

    fn cancel_rule<'a>(&'a self, rule_id: &'a RuleId, _token: &'a str) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let rule = Self::find(&mut state, rule_id)?;
            if rule.status.is_some_and(|s| s.is_active()) {
                rule.status = Some(LegStatus::Cancelled);
            }
            Ok(())
        })
    }

    fn modify_rule<'a>(&'a self, request: &'a ModifyRequest) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let rule = Self::find(&mut state, &request.rule_id)?;
            if !rule.status.is_some_and(|s| s.is_active()) {
                return Err(GatewayError::Modify(format!("rule {} is not active", request.rule_id)));
            }
            rule.request.trigger_price = request.trigger_price;
            rule.request.limit_price = request.limit_price;
            rule.request.quantity = request.quantity;
            let updated = rule.request.clone();
            let direction = state.direction_for(&updated);
            Self::find(&mut state, &request.rule_id)?.direction = direction;
            Ok(())
        })
    }

    fn rule_status<'a>(&'a self, rule_id: &'a RuleId) -> BoxFuture<'a, GatewayResult<RuleDetails>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let token = Self::find(&mut state, rule_id)?.request.token.clone();
            self.tick(&mut state, &token);
            let rule = Self::find(&mut state, rule_id)?;
            Ok(RuleDetails {
                status: rule.status,
                quantity: rule.request.quantity,
            })
        })
    }

    fn order_book(&self) -> BoxFuture<'_, GatewayResult<Vec<OrderBookEntry>>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let mut tokens: Vec<String> = state
                .rules
                .iter()
                .filter(|(_, r)| r.status.is_some_and(|s| s.is_active()))
                .map(|(_, r)| r.request.token.clone())
                .collect();
            tokens.sort();
            tokens.dedup();
            for token in tokens {
                self.tick(&mut state, &token);
            }
            Ok(state.order_book.clone())
        })
    }

    fn last_traded_price<'a>(
        &'a self,
        _exchange: &'a str,
        symbol: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Price>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            self.tick(&mut state, token)
                .ok_or_else(|| GatewayError::Quote(format!("no paper price for {symbol} ({token})")))
        })
    }

    fn pending_order_counts(&self) -> BoxFuture<'_, GatewayResult<PendingCounts>> {
        Box::pin(async move {
            let state = self.state.lock();
            let conditional = state
                .rules
                .iter()
                .filter(|(_, r)| r.status.is_some_and(|s| s.is_active()))
                .count() as u32;
            Ok(PendingCounts { plain: 0, conditional })
        })
    }
}
