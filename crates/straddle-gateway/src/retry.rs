//! Backoff retry for transient network failures.
//!
//! Delay for attempt `n` (1-based) is `base * 2^(n-1)`, capped at `max`,
//! plus a small jitter. Only `GatewayError::Network` is retried; every other
//! error is returned to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use straddle_core::{Price, RuleId};
use tracing::warn;

use crate::error::GatewayResult;
use crate::gateway::{BoxFuture, ConditionalOrderGateway};
use crate::types::{ModifyRequest, OrderBookEntry, PendingCounts, RuleDetails, RuleRequest};

/// Retry schedule for gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to every delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        self.backoff(attempt) + Duration::from_millis(rand_jitter(self.jitter_ms))
    }

    /// Run `op`, retrying network errors per this policy.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Err(e) if e.is_network() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_with_jitter(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Network error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// Random jitter in `0..=max_ms`.
fn rand_jitter(max_ms: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    if max_ms == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (max_ms + 1)
}

/// Gateway decorator that applies a [`RetryPolicy`].
///
/// Reads, cancels and modifies are retried. Creates pass straight through.
#[derive(Debug)]
pub struct RetryingGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: ConditionalOrderGateway> RetryingGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: ConditionalOrderGateway> ConditionalOrderGateway for RetryingGateway<G> {
    fn create_rule<'a>(&'a self, request: &'a RuleRequest) -> BoxFuture<'a, GatewayResult<RuleId>> {
        self.inner.create_rule(request)
    }

    fn cancel_rule<'a>(&'a self, rule_id: &'a RuleId, token: &'a str) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            self.policy
                .run("cancel_rule", || self.inner.cancel_rule(rule_id, token))
                .await
        })
    }

    fn modify_rule<'a>(&'a self, request: &'a ModifyRequest) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move { self.policy.run("modify_rule", || self.inner.modify_rule(request)).await })
    }

    fn rule_status<'a>(&'a self, rule_id: &'a RuleId) -> BoxFuture<'a, GatewayResult<RuleDetails>> {
        Box::pin(async move { self.policy.run("rule_status", || self.inner.rule_status(rule_id)).await })
    }

    fn order_book(&self) -> BoxFuture<'_, GatewayResult<Vec<OrderBookEntry>>> {
        Box::pin(async move { self.policy.run("order_book", || self.inner.order_book()).await })
    }

    fn last_traded_price<'a>(
        &'a self,
        exchange: &'a str,
        symbol: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Price>> {
        Box::pin(async move {
            self.policy
                .run("last_traded_price", || self.inner.last_traded_price(exchange, symbol, token))
                .await
        })
    }

    fn pending_order_counts(&self) -> BoxFuture<'_, GatewayResult<PendingCounts>> {
        Box::pin(async move {
            self.policy
                .run("pending_order_counts", || self.inner.pending_order_counts())
                .await
        })
    }
}
