//! Gateway error types.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Rule creation failed: {0}")]
    Creation(String),

    #[error("Rule not found: {0}")]
    NotFound(String),

    #[error("Rule modify failed: {0}")]
    Modify(String),

    #[error("Rule lookup failed: {0}")]
    Lookup(String),

    #[error("Quote unavailable: {0}")]
    Quote(String),

    #[error("Order book unavailable: {0}")]
    OrderBook(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway error: {0}")]
    Other(String),
}

impl GatewayError {
    /// Access-rate limit hit; answered with a fixed cooldown.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Connection-level failure eligible for backoff retry.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// The call may succeed if repeated on a later tick.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Lookup(_) | Self::Quote(_) | Self::OrderBook(_) | Self::RateLimited(_) | Self::Network(_)
        )
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Creation(_) => "creation",
            Self::NotFound(_) => "not_found",
            Self::Modify(_) => "modify",
            Self::Lookup(_) => "lookup",
            Self::Quote(_) => "quote",
            Self::OrderBook(_) => "order_book",
            Self::RateLimited(_) => "rate_limited",
            Self::Network(_) => "network",
            Self::Other(_) => "other",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
