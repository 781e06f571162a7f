//! Conditional-order gateway for the straddle engine.
//!
//! The broker's rule (GTT) service is an external collaborator. This crate
//! models it as a request/response trait so the lifecycle controllers can be
//! driven by a real client, the in-memory paper broker or a scripted mock.
//!
//! # Key Components
//!
//! - [`ConditionalOrderGateway`]: dyn-compatible async trait over the broker API
//! - [`GatewayError`]: Failure taxonomy (creation, lookup, quote, rate limit, network)
//! - [`RetryPolicy`]: Exponential backoff with jitter for transient network errors
//! - [`RetryingGateway`]: Applies a `RetryPolicy` at the gateway boundary
//! - [`MockGateway`]: Scriptable test double that records every call
//! - [`PaperGateway`]: Simulated broker with random-walk prices

pub mod error;
pub mod gateway;
pub mod mock;
pub mod paper;
pub mod retry;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{BoxFuture, ConditionalOrderGateway, DynGateway};
pub use mock::{GatewayCall, MockGateway, MockRule};
pub use paper::{PaperConfig, PaperGateway};
pub use retry::{RetryPolicy, RetryingGateway};
pub use types::{
    ModifyRequest, OrderBookEntry, PendingCounts, RuleDetails, RuleRequest, DEFAULT_ORDER_ID_PREFIX,
};
