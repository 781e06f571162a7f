//! Lifecycle error types.

use straddle_core::{CoreError, LegName};
use straddle_gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Orders are already open at the broker; entry waits.
    #[error("Pending orders present (plain={plain}, conditional={conditional})")]
    Precondition { plain: u32, conditional: u32 },

    /// Exactly two rules already pending: a previous straddle was left behind.
    #[error(
        "Two conditional orders already pending (plain={plain}); delete them manually before entry resumes"
    )]
    ManualRemediation { plain: u32, conditional: u32 },

    /// A leg could not be created; `compensated` earlier legs were cancelled.
    #[error("Failed to create {order_name}: {source} (compensated {compensated} leg(s))")]
    Creation {
        order_name: LegName,
        source: GatewayError,
        compensated: usize,
    },

    /// Per-cycle records do not match the cycle state.
    #[error("Inconsistent cycle: {0}")]
    InconsistentCycle(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LifecycleError {
    /// The broker's access-rate limit was hit somewhere in the step.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_rate_limited(),
            Self::Creation { source, .. } => source.is_rate_limited(),
            _ => false,
        }
    }

    /// Lookup/quote failure: skip this tick and try again on the next.
    #[must_use]
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::Gateway(GatewayError::Lookup(_) | GatewayError::Quote(_) | GatewayError::OrderBook(_))
        )
    }

    /// Broker state the loop cannot repair on its own: rules left over
    /// from an earlier straddle, or a tracked rule the broker no longer knows.
    #[must_use]
    pub fn needs_manual_action(&self) -> bool {
        matches!(
            self,
            Self::ManualRemediation { .. } | Self::Gateway(GatewayError::NotFound(_))
        )
    }

    /// Short label for metrics and the journal.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition { .. } => "precondition",
            Self::ManualRemediation { .. } => "manual_remediation",
            Self::Creation { .. } => "creation",
            Self::InconsistentCycle(_) => "inconsistent_cycle",
            Self::Persistence(_) => "persistence",
            Self::Gateway(e) => e.kind(),
            Self::Core(_) => "core",
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
