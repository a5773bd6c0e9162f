//! Error types and result aliases.
//!
//! Every failure the dispatch core can raise is a `DispatchError`. Errors
//! coming out of user-supplied router or rewrite functions are carried
//! verbatim; the core never retries and never falls back to the static
//! target when one of them fails.

use thiserror::Error;

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed or ambiguous filter configuration.
    #[error("invalid filter spec: {0}")]
    InvalidFilterSpec(String),

    /// Malformed rewrite table.
    #[error("invalid rewrite config: {0}")]
    InvalidRewriteConfig(String),

    /// Error returned by a custom filter predicate.
    #[error(transparent)]
    FilterPredicate(anyhow::Error),

    /// Error returned by a custom router function.
    #[error(transparent)]
    RouterResolution(anyhow::Error),

    /// Error returned by a custom rewrite function.
    #[error(transparent)]
    Rewrite(anyhow::Error),

    /// Neither a static target nor a router was configured.
    #[error("missing \"target\" option: configure a target or a router")]
    MissingTarget,
}

/// Result type alias for `DispatchError`.
pub type Result<T> = std::result::Result<T, DispatchError>;
