//! Error taxonomy shared across components (spec §7).
//!
//! This enum describes *kinds* of failure, not transport. Only `metget-api`
//! converts it into an HTTP response; workers and downloaders log it or fold
//! it into a `Request.message` JSON blob instead.

/// A MetGet-Server error, tagged by the kind of failure per the taxonomy in
/// spec §7. Each variant documents which components are expected to raise it
/// and how callers are expected to recover.
#[derive(Debug, thiserror::Error)]
pub enum MetGetError {
    /// Spec cannot be parsed or violates schema. Raised by `metget-api`
    /// request validation; surfaced to the client synchronously.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing, unknown, expired, or disabled key. Raised by `metget-api`
    /// auth; maps to 401 (spec §6).
    #[error("auth error: {0}")]
    Auth(String),

    /// Key is valid but its permission allow-list does not cover a requested
    /// domain's service. Raised by `metget-api` auth; maps to 403, distinct
    /// from `Auth`'s 401 (spec §6: "401/403 auth").
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Credit debit was refused by `metget-credit`.
    #[error("credit denied")]
    CreditDenied,

    /// Unknown `request_id` on `/check`.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient upstream failure (C1/C2/C7/source timeout). Downloaders and
    /// workers retry or skip; never surfaced synchronously to a client.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Selection produced a hole with `backfill=false`. Terminal for the
    /// request that triggered it.
    #[error("coverage gap: {0}")]
    CoverageGap(String),

    /// Two writers raced on the catalog's uniqueness constraint. The loser
    /// retries or skips; never propagated past the write site.
    #[error("integrity conflict: {0}")]
    IntegrityConflict(String),

    /// Anything else. Terminal after the retry budget is exhausted.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wraps a `sqlx` failure that doesn't map to a more specific kind.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MetGetError {
    /// `true` for failures a retry loop should treat as transient (i.e. not
    /// ack/terminal) rather than permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetGetError::UpstreamUnavailable(_)
                | MetGetError::IntegrityConflict(_)
                | MetGetError::Database(_)
        )
    }
}
