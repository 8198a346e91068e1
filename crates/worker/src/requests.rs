//! The worker's only view of a `Request` row: claim it, then mark it
//! completed or errored. Expressed as a capability trait (mirrors
//! `metget-downloader`'s `CatalogGate`/`BlobSink` seam) so the state machine
//! in `build.rs` is unit-testable without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metget_core::MetGetError;
use sqlx::PgPool;
use uuid::Uuid;

/// Outcome of a `begin()` claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Claimed: transitioned to `running`, `try_count` as returned.
    Claimed(i32),
    /// The row is already terminal (`completed`/`error`), or does not exist:
    /// a true duplicate delivery with nothing left to do (spec §4.9 step 1:
    /// "Reject envelope if already terminal (duplicate delivery)").
    Terminal,
    /// The row is `running` with a `last_date` still inside the visibility
    /// window — work is already in flight (another delivery of the same
    /// envelope, most likely a crash-induced redelivery that raced ahead of
    /// the visibility timeout). This is NOT a duplicate to drop: the only
    /// copy of the work may have died with the worker that holds it, so the
    /// envelope must stay on the queue until the timeout lets a later
    /// delivery reclaim the row (spec §8 "Crash recovery").
    RunningFresh,
}

#[async_trait]
pub trait RequestGate: Send + Sync {
    /// Claim `request_id` for processing: transition `queued -> running` (or
    /// reclaim an abandoned `running` row past the visibility timeout),
    /// incrementing `try_count`.
    async fn begin(&self, request_id: Uuid) -> Result<BeginOutcome, MetGetError>;

    async fn complete(&self, request_id: Uuid, message: serde_json::Value) -> Result<(), MetGetError>;

    async fn fail(&self, request_id: Uuid, message: serde_json::Value) -> Result<(), MetGetError>;
}

/// Postgres-backed `RequestGate`, wired into the worker's `main.rs`.
pub struct PgRequestGate {
    pool: PgPool,
    visibility_timeout_secs: i64,
}

impl PgRequestGate {
    pub fn new(pool: PgPool, visibility_timeout_secs: i64) -> Self {
        Self {
            pool,
            visibility_timeout_secs,
        }
    }
}

#[async_trait]
impl RequestGate for PgRequestGate {
    async fn begin(&self, request_id: Uuid) -> Result<BeginOutcome, MetGetError> {
        let stale_before: DateTime<Utc> = Utc::now() - chrono::Duration::seconds(self.visibility_timeout_secs);
        let claimed: Option<(i32,)> = sqlx::query_as(
            "UPDATE requests \
             SET status = 'running', try_count = try_count + 1, last_date = now() \
             WHERE request_id = $1 \
               AND (status = 'queued' OR (status = 'running' AND last_date < $2)) \
             RETURNING try_count",
        )
        .bind(request_id)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((try_count,)) = claimed {
            return Ok(BeginOutcome::Claimed(try_count));
        }

        // The conditional UPDATE didn't match. Read the current status to
        // tell a true duplicate of a terminal row apart from a redelivery
        // that arrived while the prior attempt's `running` row is still
        // inside its visibility window.
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM requests WHERE request_id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?;

        match status {
            Some((s,)) if s == "running" => Ok(BeginOutcome::RunningFresh),
            _ => Ok(BeginOutcome::Terminal),
        }
    }

    async fn complete(&self, request_id: Uuid, message: serde_json::Value) -> Result<(), MetGetError> {
        sqlx::query(
            "UPDATE requests SET status = 'completed', last_date = now(), message = $2 WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, request_id: Uuid, message: serde_json::Value) -> Result<(), MetGetError> {
        sqlx::query(
            "UPDATE requests SET status = 'error', last_date = now(), message = $2 WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
