//! Query layer for the `requests` table (`0002_requests.sql`), written the
//! teacher's `db/queries.rs` way: a column-list constant kept in sync with
//! the row struct, `query_as` for reads, plain `query` for writes.

use chrono::{DateTime, Utc};
use metget_core::model::{Request, RequestStatus};
use metget_core::MetGetError;
use sqlx::PgPool;
use uuid::Uuid;

const REQUEST_COLS: &str = "\
    request_id, status, try_count, start_date, last_date, \
    api_key, source_ip, credit_usage, input_data, message";

/// Row shape of the `requests` table. `status` is read back as its raw
/// column text and mapped onto [`RequestStatus`] in [`RequestRow::into_request`]
/// since the column has no enum type of its own (spec §3/§6: written as
/// plain `'queued'`/`'running'`/`'completed'`/`'error'` strings so both
/// `metget-api` and `metget-worker` can update it with a bare SQL literal).
#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    request_id: Uuid,
    status: String,
    try_count: i32,
    start_date: DateTime<Utc>,
    last_date: DateTime<Utc>,
    api_key: String,
    source_ip: String,
    credit_usage: i64,
    input_data: serde_json::Value,
    message: serde_json::Value,
}

impl RequestRow {
    fn into_request(self) -> Result<Request, MetGetError> {
        let status = match self.status.as_str() {
            "queued" => RequestStatus::Queued,
            "running" => RequestStatus::Running,
            "error" => RequestStatus::Error,
            "completed" => RequestStatus::Completed,
            other => {
                return Err(MetGetError::Internal(format!(
                    "requests row {} has unrecognized status '{other}'",
                    self.request_id
                )))
            }
        };
        Ok(Request {
            request_id: self.request_id,
            status,
            try_count: self.try_count,
            start_date: self.start_date,
            last_date: self.last_date,
            api_key: self.api_key,
            source_ip: self.source_ip,
            credit_usage: self.credit_usage,
            input_data: self.input_data,
            message: self.message,
        })
    }
}

/// Creates the row for a newly accepted `/build` (spec §4.6 step 4): always
/// starts `queued` with `try_count = 0` and an empty `message`. `idempotency_key`
/// is the client-supplied dedup key (spec §4.6: "optional ... deduplicates
/// within a window"); the partial unique index on (api_key, idempotency_key)
/// is the backstop if two concurrent callers race past [`find_by_idempotency_key`].
pub async fn insert_request(
    pool: &PgPool,
    request_id: Uuid,
    api_key: &str,
    source_ip: &str,
    credit_usage: i64,
    input_data: &serde_json::Value,
    idempotency_key: Option<&str>,
) -> Result<Request, MetGetError> {
    let sql = format!(
        "INSERT INTO requests (request_id, status, try_count, api_key, source_ip, credit_usage, input_data, idempotency_key)
         VALUES ($1, 'queued', 0, $2, $3, $4, $5, $6)
         RETURNING {REQUEST_COLS}"
    );
    let row: RequestRow = sqlx::query_as(&sql)
        .bind(request_id)
        .bind(api_key)
        .bind(source_ip)
        .bind(credit_usage)
        .bind(input_data)
        .bind(idempotency_key)
        .fetch_one(pool)
        .await?;
    row.into_request()
}

/// Looks up a prior request from the same key within the dedup window
/// (spec §4.6). The window here is the request's full retention period —
/// no explicit TTL was specified for the dedup window, and `Request`
/// retention is itself unbounded, so there is no separate expiry to apply.
pub async fn find_by_idempotency_key(
    pool: &PgPool,
    api_key: &str,
    idempotency_key: &str,
) -> Result<Option<Request>, MetGetError> {
    let sql = format!(
        "SELECT {REQUEST_COLS} FROM requests WHERE api_key = $1 AND idempotency_key = $2"
    );
    let row: Option<RequestRow> = sqlx::query_as(&sql)
        .bind(api_key)
        .bind(idempotency_key)
        .fetch_optional(pool)
        .await?;
    row.map(RequestRow::into_request).transpose()
}

/// `POST /check` lookup (spec §6). `None` means the caller should respond
/// `404 NotFound`.
pub async fn get_request(pool: &PgPool, request_id: Uuid) -> Result<Option<Request>, MetGetError> {
    let sql = format!("SELECT {REQUEST_COLS} FROM requests WHERE request_id = $1");
    let row: Option<RequestRow> = sqlx::query_as(&sql)
        .bind(request_id)
        .fetch_optional(pool)
        .await?;
    row.map(RequestRow::into_request).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_status_is_an_internal_error_not_a_panic() {
        let row = RequestRow {
            request_id: Uuid::nil(),
            status: "bogus".into(),
            try_count: 0,
            start_date: Utc::now(),
            last_date: Utc::now(),
            api_key: "k".into(),
            source_ip: "127.0.0.1".into(),
            credit_usage: 0,
            input_data: serde_json::json!({}),
            message: serde_json::json!({}),
        };
        assert!(row.into_request().is_err());
    }

    #[test]
    fn known_statuses_round_trip() {
        for (tag, expected) in [
            ("queued", RequestStatus::Queued),
            ("running", RequestStatus::Running),
            ("error", RequestStatus::Error),
            ("completed", RequestStatus::Completed),
        ] {
            let row = RequestRow {
                request_id: Uuid::nil(),
                status: tag.into(),
                try_count: 0,
                start_date: Utc::now(),
                last_date: Utc::now(),
                api_key: "k".into(),
                source_ip: "127.0.0.1".into(),
                credit_usage: 0,
                input_data: serde_json::json!({}),
                message: serde_json::json!({}),
            };
            assert_eq!(row.into_request().unwrap().status, expected);
        }
    }
}
