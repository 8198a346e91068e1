use chrono::{DateTime, Utc};
use metget_core::MetGetError;
use sqlx::PgPool;

/// Row shape of the `apikeys` table (`0003_apikeys.sql`).
#[derive(Debug, Clone, sqlx::FromRow)]
struct ApiKeyRow {
    key: String,
    username: String,
    credit_limit: i64,
    credit_used: i64,
    enabled: bool,
    expiration: Option<DateTime<Utc>>,
    permissions: serde_json::Value,
}

impl ApiKeyRow {
    fn is_unlimited(&self) -> bool {
        self.credit_limit < 0
    }

    fn remaining(&self) -> i64 {
        if self.is_unlimited() {
            i64::MAX
        } else {
            (self.credit_limit - self.credit_used).max(0)
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.map(|e| now >= e).unwrap_or(false)
    }
}

/// Result of `CreditLedger::authorize` (spec §4.3).
#[derive(Debug, Clone)]
pub struct Authorization {
    pub enabled: bool,
    pub unlimited: bool,
    pub remaining: i64,
    pub permissions: serde_json::Value,
}

/// Result of `CreditLedger::debit` (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Ok { remaining: i64 },
    Denied,
}

/// C3 — one `CreditLedger` per process, wrapping the shared `PgPool`.
#[derive(Debug, Clone)]
pub struct CreditLedger {
    pool: PgPool,
}

impl CreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read-only: enabled/remaining/unlimited/permissions for `api_key`.
    /// Returns `Auth` if the key does not exist, is disabled, or has expired.
    pub async fn authorize(&self, api_key: &str, now: DateTime<Utc>) -> Result<Authorization, MetGetError> {
        let row: Option<ApiKeyRow> = sqlx::query_as(
            "SELECT key, username, credit_limit, credit_used, enabled, expiration, permissions
             FROM apikeys WHERE key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| MetGetError::Auth("unknown api key".into()))?;

        if !row.enabled {
            return Err(MetGetError::Auth("api key disabled".into()));
        }
        if row.is_expired(now) {
            return Err(MetGetError::Auth("api key expired".into()));
        }

        Ok(Authorization {
            enabled: row.enabled,
            unlimited: row.is_unlimited(),
            remaining: row.remaining(),
            permissions: row.permissions,
        })
    }

    /// Atomic compare-and-decrement against `credit_limit`. Never lets
    /// `credit_used` exceed `credit_limit` unless unlimited (`credit_limit <
    /// 0`). When `enforce` is `false`, always `Ok` without mutating the row
    /// (spec §4.3: "If `enforce_credit_limits` is false, always returns ok
    /// without mutation").
    pub async fn debit(&self, api_key: &str, amount: i64, enforce: bool) -> Result<DebitOutcome, MetGetError> {
        if !enforce {
            return Ok(DebitOutcome::Ok { remaining: i64::MAX });
        }

        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE apikeys SET credit_used = credit_used + $2
             WHERE key = $1
               AND enabled
               AND (credit_limit < 0 OR credit_used + $2 <= credit_limit)
             RETURNING credit_limit - credit_used",
        )
        .bind(api_key)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((remaining,)) => Ok(DebitOutcome::Ok { remaining }),
            None => Ok(DebitOutcome::Denied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(credit_limit: i64, credit_used: i64, enabled: bool, expiration: Option<DateTime<Utc>>) -> ApiKeyRow {
        ApiKeyRow {
            key: "k".into(),
            username: "u".into(),
            credit_limit,
            credit_used,
            enabled,
            expiration,
            permissions: serde_json::json!([]),
        }
    }

    #[test]
    fn unlimited_when_credit_limit_negative() {
        let r = row(-1, 500, true, None);
        assert!(r.is_unlimited());
        assert_eq!(r.remaining(), i64::MAX);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let r = row(100, 150, true, None);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn expired_key_detected() {
        let now = Utc::now();
        let r = row(100, 0, true, Some(now - chrono::Duration::seconds(1)));
        assert!(r.is_expired(now));
        let r2 = row(100, 0, true, Some(now + chrono::Duration::seconds(60)));
        assert!(!r2.is_expired(now));
    }

    #[test]
    fn no_expiration_never_expires() {
        let r = row(100, 0, true, None);
        assert!(!r.is_expired(Utc::now()));
    }
}
