//! `x-api-key` authentication (spec §4.6 step 1, §6).

use axum::http::HeaderMap;
use chrono::Utc;
use metget_credit::{Authorization, CreditLedger};
use metget_core::MetGetError;

/// Pulls `x-api-key` off the request and authorizes it against C3. Mirrors
/// `metget_core::model::ApiKey::allows_service`'s allow-list semantics
/// (empty/missing `allow` means unrestricted) without depending on that
/// type directly, since [`Authorization`] already carries the decoded
/// `permissions` value from the row `metget-credit` read.
pub async fn authenticate(
    headers: &HeaderMap,
    credit: &CreditLedger,
) -> Result<(String, Authorization), MetGetError> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| MetGetError::Auth("missing x-api-key header".into()))?
        .to_string();

    let authorization = credit.authorize(&api_key, Utc::now()).await?;
    Ok((api_key, authorization))
}

/// Whether `authorization`'s allow-list covers `service`.
pub fn allows_service(authorization: &Authorization, service: &str) -> bool {
    match authorization.permissions.get("allow").and_then(|v| v.as_array()) {
        None => true,
        Some(list) if list.is_empty() => true,
        Some(list) => list.iter().any(|v| v.as_str() == Some(service)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization(permissions: serde_json::Value) -> Authorization {
        Authorization {
            enabled: true,
            unlimited: false,
            remaining: 1000,
            permissions,
        }
    }

    #[test]
    fn missing_allow_list_permits_everything() {
        let a = authorization(serde_json::json!({}));
        assert!(allows_service(&a, "global"));
    }

    #[test]
    fn empty_allow_list_permits_everything() {
        let a = authorization(serde_json::json!({"allow": []}));
        assert!(allows_service(&a, "global"));
    }

    #[test]
    fn non_empty_allow_list_is_exclusive() {
        let a = authorization(serde_json::json!({"allow": ["gfs"]}));
        assert!(allows_service(&a, "gfs"));
        assert!(!allows_service(&a, "global"));
    }
}
