//! `POST /build` — the six ordered steps of spec §4.6: authenticate,
//! validate, debit, persist, publish, respond.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use metget_bus::Envelope;
use metget_core::model::RequestSpec;
use metget_core::MetGetError;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{allows_service, authenticate};
use crate::db::requests::{find_by_idempotency_key, insert_request};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct BuildResponse {
    pub request_id: Uuid,
    /// Presigned GET URL for the output object, valid before the worker has
    /// written anything (spec §4.2, §4.6 step 6).
    pub request_url: String,
}

#[utoipa::path(
    post,
    path = "/build",
    tag = "Build",
    responses(
        (status = 200, description = "Request accepted", body = BuildResponse),
        (status = 400, description = "Invalid spec"),
        (status = 401, description = "Missing or unknown api key"),
        (status = 403, description = "Domain service not permitted for this key"),
        (status = 402, description = "Credit denied"),
    )
)]
pub async fn build(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<BuildResponse>, MetGetError> {
    let (api_key, authorization) = authenticate(&headers, &state.credit).await?;

    let spec: RequestSpec = serde_json::from_value(body)
        .map_err(|e| MetGetError::Validation(format!("malformed request spec: {e}")))?;
    spec.validate()?;

    for domain in &spec.domains {
        if !allows_service(&authorization, &domain.service) {
            return Err(MetGetError::Forbidden(format!(
                "api key does not permit service '{}'",
                domain.service
            )));
        }
    }

    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    if let Some(key) = &idempotency_key {
        if let Some(existing) =
            find_by_idempotency_key(&state.pool, &api_key, key).await?
        {
            let output_key = output_key(existing.request_id, &spec);
            let request_url = state.blobs.presign(&output_key, state.presign_ttl).await?;
            return Ok(Json(BuildResponse {
                request_id: existing.request_id,
                request_url,
            }));
        }
    }

    let credit_usage = metget_core::tariff::credit_usage(&spec);
    let debit = state
        .credit
        .debit(&api_key, credit_usage, state.enforce_credit_limits)
        .await?;
    if debit == metget_credit::DebitOutcome::Denied {
        return Err(MetGetError::CreditDenied);
    }

    let request_id = Uuid::new_v4();
    let source_ip = remote.ip().to_string();
    let input_data = spec.canonical_json();

    insert_request(
        &state.pool,
        request_id,
        &api_key,
        &source_ip,
        credit_usage,
        &input_data,
        idempotency_key.as_deref(),
    )
    .await?;

    let envelope = Envelope {
        request_id,
        spec_json: input_data,
        api_key: api_key.clone(),
        submitted_at: Utc::now(),
    };
    state.bus.publish(&envelope).await?;

    let output_key = output_key(request_id, &spec);
    let request_url = state.blobs.presign(&output_key, state.presign_ttl).await?;

    Ok(Json(BuildResponse { request_id, request_url }))
}

/// Object-store key layout (spec §6): `{request_id}/{filename}.{ext}`.
fn output_key(request_id: Uuid, spec: &RequestSpec) -> String {
    format!("{request_id}/{}.{}", spec.filename, spec.format.extension())
}
