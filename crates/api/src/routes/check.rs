//! `POST /check` — current `Request` row snapshot (spec §4.6, §6).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use metget_core::model::Request;
use metget_core::MetGetError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::authenticate;
use crate::db::requests::get_request;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRequest {
    pub request: Uuid,
}

/// Client-facing view of a `Request` row. Omits `api_key`/`source_ip` —
/// those are bookkeeping for `metget-credit`/abuse triage, not something a
/// client polling its own request needs echoed back.
#[derive(Debug, Serialize, ToSchema)]
pub struct RequestSnapshot {
    pub request_id: Uuid,
    pub status: String,
    pub try_count: i32,
    pub start_date: String,
    pub last_date: String,
    pub credit_usage: i64,
    pub input_data: serde_json::Value,
    pub message: serde_json::Value,
}

impl From<Request> for RequestSnapshot {
    fn from(r: Request) -> Self {
        Self {
            request_id: r.request_id,
            status: r.status.tag().to_string(),
            try_count: r.try_count,
            start_date: r.start_date.to_rfc3339(),
            last_date: r.last_date.to_rfc3339(),
            credit_usage: r.credit_usage,
            input_data: r.input_data,
            message: r.message,
        }
    }
}

#[utoipa::path(
    post,
    path = "/check",
    tag = "Check",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Request row snapshot", body = RequestSnapshot),
        (status = 401, description = "Missing or unknown api key"),
        (status = 404, description = "Unknown request_id"),
    )
)]
pub async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CheckRequest>,
) -> Result<Json<RequestSnapshot>, MetGetError> {
    authenticate(&headers, &state.credit).await?;

    let request = get_request(&state.pool, body.request)
        .await?
        .ok_or_else(|| MetGetError::NotFound(format!("request {} not found", body.request)))?;

    Ok(Json(request.into()))
}
