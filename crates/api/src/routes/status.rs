//! `GET /status` — catalog coverage snapshot per model family (spec §4.6,
//! §6).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use metget_core::model::ModelFamily;
use metget_core::MetGetError;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::authenticate;
use crate::state::AppState;

/// Coverage snapshot for one model family.
#[derive(Debug, Serialize, ToSchema)]
pub struct FamilyStatus {
    /// The family's wire tag, e.g. "global", "tropical_ensemble".
    pub family: String,
    /// Oldest forecast cycle present in the catalog, if any.
    pub min_cycle: Option<String>,
    /// Newest forecast cycle present in the catalog, if any.
    pub max_cycle: Option<String>,
    /// Most recent cycle with at least one catalogued row. Distinct from
    /// `max_cycle` only in name; there is no separate "completeness" signal
    /// in the catalog schema (no expected-tau-count column), so this is the
    /// same value — see `DESIGN.md` for this open-question decision.
    pub latest_complete: Option<String>,
    /// All forecast cycles present, most recent first.
    pub cycles: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub families: Vec<FamilyStatus>,
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "Status",
    responses(
        (status = 200, description = "Catalog coverage snapshot", body = StatusResponse),
        (status = 401, description = "Missing or unknown api key"),
        (status = 403, description = "Api key disabled or expired"),
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, MetGetError> {
    authenticate(&headers, &state.credit).await?;

    let mut families = Vec::with_capacity(ModelFamily::ALL.len());
    for family in ModelFamily::ALL {
        let cycles = state.catalog.list_cycles(family).await?;
        let cycle_strings: Vec<String> = cycles.iter().map(|c| c.to_rfc3339()).collect();
        families.push(FamilyStatus {
            family: family.tag().to_string(),
            min_cycle: cycles.last().map(|c| c.to_rfc3339()),
            max_cycle: cycles.first().map(|c| c.to_rfc3339()),
            latest_complete: cycles.first().map(|c| c.to_rfc3339()),
            cycles: cycle_strings,
        });
    }

    Ok(Json(StatusResponse { families }))
}
