//! DTOs de la API HTTP del despacho

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{RequestId, RouteId};
use crate::services::eligibility_matcher::RankedCandidate;
use crate::utils::validation::validate_not_empty;

/// Body de `POST /api/dispatch/service-requests`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestServiceBody {
    #[validate(length(min = 1, max = 64), custom = "validate_not_empty")]
    pub branch_id: String,
}

/// Body de `POST /api/dispatch/service-requests/:id/accept`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequestBody {
    #[validate(length(min = 1, max = 64), custom = "validate_not_empty")]
    pub fe_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatesResponse {
    pub request_id: RequestId,
    pub radius_km: f64,
    /// Vacío = "esperando engineers"
    pub candidates: Vec<RankedCandidate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDisplayResponse {
    pub selected_route_id: Option<RouteId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
    pub hub_connected: bool,
}
