//! Matching de engineers elegibles
//!
//! Función pura sobre snapshots del roster: filtra engineers disponibles dentro
//! del radio actual de la solicitud y los ordena del más cercano al más lejano.
//! Una lista vacía es un estado válido ("esperando"), nunca un error.

use serde::Serialize;
use std::cmp::Ordering;

use super::geo_distance::distance_km;
use crate::models::{Coordinate, EngineerId, FieldEngineer, ServiceRequest};

/// Engineer candidato con su puntaje (distancia en km a la sucursal)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCandidate {
    pub fe_id: EngineerId,
    pub name: String,
    pub coordinate: Coordinate,
    pub distance_km: f64,
}

/// Candidatos para `request`, del más cercano al más lejano; empate por id
pub fn find_candidates(request: &ServiceRequest, engineers: &[FieldEngineer]) -> Vec<RankedCandidate> {
    let mut candidates: Vec<RankedCandidate> = engineers
        .iter()
        .filter(|engineer| engineer.is_available())
        .map(|engineer| RankedCandidate {
            fe_id: engineer.fe_id.clone(),
            name: engineer.name.clone(),
            coordinate: engineer.coordinate,
            distance_km: distance_km(engineer.coordinate, request.coordinate),
        })
        .filter(|candidate| candidate.distance_km <= request.current_radius_km)
        .collect();

    candidates.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.fe_id.cmp(&b.fe_id))
    });

    candidates
}
