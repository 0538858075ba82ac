//! Modelo de Branch
//!
//! Sucursal física que puede solicitar servicio. El backend es el sistema de
//! registro; aquí sólo se mantiene un cache de lectura indexado por `BranchId`.

use serde::{Deserialize, Serialize};

use super::geo::Coordinate;
use super::ids::BranchId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub branch_id: BranchId,
    pub name: String,
    pub address: String,
    pub coordinate: Coordinate,
}

/// Campos parciales de una sucursal tal como llegan por evento o polling.
/// Las claves ya vienen canonicalizadas (ver `utils::casing`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchPatch {
    #[serde(rename = "branchid")]
    pub branch_id: Option<BranchId>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Alias conocidos del backend -> clave canónica
pub const BRANCH_KEY_ALIASES: &[(&str, &str)] = &[
    ("id", "branchid"),
    ("branchname", "name"),
    ("lat", "latitude"),
    ("lng", "longitude"),
    ("lon", "longitude"),
];

impl Branch {
    /// Crea la sucursal a partir de un patch completo; `None` si falta la posición
    pub fn from_patch(branch_id: BranchId, patch: &BranchPatch) -> Option<Self> {
        let coordinate = Coordinate::new(patch.latitude?, patch.longitude?);
        Some(Self {
            branch_id,
            name: patch.name.clone().unwrap_or_default(),
            address: patch.address.clone().unwrap_or_default(),
            coordinate,
        })
    }

    /// Merge superficial: sólo se sobreescriben los campos presentes
    pub fn apply_patch(&mut self, patch: &BranchPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(address) = &patch.address {
            self.address = address.clone();
        }
        if let Some(lat) = patch.latitude {
            self.coordinate.lat = lat;
        }
        if let Some(lng) = patch.longitude {
            self.coordinate.lng = lng;
        }
    }
}
