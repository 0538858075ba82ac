//! Modelo de ServiceRequest
//!
//! Necesidad pendiente de un engineer en una sucursal, con radio de búsqueda
//! que se expande mientras está en Pending. Los datos de la sucursal se copian
//! al crearla para que la solicitud sea autodescriptiva.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::field_engineer::canonical_token;
use super::geo::Coordinate;
use super::ids::{BranchId, EngineerId, RequestId};
use crate::utils::validation::lenient_datetime;

/// Estado de la solicitud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Cancelled,
    Expired,
}

impl RequestStatus {
    /// Accepted, Cancelled y Expired son terminales para matching y expansión
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match canonical_token(value).as_str() {
            "pending" | "open" | "waiting" => Ok(RequestStatus::Pending),
            "accepted" | "assigned" => Ok(RequestStatus::Accepted),
            "cancelled" | "canceled" => Ok(RequestStatus::Cancelled),
            "expired" | "timedout" => Ok(RequestStatus::Expired),
            _ => Err(format!("unknown request status '{}'", value)),
        }
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Cancelled => "Cancelled",
            RequestStatus::Expired => "Expired",
        };
        f.write_str(label)
    }
}

/// Quién manda sobre `current_radius_km`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiusAuthority {
    /// El scheduler local expande el radio
    Local,
    /// El servidor ya empujó un radio; el timer local no lo toca más
    Server,
}

/// Estado de confirmación de una aceptación optimista
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptanceConfirmation {
    Tentative,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub request_id: RequestId,
    pub branch_id: BranchId,
    pub branch_name: String,
    pub coordinate: Coordinate,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub current_radius_km: f64,
    pub accepted_at: Option<DateTime<Utc>>,
    pub accepted_by_fe_id: Option<EngineerId>,
    pub accepted_by_fe_name: Option<String>,
    /// Última versión del servidor aplicada (None si nunca llegó versionada)
    pub version: Option<u64>,
    pub radius_authority: RadiusAuthority,
    pub confirmation: Option<AcceptanceConfirmation>,
    /// Expirada por el TTL local, no por el servidor; cualquier estado que
    /// envíe el servidor la reemplaza
    #[serde(default)]
    pub expired_locally: bool,
}

/// Campos parciales de una solicitud (eventos `newServiceRequest` /
/// `serviceRequestUpdate` o polling). Claves canonicalizadas.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestPatch {
    #[serde(rename = "requestid")]
    pub request_id: Option<RequestId>,
    #[serde(rename = "branchid")]
    pub branch_id: Option<BranchId>,
    #[serde(rename = "branchname")]
    pub branch_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<RequestStatus>,
    #[serde(rename = "createdat", default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "currentradiuskm")]
    pub current_radius_km: Option<f64>,
    #[serde(rename = "acceptedat", default, deserialize_with = "lenient_datetime")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(rename = "acceptedbyfeid")]
    pub accepted_by_fe_id: Option<EngineerId>,
    #[serde(rename = "acceptedbyfename")]
    pub accepted_by_fe_name: Option<String>,
    pub version: Option<u64>,
}

pub const REQUEST_KEY_ALIASES: &[(&str, &str)] = &[
    ("id", "requestid"),
    ("servicerequestid", "requestid"),
    ("branchlat", "latitude"),
    ("branchlng", "longitude"),
    ("lat", "latitude"),
    ("lng", "longitude"),
    ("lon", "longitude"),
    ("radiuskm", "currentradiuskm"),
    ("searchradiuskm", "currentradiuskm"),
    ("radius", "currentradiuskm"),
    ("acceptedby", "acceptedbyfeid"),
    ("feid", "acceptedbyfeid"),
    ("fename", "acceptedbyfename"),
    ("sequence", "version"),
    ("seq", "version"),
];

impl ServiceRequest {
    /// Solicitud Pending recién creada por el operador
    pub fn pending(
        request_id: RequestId,
        branch_id: BranchId,
        branch_name: String,
        coordinate: Coordinate,
        created_at: DateTime<Utc>,
        initial_radius_km: f64,
    ) -> Self {
        Self {
            request_id,
            branch_id,
            branch_name,
            coordinate,
            status: RequestStatus::Pending,
            created_at,
            current_radius_km: initial_radius_km,
            accepted_at: None,
            accepted_by_fe_id: None,
            accepted_by_fe_name: None,
            version: None,
            radius_authority: RadiusAuthority::Local,
            confirmation: None,
            expired_locally: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Construye una solicitud desde un patch; la posición de la sucursal es
    /// obligatoria (puede venir del cache de sucursales vía `fallback`)
    pub fn from_patch(
        request_id: RequestId,
        patch: &RequestPatch,
        fallback: Option<(&str, Coordinate)>,
        initial_radius_km: f64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let branch_id = patch.branch_id.clone()?;
        let coordinate = match (patch.latitude, patch.longitude) {
            (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
            _ => fallback.map(|(_, coordinate)| coordinate)?,
        };
        let branch_name = patch
            .branch_name
            .clone()
            .or_else(|| fallback.map(|(name, _)| name.to_string()))
            .unwrap_or_default();

        let mut request = Self::pending(
            request_id,
            branch_id,
            branch_name,
            coordinate,
            patch.created_at.unwrap_or(now),
            initial_radius_km,
        );
        request.apply_patch(patch);
        Some(request)
    }

    /// Merge superficial de los campos presentes. La política de staleness
    /// (versiones, regresiones de estado) la decide el reconciliador antes.
    pub fn apply_patch(&mut self, patch: &RequestPatch) {
        if let Some(branch_id) = &patch.branch_id {
            self.branch_id = branch_id.clone();
        }
        if let Some(name) = &patch.branch_name {
            self.branch_name = name.clone();
        }
        if let Some(lat) = patch.latitude {
            self.coordinate.lat = lat;
        }
        if let Some(lng) = patch.longitude {
            self.coordinate.lng = lng;
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = created_at;
        }
        if let Some(radius) = patch.current_radius_km {
            self.current_radius_km = radius;
            self.radius_authority = RadiusAuthority::Server;
        }
        if let Some(accepted_at) = patch.accepted_at {
            self.accepted_at = Some(accepted_at);
        }
        if let Some(fe_id) = &patch.accepted_by_fe_id {
            self.accepted_by_fe_id = Some(fe_id.clone());
        }
        if let Some(fe_name) = &patch.accepted_by_fe_name {
            self.accepted_by_fe_name = Some(fe_name.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
            self.expired_locally = false;
            if status == RequestStatus::Accepted {
                // El broadcast del servidor es la confirmación autoritativa
                self.confirmation = Some(AcceptanceConfirmation::Confirmed);
            }
        }
        if let Some(version) = patch.version {
            self.version = Some(version);
        }
    }
}
