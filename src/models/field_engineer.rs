//! Modelo de FieldEngineer
//!
//! Técnico móvil rastreado por posición y estado. Sólo los `Active` son
//! elegibles para una nueva asignación.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::geo::Coordinate;
use super::ids::EngineerId;

/// Estado del field engineer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum EngineerStatus {
    Active,
    OnAssignment,
    Inactive,
}

impl FromStr for EngineerStatus {
    type Err = String;

    /// Único punto donde se canonicaliza el estado ('Active', 'active', 'on_assignment'...)
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match canonical_token(value).as_str() {
            "active" | "available" | "online" => Ok(EngineerStatus::Active),
            "onassignment" | "assigned" | "busy" | "enroute" | "onroute" => {
                Ok(EngineerStatus::OnAssignment)
            }
            "inactive" | "offline" | "off" => Ok(EngineerStatus::Inactive),
            _ => Err(format!("unknown engineer status '{}'", value)),
        }
    }
}

impl TryFrom<String> for EngineerStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for EngineerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineerStatus::Active => "Active",
            EngineerStatus::OnAssignment => "OnAssignment",
            EngineerStatus::Inactive => "Inactive",
        };
        f.write_str(label)
    }
}

/// Minúsculas y sin separadores, para comparar estados de distintas fuentes
pub(crate) fn canonical_token(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEngineer {
    pub fe_id: EngineerId,
    pub name: String,
    pub coordinate: Coordinate,
    pub status: EngineerStatus,
}

/// Campos parciales de un engineer (evento `fieldEngineerUpdate` o polling).
/// Las claves ya vienen canonicalizadas (ver `utils::casing`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineerPatch {
    #[serde(rename = "feid")]
    pub fe_id: Option<EngineerId>,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<EngineerStatus>,
}

pub const ENGINEER_KEY_ALIASES: &[(&str, &str)] = &[
    ("id", "feid"),
    ("engineerid", "feid"),
    ("fieldengineerid", "feid"),
    ("fename", "name"),
    ("fullname", "name"),
    ("lat", "latitude"),
    ("lng", "longitude"),
    ("lon", "longitude"),
];

impl FieldEngineer {
    pub fn is_available(&self) -> bool {
        self.status == EngineerStatus::Active
    }

    /// Un engineer nuevo necesita al menos su posición; el estado por defecto es Active
    pub fn from_patch(fe_id: EngineerId, patch: &EngineerPatch) -> Option<Self> {
        let coordinate = Coordinate::new(patch.latitude?, patch.longitude?);
        Some(Self {
            fe_id,
            name: patch.name.clone().unwrap_or_default(),
            coordinate,
            status: patch.status.unwrap_or(EngineerStatus::Active),
        })
    }

    /// Merge superficial; devuelve `true` si cambió la posición
    pub fn apply_patch(&mut self, patch: &EngineerPatch) -> bool {
        let before = self.coordinate;
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(lat) = patch.latitude {
            self.coordinate.lat = lat;
        }
        if let Some(lng) = patch.longitude {
            self.coordinate.lng = lng;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        before != self.coordinate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!("Active".parse::<EngineerStatus>(), Ok(EngineerStatus::Active));
        assert_eq!("active".parse::<EngineerStatus>(), Ok(EngineerStatus::Active));
        assert_eq!("On Assignment".parse::<EngineerStatus>(), Ok(EngineerStatus::OnAssignment));
        assert_eq!("on_assignment".parse::<EngineerStatus>(), Ok(EngineerStatus::OnAssignment));
        assert_eq!("INACTIVE".parse::<EngineerStatus>(), Ok(EngineerStatus::Inactive));
        assert!("sleeping".parse::<EngineerStatus>().is_err());
    }

    #[test]
    fn test_partial_patch_keeps_absent_fields() {
        let mut engineer = FieldEngineer {
            fe_id: EngineerId::new("fe-1"),
            name: "Ana".to_string(),
            coordinate: Coordinate::new(14.6, 120.98),
            status: EngineerStatus::Active,
        };
        let patch: EngineerPatch = serde_json::from_value(serde_json::json!({
            "feid": "fe-1",
            "status": "inactive"
        }))
        .unwrap();

        let moved = engineer.apply_patch(&patch);

        assert!(!moved);
        assert_eq!(engineer.name, "Ana");
        assert_eq!(engineer.status, EngineerStatus::Inactive);
        assert_eq!(engineer.coordinate, Coordinate::new(14.6, 120.98));
    }
}
