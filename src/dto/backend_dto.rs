//! DTOs del backend REST (sistema de registro)
//!
//! Los bodies salientes son camelCase. Las respuestas se manejan como JSON
//! crudo y pasan por `utils::casing` antes de convertirse en patches, porque
//! el backend no es consistente con el casing de los campos.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{BranchId, EngineerId, RouteId};

/// Body de `POST /serviceRequests`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequestBody {
    pub branch_id: BranchId,
    pub branch_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub current_radius_km: f64,
}

/// Body de `POST /serviceRequests/{id}/accept`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptServiceRequestBody {
    pub fe_id: EngineerId,
    pub fe_name: String,
    pub accepted_at: DateTime<Utc>,
    pub route_id: RouteId,
}

/// Extrae la lista de entidades de una respuesta que puede venir como array
/// plano o envuelta (`{"data": [...]}`, `{"items": [...]}`, `{"value": [...]}`)
pub fn extract_list(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            for key in ["data", "items", "value", "results"] {
                if let Some(Value::Array(items)) = object.remove(key) {
                    return items;
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Extrae una entidad que puede venir envuelta en `{"data": {...}}`
pub fn extract_entity(body: Value) -> Value {
    match body {
        Value::Object(mut object) => match object.remove("data") {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                object.insert("data".to_string(), other);
                Value::Object(object)
            }
            None => Value::Object(object),
        },
        other => other,
    }
}
