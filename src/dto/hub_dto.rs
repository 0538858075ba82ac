//! DTOs del hub en tiempo real
//!
//! Los eventos llegan por nombre y con payload JSON libre. Aquí se traducen una
//! sola vez a un enum cerrado (`HubEvent`) para que el reconciliador tenga
//! exhaustividad en tiempo de compilación.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::models::branch::BRANCH_KEY_ALIASES;
use crate::models::field_engineer::ENGINEER_KEY_ALIASES;
use crate::models::route::ROUTE_KEY_ALIASES;
use crate::models::service_request::REQUEST_KEY_ALIASES;
use crate::models::{BranchPatch, EngineerPatch, RequestPatch, RouteId, RoutePatch};
use crate::utils::casing::canonicalize_payload;

/// Separador de registros del protocolo JSON de SignalR
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Tipos de evento conocidos del hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEventKind {
    FieldEngineerUpdate,
    BranchUpdate,
    NewServiceRequest,
    ServiceRequestUpdate,
    NewRoute,
    RouteUpdate,
    RouteCompleted,
    Connected,
    Disconnected,
    Error,
}

impl HubEventKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim() {
            "fieldEngineerUpdate" | "newFieldEngineer" => HubEventKind::FieldEngineerUpdate,
            "branchUpdate" | "newBranch" => HubEventKind::BranchUpdate,
            "newServiceRequest" => HubEventKind::NewServiceRequest,
            "serviceRequestUpdate" => HubEventKind::ServiceRequestUpdate,
            "newRoute" => HubEventKind::NewRoute,
            "routeUpdate" => HubEventKind::RouteUpdate,
            "routeCompleted" => HubEventKind::RouteCompleted,
            "connected" => HubEventKind::Connected,
            "disconnected" => HubEventKind::Disconnected,
            "error" => HubEventKind::Error,
            _ => return None,
        };
        Some(kind)
    }

    /// Etiqueta estable para logs y métricas
    pub fn label(&self) -> &'static str {
        match self {
            HubEventKind::FieldEngineerUpdate => "fieldEngineerUpdate",
            HubEventKind::BranchUpdate => "branchUpdate",
            HubEventKind::NewServiceRequest => "newServiceRequest",
            HubEventKind::ServiceRequestUpdate => "serviceRequestUpdate",
            HubEventKind::NewRoute => "newRoute",
            HubEventKind::RouteUpdate => "routeUpdate",
            HubEventKind::RouteCompleted => "routeCompleted",
            HubEventKind::Connected => "connected",
            HubEventKind::Disconnected => "disconnected",
            HubEventKind::Error => "error",
        }
    }
}

/// Evento tipado del hub
#[derive(Debug, Clone)]
pub enum HubEvent {
    EngineerUpdated(EngineerPatch),
    BranchUpserted(BranchPatch),
    RequestCreated(RequestPatch),
    RequestUpdated(RequestPatch),
    RouteCreated(RoutePatch),
    RouteUpdated(RoutePatch),
    RouteCompleted(Option<RouteId>),
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown hub event '{0}'")]
    UnknownEvent(String),

    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl HubEvent {
    pub fn kind(&self) -> HubEventKind {
        match self {
            HubEvent::EngineerUpdated(_) => HubEventKind::FieldEngineerUpdate,
            HubEvent::BranchUpserted(_) => HubEventKind::BranchUpdate,
            HubEvent::RequestCreated(_) => HubEventKind::NewServiceRequest,
            HubEvent::RequestUpdated(_) => HubEventKind::ServiceRequestUpdate,
            HubEvent::RouteCreated(_) => HubEventKind::NewRoute,
            HubEvent::RouteUpdated(_) => HubEventKind::RouteUpdate,
            HubEvent::RouteCompleted(_) => HubEventKind::RouteCompleted,
            HubEvent::Connected => HubEventKind::Connected,
            HubEvent::Disconnected => HubEventKind::Disconnected,
            HubEvent::Error(_) => HubEventKind::Error,
        }
    }

    /// Traduce un evento por nombre + payload crudo al enum tipado
    pub fn decode(name: &str, payload: Value) -> Result<Self, EventDecodeError> {
        let kind = HubEventKind::from_name(name)
            .ok_or_else(|| EventDecodeError::UnknownEvent(name.to_string()))?;
        Self::decode_kind(kind, payload)
    }

    pub fn decode_kind(kind: HubEventKind, payload: Value) -> Result<Self, EventDecodeError> {
        let event = match kind {
            HubEventKind::FieldEngineerUpdate => {
                HubEvent::EngineerUpdated(decode_patch(kind, payload, ENGINEER_KEY_ALIASES)?)
            }
            HubEventKind::BranchUpdate => {
                HubEvent::BranchUpserted(decode_patch(kind, payload, BRANCH_KEY_ALIASES)?)
            }
            HubEventKind::NewServiceRequest => {
                HubEvent::RequestCreated(decode_patch(kind, payload, REQUEST_KEY_ALIASES)?)
            }
            HubEventKind::ServiceRequestUpdate => {
                HubEvent::RequestUpdated(decode_patch(kind, payload, REQUEST_KEY_ALIASES)?)
            }
            HubEventKind::NewRoute => {
                HubEvent::RouteCreated(decode_patch(kind, payload, ROUTE_KEY_ALIASES)?)
            }
            HubEventKind::RouteUpdate => {
                HubEvent::RouteUpdated(decode_patch(kind, payload, ROUTE_KEY_ALIASES)?)
            }
            HubEventKind::RouteCompleted => HubEvent::RouteCompleted(decode_route_completion(kind, payload)?),
            HubEventKind::Connected => HubEvent::Connected,
            HubEventKind::Disconnected => HubEvent::Disconnected,
            HubEventKind::Error => HubEvent::Error(match payload {
                Value::String(message) => message,
                other => other.to_string(),
            }),
        };
        Ok(event)
    }
}

/// Canonicaliza el casing y deserializa el patch parcial
pub fn decode_patch<T: DeserializeOwned>(
    kind: HubEventKind,
    payload: Value,
    aliases: &[(&str, &str)],
) -> Result<T, EventDecodeError> {
    serde_json::from_value(canonicalize_payload(payload, aliases)).map_err(|source| {
        EventDecodeError::InvalidPayload {
            kind: kind.label(),
            source,
        }
    })
}

/// `routeCompleted` puede traer sólo el id o un objeto con `routeId`
fn decode_route_completion(kind: HubEventKind, payload: Value) -> Result<Option<RouteId>, EventDecodeError> {
    match payload {
        Value::Object(_) => {
            let patch: RoutePatch = decode_patch(kind, payload, ROUTE_KEY_ALIASES)?;
            Ok(patch.route_id)
        }
        Value::Null => Ok(None),
        scalar => serde_json::from_value(scalar)
            .map(Some)
            .map_err(|source| EventDecodeError::InvalidPayload {
                kind: kind.label(),
                source,
            }),
    }
}

/// Extrae `(nombre, payload)` de un frame de texto del websocket.
///
/// Acepta invocaciones SignalR (`{"type":1,"target":..,"arguments":[..]}`,
/// separadas por 0x1E) y frames planos `{"event":..,"data":..}`. Pings,
/// handshakes y frames ilegibles se ignoran.
pub fn parse_frames(text: &str) -> Vec<(String, Value)> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| match serde_json::from_str::<Value>(record) {
            Ok(value) => frame_to_event(value),
            Err(e) => {
                tracing::warn!("⚠️ Frame del hub ilegible descartado: {}", e);
                None
            }
        })
        .collect()
}

fn frame_to_event(frame: Value) -> Option<(String, Value)> {
    let Value::Object(mut object) = frame else {
        return None;
    };

    if let Some(Value::String(target)) = object.remove("target") {
        let payload = match object.remove("arguments") {
            Some(Value::Array(mut arguments)) if !arguments.is_empty() => arguments.swap_remove(0),
            _ => Value::Null,
        };
        return Some((target, payload));
    }

    let name = match object.remove("event") {
        Some(Value::String(name)) => name,
        _ => match object.remove("type") {
            Some(Value::String(name)) => name,
            _ => return None,
        },
    };
    let payload = object
        .remove("data")
        .or_else(|| object.remove("payload"))
        .unwrap_or(Value::Null);
    Some((name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signalr_frames_are_split_and_parsed() {
        let text = format!(
            "{}{}{}{}{}",
            r#"{"type":1,"target":"fieldEngineerUpdate","arguments":[{"FeId":"fe-1","Lat":14.6}]}"#,
            RECORD_SEPARATOR,
            r#"{"type":6}"#,
            RECORD_SEPARATOR,
            "{}"
        );

        let frames = parse_frames(&text);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, "fieldEngineerUpdate");
        assert_eq!(frames[0].1["FeId"], "fe-1");
    }

    #[test]
    fn test_plain_frames_are_parsed() {
        let frames = parse_frames(r#"{"event":"routeCompleted","data":1700000000000}"#);
        assert_eq!(frames, vec![("routeCompleted".to_string(), json!(1700000000000u64))]);
    }

    #[test]
    fn test_decode_uses_canonical_casing() {
        let event = HubEvent::decode(
            "serviceRequestUpdate",
            json!({"RequestId": "r-1", "Status": "Accepted", "Version": 3}),
        )
        .unwrap();

        match event {
            HubEvent::RequestUpdated(patch) => {
                assert_eq!(patch.request_id.unwrap().as_str(), "r-1");
                assert_eq!(patch.version, Some(3));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_and_bad_payload_are_errors() {
        assert!(matches!(
            HubEvent::decode("somethingElse", json!({})),
            Err(EventDecodeError::UnknownEvent(_))
        ));
        assert!(matches!(
            HubEvent::decode("fieldEngineerUpdate", json!({"status": "sleeping"})),
            Err(EventDecodeError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_route_completed_accepts_scalar_or_object() {
        assert!(matches!(
            HubEvent::decode("routeCompleted", json!("42")).unwrap(),
            HubEvent::RouteCompleted(Some(RouteId(42)))
        ));
        assert!(matches!(
            HubEvent::decode("routeCompleted", json!({"routeId": 43})).unwrap(),
            HubEvent::RouteCompleted(Some(RouteId(43)))
        ));
    }
}
