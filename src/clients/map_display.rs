//! Colaborador de visualización del mapa
//!
//! El motor no dibuja nada: empuja la geometría de la ruta seleccionada y su
//! estilo (según el estado de la ruta) a quien esté renderizando el mapa.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Route, RouteId, RouteStatus};

/// Estilo de la línea de ruta
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintStyle {
    pub line_color: String,
    pub line_width: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_dasharray: Option<Vec<f64>>,
}

impl PaintStyle {
    pub fn for_status(status: RouteStatus) -> Self {
        match status {
            RouteStatus::InProgress => Self {
                line_color: "#2563eb".to_string(),
                line_width: 4.0,
                line_dasharray: None,
            },
            RouteStatus::Delayed => Self {
                line_color: "#dc2626".to_string(),
                line_width: 4.0,
                line_dasharray: Some(vec![2.0, 2.0]),
            },
            RouteStatus::Arriving => Self {
                line_color: "#16a34a".to_string(),
                line_width: 5.0,
                line_dasharray: None,
            },
        }
    }
}

/// Geometría + estilo de la ruta seleccionada
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOverlay {
    pub route_id: RouteId,
    pub route_geometry: serde_json::Value,
    pub paint_style: PaintStyle,
}

impl RouteOverlay {
    /// `None` si la ruta todavía no tiene geometría
    pub fn for_route(route: &Route) -> Option<Self> {
        let geometry = route.geometry.clone()?;
        Some(Self {
            route_id: route.route_id,
            route_geometry: geometry,
            paint_style: PaintStyle::for_status(route.status),
        })
    }
}

/// Comando enviado al mapa
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapDisplayCommand {
    ShowRoute(RouteOverlay),
    ClearRoute,
}

#[async_trait]
pub trait MapDisplay: Send + Sync {
    async fn show_route(&self, overlay: RouteOverlay);
    async fn clear_route(&self);
}

/// Fan-out por canal broadcast hacia los websockets `/ws/map`
pub struct BroadcastMapDisplay {
    sender: broadcast::Sender<MapDisplayCommand>,
}

impl BroadcastMapDisplay {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapDisplayCommand> {
        self.sender.subscribe()
    }

    fn publish(&self, command: MapDisplayCommand) {
        // Sin suscriptores el comando simplemente se pierde
        let _ = self.sender.send(command);
    }
}

impl Default for BroadcastMapDisplay {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl MapDisplay for BroadcastMapDisplay {
    async fn show_route(&self, overlay: RouteOverlay) {
        log::debug!("🗺️ Mostrando ruta {} en el mapa", overlay.route_id);
        self.publish(MapDisplayCommand::ShowRoute(overlay));
    }

    async fn clear_route(&self) {
        log::debug!("🧹 Limpiando ruta del mapa");
        self.publish(MapDisplayCommand::ClearRoute);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delayed_routes_are_dashed_red() {
        let paint = PaintStyle::for_status(RouteStatus::Delayed);
        assert_eq!(paint.line_color, "#dc2626");
        assert!(paint.line_dasharray.is_some());
        assert!(PaintStyle::for_status(RouteStatus::InProgress).line_dasharray.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_display_reaches_subscribers() {
        let display = BroadcastMapDisplay::default();
        let mut rx = display.subscribe();

        display.clear_route().await;

        assert_eq!(rx.recv().await.unwrap(), MapDisplayCommand::ClearRoute);
    }

    #[test]
    fn test_command_serialization_is_tagged() {
        let json = serde_json::to_value(MapDisplayCommand::ClearRoute).unwrap();
        assert_eq!(json["type"], "clearRoute");
    }
}
