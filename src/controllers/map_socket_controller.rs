//! Websocket `/ws/map`
//!
//! Cada cliente recibe la ruta seleccionada actual al conectarse y luego
//! todos los comandos del mapa (mostrar / limpiar ruta) como JSON.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::clients::map_display::{MapDisplayCommand, RouteOverlay};
use crate::state::AppState;

pub async fn map_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Suscribirse antes de leer el estado para no perder comandos intermedios
    let commands = state.map_display.subscribe();
    let initial = {
        let store = state.dispatch.store();
        let store = store.read().await;
        store
            .selected_route()
            .and_then(|route_id| store.route(route_id))
            .and_then(RouteOverlay::for_route)
            .map(MapDisplayCommand::ShowRoute)
    };

    ws.on_upgrade(move |socket| stream_commands(socket, initial, commands))
}

async fn stream_commands(
    mut socket: WebSocket,
    initial: Option<MapDisplayCommand>,
    mut commands: broadcast::Receiver<MapDisplayCommand>,
) {
    log::debug!("🗺️ Cliente de mapa conectado");

    if let Some(command) = initial {
        if send_command(&mut socket, &command).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(command) => {
                    if send_command(&mut socket, &command).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("⚠️ Cliente de mapa atrasado; {} comandos omitidos", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    log::debug!("🗺️ Cliente de mapa desconectado");
}

async fn send_command(socket: &mut WebSocket, command: &MapDisplayCommand) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(command) {
        Ok(text) => text,
        Err(e) => {
            log::error!("❌ No se pudo serializar el comando del mapa: {}", e);
            return Ok(());
        }
    };
    socket.send(Message::Text(text)).await
}
