//! Cliente del hub en tiempo real
//!
//! Lee el websocket del hub, traduce cada frame a `HubEvent` y lo envía al
//! bucle de eventos por un canal. Si la conexión cae emite `Disconnected` y
//! reconecta con backoff exponencial + jitter; el roster no se toca.

use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::dto::hub_dto::{parse_frames, EventDecodeError, HubEvent, RECORD_SEPARATOR};
use crate::metrics::HUB_EVENTS;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const KEEPALIVE_EVERY: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum HubError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("event channel closed")]
    ChannelClosed,
}

pub struct HubClient {
    url: String,
    signalr_handshake: bool,
    events: mpsc::Sender<HubEvent>,
}

impl HubClient {
    pub fn new(url: String, signalr_handshake: bool, events: mpsc::Sender<HubEvent>) -> Self {
        Self {
            url,
            signalr_handshake,
            events,
        }
    }

    /// Bucle de conexión; termina sólo si el receptor de eventos desaparece
    pub async fn run(self) {
        let mut attempt: u32 = 0;
        loop {
            match self.connect_and_listen(&mut attempt).await {
                Ok(()) => log::warn!("🔌 El hub cerró la conexión"),
                Err(HubError::ChannelClosed) => {
                    log::info!("📭 Receptor de eventos cerrado; cliente del hub detenido");
                    return;
                }
                Err(e) => log::warn!("⚠️ Conexión con el hub perdida: {}", e),
            }

            if self.events.send(HubEvent::Disconnected).await.is_err() {
                return;
            }

            let delay = backoff_delay(attempt);
            attempt = attempt.saturating_add(1);
            log::info!("🔄 Reconectando al hub en {:?} (intento {})", delay, attempt);
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_listen(&self, attempt: &mut u32) -> Result<(), HubError> {
        log::info!("🔗 Conectando al hub {}", self.url);
        let (mut socket, _) = connect_async(self.url.as_str()).await?;

        if self.signalr_handshake {
            socket
                .send(Message::Text(format!(
                    "{{\"protocol\":\"json\",\"version\":1}}{}",
                    RECORD_SEPARATOR
                )))
                .await?;
        }

        *attempt = 0;
        self.events
            .send(HubEvent::Connected)
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        let mut keepalive = tokio::time::interval(KEEPALIVE_EVERY);
        keepalive.tick().await;

        loop {
            tokio::select! {
                message = socket.next() => {
                    let Some(message) = message else {
                        return Ok(());
                    };
                    match message? {
                        Message::Text(text) => self.forward_frames(&text).await?,
                        Message::Binary(bytes) => {
                            if let Ok(text) = String::from_utf8(bytes) {
                                self.forward_frames(&text).await?;
                            }
                        }
                        Message::Ping(payload) => socket.send(Message::Pong(payload)).await?,
                        Message::Close(_) => return Ok(()),
                        _ => {}
                    }
                }
                _ = keepalive.tick(), if self.signalr_handshake => {
                    socket
                        .send(Message::Text(format!("{{\"type\":6}}{}", RECORD_SEPARATOR)))
                        .await?;
                }
            }
        }
    }

    async fn forward_frames(&self, text: &str) -> Result<(), HubError> {
        for (name, payload) in parse_frames(text) {
            match HubEvent::decode(&name, payload) {
                Ok(event) => self
                    .events
                    .send(event)
                    .await
                    .map_err(|_| HubError::ChannelClosed)?,
                Err(EventDecodeError::UnknownEvent(name)) => {
                    log::debug!("🤷 Evento del hub desconocido '{}' ignorado", name);
                    HUB_EVENTS.with_label_values(&["unknown", "dropped"]).inc();
                }
                Err(e) => {
                    let kind = match &e {
                        EventDecodeError::InvalidPayload { kind, .. } => *kind,
                        EventDecodeError::UnknownEvent(_) => "unknown",
                    };
                    log::warn!("⚠️ Evento del hub descartado: {}", e);
                    HUB_EVENTS.with_label_values(&[kind, "dropped"]).inc();
                }
            }
        }
        Ok(())
    }
}

/// `base * 2^attempt`, con tope, más hasta un 50% de jitter
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BACKOFF_BASE
        .checked_mul(2u32.saturating_pow(attempt.min(16)))
        .unwrap_or(BACKOFF_MAX)
        .min(BACKOFF_MAX);
    let jitter_ms = rand::thread_rng().gen_range(0..=exponential.as_millis() as u64 / 2);
    exponential + Duration::from_millis(jitter_ms)
}
