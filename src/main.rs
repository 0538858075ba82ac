use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use field_dispatch::clients::{BroadcastMapDisplay, HttpDispatchBackend, HubClient, MapboxDirectionsClient};
use field_dispatch::config::environment::EnvironmentConfig;
use field_dispatch::metrics::register_metrics;
use field_dispatch::routes::create_app_router;
use field_dispatch::services::RadiusExpansionScheduler;
use field_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🛠️ Field Dispatch - Motor de despacho de field engineers");
    info!("=======================================================");

    let config = EnvironmentConfig::from_env()?;
    register_metrics();

    if config.mapbox_token.is_none() {
        warn!("⚠️ MAPBOX_TOKEN no configurado: las rutas quedarán en 'Calculating...'");
    }

    let backend = Arc::new(HttpDispatchBackend::new(config.backend_base_url.clone())?);
    let directions = Arc::new(MapboxDirectionsClient::new(
        config.directions_base_url.clone(),
        config.mapbox_token.clone(),
        config.directions_timeout,
    )?);
    let map_display = Arc::new(BroadcastMapDisplay::default());

    let app_state = AppState::new(config.clone(), backend, directions, map_display);
    let dispatch = app_state.dispatch.clone();

    // Carga inicial del roster; si falla, el polling lo reintenta
    if let Err(e) = dispatch.refresh_roster().await {
        warn!("⚠️ Carga inicial del roster falló: {}", e);
    }

    // Tareas de fondo de la sesión
    let (events_tx, events_rx) = mpsc::channel(1024);
    let background = vec![
        tokio::spawn(HubClient::new(config.hub_url.clone(), config.hub_signalr_handshake, events_tx).run()),
        tokio::spawn(dispatch.clone().run_event_loop(events_rx)),
        tokio::spawn(dispatch.clone().run_roster_poller(config.roster_poll_interval)),
        tokio::spawn(
            RadiusExpansionScheduler::new(config.radius.clone()).run(dispatch.store(), config.scheduler_tick),
        ),
    ];

    let app = create_app_router(app_state);
    let addr: SocketAddr = config.server_url().parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET    /health - Health check");
    info!("   GET    /metrics - Métricas Prometheus");
    info!("   GET    /ws/map - Stream de comandos del mapa");
    info!("   GET    /api/dispatch/snapshot - Roster completo");
    info!("   POST   /api/dispatch/service-requests - Solicitar servicio");
    info!("   GET    /api/dispatch/service-requests/:id/candidates - Engineers elegibles");
    info!("   GET    /api/dispatch/service-requests/:id/radius - Radio de búsqueda (GeoJSON)");
    info!("   POST   /api/dispatch/service-requests/:id/accept - Aceptar solicitud");
    info!("   POST   /api/dispatch/service-requests/:id/cancel - Cancelar solicitud");
    info!("   POST   /api/dispatch/routes/:id/display - Mostrar ruta en el mapa");
    info!("   DELETE /api/dispatch/routes/display - Limpiar mapa");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
    }

    // Fin de la sesión: el roster se descarta con las tareas
    for task in background {
        task.abort();
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
