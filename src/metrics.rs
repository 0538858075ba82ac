//! Métricas Prometheus del motor de despacho

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Eventos del hub por tipo y resultado (applied, stale, dropped)
    pub static ref HUB_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("dispatch_hub_events_total", "Real-time events processed by the reconciler"),
        &["kind", "outcome"]
    )
    .expect("valid metric definition");

    pub static ref ENRICHMENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("dispatch_route_enrichments_total", "Directions enrichment attempts"),
        &["outcome"]
    )
    .expect("valid metric definition");

    pub static ref ACCEPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("dispatch_accepts_total", "Operator accept commands"),
        &["outcome"]
    )
    .expect("valid metric definition");

    pub static ref RADIUS_STEPS: IntCounter = IntCounter::new(
        "dispatch_radius_expansions_total",
        "Search radius expansion steps applied locally"
    )
    .expect("valid metric definition");

    pub static ref ACTIVE_ROUTES: IntGauge = IntGauge::new(
        "dispatch_active_routes",
        "Routes currently in the active set"
    )
    .expect("valid metric definition");
}

/// Registrar todas las métricas; llamar una vez al arrancar
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HUB_EVENTS.clone()),
        Box::new(ENRICHMENTS.clone()),
        Box::new(ACCEPTS.clone()),
        Box::new(RADIUS_STEPS.clone()),
        Box::new(ACTIVE_ROUTES.clone()),
    ];
    for collector in collectors {
        // Registrar dos veces (tests) no es un error fatal
        if let Err(e) = REGISTRY.register(collector) {
            tracing::debug!("Métrica ya registrada: {}", e);
        }
    }
}

/// Exposición en formato texto para `/metrics`
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("⚠️ Error codificando métricas: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
