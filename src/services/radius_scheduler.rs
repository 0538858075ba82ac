//! Expansión periódica del radio de búsqueda
//!
//! Cada tick recorre las solicitudes Pending: las que superaron el TTL expiran
//! y el resto crece en escalones hasta el máximo. El estado se relee bajo el
//! mismo lock justo antes de cada escalón, así que una solicitud aceptada
//! nunca vuelve a crecer.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::request_lifecycle;
use crate::config::RadiusPolicy;
use crate::metrics::RADIUS_STEPS;
use crate::models::{RadiusAuthority, RequestId};
use crate::store::DispatchStore;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub expanded: Vec<RequestId>,
    pub expired: Vec<RequestId>,
}

pub struct RadiusExpansionScheduler {
    policy: RadiusPolicy,
}

impl RadiusExpansionScheduler {
    pub fn new(policy: RadiusPolicy) -> Self {
        Self { policy }
    }

    /// `min(initial + step * floor(age / interval), max)`
    pub fn target_radius(&self, age: Duration) -> f64 {
        let interval = self.policy.step_interval.as_secs_f64();
        if interval <= 0.0 {
            return self.policy.initial_radius_km;
        }
        let steps = (age.as_secs_f64() / interval).floor();
        (self.policy.initial_radius_km + self.policy.step_km * steps).min(self.policy.max_radius_km)
    }

    pub fn tick(&self, store: &mut DispatchStore, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for request in store.requests_mut() {
            if !request.is_pending() {
                continue;
            }

            // El servidor ya manda sobre esta solicitud: ni expira ni crece aquí
            if request.radius_authority != RadiusAuthority::Local {
                continue;
            }

            let age = (now - request.created_at).to_std().unwrap_or(Duration::ZERO);

            if age >= self.policy.request_ttl {
                if request_lifecycle::expire(request) {
                    report.expired.push(request.request_id.clone());
                }
                continue;
            }

            let target = self.target_radius(age);
            if target > request.current_radius_km {
                log::info!(
                    "📡 Radio de {} ampliado {:.1} -> {:.1} km",
                    request.request_id,
                    request.current_radius_km,
                    target
                );
                request.current_radius_km = target;
                RADIUS_STEPS.inc();
                report.expanded.push(request.request_id.clone());
            }
        }

        report
    }

    /// Bucle de fondo; el lock se toma sólo durante cada tick
    pub async fn run(self, store: Arc<RwLock<DispatchStore>>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        log::info!("⏱️ Scheduler de radio iniciado (cada {:?})", period);
        loop {
            interval.tick().await;
            let report = {
                let mut store = store.write().await;
                self.tick(&mut store, Utc::now())
            };
            if !report.expired.is_empty() {
                log::debug!("⌛ {} solicitudes expiradas en este tick", report.expired.len());
            }
        }
    }
}
