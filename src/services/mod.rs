//! Services module
//!
//! Lógica de despacho: distancia geográfica, matching de engineers, ciclo de
//! vida de solicitudes, materialización de rutas, reconciliación de eventos y
//! expansión del radio. `DispatchService` es la fachada que usan los
//! controladores y las tareas de fondo.

pub mod dispatch_service;
pub mod eligibility_matcher;
pub mod event_reconciler;
pub mod geo_distance;
pub mod radius_scheduler;
pub mod request_lifecycle;
pub mod route_materializer;

pub use dispatch_service::DispatchService;
pub use eligibility_matcher::{find_candidates, RankedCandidate};
pub use event_reconciler::{EventReconciler, FollowUp, MergeOutcome};
pub use radius_scheduler::RadiusExpansionScheduler;
pub use request_lifecycle::AcceptOutcome;
pub use route_materializer::{EnrichmentOutcome, RouteMaterializer};
