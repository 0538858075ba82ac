//! Modelos del sistema
//!
//! Este módulo contiene las entidades del roster de despacho: sucursales,
//! field engineers, solicitudes de servicio y rutas en curso.

pub mod branch;
pub mod field_engineer;
pub mod geo;
pub mod ids;
pub mod route;
pub mod service_request;

pub use branch::{Branch, BranchPatch};
pub use field_engineer::{EngineerPatch, EngineerStatus, FieldEngineer};
pub use geo::Coordinate;
pub use ids::{BranchId, EngineerId, RequestId, RouteId};
pub use route::{Route, RouteEnrichment, RoutePatch, RouteStatus, RouteStatusSignal, CALCULATING};
pub use service_request::{
    AcceptanceConfirmation, RadiusAuthority, RequestPatch, RequestStatus, ServiceRequest,
};
