//! Clients - colaboradores externos
//!
//! Backend REST (sistema de registro), hub en tiempo real, proveedor de
//! direcciones y visualización del mapa.

pub mod backend_client;
pub mod directions_client;
pub mod hub_client;
pub mod map_display;

pub use backend_client::{DispatchBackend, HttpDispatchBackend};
pub use directions_client::{DirectionsProvider, MapboxDirectionsClient};
pub use hub_client::HubClient;
pub use map_display::{BroadcastMapDisplay, MapDisplay};
