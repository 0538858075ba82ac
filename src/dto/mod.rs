//! DTOs
//!
//! Formas de datos en la frontera: API HTTP, backend REST, hub en tiempo real
//! y proveedor de direcciones.

pub mod backend_dto;
pub mod directions_dto;
pub mod dispatch_dto;
pub mod hub_dto;
