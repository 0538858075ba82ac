//! Utilidades del sistema
//!
//! Este módulo contiene utilidades para manejo de errores, validación
//! y canonicalización de payloads del backend.

pub mod casing;
pub mod errors;
pub mod validation;

pub use errors::{AppError, AppResult};
