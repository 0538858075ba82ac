//! Middleware del sistema
//!
//! Este módulo contiene la configuración de CORS del router HTTP.

pub mod cors;

pub use cors::*;
