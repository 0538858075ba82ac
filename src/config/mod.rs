//! Configuración del proyecto
//!
//! Este módulo contiene las variables de entorno y la política de despacho.

pub mod environment;

pub use environment::*;
