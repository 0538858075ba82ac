//! Motor de despacho de field engineers
//!
//! Matching geográfico de engineers contra solicitudes de servicio de
//! sucursales, ciclo de vida de rutas y reconciliación en tiempo real con el
//! backend. El binario en `main.rs` sólo arma las piezas de este crate.

pub mod clients;
pub mod config;
pub mod controllers;
pub mod dto;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
