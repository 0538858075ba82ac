//! Store
//!
//! Estado en memoria de la sesión de despacho.

pub mod dispatch_store;

pub use dispatch_store::{DispatchStore, RosterSnapshot};
