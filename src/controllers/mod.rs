//! Controladores HTTP

pub mod dispatch_controller;
pub mod map_socket_controller;
