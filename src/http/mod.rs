//! HTTP front: axum wiring for the request pipeline and websocket streams.

pub mod mime;
pub mod server;
pub mod websocket;

pub use server::{AppState, HttpServer};
